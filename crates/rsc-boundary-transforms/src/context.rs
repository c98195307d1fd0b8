use std::path::{Path, PathBuf};

use rustc_hash::FxHashSet;
use swc_core::{
    atoms::Atom,
    common::{DUMMY_SP, Span, SyntaxContext, comments::SingleThreadedComments},
    ecma::{
        ast::*,
        utils::{quote_ident, quote_str},
        visit::{Visit, VisitWith, noop_visit_type},
    },
    quote,
};
use url::Url;

use crate::{
    FxIndexMap,
    config::Caller,
    diagnostics::{BoundaryErrorKind, BoundaryWarningKind, Severity},
    metadata::TransformMetadata,
};

const UNKNOWN_FILE_URI: &str = "file:///unknown";

pub(crate) struct RawDiagnostic {
    pub span: Span,
    pub message: String,
    pub severity: Severity,
}

/// State owned by a single file compilation. Every pass receives it by
/// reference; nothing in it outlives the call to [`crate::transform`].
pub struct FileCompilationContext {
    pub(crate) file_path: PathBuf,
    pub(crate) caller: Caller,
    pub(crate) file_uri: String,
    pub(crate) comments: SingleThreadedComments,
    pub(crate) unresolved_ctxt: SyntaxContext,
    pub(crate) metadata: TransformMetadata,
    used_names: FxHashSet<Atom>,
    runtime_imports: FxIndexMap<(&'static str, &'static str), Ident>,
    bound_args_helper: Option<Ident>,
    diagnostics: Vec<RawDiagnostic>,
}

impl FileCompilationContext {
    pub fn new(
        file_path: impl AsRef<Path>,
        caller: Caller,
        comments: SingleThreadedComments,
        unresolved_ctxt: SyntaxContext,
    ) -> Self {
        let file_path = file_path.as_ref().to_path_buf();
        let file_uri = file_uri(&file_path, caller.project_root.as_deref());

        FileCompilationContext {
            file_path,
            caller,
            file_uri,
            comments,
            unresolved_ctxt,
            metadata: Default::default(),
            used_names: Default::default(),
            runtime_imports: Default::default(),
            bound_args_helper: None,
            diagnostics: vec![],
        }
    }

    /// Records every identifier of the module so generated names never
    /// shadow or collide with user code.
    pub fn reserve_names(&mut self, module: &Module) {
        let mut collector = NameCollector {
            names: &mut self.used_names,
        };
        module.visit_with(&mut collector);
    }

    pub fn file_uri(&self) -> &str {
        &self.file_uri
    }

    pub fn reference_id(&self, name: &str) -> String {
        format!("{}#{name}", self.file_uri)
    }

    /// Generates `_name`, then `_name2`, `_name3`, ... skipping anything
    /// already present in the file or previously generated.
    pub(crate) fn generate_uid(&mut self, name: &str) -> Ident {
        let base = format!("_{}", name.trim_start_matches('_'));
        let mut i = 1;
        loop {
            let candidate: Atom = if i > 1 {
                format!("{base}{i}").into()
            } else {
                base.as_str().into()
            };
            if self.used_names.insert(candidate.clone()) {
                return Ident::new(candidate, DUMMY_SP, SyntaxContext::empty());
            }
            i += 1;
        }
    }

    /// Returns the local binding for a named runtime import, adding the
    /// import on first use.
    pub(crate) fn runtime_import(&mut self, source: &'static str, name: &'static str) -> Ident {
        if let Some(local) = self.runtime_imports.get(&(source, name)) {
            return local.clone();
        }

        let local = if self.used_names.insert(name.into()) {
            Ident::new(name.into(), DUMMY_SP, SyntaxContext::empty())
        } else {
            self.generate_uid(name)
        };
        self.runtime_imports.insert((source, name), local.clone());
        local
    }

    pub(crate) fn take_runtime_imports(&mut self) -> Vec<ModuleItem> {
        let supports_static_esm = self.caller.supports_static_esm;
        let unresolved_ctxt = self.unresolved_ctxt;

        std::mem::take(&mut self.runtime_imports)
            .into_iter()
            .map(|((source, name), local)| {
                if supports_static_esm {
                    ModuleItem::ModuleDecl(ModuleDecl::Import(ImportDecl {
                        span: DUMMY_SP,
                        specifiers: vec![ImportSpecifier::Named(ImportNamedSpecifier {
                            span: DUMMY_SP,
                            imported: (&*local.sym != name).then(|| {
                                ModuleExportName::Ident(Ident::new(
                                    name.into(),
                                    DUMMY_SP,
                                    SyntaxContext::empty(),
                                ))
                            }),
                            local,
                            is_type_only: false,
                        })],
                        src: Box::new(source.into()),
                        type_only: false,
                        with: None,
                        phase: Default::default(),
                    }))
                } else {
                    ModuleItem::Stmt(quote!(
                        "const { [$imported]: $local } = $require($source);" as Stmt,
                        imported: Expr = quote_str!(name).into(),
                        local = local,
                        source: Expr = quote_str!(source).into(),
                        require = quote_ident!(unresolved_ctxt, "require"),
                    ))
                }
            })
            .collect()
    }

    /// Identifier of the per-file `wrapBoundArgs` helper. The declaration is
    /// only emitted when this has been called at least once.
    pub(crate) fn bound_args_helper(&mut self) -> Ident {
        if let Some(helper) = &self.bound_args_helper {
            return helper.clone();
        }
        let helper = self.generate_uid("wrapBoundArgs");
        self.bound_args_helper = Some(helper.clone());
        helper
    }

    pub(crate) fn take_bound_args_helper_decl(&mut self) -> Option<ModuleItem> {
        let helper = self.bound_args_helper.take()?;
        Some(ModuleItem::Stmt(quote!(
            "var $helper = (thunk) => {
                let cache;
                return {
                    get value() {
                        return cache || (cache = thunk());
                    }
                };
            };" as Stmt,
            helper = helper,
        )))
    }

    pub(crate) fn emit_error(&mut self, kind: BoundaryErrorKind) {
        let (span, message) = kind.into_message();
        self.diagnostics.push(RawDiagnostic {
            span,
            message: message.trim_end().to_string(),
            severity: Severity::Error,
        });
    }

    pub(crate) fn emit_warning(&mut self, kind: BoundaryWarningKind) {
        let (span, message) = kind.into_message();
        tracing::warn!(file = %self.file_path.display(), "{}", message.trim_end());
        self.diagnostics.push(RawDiagnostic {
            span,
            message: message.trim_end().to_string(),
            severity: Severity::Warning,
        });
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    pub(crate) fn take_diagnostics(&mut self) -> Vec<RawDiagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    /// Third-party code is not held to the boundary rules.
    pub(crate) fn is_node_module(&self) -> bool {
        self.caller.is_node_module
            || self
                .file_path
                .components()
                .any(|c| c.as_os_str() == "node_modules")
    }
}

fn file_uri(file_path: &Path, project_root: Option<&Path>) -> String {
    if file_path.as_os_str().is_empty() {
        return UNKNOWN_FILE_URI.to_string();
    }

    let absolute = if file_path.is_absolute() {
        file_path.to_path_buf()
    } else if let Some(root) = project_root {
        root.join(file_path)
    } else {
        return UNKNOWN_FILE_URI.to_string();
    };

    Url::from_file_path(&absolute)
        .map(|url| url.to_string())
        .unwrap_or_else(|()| UNKNOWN_FILE_URI.to_string())
}

struct NameCollector<'a> {
    names: &'a mut FxHashSet<Atom>,
}

impl Visit for NameCollector<'_> {
    noop_visit_type!();

    fn visit_ident(&mut self, ident: &Ident) {
        self.names.insert(ident.sym.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(path: &str, caller: Caller) -> FileCompilationContext {
        FileCompilationContext::new(
            path,
            caller,
            SingleThreadedComments::default(),
            SyntaxContext::empty(),
        )
    }

    #[test]
    fn generated_names_are_unique() {
        let mut ctx = context("/app/page.js", Caller::default());
        ctx.used_names.insert("_$$INLINE_ACTION2".into());

        let names: Vec<_> = (0..3)
            .map(|_| ctx.generate_uid("$$INLINE_ACTION").sym.to_string())
            .collect();

        assert_eq!(
            names,
            vec!["_$$INLINE_ACTION", "_$$INLINE_ACTION3", "_$$INLINE_ACTION4"]
        );
    }

    #[test]
    fn runtime_import_avoids_user_bindings() {
        let mut ctx = context("/app/page.js", Caller::default());
        ctx.used_names.insert("registerServerReference".into());

        let local = ctx.runtime_import("react-server-dom-webpack/server", "registerServerReference");
        assert_eq!(&*local.sym, "_registerServerReference");

        let again = ctx.runtime_import("react-server-dom-webpack/server", "registerServerReference");
        assert_eq!(local.sym, again.sym);
        assert_eq!(ctx.take_runtime_imports().len(), 1);
    }

    #[test]
    fn reference_ids_embed_the_absolute_path() {
        let ctx = context("/app/actions.js", Caller::default());
        assert_eq!(ctx.file_uri(), "file:///app/actions.js");
        assert_eq!(ctx.reference_id("foo"), "file:///app/actions.js#foo");
    }

    #[test]
    fn relative_paths_resolve_against_the_project_root() {
        let ctx = context(
            "app/actions.js",
            Caller {
                project_root: Some("/root/project".into()),
                ..Default::default()
            },
        );
        assert_eq!(ctx.file_uri(), "file:///root/project/app/actions.js");

        let ctx = context("", Caller::default());
        assert_eq!(ctx.file_uri(), "file:///unknown");
    }

    #[test]
    fn node_modules_are_detected_from_the_path() {
        let ctx = context("/app/node_modules/lib/index.js", Caller::default());
        assert!(ctx.is_node_module());

        let ctx = context("/app/src/index.js", Caller::default());
        assert!(!ctx.is_node_module());
    }
}
