//! Hoists `"use server"` functions into registered server references and
//! registers the exports of `"use server"` modules in the react-server graph.
//!
//! An inline action
//!
//! ```js
//! export function Page({ id }) {
//!     async function save() {
//!         "use server";
//!         await db.save(id);
//!     }
//! }
//! ```
//!
//! becomes
//!
//! ```js
//! // hoisted action: save
//! export const _$$INLINE_ACTION = registerServerReference(async function save(_$$CLOSURE) {
//!     var [id] = _$$CLOSURE.value;
//!     await db.save(id);
//! }, "file:///app/page.js", "_$$INLINE_ACTION");
//! export function Page({ id }) {
//!     var save = _$$INLINE_ACTION.bind(null, _wrapBoundArgs(() => [id]));
//! }
//! ```

use rustc_hash::FxHashSet;
use swc_core::{
    atoms::Atom,
    common::{
        DUMMY_SP, Span, Spanned,
        comments::{Comment, CommentKind, Comments},
        util::take::Take,
    },
    ecma::{
        ast::*,
        utils::{ExprFactory, quote_str},
        visit::{
            Visit, VisitMut, VisitMutWith, VisitWith, noop_visit_mut_type, noop_visit_type,
            visit_mut_pass,
        },
    },
    quote,
};

use super::{
    closure::ScopeTree,
    directives::{DirectiveKind, DirectiveMap, prologue_len, strip_module_directives, strip_use_server},
    exports::{const_decl, export_name},
};
use crate::{
    context::FileCompilationContext,
    diagnostics::{BoundaryErrorKind, BoundaryWarningKind},
    metadata::ReactServerActions,
};

const SERVER_RUNTIME: &str = "react-server-dom-webpack/server";

#[tracing::instrument(level = tracing::Level::TRACE, skip_all)]
pub fn server_actions<'a>(
    ctx: &'a mut FileCompilationContext,
    scopes: &'a ScopeTree,
    directives: &'a DirectiveMap,
) -> impl Pass + 'a {
    visit_mut_pass(ServerActions {
        is_action_module: directives.module == Some(DirectiveKind::UseServer),
        ctx,
        scopes,
        directives,
        exported_bodies: Default::default(),
        hoisted: vec![],
        hoisted_ids: Default::default(),
        registered: Default::default(),
        closure_param: None,
        action_names: vec![],
        export_names: vec![],
    })
}

struct ServerActions<'a> {
    ctx: &'a mut FileCompilationContext,
    scopes: &'a ScopeTree,
    directives: &'a DirectiveMap,
    is_action_module: bool,
    /// Bodies of exported functions in a `"use server"` module. They are
    /// registered in place and never hoisted.
    exported_bodies: FxHashSet<Span>,
    /// Hoisted declarations in creation order.
    hoisted: Vec<ModuleItem>,
    hoisted_ids: FxHashSet<Atom>,
    /// Module bindings that already refer to a registered reference.
    registered: FxHashSet<Id>,
    closure_param: Option<Ident>,
    action_names: Vec<String>,
    export_names: Vec<String>,
}

impl ServerActions<'_> {
    fn is_action(&self, body: Option<&BlockStmt>) -> bool {
        body.is_some_and(|body| {
            self.directives.is_server_function(body) && !self.exported_bodies.contains(&body.span)
        })
    }

    fn is_action_arrow(&self, arrow: &ArrowExpr) -> bool {
        match &*arrow.body {
            BlockStmtOrExpr::BlockStmt(body) => self.is_action(Some(body)),
            BlockStmtOrExpr::Expr(_) => false,
        }
    }

    /// The synthetic first parameter of every action with captures. Each
    /// hoisted function is its own scope, so one name serves all of them.
    fn closure_param(&mut self) -> Ident {
        if let Some(param) = &self.closure_param {
            return param.clone();
        }
        let param = self.ctx.generate_uid("$$CLOSURE");
        self.closure_param = Some(param.clone());
        param
    }

    /// The leading parameter that receives the bound captures.
    ///
    /// Parameter defaults run before the body, so when a default reads a
    /// capture the captures are destructured in the parameter itself:
    /// `async ({ value: [a] }, b = a) => {}`.
    fn closure_pattern(&mut self, body: &mut BlockStmt, captures: &[Ident], read_by_params: bool) -> Pat {
        if !read_by_params {
            return Pat::Ident(self.bind_captures(body, captures).into());
        }
        Pat::Object(ObjectPat {
            span: DUMMY_SP,
            props: vec![ObjectPatProp::KeyValue(KeyValuePatProp {
                key: PropName::Ident(IdentName::new("value".into(), DUMMY_SP)),
                value: Box::new(captures_pattern(captures)),
            })],
            optional: false,
            type_ann: None,
        })
    }

    /// `var [a, b] = _$$CLOSURE.value;`, placed after the body's prologue.
    fn bind_captures(&mut self, body: &mut BlockStmt, captures: &[Ident]) -> Ident {
        let param = self.closure_param();
        let destructure = Stmt::Decl(Decl::Var(Box::new(VarDecl {
            kind: VarDeclKind::Var,
            decls: vec![VarDeclarator {
                span: DUMMY_SP,
                name: captures_pattern(captures),
                init: Some(Box::new(quote!(
                    "$closure.value" as Expr,
                    closure = param.clone(),
                ))),
                definite: false,
            }],
            ..Default::default()
        })));

        let at = prologue_len(&body.stmts);
        body.stmts.insert(at, destructure);
        param
    }

    fn hoist_function(&mut self, ident: Option<Ident>, function: &mut Function) -> Option<Expr> {
        let captures = self.scopes.captured_variables(function.span, &*function);
        if !function.is_async {
            self.ctx
                .emit_error(BoundaryErrorKind::InlineSyncFunction {
                    span: function.span,
                });
            return None;
        }

        let read_by_params = reads_any(function.params.iter().map(|param| &param.pat), &captures);
        let body = function.body.as_mut()?;
        strip_use_server(body);
        if !captures.is_empty() {
            let pat = self.closure_pattern(body, &captures, read_by_params);
            function.params.insert(
                0,
                Param {
                    span: DUMMY_SP,
                    decorators: vec![],
                    pat,
                },
            );
        }

        let name = ident.as_ref().map(|ident| ident.sym.to_string());
        let hoisted = Expr::Fn(FnExpr {
            ident,
            function: Box::new(function.take()),
        });
        Some(self.register_inline(hoisted, name.as_deref(), captures))
    }

    fn hoist_arrow(&mut self, arrow: &mut ArrowExpr) -> Option<Expr> {
        let captures = self.scopes.captured_variables(arrow.span, &*arrow);
        if !arrow.is_async {
            self.ctx
                .emit_error(BoundaryErrorKind::InlineSyncFunction { span: arrow.span });
            return None;
        }

        let read_by_params = reads_any(&arrow.params, &captures);
        let BlockStmtOrExpr::BlockStmt(body) = &mut *arrow.body else {
            return None;
        };
        strip_use_server(body);
        if !captures.is_empty() {
            let pat = self.closure_pattern(body, &captures, read_by_params);
            arrow.params.insert(0, pat);
        }

        Some(self.register_inline(Expr::Arrow(arrow.take()), None, captures))
    }

    /// Emits the hoisted `export const` and returns the expression that
    /// replaces the function at its original position.
    fn register_inline(&mut self, function: Expr, name: Option<&str>, captures: Vec<Ident>) -> Expr {
        let register = self
            .ctx
            .runtime_import(SERVER_RUNTIME, "registerServerReference");
        let action = self.ctx.generate_uid("$$INLINE_ACTION");

        let init: Expr = CallExpr {
            span: DUMMY_SP,
            callee: register.as_callee(),
            args: vec![
                function.as_arg(),
                Atom::from(self.ctx.file_uri()).as_arg(),
                action.sym.clone().as_arg(),
            ],
            ..Default::default()
        }
        .into();

        let span = Span::dummy_with_cmt();
        self.ctx.comments.add_leading(
            span.lo,
            Comment {
                span: DUMMY_SP,
                kind: CommentKind::Line,
                text: format!(" hoisted action: {}", name.unwrap_or("<anonymous>")).into(),
            },
        );
        self.hoisted
            .push(ModuleItem::ModuleDecl(ModuleDecl::ExportDecl(ExportDecl {
                span,
                decl: const_decl(action.clone(), init),
            })));

        tracing::debug!(
            action = %action.sym,
            name = name.unwrap_or("<anonymous>"),
            captures = captures.len(),
            "hoisted server action"
        );
        self.hoisted_ids.insert(action.sym.clone());
        self.action_names.push(action.sym.to_string());

        if captures.is_empty() {
            return action.into();
        }

        let helper = self.ctx.bound_args_helper();
        let captured = Expr::Array(ArrayLit {
            span: DUMMY_SP,
            elems: captures
                .into_iter()
                .map(|ident| {
                    Some(ExprOrSpread {
                        spread: None,
                        expr: Box::new(ident.into()),
                    })
                })
                .collect(),
        });
        quote!(
            "$action.bind(null, $helper(() => $captured))" as Expr,
            action = action,
            helper = helper,
            captured: Expr = captured,
        )
    }

    /// Replaces a hoisted function declaration with `var name = <reference>`.
    fn hoist_fn_decl(&mut self, decl: &mut FnDecl) -> Option<Decl> {
        let ident = decl.ident.clone();
        let replacement = self.hoist_function(Some(ident.clone()), &mut decl.function)?;
        Some(var_decl(ident, replacement))
    }

    /// Rewrites a top-level action declaration in place.
    fn hoist_top_level(&mut self, item: &mut ModuleItem) -> Option<ModuleItem> {
        match item {
            ModuleItem::Stmt(Stmt::Decl(Decl::Fn(decl)))
                if self.is_action(decl.function.body.as_ref()) =>
            {
                self.registered.insert(decl.ident.to_id());
                let var = self.hoist_fn_decl(decl)?;
                Some(ModuleItem::Stmt(Stmt::Decl(var)))
            }
            ModuleItem::ModuleDecl(ModuleDecl::ExportDecl(ExportDecl {
                span,
                decl: Decl::Fn(decl),
            })) if self.is_action(decl.function.body.as_ref()) => {
                self.registered.insert(decl.ident.to_id());
                let span = *span;
                let var = self.hoist_fn_decl(decl)?;
                Some(ModuleItem::ModuleDecl(ModuleDecl::ExportDecl(ExportDecl {
                    span,
                    decl: var,
                })))
            }
            ModuleItem::ModuleDecl(ModuleDecl::ExportDefaultDecl(ExportDefaultDecl {
                span,
                decl: DefaultDecl::Fn(FnExpr { ident, function }),
            })) if self.is_action(function.body.as_ref()) => {
                let span = *span;
                let replacement = self.hoist_function(ident.clone(), function)?;
                Some(ModuleItem::ModuleDecl(ModuleDecl::ExportDefaultExpr(
                    ExportDefaultExpr {
                        span,
                        expr: Box::new(replacement),
                    },
                )))
            }
            _ => None,
        }
    }

    /// Records module bindings initialized with a hoisted reference.
    fn track_registered(&mut self, item: &ModuleItem) {
        let var = match item {
            ModuleItem::Stmt(Stmt::Decl(Decl::Var(var)))
            | ModuleItem::ModuleDecl(ModuleDecl::ExportDecl(ExportDecl {
                decl: Decl::Var(var),
                ..
            })) => var,
            _ => return,
        };

        for declarator in &var.decls {
            if let (Pat::Ident(name), Some(init)) = (&declarator.name, declarator.init.as_deref())
                && let Expr::Ident(init) = init
                && self.hoisted_ids.contains(&init.sym)
            {
                self.registered.insert(name.id.to_id());
            }
        }
    }

    /// Strips the directive from functions exported by a `"use server"`
    /// module; those are registered where they are declared.
    fn claim_exported_functions(&mut self, items: &mut [ModuleItem]) {
        for item in items {
            let ModuleItem::ModuleDecl(ModuleDecl::ExportDecl(ExportDecl { decl, .. })) = item
            else {
                continue;
            };

            match decl {
                Decl::Fn(decl) => {
                    if let Some(body) = &mut decl.function.body {
                        self.exported_bodies.insert(body.span);
                        strip_use_server(body);
                    }
                }
                Decl::Var(var) => {
                    for init in var.decls.iter_mut().filter_map(|d| d.init.as_deref_mut()) {
                        let body = match init {
                            Expr::Arrow(ArrowExpr { body, .. }) => match &mut **body {
                                BlockStmtOrExpr::BlockStmt(body) => body,
                                BlockStmtOrExpr::Expr(_) => continue,
                            },
                            Expr::Fn(FnExpr { function, .. }) => match &mut function.body {
                                Some(body) => body,
                                None => continue,
                            },
                            _ => continue,
                        };
                        self.exported_bodies.insert(body.span);
                        strip_use_server(body);
                    }
                }
                _ => {}
            }
        }
    }

    /// `(() => registerServerReference(local, "<file>", "<name>"))();`
    fn registration(&mut self, local: Ident, exported: &str) -> ModuleItem {
        let register = self
            .ctx
            .runtime_import(SERVER_RUNTIME, "registerServerReference");
        ModuleItem::Stmt(quote!(
            "(() => $register($local, $file, $name))();" as Stmt,
            register = register,
            local = local,
            file: Expr = quote_str!(self.ctx.file_uri()).into(),
            name: Expr = quote_str!(exported).into(),
        ))
    }

    fn register(&mut self, local: &Ident, exported: String, out: &mut Vec<ModuleItem>) {
        if self.registered.insert(local.to_id()) {
            out.push(self.registration(local.clone(), &exported));
        }
        self.export_names.push(exported);
    }

    /// Bindings declared by `export <decl>` that must be registered.
    fn exported_locals(&mut self, export: &ExportDecl) -> Vec<Ident> {
        match &export.decl {
            Decl::Fn(decl) if decl.declare => vec![],
            Decl::Fn(decl) => {
                if decl.function.is_async {
                    vec![decl.ident.clone()]
                } else {
                    self.ctx
                        .emit_error(BoundaryErrorKind::ExportedSyncFunction {
                            span: decl.function.span,
                        });
                    vec![]
                }
            }
            Decl::Var(var) if var.declare => vec![],
            Decl::Var(var) => {
                let mut locals = vec![];
                for declarator in &var.decls {
                    let Pat::Ident(name) = &declarator.name else {
                        self.ctx
                            .emit_error(BoundaryErrorKind::UnsupportedExportPattern {
                                span: declarator.span,
                            });
                        continue;
                    };
                    if self.hoisted_ids.contains(&name.id.sym) {
                        continue;
                    }
                    if declarator.init.as_deref().is_some_and(cannot_be_action) {
                        self.ctx
                            .emit_error(BoundaryErrorKind::ExportedSyncFunction {
                                span: declarator.span,
                            });
                        continue;
                    }
                    locals.push(name.id.clone());
                }
                locals
            }
            Decl::Class(class) if !class.declare => {
                self.ctx
                    .emit_error(BoundaryErrorKind::ExportedSyncFunction {
                        span: class.class.span,
                    });
                vec![]
            }
            Decl::TsEnum(decl) if !decl.declare => {
                self.ctx
                    .emit_error(BoundaryErrorKind::ExportedSyncFunction { span: decl.span });
                vec![]
            }
            _ => vec![],
        }
    }

    /// `export { a as b } from "./x"` becomes an import of a local binding,
    /// its registration and a local export.
    fn rewrite_re_export(&mut self, export: NamedExport, src: Box<Str>, out: &mut Vec<ModuleItem>) {
        let mut imports = vec![];
        let mut registrations = vec![];
        let mut specifiers = vec![];

        for specifier in export.specifiers {
            let named = match specifier {
                ExportSpecifier::Named(named) => named,
                other => {
                    self.ctx
                        .emit_error(BoundaryErrorKind::NamespaceReExport { span: other.span() });
                    continue;
                }
            };
            if named.is_type_only {
                continue;
            }

            let exported_as = named.exported.unwrap_or_else(|| named.orig.clone());
            let exported = export_name(&exported_as);
            let local = self.ctx.generate_uid(local_name_hint(&exported));

            imports.push(ImportSpecifier::Named(ImportNamedSpecifier {
                span: DUMMY_SP,
                local: local.clone(),
                imported: Some(named.orig),
                is_type_only: false,
            }));
            self.register(&local, exported, &mut registrations);
            specifiers.push(ExportSpecifier::Named(ExportNamedSpecifier {
                span: named.span,
                orig: ModuleExportName::Ident(local),
                exported: Some(exported_as),
                is_type_only: false,
            }));
        }

        if imports.is_empty() {
            return;
        }

        out.push(ModuleItem::ModuleDecl(ModuleDecl::Import(ImportDecl {
            span: DUMMY_SP,
            specifiers: imports,
            src,
            type_only: false,
            with: export.with,
            phase: Default::default(),
        })));
        out.extend(registrations);
        out.push(ModuleItem::ModuleDecl(ModuleDecl::ExportNamed(NamedExport {
            span: export.span,
            specifiers,
            src: None,
            type_only: false,
            with: None,
        })));
    }

    /// Registers every export of a `"use server"` module.
    fn register_exports(&mut self, items: Vec<ModuleItem>) -> Vec<ModuleItem> {
        let mut out = Vec::with_capacity(items.len());

        for item in items {
            match item {
                ModuleItem::ModuleDecl(ModuleDecl::ExportDecl(export)) => {
                    let locals = self.exported_locals(&export);
                    out.push(ModuleItem::ModuleDecl(ModuleDecl::ExportDecl(export)));
                    for local in locals {
                        let exported = local.sym.to_string();
                        self.register(&local, exported, &mut out);
                    }
                }
                ModuleItem::ModuleDecl(ModuleDecl::ExportNamed(export)) if !export.type_only => {
                    match export.src.clone() {
                        Some(src) => self.rewrite_re_export(export, src, &mut out),
                        None => {
                            for specifier in &export.specifiers {
                                if let ExportSpecifier::Named(named) = specifier
                                    && !named.is_type_only
                                    && let ModuleExportName::Ident(local) = &named.orig
                                {
                                    let exported = named
                                        .exported
                                        .as_ref()
                                        .map_or_else(|| local.sym.to_string(), export_name);
                                    self.register(local, exported, &mut out);
                                }
                            }
                            out.push(ModuleItem::ModuleDecl(ModuleDecl::ExportNamed(export)));
                        }
                    }
                }
                ModuleItem::ModuleDecl(ModuleDecl::ExportDefaultDecl(ExportDefaultDecl {
                    decl: DefaultDecl::TsInterfaceDecl(_),
                    ..
                })) => out.push(item),
                ModuleItem::ModuleDecl(ModuleDecl::ExportDefaultDecl(ExportDefaultDecl {
                    span,
                    ..
                }))
                | ModuleItem::ModuleDecl(ModuleDecl::ExportDefaultExpr(ExportDefaultExpr {
                    span,
                    ..
                })) => {
                    self.ctx
                        .emit_error(BoundaryErrorKind::UnsupportedDefaultExport { span });
                    out.push(item);
                }
                ModuleItem::ModuleDecl(ModuleDecl::ExportAll(ref export)) if !export.type_only => {
                    self.ctx
                        .emit_warning(BoundaryWarningKind::UnresolvedExportAll {
                            span: export.span,
                            directive: DirectiveKind::UseServer,
                        });
                    out.push(item);
                }
                _ => out.push(item),
            }
        }

        out
    }

    fn annotate(&mut self, module: &mut Module) {
        let file_uri = self.ctx.file_uri().to_string();

        let mut names = std::mem::take(&mut self.action_names);
        names.append(&mut self.export_names);

        if self.is_action_module || !names.is_empty() {
            self.ctx.metadata.react_server_reference = Some(file_uri.clone());
        }
        if names.is_empty() {
            return;
        }

        tracing::debug!(file = %self.ctx.file_path.display(), ?names, "extracted server actions");

        let actions = ReactServerActions {
            id: file_uri,
            names,
        };
        match actions.to_comment_text() {
            Ok(text) => {
                // The first statement usually shares the module's `lo`, which
                // would print the comment below the hoisted declarations.
                module.span = Span::dummy_with_cmt();
                self.ctx.comments.add_leading(
                    module.span.lo,
                    Comment {
                        span: DUMMY_SP,
                        kind: CommentKind::Block,
                        text: text.into(),
                    },
                );
            }
            Err(err) => tracing::warn!(%err, "failed to serialize server actions"),
        }
        self.ctx.metadata.react_server_actions = Some(actions);
    }
}

impl VisitMut for ServerActions<'_> {
    noop_visit_mut_type!();

    fn visit_mut_module(&mut self, module: &mut Module) {
        if self.is_action_module {
            strip_module_directives(&mut module.body);
            self.claim_exported_functions(&mut module.body);
        }

        let mut body = Vec::with_capacity(module.body.len());
        for mut item in module.body.take() {
            item.visit_mut_with(self);
            if let Some(replacement) = self.hoist_top_level(&mut item) {
                item = replacement;
            }
            self.track_registered(&item);
            body.push(item);
        }

        let after_imports = body
            .iter()
            .rposition(|item| matches!(item, ModuleItem::ModuleDecl(ModuleDecl::Import(_))))
            .map_or(0, |i| i + 1);
        let helper = self.ctx.take_bound_args_helper_decl();
        // Each action is inserted right after the imports, so the latest one
        // ends up first.
        let hoisted = helper
            .into_iter()
            .chain(std::mem::take(&mut self.hoisted).into_iter().rev());
        body.splice(after_imports..after_imports, hoisted);

        if self.is_action_module {
            body = self.register_exports(body);
        }
        module.body = body;

        if self.ctx.has_errors() {
            return;
        }
        self.annotate(module);
    }

    fn visit_mut_stmts(&mut self, stmts: &mut Vec<Stmt>) {
        let mut declarations = vec![];
        let mut kept = Vec::with_capacity(stmts.len());

        for mut stmt in stmts.take() {
            stmt.visit_mut_with(self);
            if let Stmt::Decl(Decl::Fn(decl)) = &mut stmt
                && self.is_action(decl.function.body.as_ref())
                && let Some(var) = self.hoist_fn_decl(decl)
            {
                declarations.push(Stmt::Decl(var));
                continue;
            }
            kept.push(stmt);
        }

        // Declarations move to the top of the enclosing block, where the
        // function would have been hoisted to.
        let at = prologue_len(&kept);
        kept.splice(at..at, declarations);
        *stmts = kept;
    }

    fn visit_mut_expr(&mut self, expr: &mut Expr) {
        expr.visit_mut_children_with(self);

        let replacement = match expr {
            Expr::Fn(FnExpr { ident, function }) if self.is_action(function.body.as_ref()) => {
                self.hoist_function(ident.clone(), function)
            }
            Expr::Arrow(arrow) if self.is_action_arrow(arrow) => self.hoist_arrow(arrow),
            _ => None,
        };
        if let Some(replacement) = replacement {
            *expr = replacement;
        }
    }
}

fn captures_pattern(captures: &[Ident]) -> Pat {
    Pat::Array(ArrayPat {
        span: DUMMY_SP,
        elems: captures
            .iter()
            .map(|ident| Some(Pat::Ident(ident.clone().into())))
            .collect(),
        optional: false,
        type_ann: None,
    })
}

/// Whether any of `captures` is read inside `pats`.
fn reads_any<'p>(pats: impl IntoIterator<Item = &'p Pat>, captures: &[Ident]) -> bool {
    let mut finder = CaptureFinder {
        captures,
        found: false,
    };
    for pat in pats {
        pat.visit_with(&mut finder);
    }
    finder.found
}

struct CaptureFinder<'a> {
    captures: &'a [Ident],
    found: bool,
}

impl Visit for CaptureFinder<'_> {
    noop_visit_type!();

    fn visit_ident(&mut self, ident: &Ident) {
        if self
            .captures
            .iter()
            .any(|capture| capture.sym == ident.sym && capture.ctxt == ident.ctxt)
        {
            self.found = true;
        }
    }
}

fn var_decl(name: Ident, init: Expr) -> Decl {
    Decl::Var(Box::new(VarDecl {
        kind: VarDeclKind::Var,
        decls: vec![VarDeclarator {
            span: DUMMY_SP,
            name: Pat::Ident(name.into()),
            init: Some(Box::new(init)),
            definite: false,
        }],
        ..Default::default()
    }))
}

/// Initializers that can never evaluate to an async function.
fn cannot_be_action(init: &Expr) -> bool {
    match init {
        Expr::Lit(_) | Expr::Tpl(_) | Expr::Class(_) | Expr::Array(_) | Expr::Object(_) => true,
        Expr::Arrow(arrow) => !arrow.is_async,
        Expr::Fn(f) => !f.function.is_async,
        Expr::Paren(ParenExpr { expr, .. }) => cannot_be_action(expr),
        _ => false,
    }
}

fn local_name_hint(exported: &str) -> &str {
    if exported
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
    {
        exported
    } else {
        "reexport"
    }
}

#[cfg(test)]
mod tests {
    use crate::{Caller, TransformError, TransformOutput, transform};

    fn react_server() -> Caller {
        Caller {
            is_react_server: true,
            is_server: true,
            supports_static_esm: true,
            ..Default::default()
        }
    }

    fn compile(src: &str, path: &str) -> TransformOutput {
        transform(src, path, &react_server()).unwrap()
    }

    fn errors(src: &str) -> Vec<String> {
        match transform(src, "/app/actions.js", &react_server()) {
            Err(TransformError::Boundary { diagnostics, .. }) => {
                diagnostics.into_iter().map(|d| d.message).collect()
            }
            other => panic!("expected boundary errors, got {other:?}"),
        }
    }

    /// Drops all whitespace so assertions do not depend on codegen layout.
    fn squash(code: &str) -> String {
        code.chars().filter(|c| !c.is_whitespace()).collect()
    }

    #[test]
    fn hoists_top_level_function() {
        let output = compile(
            r#"async function foo() { "use server"; return "bar"; }"#,
            "",
        );
        let code = squash(&output.code);

        assert!(code.contains(&squash(
            r#"export const _$$INLINE_ACTION = registerServerReference(async function foo() {
                return "bar";
            }, "file:///unknown", "_$$INLINE_ACTION");
            var foo = _$$INLINE_ACTION;"#
        )), "{}", output.code);
        assert!(output.code.contains("// hoisted action: foo"));
        assert!(output.code.contains(
            r#"import { registerServerReference } from "react-server-dom-webpack/server";"#
        ));
        assert!(!output.code.contains("use server"));
        assert!(code.contains(&squash(
            r#"/*rsc/actions: {"id":"file:///unknown","names":["_$$INLINE_ACTION"]}*/"#
        )));
        assert_eq!(
            output.metadata.react_server_actions.unwrap().names,
            vec!["_$$INLINE_ACTION"]
        );
    }

    #[test]
    fn binds_captured_props() {
        let output = compile(
            r#"
            export function Component({ shared }) {
                const foo = async () => { "use server"; return shared; };
                return foo;
            }
            "#,
            "/app/page.js",
        );
        let code = squash(&output.code);

        assert!(code.contains("constfoo=_$$INLINE_ACTION.bind(null,_wrapBoundArgs(()=>[shared]));"), "{}", output.code);
        assert!(code.contains("async(_$$CLOSURE)=>{var[shared]=_$$CLOSURE.value;returnshared;}"));
        assert!(code.contains("var_wrapBoundArgs=(thunk)=>{"));
        assert!(output.code.contains("// hoisted action: <anonymous>"));
    }

    #[test]
    fn captures_read_by_parameter_defaults_are_bound_in_the_parameters() {
        let output = compile(
            r#"
            export function Page({ shared }) {
                return async (v = shared) => { "use server"; return v; };
            }
            "#,
            "/app/page.js",
        );
        let code = squash(&output.code);

        assert!(code.contains("async({value:[shared]},v=shared)=>{returnv;}"), "{}", output.code);
        assert!(!code.contains("_$$CLOSURE"));
        assert!(code.contains("return_$$INLINE_ACTION.bind(null,_wrapBoundArgs(()=>[shared]));"));
    }

    #[test]
    fn bound_args_helper_is_declared_once() {
        let output = compile(
            r#"
            export function Page({ a, b }) {
                const first = async () => { "use server"; return a; };
                const second = async () => { "use server"; return b; };
                return [first, second];
            }
            "#,
            "/app/page.js",
        );
        let code = squash(&output.code);

        assert_eq!(code.matches("var_wrapBoundArgs=").count(), 1, "{}", output.code);
        assert!(code.contains("constfirst=_$$INLINE_ACTION.bind(null,_wrapBoundArgs(()=>[a]));"));
        assert!(code.contains("constsecond=_$$INLINE_ACTION2.bind(null,_wrapBoundArgs(()=>[b]));"));
        assert!(code.contains("async(_$$CLOSURE)=>{var[a]=_$$CLOSURE.value;returna;}"));
        assert!(code.contains("async(_$$CLOSURE)=>{var[b]=_$$CLOSURE.value;returnb;}"));
    }

    #[test]
    fn annotation_comment_leads_the_file() {
        let output = compile(
            r#"import { db } from "./db";
export function Page({ id }) {
    return async () => { "use server"; await db.save(id); };
}"#,
            "/app/page.js",
        );

        assert!(output.code.starts_with("/*rsc/actions:"), "{}", output.code);
        assert_eq!(output.code.matches("rsc/actions:").count(), 1);
    }

    #[test]
    fn nested_declarations_move_to_the_top_of_their_block() {
        let output = compile(
            r#"
            export function Page({ id }) {
                console.log(id);
                return doStuff;
                async function doStuff() { "use server"; await save(id); }
            }
            "#,
            "/app/page.js",
        );
        let code = squash(&output.code);

        let declaration = code
            .find("vardoStuff=_$$INLINE_ACTION.bind(null,_wrapBoundArgs(()=>[id]));")
            .expect("bound declaration");
        assert!(declaration < code.find("console.log(id)").unwrap());
        assert!(code.contains("asyncfunctiondoStuff(_$$CLOSURE){var[id]=_$$CLOSURE.value;awaitsave(id);}"));
    }

    #[test]
    fn later_actions_are_hoisted_above_earlier_ones() {
        let output = compile(
            r#"
            import { db } from "./db";
            export const handlers = [
                async () => { "use server"; await db.a(); },
                async () => { "use server"; await db.b(); },
            ];
            "#,
            "/app/page.js",
        );
        let code = squash(&output.code);

        assert!(code.contains("exportconsthandlers=[_$$INLINE_ACTION,_$$INLINE_ACTION2];"));
        let second = code.find("exportconst_$$INLINE_ACTION2=").unwrap();
        let first = code.find("exportconst_$$INLINE_ACTION=").unwrap();
        assert!(code.find("from\"./db\";").unwrap() < second);
        assert!(second < first);
        assert_eq!(
            output.metadata.react_server_actions.unwrap().names,
            vec!["_$$INLINE_ACTION", "_$$INLINE_ACTION2"]
        );
    }

    #[test]
    fn sync_inline_actions_are_rejected() {
        let err = transform(
            r#"function foo() { "use server"; }"#,
            "/app/page.js",
            &react_server(),
        )
        .unwrap_err();
        assert!(err.to_string().contains(r#"functions marked with "use server" must be async"#));
    }

    #[test]
    fn registers_module_exports() {
        let output = compile(
            r#"
            "use server";
            import { db } from "./db";
            export async function create(data) { await db.insert(data); }
            export const remove = async (id) => { "use server"; await db.remove(id); };
            async function archive() {}
            export { archive, create as default };
            export { search as find } from "./search";
            "#,
            "/app/actions.js",
        );
        let code = squash(&output.code);

        assert!(!output.code.contains("use server"), "{}", output.code);
        assert!(!output.code.contains("_$$INLINE_ACTION"));
        assert!(code.contains(r#"(()=>registerServerReference(create,"file:///app/actions.js","create"))();"#));
        assert!(code.contains(r#"(()=>registerServerReference(remove,"file:///app/actions.js","remove"))();"#));
        assert_eq!(code.matches("registerServerReference(create,").count(), 1);
        assert!(
            code.find(r#"registerServerReference(archive,"file:///app/actions.js","archive")"#).unwrap()
                < code.find("export{archive,createasdefault};").unwrap()
        );
        assert!(code.contains(r#"import{searchas_find}from"./search";"#));
        assert!(code.contains(r#"registerServerReference(_find,"file:///app/actions.js","find")"#));
        assert!(code.contains("export{_findasfind};"));

        assert_eq!(
            output.metadata.react_server_actions.unwrap().names,
            vec!["create", "remove", "archive", "default", "find"]
        );
        assert_eq!(
            output.metadata.react_server_reference.as_deref(),
            Some("file:///app/actions.js")
        );
    }

    #[test]
    fn default_export_declarations_are_rejected() {
        let errors = errors(r#""use server"; export default async function foo() {}"#);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("Not implemented: 'export default' declarations"));

        let errors = super::tests::errors(r#""use server"; export default async () => {};"#);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn non_function_exports_are_rejected() {
        let errors = errors(
            r#"
            "use server";
            export function sync() {}
            export class Store {}
            export const limit = 10;
            export const { a, b } = load();
            export * as all from "./all";
            "#,
        );
        assert_eq!(
            errors
                .iter()
                .filter(|e| e.starts_with("Only async functions are allowed"))
                .count(),
            3
        );
        assert!(errors.iter().any(|e| e.starts_with("Destructuring exports")));
        assert!(errors.iter().any(|e| e.starts_with("Namespace exports")));
    }

    #[test]
    fn export_all_is_kept_with_a_warning() {
        let output = compile(
            r#""use server"; export * from "./more"; export async function a() {}"#,
            "/app/actions.js",
        );
        assert!(output.code.contains(r#"export * from "./more";"#));
        assert_eq!(output.warnings.len(), 1);
        assert_eq!(output.metadata.react_server_actions.unwrap().names, vec!["a"]);
    }
}
