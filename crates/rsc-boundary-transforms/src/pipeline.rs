use std::path::Path;

use serde::Serialize;
use swc_core::{
    common::{
        FileName, GLOBALS, Globals, Mark, SourceMap, Spanned, SyntaxContext,
        comments::SingleThreadedComments, sync::Lrc,
    },
    ecma::{
        ast::*,
        codegen::{self, Emitter, text_writer::JsWriter},
        parser::{EsSyntax, Parser, StringInput, Syntax, TsSyntax, lexer::Lexer},
        transforms::base::{fixer::fixer, resolver},
        visit::VisitMutWith,
    },
};

use crate::{
    config::Caller,
    context::FileCompilationContext,
    diagnostics::{Diagnostic, Severity, TransformError},
    metadata::TransformMetadata,
    transforms::{
        client_proxy::client_module_proxy,
        closure::ScopeTree,
        directives::{DirectiveKind, scan_directives},
        dom_component::dom_component_proxy,
        restricted_imports::restricted_imports,
        rsc_hooks::rsc_hooks,
        server_actions::server_actions,
        server_reference_proxy::server_reference_proxy,
    },
};

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformOutput {
    pub code: String,
    pub metadata: TransformMetadata,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Diagnostic>,
}

/// Compiles one module for the graph described by `caller`.
///
/// Every error found in the file is reported at once through
/// [`TransformError::Boundary`]; nothing is emitted in that case.
pub fn transform(
    source: &str,
    file_path: impl AsRef<Path>,
    caller: &Caller,
) -> Result<TransformOutput, TransformError> {
    let file_path = file_path.as_ref();
    GLOBALS.set(&Globals::new(), || {
        let cm: Lrc<SourceMap> = Default::default();
        let comments = SingleThreadedComments::default();
        let syntax = syntax_for(file_path);

        let mut module = parse(&cm, &comments, source, file_path, syntax).map_err(
            |diagnostics| TransformError::Parse {
                file: file_path.to_path_buf(),
                diagnostics,
            },
        )?;

        let unresolved_mark = Mark::new();
        let top_level_mark = Mark::new();
        let span = tracing::trace_span!("resolve").entered();
        module.visit_mut_with(&mut resolver(
            unresolved_mark,
            top_level_mark,
            syntax.typescript(),
        ));
        drop(span);

        let mut ctx = FileCompilationContext::new(
            file_path,
            caller.clone(),
            comments.clone(),
            SyntaxContext::empty().apply_mark(unresolved_mark),
        );
        ctx.reserve_names(&module);

        let mut program = Program::Module(module);
        run_passes(&mut program, &mut ctx);

        let (errors, warnings): (Vec<_>, Vec<_>) = ctx
            .take_diagnostics()
            .into_iter()
            .map(|d| Diagnostic::new(&cm, d.span, d.message, d.severity))
            .partition(|d| d.severity == Severity::Error);

        if !errors.is_empty() {
            return Err(TransformError::Boundary {
                file: file_path.to_path_buf(),
                diagnostics: errors,
            });
        }

        program.mutate(fixer(Some(&comments)));

        let span = tracing::trace_span!("codegen").entered();
        let code = print(&cm, &comments, &program)?;
        drop(span);

        Ok(TransformOutput {
            code,
            metadata: std::mem::take(&mut ctx.metadata),
            warnings,
        })
    })
}

fn run_passes(program: &mut Program, ctx: &mut FileCompilationContext) {
    let Some(module) = program.as_module() else {
        return;
    };
    let directives = scan_directives(module, ctx);

    if !ctx.is_node_module() {
        program.mutate(restricted_imports(ctx, directives.module));
    }
    if ctx.has_errors() {
        return;
    }

    let is_react_server = ctx.caller.is_react_server;
    let is_native = ctx.caller.platform.is_native();

    match directives.module {
        // A DOM component only runs inside the web view, so the server graph
        // sees it as a client reference.
        Some(directive @ (DirectiveKind::UseClient | DirectiveKind::UseDom)) if is_react_server => {
            program.mutate(client_module_proxy(ctx, directive));
        }
        Some(DirectiveKind::UseDom) if is_native && !is_react_server => {
            program.mutate(dom_component_proxy(ctx, directives.module_span));
        }
        Some(DirectiveKind::UseServer) if !is_react_server => {
            program.mutate(server_reference_proxy(ctx));
        }
        module_directive => {
            if module_directive == Some(DirectiveKind::UseServer)
                || directives.has_server_functions()
            {
                let scopes = match program.as_module() {
                    Some(module) => ScopeTree::build(module),
                    None => return,
                };
                program.mutate(server_actions(ctx, &scopes, &directives));
            }

            if is_react_server && !ctx.has_errors() {
                program.mutate(rsc_hooks(ctx));
            }
        }
    }

    if ctx.has_errors() {
        return;
    }

    let imports = ctx.take_runtime_imports();
    if let Some(module) = program.as_mut_module()
        && !imports.is_empty()
    {
        module.body.splice(0..0, imports);
    }
}

fn syntax_for(file_path: &Path) -> Syntax {
    match file_path.extension().and_then(|ext| ext.to_str()) {
        Some("ts" | "mts" | "cts") => Syntax::Typescript(TsSyntax {
            tsx: false,
            decorators: true,
            ..Default::default()
        }),
        Some("js" | "jsx" | "mjs" | "cjs") => Syntax::Es(EsSyntax {
            jsx: true,
            decorators: true,
            ..Default::default()
        }),
        _ => Syntax::Typescript(TsSyntax {
            tsx: true,
            decorators: true,
            ..Default::default()
        }),
    }
}

fn parse(
    cm: &Lrc<SourceMap>,
    comments: &SingleThreadedComments,
    source: &str,
    file_path: &Path,
    syntax: Syntax,
) -> Result<Module, Vec<Diagnostic>> {
    let fm = cm.new_source_file(
        Lrc::new(FileName::Real(file_path.to_path_buf())),
        source.to_string(),
    );

    let lexer = Lexer::new(
        syntax,
        EsVersion::latest(),
        StringInput::from(&*fm),
        Some(comments),
    );
    let mut parser = Parser::new_from(lexer);

    let span = tracing::trace_span!("parse").entered();
    let result = parser.parse_module();
    drop(span);

    let mut errors: Vec<_> = parser
        .take_errors()
        .into_iter()
        .map(|e| Diagnostic::new(cm, e.span(), e.kind().msg().into_owned(), Severity::Error))
        .collect();

    match result {
        Ok(module) if errors.is_empty() => Ok(module),
        Ok(_) => Err(errors),
        Err(e) => {
            errors.push(Diagnostic::new(
                cm,
                e.span(),
                e.kind().msg().into_owned(),
                Severity::Error,
            ));
            Err(errors)
        }
    }
}

fn print(
    cm: &Lrc<SourceMap>,
    comments: &SingleThreadedComments,
    program: &Program,
) -> Result<String, TransformError> {
    let mut output = vec![];
    {
        let mut emitter = Emitter {
            cfg: codegen::Config::default().with_target(EsVersion::latest()),
            cm: cm.clone(),
            comments: Some(comments),
            wr: JsWriter::new(cm.clone(), "\n", &mut output, None),
        };
        emitter.emit_program(program)?;
    }
    Ok(String::from_utf8(output)?)
}

/// Parses and resolves `source` as `/app/test.tsx` for unit tests of
/// individual passes.
#[cfg(test)]
pub(crate) fn with_parsed_module<R>(
    source: &str,
    caller: Caller,
    op: impl FnOnce(&mut Module, &mut FileCompilationContext) -> R,
) -> R {
    GLOBALS.set(&Globals::new(), || {
        let cm: Lrc<SourceMap> = Default::default();
        let comments = SingleThreadedComments::default();
        let file_path = Path::new("/app/test.tsx");

        let mut module = parse(&cm, &comments, source, file_path, syntax_for(file_path))
            .expect("failed to parse test input");

        let unresolved_mark = Mark::new();
        let top_level_mark = Mark::new();
        module.visit_mut_with(&mut resolver(unresolved_mark, top_level_mark, true));

        let mut ctx = FileCompilationContext::new(
            file_path,
            caller,
            comments,
            SyntaxContext::empty().apply_mark(unresolved_mark),
        );
        ctx.reserve_names(&module);
        op(&mut module, &mut ctx)
    })
}
