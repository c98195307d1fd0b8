use swc_core::{
    atoms::Atom,
    common::{DUMMY_SP, SyntaxContext},
    ecma::{
        ast::*,
        utils::{ExprFactory, quote_ident, quote_str},
        visit::{VisitMut, noop_visit_mut_type, visit_mut_pass},
    },
    quote,
};

use super::{
    directives::DirectiveKind,
    exports::{collect_exports, const_decl, export_binding},
};
use crate::{context::FileCompilationContext, diagnostics::BoundaryWarningKind};

const SERVER_RUNTIME: &str = "react-server-dom-webpack/server";

/// Replaces a `"use client"` or `"use dom"` module in the react-server graph
/// with a client module proxy. Only the export names survive; the
/// implementation never reaches the server bundle.
#[tracing::instrument(level = tracing::Level::TRACE, skip_all)]
pub fn client_module_proxy(
    ctx: &mut FileCompilationContext,
    directive: DirectiveKind,
) -> impl Pass {
    visit_mut_pass(ClientModuleProxy { ctx, directive })
}

struct ClientModuleProxy<'a> {
    ctx: &'a mut FileCompilationContext,
    directive: DirectiveKind,
}

impl ClientModuleProxy<'_> {
    fn proxy_member(proxy: &Ident, name: &str) -> Expr {
        Expr::Member(MemberExpr {
            span: DUMMY_SP,
            obj: Box::new(proxy.clone().into()),
            prop: MemberProp::Computed(ComputedPropName {
                span: DUMMY_SP,
                expr: Box::new(quote_str!(name).into()),
            }),
        })
    }
}

impl VisitMut for ClientModuleProxy<'_> {
    noop_visit_mut_type!();

    fn visit_mut_module(&mut self, module: &mut Module) {
        let exports = collect_exports(module, self.ctx.unresolved_ctxt);

        for span in &exports.star_exports {
            self.ctx
                .emit_warning(BoundaryWarningKind::UnresolvedExportAll {
                    span: *span,
                    directive: self.directive,
                });
        }

        let create_proxy = self
            .ctx
            .runtime_import(SERVER_RUNTIME, "createClientModuleProxy");
        let proxy = if exports.exports.iter().any(|e| e.name == "proxy") {
            self.ctx.generate_uid("proxy")
        } else {
            Ident::new(Atom::from("proxy"), DUMMY_SP, SyntaxContext::empty())
        };

        let create_call: Expr = CallExpr {
            span: DUMMY_SP,
            callee: create_proxy.as_callee(),
            args: vec![Atom::from(self.ctx.file_uri()).as_arg()],
            ..Default::default()
        }
        .into();

        let mut body = vec![
            ModuleItem::Stmt(Stmt::Decl(const_decl(proxy.clone(), create_call))),
            ModuleItem::Stmt(quote!(
                "$module.exports = $proxy;" as Stmt,
                module = quote_ident!(self.ctx.unresolved_ctxt, "module"),
                proxy = proxy.clone(),
            )),
        ];

        for export in &exports.exports {
            let member = Self::proxy_member(&proxy, &export.name);
            if export.name == "default" {
                body.push(ModuleItem::ModuleDecl(ModuleDecl::ExportDefaultExpr(
                    ExportDefaultExpr {
                        span: DUMMY_SP,
                        expr: Box::new(member),
                    },
                )));
            } else {
                body.extend(export_binding(self.ctx, &export.name, member));
            }
        }

        let names = exports.names();
        tracing::debug!(
            file = %self.ctx.file_path.display(),
            exports = ?names,
            "created client module proxy"
        );

        module.body = body;
        let file_uri = self.ctx.file_uri().to_string();
        let metadata = &mut self.ctx.metadata;
        metadata.proxy_exports = Some(names);
        metadata.has_cjs_exports = Some(exports.has_cjs_exports);
        metadata.react_client_reference = Some(file_uri);
    }
}
