use swc_core::{
    atoms::Atom,
    common::DUMMY_SP,
    ecma::{
        ast::*,
        utils::ExprFactory,
        visit::{VisitMut, noop_visit_mut_type, visit_mut_pass},
    },
};

use super::{
    directives::DirectiveKind,
    exports::{collect_exports, export_binding},
};
use crate::{context::FileCompilationContext, diagnostics::BoundaryWarningKind};

const CLIENT_RUNTIME: &str = "react-server-dom-webpack/client";
const CALL_SERVER_RUNTIME: &str = "expo-router/rsc/internal";

/// Replaces a `"use server"` module compiled outside the react-server graph
/// with references that call back into the server:
///
/// ```js
/// export const foo = createServerReference("file:///app/actions.js#foo", callServerRSC);
/// ```
#[tracing::instrument(level = tracing::Level::TRACE, skip_all)]
pub fn server_reference_proxy(ctx: &mut FileCompilationContext) -> impl Pass {
    visit_mut_pass(ServerReferenceProxy { ctx })
}

struct ServerReferenceProxy<'a> {
    ctx: &'a mut FileCompilationContext,
}

impl VisitMut for ServerReferenceProxy<'_> {
    noop_visit_mut_type!();

    fn visit_mut_module(&mut self, module: &mut Module) {
        let exports = collect_exports(module, self.ctx.unresolved_ctxt);

        for span in &exports.star_exports {
            self.ctx
                .emit_warning(BoundaryWarningKind::UnresolvedExportAll {
                    span: *span,
                    directive: DirectiveKind::UseServer,
                });
        }

        let create_server_reference = self
            .ctx
            .runtime_import(CLIENT_RUNTIME, "createServerReference");
        let call_server = self.ctx.runtime_import(CALL_SERVER_RUNTIME, "callServerRSC");

        let mut body = vec![];
        for export in &exports.exports {
            let reference: Expr = CallExpr {
                span: DUMMY_SP,
                callee: create_server_reference.clone().as_callee(),
                args: vec![
                    Atom::from(self.ctx.reference_id(&export.name)).as_arg(),
                    call_server.clone().as_arg(),
                ],
                ..Default::default()
            }
            .into();

            if export.name == "default" {
                body.push(ModuleItem::ModuleDecl(ModuleDecl::ExportDefaultExpr(
                    ExportDefaultExpr {
                        span: DUMMY_SP,
                        expr: Box::new(reference),
                    },
                )));
            } else {
                body.extend(export_binding(self.ctx, &export.name, reference));
            }
        }

        tracing::debug!(
            file = %self.ctx.file_path.display(),
            exports = ?exports.names(),
            "created server references"
        );

        module.body = body;
        self.ctx.metadata.react_server_reference = Some(self.ctx.file_uri().to_string());
        if exports.has_cjs_exports {
            self.ctx.metadata.has_cjs_exports = Some(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{Caller, transform};

    #[test]
    fn replaces_actions_with_references() {
        let output = transform(
            r#"
            "use server";
            import { db } from "./db";
            export async function create(data) { await db.insert(data); }
            export const remove = async (id) => db.remove(id);
            export { create as default };
            "#,
            "/app/actions.js",
            &Caller {
                supports_static_esm: true,
                ..Default::default()
            },
        )
        .unwrap();

        assert!(!output.code.contains("./db"));
        assert!(output.code.contains(
            r#"export const create = createServerReference("file:///app/actions.js#create", callServerRSC);"#
        ));
        assert!(output.code.contains(
            r#"export default createServerReference("file:///app/actions.js#default", callServerRSC);"#
        ));
        assert!(
            output
                .code
                .contains(r#"import { callServerRSC } from "expo-router/rsc/internal";"#)
        );
        assert_eq!(
            output.metadata.react_server_reference.as_deref(),
            Some("file:///app/actions.js")
        );
    }
}
