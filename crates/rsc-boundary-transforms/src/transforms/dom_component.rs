use std::path::Path;

use hex::encode as hex_encode;
use pathdiff::diff_paths;
use sha1::{Digest, Sha1};
use swc_core::{
    common::{DUMMY_SP, Span},
    ecma::{
        ast::*,
        utils::quote_str,
        visit::{VisitMut, noop_visit_mut_type, visit_mut_pass},
    },
    quote,
};

use super::exports::{ExportKind, collect_exports, const_decl};
use crate::{
    config::Platform, context::FileCompilationContext, diagnostics::BoundaryErrorKind,
};

const ANDROID_ASSET_ROOT: &str = "file:///android_asset/www.bundle";
const ASSET_ROOT: &str = "www.bundle";
const DEV_SERVER_PREFIX: &str = "/_expo/@dom/";

/// Replaces a `"use dom"` module on native platforms with a component that
/// renders the original one inside a web view.
#[tracing::instrument(level = tracing::Level::TRACE, skip_all)]
pub fn dom_component_proxy(
    ctx: &mut FileCompilationContext,
    directive_span: Option<Span>,
) -> impl Pass {
    visit_mut_pass(DomComponentProxy {
        ctx,
        directive_span: directive_span.unwrap_or(DUMMY_SP),
    })
}

struct DomComponentProxy<'a> {
    ctx: &'a mut FileCompilationContext,
    directive_span: Span,
}

impl DomComponentProxy<'_> {
    fn source_uri(&self) -> String {
        let file_uri = self.ctx.file_uri();

        if self.ctx.caller.is_dev {
            let relative = self
                .ctx
                .caller
                .project_root
                .as_deref()
                .and_then(|root| diff_paths(&self.ctx.file_path, root))
                .unwrap_or_else(|| {
                    self.ctx
                        .file_path
                        .file_name()
                        .map(Path::new)
                        .unwrap_or(Path::new("unknown"))
                        .to_path_buf()
                });
            let relative = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            format!(
                "{DEV_SERVER_PREFIX}{relative}?file={}",
                urlencoding::encode(file_uri)
            )
        } else {
            let root = match self.ctx.caller.platform {
                Platform::Android => ANDROID_ASSET_ROOT,
                _ => ASSET_ROOT,
            };
            format!("{root}/{}.html", hex_encode(Sha1::digest(file_uri.as_bytes())))
        }
    }

    fn display_name(&self, module: &Module) -> String {
        let default_fn_name = module.body.iter().find_map(|item| match item {
            ModuleItem::ModuleDecl(ModuleDecl::ExportDefaultDecl(ExportDefaultDecl {
                decl: DefaultDecl::Fn(FnExpr {
                    ident: Some(ident), ..
                }),
                ..
            })) => Some(ident.sym.to_string()),
            ModuleItem::ModuleDecl(ModuleDecl::ExportDefaultExpr(ExportDefaultExpr {
                expr,
                ..
            })) => match &**expr {
                Expr::Ident(ident) => Some(ident.sym.to_string()),
                _ => None,
            },
            _ => None,
        });

        default_fn_name
            .or_else(|| {
                self.ctx
                    .file_path
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| "Component".to_string())
    }

    /// Returns `false` if the module cannot be rendered as a DOM component.
    fn validate(&mut self, module: &Module) -> bool {
        let exports = collect_exports(module, self.ctx.unresolved_ctxt);
        let mut has_default = false;

        for export in &exports.exports {
            if export.name != "default" {
                self.ctx
                    .emit_error(BoundaryErrorKind::DomNamedExport { span: export.span });
                continue;
            }
            has_default = true;
            if export.kind != ExportKind::Function {
                self.ctx
                    .emit_error(BoundaryErrorKind::DomDefaultExportNotFunction {
                        span: export.span,
                    });
            }
        }

        for span in &exports.star_exports {
            self.ctx
                .emit_error(BoundaryErrorKind::DomNamedExport { span: *span });
        }

        if !has_default {
            self.ctx
                .emit_error(BoundaryErrorKind::DomMissingDefaultExport {
                    span: self.directive_span,
                });
        }

        !self.ctx.has_errors()
    }
}

impl VisitMut for DomComponentProxy<'_> {
    noop_visit_mut_type!();

    fn visit_mut_module(&mut self, module: &mut Module) {
        if !self.validate(module) {
            return;
        }

        let uri = self.source_uri();
        let display_name = self.display_name(module);

        let forward_ref = self.ctx.runtime_import("react", "forwardRef");
        let create_element = self.ctx.runtime_import("react", "createElement");
        let web_view = self.ctx.runtime_import("expo/dom/internal", "WebView");
        let component = self.ctx.generate_uid("Expo_DOMProxyComponent");

        let render: Expr = quote!(
            "$forward_ref((props, ref) => $create_element($web_view, {
                ref: ref,
                ...props,
                source: { uri: $uri }
            }))" as Expr,
            forward_ref = forward_ref,
            create_element = create_element,
            web_view = web_view,
            uri: Expr = quote_str!(&*uri).into(),
        );

        let mut body = vec![ModuleItem::Stmt(Stmt::Decl(const_decl(
            component.clone(),
            render,
        )))];

        if self.ctx.caller.is_dev {
            body.push(ModuleItem::Stmt(quote!(
                "$component.displayName = $name;" as Stmt,
                component = component.clone(),
                name: Expr = quote_str!(&*format!("DOM({display_name})")).into(),
            )));
        }

        body.push(ModuleItem::ModuleDecl(ModuleDecl::ExportDefaultExpr(
            ExportDefaultExpr {
                span: DUMMY_SP,
                expr: Box::new(component.into()),
            },
        )));

        tracing::debug!(file = %self.ctx.file_path.display(), %uri, "created DOM component proxy");

        module.body = body;
        let file_uri = self.ctx.file_uri().to_string();
        self.ctx.metadata.expo_dom_component_reference = Some(file_uri);
    }
}

#[cfg(test)]
mod tests {
    use crate::{Caller, Platform, TransformError, transform};

    fn native(platform: Platform, is_dev: bool) -> Caller {
        Caller {
            platform,
            is_dev,
            supports_static_esm: true,
            project_root: Some("/app".into()),
            ..Default::default()
        }
    }

    const COMPONENT: &str = r#"
        "use dom";
        export default function Chart({ data }) {
            return <canvas data={data} />;
        }
    "#;

    #[test]
    fn dev_components_point_at_the_dev_server() {
        let output = transform(COMPONENT, "/app/components/chart.tsx", &native(Platform::Ios, true))
            .unwrap();

        assert!(output.code.contains(
            r#"uri: "/_expo/@dom/components/chart.tsx?file=file%3A%2F%2F%2Fapp%2Fcomponents%2Fchart.tsx""#
        ));
        assert!(output.code.contains(r#"_Expo_DOMProxyComponent.displayName = "DOM(Chart)";"#));
        assert!(output.code.contains(r#"import { WebView } from "expo/dom/internal";"#));
        assert!(output.code.contains("export default _Expo_DOMProxyComponent;"));
        assert!(!output.code.contains("canvas"));
        assert_eq!(
            output.metadata.expo_dom_component_reference.as_deref(),
            Some("file:///app/components/chart.tsx")
        );
    }

    #[test]
    fn production_components_point_at_hashed_assets() {
        let output = transform(
            COMPONENT,
            "/app/components/chart.tsx",
            &native(Platform::Android, false),
        )
        .unwrap();

        let hashed = asset_name(&output.code, "file:///android_asset/www.bundle/");
        assert_eq!(hashed.len(), 40 + ".html".len());
        assert!(hashed.ends_with(".html"));
        assert!(!output.code.contains("displayName"));
    }

    fn asset_name<'a>(code: &'a str, prefix: &str) -> &'a str {
        let start = code.find(prefix).expect("asset uri") + prefix.len();
        let end = code[start..].find('"').expect("closing quote") + start;
        &code[start..end]
    }

    #[test]
    fn web_builds_keep_the_component() {
        let output = transform(
            COMPONENT,
            "/app/components/chart.tsx",
            &Caller::default(),
        )
        .unwrap();
        assert!(output.code.contains("canvas"));
    }

    #[test]
    fn named_exports_are_rejected() {
        let err = transform(
            r#"
            "use dom";
            export function App() { return null; }
            "#,
            "/app/app.tsx",
            &native(Platform::Ios, false),
        )
        .unwrap_err();

        let TransformError::Boundary { diagnostics, .. } = &err else {
            panic!("expected a boundary error, got {err}");
        };
        let messages: Vec<_> = diagnostics.iter().map(|d| d.message.as_str()).collect();
        assert!(messages.iter().any(|m| m.contains("only support a single default export")));
        assert!(messages.iter().any(|m| m.contains("requires a default export")));
        assert_eq!(diagnostics[0].location.unwrap().start.line, 3);
    }

    #[test]
    fn default_export_must_be_a_function() {
        let err = transform(
            "'use dom'; export default class App {}",
            "/app/app.tsx",
            &native(Platform::Ios, false),
        )
        .unwrap_err();
        assert!(err.to_string().contains("must be a React function component"));
    }
}
