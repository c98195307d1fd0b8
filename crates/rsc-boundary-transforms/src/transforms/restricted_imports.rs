use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use swc_core::{
    common::{Span, SyntaxContext},
    ecma::{
        ast::*,
        visit::{Visit, VisitWith, noop_visit_type, visit_pass},
    },
};

use super::directives::DirectiveKind;
use crate::{
    context::FileCompilationContext,
    diagnostics::{BoundaryErrorKind, Environment},
};

/// Bare specifiers that may only be imported from one environment.
static RESTRICTED_MODULES: Lazy<FxHashMap<&'static str, Environment>> = Lazy::new(|| {
    FxHashMap::from_iter([
        ("client-only", Environment::ClientOnly),
        ("react-dom/client", Environment::ClientOnly),
        ("server-only", Environment::ServerOnly),
    ])
});

/// Client-only APIs, checked where they are used rather than imported.
/// `useState`, `useEffect`, `useLayoutEffect` and `useMemo` are folded away
/// by the hook unwrapper and are therefore allowed.
static CLIENT_ONLY_APIS: Lazy<FxHashMap<&'static str, &'static [&'static str]>> =
    Lazy::new(|| {
        FxHashMap::from_iter([
            (
                "react",
                &[
                    "Component",
                    "PureComponent",
                    "createContext",
                    "useReducer",
                    "useRef",
                    "useImperativeHandle",
                    "useInsertionEffect",
                    "useSyncExternalStore",
                    "useTransition",
                    "useDeferredValue",
                    "useOptimistic",
                    "useActionState",
                ][..],
            ),
            (
                "react-dom",
                &[
                    "findDOMNode",
                    "flushSync",
                    "unstable_batchedUpdates",
                    "useFormStatus",
                    "useFormState",
                ][..],
            ),
        ])
    });

/// Rejects imports and API usages that cannot run in the environment the
/// file is compiled for.
#[tracing::instrument(level = tracing::Level::TRACE, skip_all)]
pub fn restricted_imports(
    ctx: &mut FileCompilationContext,
    module_directive: Option<DirectiveKind>,
) -> impl Pass {
    visit_pass(RestrictedImports::new(ctx, module_directive))
}

struct RestrictedImports<'a> {
    ctx: &'a mut FileCompilationContext,
    reject_client_only: bool,
    reject_server_only: bool,
    /// Named imports of client-only APIs.
    restricted_bindings: FxHashMap<Id, (&'static str, &'static str)>,
    /// Default and namespace imports of `react` / `react-dom`.
    namespaces: FxHashMap<Id, &'static str>,
}

impl<'a> RestrictedImports<'a> {
    fn new(ctx: &'a mut FileCompilationContext, module_directive: Option<DirectiveKind>) -> Self {
        // DOM components run in a web view, like client modules.
        let is_client_module = matches!(
            module_directive,
            Some(DirectiveKind::UseClient | DirectiveKind::UseDom)
        );
        let caller = &ctx.caller;
        let reject_client_only = caller.is_react_server && !is_client_module;
        let reject_server_only =
            is_client_module || (!caller.is_server && !caller.is_react_server);

        RestrictedImports {
            ctx,
            reject_client_only,
            reject_server_only,
            restricted_bindings: Default::default(),
            namespaces: Default::default(),
        }
    }

    fn check_specifier(&mut self, span: Span, specifier: &str) {
        let Some(&environment) = RESTRICTED_MODULES.get(specifier) else {
            return;
        };

        let rejected = match environment {
            Environment::ClientOnly => self.reject_client_only,
            Environment::ServerOnly => self.reject_server_only,
        };

        if rejected {
            self.ctx.emit_error(BoundaryErrorKind::RestrictedImport {
                span,
                specifier: specifier.to_string(),
                environment,
            });
        }
    }

    fn track_bindings(&mut self, import: &ImportDecl) {
        if !self.reject_client_only || import.type_only {
            return;
        }
        let source = import.src.value.to_string_lossy();
        let Some((&module, &apis)) = CLIENT_ONLY_APIS.get_key_value(&*source) else {
            return;
        };

        for specifier in &import.specifiers {
            match specifier {
                ImportSpecifier::Named(named) if !named.is_type_only => {
                    let imported = match &named.imported {
                        Some(ModuleExportName::Ident(ident)) => ident.sym.to_string(),
                        Some(ModuleExportName::Str(s)) => s.value.to_string_lossy().into_owned(),
                        None => named.local.sym.to_string(),
                    };
                    if let Some(&api) = apis.iter().find(|api| **api == imported) {
                        self.restricted_bindings
                            .insert(named.local.to_id(), (api, module));
                    }
                }
                ImportSpecifier::Default(default) => {
                    self.namespaces.insert(default.local.to_id(), module);
                }
                ImportSpecifier::Namespace(namespace) => {
                    self.namespaces.insert(namespace.local.to_id(), module);
                }
                ImportSpecifier::Named(_) => {}
            }
        }
    }

    fn dynamic_specifier(call: &CallExpr, unresolved_ctxt: SyntaxContext) -> Option<(Span, String)> {
        let is_loader = match &call.callee {
            Callee::Import(_) => true,
            Callee::Expr(callee) => matches!(
                &**callee,
                Expr::Ident(ident) if ident.ctxt == unresolved_ctxt && ident.sym == *"require"
            ),
            Callee::Super(_) => false,
        };
        if !is_loader {
            return None;
        }

        match call.args.first() {
            Some(ExprOrSpread { spread: None, expr }) => match &**expr {
                Expr::Lit(Lit::Str(s)) => {
                    Some((call.span, s.value.to_string_lossy().into_owned()))
                }
                Expr::Tpl(tpl) if tpl.exprs.is_empty() && tpl.quasis.len() == 1 => tpl.quasis[0]
                    .cooked
                    .as_ref()
                    .map(|cooked| (call.span, cooked.to_string_lossy().into_owned())),
                _ => None,
            },
            _ => None,
        }
    }
}

impl Visit for RestrictedImports<'_> {
    noop_visit_type!();

    fn visit_module(&mut self, module: &Module) {
        for item in &module.body {
            if let ModuleItem::ModuleDecl(ModuleDecl::Import(import)) = item {
                if !import.type_only {
                    self.check_specifier(import.span, &import.src.value.to_string_lossy());
                }
                self.track_bindings(import);
            }
        }

        module.visit_children_with(self);
    }

    fn visit_import_decl(&mut self, _: &ImportDecl) {
        // Checked up front; specifiers are bindings, not usages.
    }

    fn visit_export_specifier(&mut self, _: &ExportSpecifier) {
        // Re-exporting is not a usage.
    }

    fn visit_named_export(&mut self, export: &NamedExport) {
        if let Some(src) = &export.src
            && !export.type_only
        {
            self.check_specifier(export.span, &src.value.to_string_lossy());
        }
    }

    fn visit_export_all(&mut self, export: &ExportAll) {
        if !export.type_only {
            self.check_specifier(export.span, &export.src.value.to_string_lossy());
        }
    }

    fn visit_ident(&mut self, ident: &Ident) {
        if let Some(&(api, module)) = self.restricted_bindings.get(&ident.to_id()) {
            self.ctx.emit_error(BoundaryErrorKind::RestrictedApi {
                span: ident.span,
                api,
                module,
            });
        }
    }

    fn visit_member_expr(&mut self, member: &MemberExpr) {
        if let Expr::Ident(obj) = &*member.obj
            && let Some(&module) = self.namespaces.get(&obj.to_id())
        {
            let prop = match &member.prop {
                MemberProp::Ident(prop) => Some(prop.sym.to_string()),
                MemberProp::Computed(ComputedPropName { expr, .. }) => match &**expr {
                    Expr::Lit(Lit::Str(s)) => Some(s.value.to_string_lossy().into_owned()),
                    _ => None,
                },
                MemberProp::PrivateName(_) => None,
            };

            if let Some(prop) = prop
                && let Some(&api) = CLIENT_ONLY_APIS
                    .get(module)
                    .and_then(|apis| apis.iter().find(|api| **api == prop))
            {
                self.ctx.emit_error(BoundaryErrorKind::RestrictedApi {
                    span: member.span,
                    api,
                    module,
                });
            }
        }

        member.visit_children_with(self);
    }

    fn visit_call_expr(&mut self, call: &CallExpr) {
        if let Some((span, specifier)) = Self::dynamic_specifier(call, self.ctx.unresolved_ctxt) {
            self.check_specifier(span, &specifier);
        }
        call.visit_children_with(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Caller, pipeline::with_parsed_module, transforms::directives::scan_directives,
    };

    fn errors(src: &str, caller: Caller) -> Vec<String> {
        with_parsed_module(src, caller, |module, ctx| {
            let directives = scan_directives(module, ctx);
            let mut checker = RestrictedImports::new(ctx, directives.module);
            module.visit_with(&mut checker);
            ctx.take_diagnostics()
                .into_iter()
                .map(|d| d.message)
                .collect()
        })
    }

    fn react_server() -> Caller {
        Caller {
            is_react_server: true,
            is_server: true,
            ..Default::default()
        }
    }

    #[test]
    fn client_only_import_in_server_component() {
        let errors = errors("import 'client-only';", react_server());
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with(
            r#"Importing "client-only" is not allowed in the React Server environment."#
        ));

        let allowed = super::tests::errors("'use client'; import 'client-only';", react_server());
        assert!(allowed.is_empty());
    }

    #[test]
    fn server_only_import_in_client_module() {
        let errors = errors(
            "'use client'; import 'server-only';",
            Caller {
                is_server: true,
                ..Default::default()
            },
        );
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("in a client module"));

        assert!(super::tests::errors("import 'server-only';", react_server()).is_empty());
    }

    #[test]
    fn apis_are_checked_at_the_usage_site() {
        assert!(errors("import { useRef, createContext } from 'react';", react_server()).is_empty());

        let errors = errors(
            r#"
            import React, { useRef as useR } from "react";
            import * as ReactDOM from "react-dom";
            export function A() {
                const ref = useR(null);
                ReactDOM.flushSync(() => {});
                return React.useState(0);
            }
            export class B extends React.Component {}
            "#,
            react_server(),
        );
        assert_eq!(
            errors,
            vec![
                r#""useRef" from "react" is a client-only API and cannot be used in a React Server Component.
Add the "use client" directive at the top of this file to use it."#,
                r#""flushSync" from "react-dom" is a client-only API and cannot be used in a React Server Component.
Add the "use client" directive at the top of this file to use it."#,
                r#""Component" from "react" is a client-only API and cannot be used in a React Server Component.
Add the "use client" directive at the top of this file to use it."#,
            ]
        );
    }

    #[test]
    fn dom_components_are_checked_like_client_modules() {
        let allowed = errors(
            r#"
            "use dom";
            import "client-only";
            import { useRef } from "react";
            export default function Chart() {
                return useRef(null);
            }
            "#,
            react_server(),
        );
        assert!(allowed.is_empty(), "{allowed:?}");

        let errors = errors("'use dom'; import 'server-only';", react_server());
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("in a client module"));
    }

    #[test]
    fn dynamic_requires_are_checked() {
        let errors = errors(
            "const a = require('server-only'); const b = import(`server-only`);",
            Caller::default(),
        );
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn node_modules_are_exempt() {
        let caller = react_server();
        let output = crate::transform(
            "import 'client-only'; export const a = 1;",
            "/app/node_modules/lib/index.js",
            &caller,
        );
        assert!(output.is_ok());
    }
}
