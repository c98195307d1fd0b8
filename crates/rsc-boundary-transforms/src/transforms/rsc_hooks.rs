//! Folds React hooks that have a static meaning during a server render.
//!
//! Only direct calls are recognized: `useState(..)`, `React.useState(..)` and
//! aliased named imports. Calls through an indirection such as
//! `(0, useState)(..)` are left untouched.

use rustc_hash::{FxHashMap, FxHashSet};
use swc_core::{
    common::{DUMMY_SP, util::take::Take},
    ecma::{
        ast::*,
        visit::{VisitMut, VisitMutWith, noop_visit_mut_type, visit_mut_pass},
    },
    quote,
};

use crate::context::FileCompilationContext;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Hook {
    Effect,
    Memo,
    State,
}

impl Hook {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "useEffect" | "useLayoutEffect" => Some(Hook::Effect),
            "useMemo" => Some(Hook::Memo),
            "useState" => Some(Hook::State),
            _ => None,
        }
    }
}

#[tracing::instrument(level = tracing::Level::TRACE, skip_all)]
pub fn rsc_hooks(ctx: &mut FileCompilationContext) -> impl Pass {
    visit_mut_pass(RscHooks {
        ctx,
        hooks: Default::default(),
        namespaces: Default::default(),
        folded: 0,
    })
}

struct RscHooks<'a> {
    ctx: &'a mut FileCompilationContext,
    /// Named imports from `react` that resolve to a foldable hook.
    hooks: FxHashMap<Id, Hook>,
    /// Default and namespace imports of `react`.
    namespaces: FxHashSet<Id>,
    folded: usize,
}

impl RscHooks<'_> {
    fn collect_imports(&mut self, module: &Module) {
        for item in &module.body {
            let ModuleItem::ModuleDecl(ModuleDecl::Import(import)) = item else {
                continue;
            };
            if import.type_only || import.src.value.to_string_lossy() != "react" {
                continue;
            }

            for specifier in &import.specifiers {
                match specifier {
                    ImportSpecifier::Named(named) if !named.is_type_only => {
                        let imported = match &named.imported {
                            Some(ModuleExportName::Ident(ident)) => ident.sym.to_string(),
                            Some(ModuleExportName::Str(s)) => {
                                s.value.to_string_lossy().into_owned()
                            }
                            None => named.local.sym.to_string(),
                        };
                        if let Some(hook) = Hook::from_name(&imported) {
                            self.hooks.insert(named.local.to_id(), hook);
                        }
                    }
                    ImportSpecifier::Default(default) => {
                        self.namespaces.insert(default.local.to_id());
                    }
                    ImportSpecifier::Namespace(namespace) => {
                        self.namespaces.insert(namespace.local.to_id());
                    }
                    ImportSpecifier::Named(_) => {}
                }
            }
        }
    }

    fn hook_of(&self, call: &CallExpr) -> Option<Hook> {
        let Callee::Expr(callee) = &call.callee else {
            return None;
        };
        match &**callee {
            Expr::Ident(ident) => self.hooks.get(&ident.to_id()).copied(),
            Expr::Member(MemberExpr {
                obj,
                prop: MemberProp::Ident(prop),
                ..
            }) => match &**obj {
                Expr::Ident(obj) if self.namespaces.contains(&obj.to_id()) => {
                    Hook::from_name(&prop.sym)
                }
                _ => None,
            },
            _ => None,
        }
    }

    fn is_effect_stmt(&self, stmt: &Stmt) -> bool {
        let Stmt::Expr(ExprStmt { expr, .. }) = stmt else {
            return false;
        };
        match &**expr {
            Expr::Call(call) => self.hook_of(call) == Some(Hook::Effect),
            _ => false,
        }
    }

    fn fold(&mut self, call: &mut CallExpr) -> Option<Expr> {
        let hook = self.hook_of(call)?;

        if call.args.first().is_some_and(|arg| arg.spread.is_some()) {
            return None;
        }
        let first_arg = call.args.first_mut();

        let folded = match hook {
            Hook::Effect => *Expr::undefined(DUMMY_SP),
            Hook::Memo => {
                let factory = first_arg?;
                let has_params = match &*factory.expr {
                    Expr::Arrow(arrow) => !arrow.params.is_empty(),
                    Expr::Fn(f) => !f.function.params.is_empty(),
                    _ => return None,
                };
                if has_params {
                    return None;
                }
                CallExpr {
                    span: call.span,
                    callee: Callee::Expr(Box::new(Expr::Paren(ParenExpr {
                        span: DUMMY_SP,
                        expr: factory.expr.take(),
                    }))),
                    args: vec![],
                    ..Default::default()
                }
                .into()
            }
            Hook::State => {
                let initial = match first_arg {
                    Some(arg) => arg.expr.take(),
                    None => Expr::undefined(DUMMY_SP),
                };
                let setter = quote!("() => $initial" as Expr, initial: Expr = (*initial).clone());
                Expr::Array(ArrayLit {
                    span: call.span,
                    elems: vec![
                        Some(ExprOrSpread {
                            spread: None,
                            expr: initial,
                        }),
                        Some(ExprOrSpread {
                            spread: None,
                            expr: Box::new(setter),
                        }),
                    ],
                })
            }
        };

        self.folded += 1;
        Some(folded)
    }
}

impl VisitMut for RscHooks<'_> {
    noop_visit_mut_type!();

    fn visit_mut_module(&mut self, module: &mut Module) {
        self.collect_imports(module);
        if self.hooks.is_empty() && self.namespaces.is_empty() {
            return;
        }

        module.visit_mut_children_with(self);

        if self.folded > 0 {
            tracing::debug!(
                file = %self.ctx.file_path.display(),
                folded = self.folded,
                "folded server hooks"
            );
        }
    }

    fn visit_mut_module_items(&mut self, items: &mut Vec<ModuleItem>) {
        let before = items.len();
        items.retain(|item| !matches!(item, ModuleItem::Stmt(stmt) if self.is_effect_stmt(stmt)));
        self.folded += before - items.len();
        items.visit_mut_children_with(self);
    }

    fn visit_mut_stmts(&mut self, stmts: &mut Vec<Stmt>) {
        let before = stmts.len();
        stmts.retain(|stmt| !self.is_effect_stmt(stmt));
        self.folded += before - stmts.len();
        stmts.visit_mut_children_with(self);
    }

    fn visit_mut_expr(&mut self, expr: &mut Expr) {
        expr.visit_mut_children_with(self);

        if let Expr::Call(call) = expr
            && let Some(folded) = self.fold(call)
        {
            *expr = folded;
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{Caller, transform};

    fn fold(src: &str) -> String {
        transform(
            src,
            "/app/page.js",
            &Caller {
                is_react_server: true,
                is_server: true,
                supports_static_esm: true,
                ..Default::default()
            },
        )
        .unwrap()
        .code
    }

    #[test]
    fn removes_effects() {
        let code = fold(
            r#"
            import React, { useEffect, useLayoutEffect as useLayout } from "react";
            export function Page() {
                useEffect(() => { document.title = "x"; }, []);
                useLayout(() => {});
                React.useEffect(() => {});
                const cleanup = useEffect(() => {});
                return cleanup;
            }
            "#,
        );
        assert!(!code.contains("document.title"));
        assert!(!code.contains("useLayout("));
        assert!(!code.contains("React.useEffect"));
        assert!(code.contains("const cleanup = void 0;"));
    }

    #[test]
    fn inlines_memo_and_state() {
        let code = fold(
            r#"
            import * as React from "react";
            import { useMemo, useState } from "react";
            export function Page({ items }) {
                const total = useMemo(() => items.length, [items]);
                const [count, setCount] = React.useState(0);
                const skipped = useMemo(compute, []);
                const indirect = (0, useState)(1);
                return [total, count, skipped, indirect];
            }
            "#,
        );
        assert!(code.contains("()=>items.length)()"), "{code}");
        assert!(code.contains("()=>0"), "{code}");
        assert!(!code.contains("React.useState"), "{code}");
        assert!(code.contains("useMemo(compute, [])"));
        assert!(code.contains("(0, useState)(1)"));
    }

    #[test]
    fn shadowed_hooks_are_ignored() {
        let code = fold(
            r#"
            import { useState } from "react";
            export function Page() {
                const useState = (v) => v;
                return useState(1);
            }
            "#,
        );
        assert!(code.contains("return useState(1);"));
    }
}
