//! Runtime export collection shared by the proxy generators.

use rustc_hash::FxHashMap;
use swc_core::{
    atoms::Atom,
    common::{DUMMY_SP, Span, SyntaxContext},
    ecma::{
        ast::*,
        visit::{Visit, VisitWith, noop_visit_type},
    },
};

use super::closure::collect_idents_in_pat;
use crate::context::FileCompilationContext;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ExportKind {
    Function,
    Class,
    Other,
}

#[derive(Clone, Debug)]
pub(crate) struct RuntimeExport {
    pub name: String,
    pub span: Span,
    pub kind: ExportKind,
}

#[derive(Debug, Default)]
pub(crate) struct ModuleExports {
    /// Runtime exports in source order, each name once.
    pub exports: Vec<RuntimeExport>,
    /// Spans of `export * from "..."` statements.
    pub star_exports: Vec<Span>,
    pub has_cjs_exports: bool,
}

impl ModuleExports {
    pub fn names(&self) -> Vec<String> {
        self.exports.iter().map(|e| e.name.clone()).collect()
    }

    fn push(&mut self, name: impl Into<String>, span: Span, kind: ExportKind) {
        let name = name.into();
        if self.exports.iter().all(|e| e.name != name) {
            self.exports.push(RuntimeExport { name, span, kind });
        }
    }
}

pub(crate) fn export_name(name: &ModuleExportName) -> String {
    match name {
        ModuleExportName::Ident(ident) => ident.sym.to_string(),
        ModuleExportName::Str(s) => s.value.to_string_lossy().into_owned(),
    }
}

pub(crate) fn collect_exports(module: &Module, unresolved_ctxt: SyntaxContext) -> ModuleExports {
    let local_kinds = top_level_kinds(module);
    let mut collected = ModuleExports::default();

    for item in &module.body {
        let ModuleItem::ModuleDecl(decl) = item else {
            continue;
        };

        match decl {
            ModuleDecl::ExportDecl(ExportDecl { decl, span }) => match decl {
                Decl::Fn(f) if !f.declare => {
                    collected.push(&*f.ident.sym, *span, ExportKind::Function);
                }
                Decl::Class(c) if !c.declare => {
                    collected.push(&*c.ident.sym, *span, ExportKind::Class);
                }
                Decl::Var(var) if !var.declare => {
                    for declarator in &var.decls {
                        let kind = declarator
                            .init
                            .as_deref()
                            .map_or(ExportKind::Other, expr_kind);
                        let mut idents = vec![];
                        collect_idents_in_pat(&declarator.name, &mut idents);
                        for ident in idents {
                            collected.push(&*ident.sym, *span, kind);
                        }
                    }
                }
                Decl::Using(using) => {
                    for declarator in &using.decls {
                        let mut idents = vec![];
                        collect_idents_in_pat(&declarator.name, &mut idents);
                        for ident in idents {
                            collected.push(&*ident.sym, *span, ExportKind::Other);
                        }
                    }
                }
                Decl::TsEnum(e) if !e.declare => {
                    collected.push(&*e.id.sym, *span, ExportKind::Other);
                }
                Decl::TsModule(m) if !m.declare => {
                    if let TsModuleName::Ident(ident) = &m.id {
                        collected.push(&*ident.sym, *span, ExportKind::Other);
                    }
                }
                _ => {}
            },
            ModuleDecl::ExportNamed(named) if !named.type_only => {
                for specifier in &named.specifiers {
                    match specifier {
                        ExportSpecifier::Named(ExportNamedSpecifier {
                            orig,
                            exported,
                            is_type_only: false,
                            span,
                        }) => {
                            let kind = match (orig, &named.src) {
                                (ModuleExportName::Ident(ident), None) => local_kinds
                                    .get(&ident.to_id())
                                    .copied()
                                    .unwrap_or(ExportKind::Other),
                                _ => ExportKind::Other,
                            };
                            collected.push(
                                export_name(exported.as_ref().unwrap_or(orig)),
                                *span,
                                kind,
                            );
                        }
                        ExportSpecifier::Namespace(ns) => {
                            collected.push(export_name(&ns.name), ns.span, ExportKind::Other);
                        }
                        ExportSpecifier::Default(default) => {
                            collected.push("default", default.exported.span, ExportKind::Other);
                        }
                        ExportSpecifier::Named(_) => {}
                    }
                }
            }
            ModuleDecl::ExportDefaultDecl(ExportDefaultDecl { decl, span }) => match decl {
                DefaultDecl::Fn(_) => collected.push("default", *span, ExportKind::Function),
                DefaultDecl::Class(_) => collected.push("default", *span, ExportKind::Class),
                DefaultDecl::TsInterfaceDecl(_) => {}
            },
            ModuleDecl::ExportDefaultExpr(ExportDefaultExpr { expr, span }) => {
                let kind = match &**expr {
                    Expr::Ident(ident) => local_kinds
                        .get(&ident.to_id())
                        .copied()
                        .unwrap_or(ExportKind::Other),
                    expr => expr_kind(expr),
                };
                collected.push("default", *span, kind);
            }
            ModuleDecl::ExportAll(ExportAll {
                span, type_only, ..
            }) if !type_only => {
                collected.star_exports.push(*span);
            }
            ModuleDecl::TsExportAssignment(_) => {
                collected.has_cjs_exports = true;
            }
            _ => {}
        }
    }

    if !collected.has_cjs_exports {
        let mut finder = CjsFinder {
            unresolved_ctxt,
            found: false,
        };
        module.visit_with(&mut finder);
        collected.has_cjs_exports = finder.found;
    }

    collected
}

fn expr_kind(expr: &Expr) -> ExportKind {
    match expr {
        Expr::Fn(_) | Expr::Arrow(_) => ExportKind::Function,
        Expr::Class(_) => ExportKind::Class,
        Expr::Paren(ParenExpr { expr, .. }) => expr_kind(expr),
        _ => ExportKind::Other,
    }
}

/// What each top-level binding is initialized with, so `export default App`
/// and `export { App }` can be classified.
fn top_level_kinds(module: &Module) -> FxHashMap<Id, ExportKind> {
    let mut kinds = FxHashMap::default();
    for item in &module.body {
        let decl = match item {
            ModuleItem::Stmt(Stmt::Decl(decl)) => decl,
            ModuleItem::ModuleDecl(ModuleDecl::ExportDecl(ExportDecl { decl, .. })) => decl,
            _ => continue,
        };
        match decl {
            Decl::Fn(f) => {
                kinds.insert(f.ident.to_id(), ExportKind::Function);
            }
            Decl::Class(c) => {
                kinds.insert(c.ident.to_id(), ExportKind::Class);
            }
            Decl::Var(var) => {
                for declarator in &var.decls {
                    if let Pat::Ident(name) = &declarator.name {
                        kinds.insert(
                            name.id.to_id(),
                            declarator
                                .init
                                .as_deref()
                                .map_or(ExportKind::Other, expr_kind),
                        );
                    }
                }
            }
            _ => {}
        }
    }
    kinds
}

/// Detects `module.exports` / `exports` references that are not shadowed by
/// a local binding.
struct CjsFinder {
    unresolved_ctxt: SyntaxContext,
    found: bool,
}

impl Visit for CjsFinder {
    noop_visit_type!();

    fn visit_ident(&mut self, ident: &Ident) {
        if ident.ctxt == self.unresolved_ctxt && ident.sym == *"exports" {
            self.found = true;
        }
    }

    fn visit_member_expr(&mut self, member: &MemberExpr) {
        if let Expr::Ident(obj) = &*member.obj
            && obj.ctxt == self.unresolved_ctxt
            && obj.sym == *"module"
            && let MemberProp::Ident(prop) = &member.prop
            && prop.sym == *"exports"
        {
            self.found = true;
            return;
        }
        member.visit_children_with(self);
    }
}

/// `export const <name> = <init>;`, or a generated binding re-exported under
/// a string name when `name` is not a valid identifier.
pub(crate) fn export_binding(
    ctx: &mut FileCompilationContext,
    name: &str,
    init: Expr,
) -> Vec<ModuleItem> {
    if Ident::verify_symbol(name).is_ok() {
        let ident = Ident::new(Atom::from(name), DUMMY_SP, SyntaxContext::empty());
        return vec![ModuleItem::ModuleDecl(ModuleDecl::ExportDecl(ExportDecl {
            span: DUMMY_SP,
            decl: const_decl(ident, init),
        }))];
    }

    let local = ctx.generate_uid("export");
    vec![
        ModuleItem::Stmt(Stmt::Decl(const_decl(local.clone(), init))),
        ModuleItem::ModuleDecl(ModuleDecl::ExportNamed(NamedExport {
            span: DUMMY_SP,
            specifiers: vec![ExportSpecifier::Named(ExportNamedSpecifier {
                span: DUMMY_SP,
                orig: ModuleExportName::Ident(local),
                exported: Some(ModuleExportName::Str(name.into())),
                is_type_only: false,
            })],
            src: None,
            type_only: false,
            with: None,
        })),
    ]
}

pub(crate) fn const_decl(name: Ident, init: Expr) -> Decl {
    Decl::Var(Box::new(VarDecl {
        span: DUMMY_SP,
        kind: VarDeclKind::Const,
        decls: vec![VarDeclarator {
            span: DUMMY_SP,
            name: Pat::Ident(name.into()),
            init: Some(Box::new(init)),
            definite: false,
        }],
        ..Default::default()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::Caller, pipeline::with_parsed_module};

    fn collect(src: &str) -> ModuleExports {
        with_parsed_module(src, Caller::default(), |module, ctx| {
            collect_exports(module, ctx.unresolved_ctxt)
        })
    }

    #[test]
    fn type_exports_are_skipped() {
        let exports = collect(
            r#"
            export type Props = { a: string };
            export interface State {}
            export type { Other } from "./other";
            export { type Thing, value } from "./thing";
            export declare function declared(): void;
            export class Pattern {}
            export const a = 1, { b, c: [d] } = obj;
            export function Button() {}
            export default Button;
            "#,
        );

        assert_eq!(
            exports.names(),
            vec!["value", "Pattern", "a", "b", "d", "Button", "default"]
        );
        assert_eq!(exports.exports[1].kind, ExportKind::Class);
        assert_eq!(exports.exports[6].kind, ExportKind::Function);
        assert!(!exports.has_cjs_exports);
    }

    #[test]
    fn star_exports_and_string_names() {
        let exports = collect(
            r#"
            export * from "./a";
            export * as ns from "./b";
            const x = 1;
            export { x as "kebab-name" };
            "#,
        );
        assert_eq!(exports.names(), vec!["ns", "kebab-name"]);
        assert_eq!(exports.star_exports.len(), 1);
    }

    #[test]
    fn detects_commonjs_exports() {
        assert!(collect("module.exports = {};").has_cjs_exports);
        assert!(collect("exports.foo = 1;").has_cjs_exports);
        assert!(!collect("const exports = {}; exports.foo = 1;").has_cjs_exports);
    }
}
