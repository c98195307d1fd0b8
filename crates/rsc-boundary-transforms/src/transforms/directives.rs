use std::fmt;

use rustc_hash::FxHashSet;
use swc_core::{
    common::Span,
    ecma::{
        ast::*,
        visit::{Visit, VisitWith, noop_visit_type},
    },
};

use crate::{context::FileCompilationContext, diagnostics::BoundaryErrorKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DirectiveKind {
    UseClient,
    UseServer,
    UseDom,
}

impl DirectiveKind {
    const ALL: [DirectiveKind; 3] = [
        DirectiveKind::UseClient,
        DirectiveKind::UseServer,
        DirectiveKind::UseDom,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DirectiveKind::UseClient => "use client",
            DirectiveKind::UseServer => "use server",
            DirectiveKind::UseDom => "use dom",
        }
    }

    fn from_value(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }

    fn misspelled_as(value: &str) -> Option<Self> {
        match value {
            "use strict" | "use asm" => return None,
            "use action" => return Some(DirectiveKind::UseServer),
            _ => {}
        }
        Self::ALL
            .into_iter()
            .find(|kind| detect_similar_strings(value, kind.as_str()))
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum DirectiveLocation {
    Module,
    FunctionBody,
}

impl fmt::Display for DirectiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directive classification of one file, computed once before any rewrite.
#[derive(Debug, Default)]
pub struct DirectiveMap {
    pub module: Option<DirectiveKind>,
    pub module_span: Option<Span>,
    /// Body spans of functions whose prologue contains `"use server"`.
    server_functions: FxHashSet<Span>,
}

impl DirectiveMap {
    pub fn is_server_function(&self, body: &BlockStmt) -> bool {
        self.server_functions.contains(&body.span)
    }

    pub fn has_server_functions(&self) -> bool {
        !self.server_functions.is_empty()
    }
}

#[tracing::instrument(level = tracing::Level::TRACE, skip_all)]
pub fn scan_directives(module: &Module, ctx: &mut FileCompilationContext) -> DirectiveMap {
    let mut scanner = DirectiveScanner {
        ctx,
        map: Default::default(),
    };
    module.visit_with(&mut scanner);
    scanner.map
}

/// Number of leading string-literal statements.
pub(crate) fn prologue_len(stmts: &[Stmt]) -> usize {
    stmts
        .iter()
        .take_while(|stmt| directive_literal(stmt).is_some())
        .count()
}

/// Removes `"use server"` from the prologue of a function body.
pub(crate) fn strip_use_server(body: &mut BlockStmt) {
    let prologue_len = prologue_len(&body.stmts);
    let mut index = 0;
    body.stmts.retain(|stmt| {
        index += 1;
        index > prologue_len
            || directive_literal(stmt).is_none_or(|s| {
                DirectiveKind::from_value(&s.value.to_string_lossy())
                    != Some(DirectiveKind::UseServer)
            })
    });
}

/// Removes the module-level directive statements from the prologue.
pub(crate) fn strip_module_directives(items: &mut Vec<ModuleItem>) {
    let prologue_len = items
        .iter()
        .take_while(|item| {
            matches!(item, ModuleItem::Stmt(stmt) if directive_literal(stmt).is_some())
        })
        .count();
    let mut index = 0;
    items.retain(|item| {
        index += 1;
        if index > prologue_len {
            return true;
        }
        let ModuleItem::Stmt(stmt) = item else {
            return true;
        };
        directive_literal(stmt)
            .is_none_or(|s| DirectiveKind::from_value(&s.value.to_string_lossy()).is_none())
    });
}

fn directive_literal(stmt: &Stmt) -> Option<&Str> {
    match stmt {
        Stmt::Expr(ExprStmt { expr, .. }) => match &**expr {
            Expr::Lit(Lit::Str(s)) => Some(s),
            _ => None,
        },
        _ => None,
    }
}

fn wrapped_directive(stmt: &Stmt) -> Option<(Span, DirectiveKind)> {
    let Stmt::Expr(ExprStmt { expr, span }) = stmt else {
        return None;
    };
    let Expr::Paren(ParenExpr { expr, .. }) = &**expr else {
        return None;
    };
    let Expr::Lit(Lit::Str(s)) = &**expr else {
        return None;
    };
    DirectiveKind::from_value(&s.value.to_string_lossy()).map(|kind| (*span, kind))
}

struct DirectiveScanner<'a> {
    ctx: &'a mut FileCompilationContext,
    map: DirectiveMap,
}

impl DirectiveScanner<'_> {
    fn scan_module(&mut self, items: &[ModuleItem]) {
        let mut in_prologue = true;
        for item in items {
            let ModuleItem::Stmt(stmt) = item else {
                in_prologue = false;
                continue;
            };

            if let Some((span, directive)) = wrapped_directive(stmt) {
                self.ctx
                    .emit_error(BoundaryErrorKind::WrappedDirective { span, directive });
                in_prologue = false;
                continue;
            }

            let Some(literal) = directive_literal(stmt) else {
                in_prologue = false;
                continue;
            };
            let value = literal.value.to_string_lossy();

            match DirectiveKind::from_value(&value) {
                Some(directive) if !in_prologue => {
                    self.ctx.emit_error(BoundaryErrorKind::MisplacedDirective {
                        span: literal.span,
                        directive,
                        location: DirectiveLocation::Module,
                    });
                }
                Some(directive) => match self.map.module {
                    Some(first) if first != directive => {
                        self.ctx.emit_error(BoundaryErrorKind::ConflictingDirectives {
                            span: literal.span,
                            first,
                            second: directive,
                        });
                    }
                    Some(_) => {}
                    None => {
                        self.map.module = Some(directive);
                        self.map.module_span = Some(literal.span);
                    }
                },
                None => self.check_misspelling(literal.span, &value),
            }
        }
    }

    /// Returns `true` if the body carries `"use server"` in its prologue.
    fn scan_function_body(&mut self, body: &BlockStmt) -> bool {
        let mut in_prologue = true;
        let mut is_action = false;

        for stmt in &body.stmts {
            if let Some((span, directive)) = wrapped_directive(stmt) {
                self.ctx
                    .emit_error(BoundaryErrorKind::WrappedDirective { span, directive });
                in_prologue = false;
                continue;
            }

            let Some(literal) = directive_literal(stmt) else {
                in_prologue = false;
                continue;
            };
            let value = literal.value.to_string_lossy();

            match DirectiveKind::from_value(&value) {
                Some(DirectiveKind::UseServer) if in_prologue => {
                    is_action = true;
                }
                Some(directive) => {
                    self.ctx.emit_error(BoundaryErrorKind::MisplacedDirective {
                        span: literal.span,
                        directive,
                        location: match directive {
                            DirectiveKind::UseServer => DirectiveLocation::FunctionBody,
                            DirectiveKind::UseClient | DirectiveKind::UseDom => {
                                DirectiveLocation::Module
                            }
                        },
                    });
                }
                None => {
                    if in_prologue {
                        self.check_misspelling(literal.span, &value);
                    }
                }
            }
        }

        if is_action {
            self.check_inline_action_allowed(body.span);
        }

        is_action
    }

    fn check_inline_action_allowed(&mut self, span: Span) {
        match self.map.module {
            Some(DirectiveKind::UseClient | DirectiveKind::UseDom) => {
                self.ctx
                    .emit_error(BoundaryErrorKind::InlineUseServerInClientComponent { span });
            }
            Some(DirectiveKind::UseServer) => {}
            None if !self.ctx.caller.is_react_server => {
                self.ctx
                    .emit_error(BoundaryErrorKind::InlineUseServerOutsideServerGraph { span });
            }
            None => {}
        }
    }

    fn check_misspelling(&mut self, span: Span, value: &str) {
        if let Some(expected_directive) = DirectiveKind::misspelled_as(value) {
            self.ctx.emit_error(BoundaryErrorKind::MisspelledDirective {
                span,
                directive: value.to_string(),
                expected_directive,
            });
        }
    }

    fn check_method_body(&mut self, body: Option<&BlockStmt>) {
        if let Some(body) = body
            && self.scan_function_body(body)
        {
            self.ctx
                .emit_error(BoundaryErrorKind::InlineUseServerInMethod { span: body.span });
        }
    }
}

impl Visit for DirectiveScanner<'_> {
    noop_visit_type!();

    fn visit_module(&mut self, module: &Module) {
        self.scan_module(&module.body);
        module.visit_children_with(self);
    }

    fn visit_function(&mut self, function: &Function) {
        if let Some(body) = &function.body
            && self.scan_function_body(body)
        {
            self.map.server_functions.insert(body.span);
        }
        function.visit_children_with(self);
    }

    fn visit_arrow_expr(&mut self, arrow: &ArrowExpr) {
        // Expression bodies cannot hold a prologue.
        if let BlockStmtOrExpr::BlockStmt(body) = &*arrow.body
            && self.scan_function_body(body)
        {
            self.map.server_functions.insert(body.span);
        }
        arrow.visit_children_with(self);
    }

    fn visit_class_method(&mut self, method: &ClassMethod) {
        self.check_method_body(method.function.body.as_ref());
        method.key.visit_with(self);
        method.function.visit_children_with(self);
    }

    fn visit_private_method(&mut self, method: &PrivateMethod) {
        self.check_method_body(method.function.body.as_ref());
        method.function.visit_children_with(self);
    }

    fn visit_method_prop(&mut self, method: &MethodProp) {
        self.check_method_body(method.function.body.as_ref());
        method.key.visit_with(self);
        method.function.visit_children_with(self);
    }

    fn visit_getter_prop(&mut self, getter: &GetterProp) {
        self.check_method_body(getter.body.as_ref());
        getter.visit_children_with(self);
    }

    fn visit_setter_prop(&mut self, setter: &SetterProp) {
        self.check_method_body(setter.body.as_ref());
        setter.visit_children_with(self);
    }

    fn visit_constructor(&mut self, constructor: &Constructor) {
        self.check_method_body(constructor.body.as_ref());
        constructor.visit_children_with(self);
    }
}

// Detect if two strings are similar (but not the same) by at most two edits
// of the same length or a single inserted character.
fn detect_similar_strings(a: &str, b: &str) -> bool {
    let mut a = a.chars().collect::<Vec<char>>();
    let mut b = b.chars().collect::<Vec<char>>();

    if a.len() < b.len() {
        (a, b) = (b, a);
    }

    if a.len() == b.len() {
        let diff = a.iter().zip(&b).filter(|(x, y)| x != y).count();
        (1..=2).contains(&diff)
    } else {
        if a.len() - b.len() > 1 {
            return false;
        }

        match a.iter().zip(&b).position(|(x, y)| x != y) {
            // "use serveer" vs "use server": the rest must line up after skipping one char.
            Some(i) => a[i + 1..] == b[i..],
            // The extra character is at the end.
            None => true,
        }
    }
}
