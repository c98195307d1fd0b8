//! Lexical scope tree used to compute the variables a `"use server"` function
//! captures from its enclosing (non-module) scopes.
//!
//! The tree is built once per file after `resolver` has run, so every binding
//! is identified by its [`Id`]. Capture analysis then only has to ask, for
//! every identifier referenced inside the function, whether its declaring
//! scope lies between the module scope and the function.

use rustc_hash::FxHashMap;
use swc_core::{
    common::Span,
    ecma::{
        ast::*,
        visit::{Visit, VisitWith, noop_visit_type},
    },
};

use crate::FxIndexSet;

type ScopeId = usize;

const MODULE_SCOPE: ScopeId = 0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ScopeKind {
    Module,
    Function,
    Block,
}

#[derive(Debug)]
struct Scope {
    parent: Option<ScopeId>,
    kind: ScopeKind,
}

#[derive(Debug)]
pub struct ScopeTree {
    scopes: Vec<Scope>,
    declarations: FxHashMap<Id, ScopeId>,
    /// Function and arrow spans to the scope holding their parameters.
    function_scopes: FxHashMap<Span, ScopeId>,
}

impl ScopeTree {
    #[tracing::instrument(level = tracing::Level::TRACE, skip_all)]
    pub fn build(module: &Module) -> Self {
        let mut tree = ScopeTree {
            scopes: vec![Scope {
                parent: None,
                kind: ScopeKind::Module,
            }],
            declarations: Default::default(),
            function_scopes: Default::default(),
        };
        let mut builder = ScopeBuilder {
            tree: &mut tree,
            current: MODULE_SCOPE,
            pending_fn_name: None,
        };
        module.visit_with(&mut builder);
        tree
    }

    fn is_within(&self, mut scope: ScopeId, ancestor: ScopeId) -> bool {
        loop {
            if scope == ancestor {
                return true;
            }
            match self.scopes[scope].parent {
                Some(parent) => scope = parent,
                None => return false,
            }
        }
    }

    /// Identifiers referenced in `node` (the function with the given span)
    /// that are bound in an enclosing scope other than the module scope, in
    /// first-reference order.
    pub fn captured_variables<N>(&self, function_span: Span, node: &N) -> Vec<Ident>
    where
        N: VisitWith<ReferenceCollector>,
    {
        let Some(&function_scope) = self.function_scopes.get(&function_span) else {
            return vec![];
        };

        let mut collector = ReferenceCollector::default();
        node.visit_with(&mut collector);

        collector
            .references
            .into_iter()
            .filter(|id| match self.declarations.get(id) {
                Some(&scope) => scope != MODULE_SCOPE && !self.is_within(scope, function_scope),
                None => false,
            })
            .map(Ident::from)
            .collect()
    }
}

struct ScopeBuilder<'a> {
    tree: &'a mut ScopeTree,
    current: ScopeId,
    /// Name of a function expression, bound inside its own scope.
    pending_fn_name: Option<Id>,
}

impl ScopeBuilder<'_> {
    fn with_scope(&mut self, kind: ScopeKind, op: impl FnOnce(&mut Self)) -> ScopeId {
        let scope = self.tree.scopes.len();
        self.tree.scopes.push(Scope {
            parent: Some(self.current),
            kind,
        });
        let parent = std::mem::replace(&mut self.current, scope);
        op(self);
        self.current = parent;
        scope
    }

    fn declare(&mut self, id: Id) {
        self.tree.declarations.insert(id, self.current);
    }

    /// `var` bindings belong to the closest function or the module.
    fn declare_var(&mut self, id: Id) {
        let mut scope = self.current;
        while self.tree.scopes[scope].kind == ScopeKind::Block {
            match self.tree.scopes[scope].parent {
                Some(parent) => scope = parent,
                None => break,
            }
        }
        self.tree.declarations.insert(id, scope);
    }

    fn declare_pat(&mut self, pat: &Pat, is_var: bool) {
        let mut idents = vec![];
        collect_idents_in_pat(pat, &mut idents);
        for ident in idents {
            if is_var {
                self.declare_var(ident.to_id());
            } else {
                self.declare(ident.to_id());
            }
        }
    }
}

impl Visit for ScopeBuilder<'_> {
    noop_visit_type!();

    fn visit_import_specifier(&mut self, specifier: &ImportSpecifier) {
        let local = match specifier {
            ImportSpecifier::Named(named) => &named.local,
            ImportSpecifier::Default(default) => &default.local,
            ImportSpecifier::Namespace(namespace) => &namespace.local,
        };
        self.declare(local.to_id());
    }

    fn visit_fn_decl(&mut self, decl: &FnDecl) {
        self.declare(decl.ident.to_id());
        decl.function.visit_with(self);
    }

    fn visit_fn_expr(&mut self, expr: &FnExpr) {
        self.pending_fn_name = expr.ident.as_ref().map(Ident::to_id);
        expr.function.visit_with(self);
    }

    fn visit_function(&mut self, function: &Function) {
        let name = self.pending_fn_name.take();
        let scope = self.with_scope(ScopeKind::Function, |this| {
            if let Some(name) = name {
                this.declare(name);
            }
            for param in &function.params {
                this.declare_pat(&param.pat, false);
            }
            function.decorators.visit_with(this);
            function.params.visit_with(this);
            if let Some(body) = &function.body {
                body.stmts.visit_with(this);
            }
        });
        self.tree.function_scopes.insert(function.span, scope);
    }

    fn visit_constructor(&mut self, constructor: &Constructor) {
        self.with_scope(ScopeKind::Function, |this| {
            for param in &constructor.params {
                if let ParamOrTsParamProp::Param(param) = param {
                    this.declare_pat(&param.pat, false);
                }
            }
            constructor.params.visit_with(this);
            if let Some(body) = &constructor.body {
                body.stmts.visit_with(this);
            }
        });
    }

    fn visit_getter_prop(&mut self, getter: &GetterProp) {
        getter.key.visit_with(self);
        self.with_scope(ScopeKind::Function, |this| {
            if let Some(body) = &getter.body {
                body.stmts.visit_with(this);
            }
        });
    }

    fn visit_setter_prop(&mut self, setter: &SetterProp) {
        setter.key.visit_with(self);
        self.with_scope(ScopeKind::Function, |this| {
            this.declare_pat(&setter.param, false);
            setter.param.visit_with(this);
            if let Some(body) = &setter.body {
                body.stmts.visit_with(this);
            }
        });
    }

    fn visit_arrow_expr(&mut self, arrow: &ArrowExpr) {
        let scope = self.with_scope(ScopeKind::Function, |this| {
            for param in &arrow.params {
                this.declare_pat(param, false);
            }
            arrow.params.visit_with(this);
            match &*arrow.body {
                BlockStmtOrExpr::BlockStmt(body) => body.stmts.visit_with(this),
                BlockStmtOrExpr::Expr(expr) => expr.visit_with(this),
            }
        });
        self.tree.function_scopes.insert(arrow.span, scope);
    }

    fn visit_block_stmt(&mut self, block: &BlockStmt) {
        self.with_scope(ScopeKind::Block, |this| block.stmts.visit_with(this));
    }

    fn visit_for_stmt(&mut self, stmt: &ForStmt) {
        self.with_scope(ScopeKind::Block, |this| stmt.visit_children_with(this));
    }

    fn visit_for_in_stmt(&mut self, stmt: &ForInStmt) {
        self.with_scope(ScopeKind::Block, |this| stmt.visit_children_with(this));
    }

    fn visit_for_of_stmt(&mut self, stmt: &ForOfStmt) {
        self.with_scope(ScopeKind::Block, |this| stmt.visit_children_with(this));
    }

    fn visit_switch_stmt(&mut self, stmt: &SwitchStmt) {
        stmt.discriminant.visit_with(self);
        self.with_scope(ScopeKind::Block, |this| stmt.cases.visit_with(this));
    }

    fn visit_catch_clause(&mut self, clause: &CatchClause) {
        self.with_scope(ScopeKind::Block, |this| {
            if let Some(param) = &clause.param {
                this.declare_pat(param, false);
            }
            clause.param.visit_with(this);
            clause.body.stmts.visit_with(this);
        });
    }

    fn visit_var_decl(&mut self, decl: &VarDecl) {
        let is_var = decl.kind == VarDeclKind::Var;
        for declarator in &decl.decls {
            self.declare_pat(&declarator.name, is_var);
        }
        decl.visit_children_with(self);
    }

    fn visit_using_decl(&mut self, decl: &UsingDecl) {
        for declarator in &decl.decls {
            self.declare_pat(&declarator.name, false);
        }
        decl.visit_children_with(self);
    }

    fn visit_class_decl(&mut self, decl: &ClassDecl) {
        self.declare(decl.ident.to_id());
        decl.class.visit_with(self);
    }

    fn visit_class_expr(&mut self, expr: &ClassExpr) {
        self.with_scope(ScopeKind::Block, |this| {
            if let Some(ident) = &expr.ident {
                this.declare(ident.to_id());
            }
            expr.class.visit_with(this);
        });
    }

    fn visit_ts_enum_decl(&mut self, decl: &TsEnumDecl) {
        self.declare(decl.id.to_id());
    }

    fn visit_ts_module_decl(&mut self, decl: &TsModuleDecl) {
        if let TsModuleName::Ident(ident) = &decl.id {
            self.declare(ident.to_id());
        }
    }
}

/// Collects referenced identifiers in order of first appearance. Type
/// positions are skipped; they have no runtime binding to capture.
#[derive(Default)]
pub struct ReferenceCollector {
    references: FxIndexSet<Id>,
}

impl Visit for ReferenceCollector {
    noop_visit_type!();

    fn visit_ident(&mut self, ident: &Ident) {
        self.references.insert(ident.to_id());
    }
}

pub(crate) fn collect_idents_in_pat(pat: &Pat, idents: &mut Vec<Ident>) {
    match pat {
        Pat::Ident(ident) => {
            idents.push(ident.id.clone());
        }
        Pat::Array(array) => {
            for elem in array.elems.iter().flatten() {
                collect_idents_in_pat(elem, idents);
            }
        }
        Pat::Object(object) => {
            for prop in &object.props {
                match prop {
                    // For `{ foo: bar }` only `bar` is a binding.
                    ObjectPatProp::KeyValue(KeyValuePatProp { value, .. }) => {
                        collect_idents_in_pat(value, idents);
                    }
                    ObjectPatProp::Assign(AssignPatProp { key, .. }) => {
                        idents.push(key.id.clone());
                    }
                    ObjectPatProp::Rest(RestPat { arg, .. }) => {
                        collect_idents_in_pat(arg, idents);
                    }
                }
            }
        }
        Pat::Assign(AssignPat { left, .. }) => {
            collect_idents_in_pat(left, idents);
        }
        Pat::Rest(RestPat { arg, .. }) => {
            collect_idents_in_pat(arg, idents);
        }
        Pat::Expr(..) | Pat::Invalid(..) => {}
    }
}
