use std::collections::{BTreeSet, HashSet};

use super::{Expr, FunctionDef};

/// Visitor over expressions with overridable callbacks.
///
/// Default methods walk into children; override a callback and call the
/// matching `walk_*` function to keep descending.
pub trait ExprVisitor {
    fn visit_expr(&mut self, expr: &Expr) {
        walk_expr(self, expr)
    }

    fn visit_ident(&mut self, _name: &str) {}

    fn visit_call(&mut self, target: Option<&Expr>, name: &str, args: &[Expr]) {
        walk_call(self, target, name, args)
    }
}

pub fn walk_expr<V: ExprVisitor + ?Sized>(visitor: &mut V, expr: &Expr) {
    match expr {
        Expr::Null | Expr::Bool(_) | Expr::Int(_) | Expr::Double(_) | Expr::Str(_) => {}
        Expr::Ident(name) => visitor.visit_ident(name),
        Expr::Array(items) => {
            for item in items {
                visitor.visit_expr(item);
            }
        }
        Expr::Range { start, end } => {
            visitor.visit_expr(start);
            visitor.visit_expr(end);
        }
        Expr::Unary { operand, .. } => visitor.visit_expr(operand),
        Expr::Binary { lhs, rhs, .. } => {
            visitor.visit_expr(lhs);
            visitor.visit_expr(rhs);
        }
        Expr::Conditional { cond, then, otherwise } => {
            visitor.visit_expr(cond);
            visitor.visit_expr(then);
            visitor.visit_expr(otherwise);
        }
        Expr::Call { target, name, args } => visitor.visit_call(target.as_deref(), name, args),
        Expr::Member { target, .. } => visitor.visit_expr(target),
        Expr::Index { target, index } => {
            visitor.visit_expr(target);
            visitor.visit_expr(index);
        }
    }
}

pub fn walk_call<V: ExprVisitor + ?Sized>(
    visitor: &mut V,
    target: Option<&Expr>,
    _name: &str,
    args: &[Expr],
) {
    if let Some(target) = target {
        visitor.visit_expr(target);
    }
    for arg in args {
        visitor.visit_expr(arg);
    }
}

/// Collects the free names an expression reads: variables, class receivers
/// and called global functions. These become dependency edges in the graph.
#[derive(Debug, Default)]
pub struct DependencyCollector {
    names: BTreeSet<String>,
    bound: HashSet<String>,
}

impl DependencyCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dependencies of a plain expression.
    pub fn collect(expr: &Expr) -> Vec<String> {
        let mut collector = Self::new();
        collector.visit_expr(expr);
        collector.names.into_iter().collect()
    }

    /// Dependencies of a function body, excluding its own parameters.
    pub fn collect_function(def: &FunctionDef) -> Vec<String> {
        let mut collector = Self::new();
        collector.bound.extend(def.params.iter().cloned());
        collector.visit_expr(&def.body);
        collector.names.into_iter().collect()
    }
}

impl ExprVisitor for DependencyCollector {
    fn visit_ident(&mut self, name: &str) {
        if !self.bound.contains(name) {
            self.names.insert(name.to_string());
        }
    }

    fn visit_call(&mut self, target: Option<&Expr>, name: &str, args: &[Expr]) {
        if target.is_none() && !self.bound.contains(name) {
            self.names.insert(name.to_string());
        }
        walk_call(self, target, name, args)
    }
}
