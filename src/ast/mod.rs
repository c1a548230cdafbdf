//! Associative script AST
//!
//! The tree produced by [`crate::frontend::parser`] and by [`AstBuilder`].
//! `Display` prints canonical source text: printing an expression and
//! parsing it back yields an equal tree, which is what makes generated node
//! code deterministic.

pub mod visitor;
pub mod builder;

pub use visitor::{ExprVisitor, DependencyCollector, walk_expr};
pub use builder::{AstBuilder, AstNode, CallSite, NodeArena, NodeId, NodeKind};

use std::fmt;

use crate::errors::SourceLocation;

/// Call arguments.
pub type Args = Vec<Expr>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }

    fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => prec::OR,
            BinaryOp::And => prec::AND,
            BinaryOp::Eq | BinaryOp::Ne => prec::EQUALITY,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => prec::COMPARE,
            BinaryOp::Add | BinaryOp::Sub => prec::ADDITIVE,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => prec::TERM,
        }
    }
}

mod prec {
    pub const CONDITIONAL: u8 = 1;
    pub const OR: u8 = 2;
    pub const AND: u8 = 3;
    pub const EQUALITY: u8 = 4;
    pub const COMPARE: u8 = 5;
    pub const RANGE: u8 = 6;
    pub const ADDITIVE: u8 = 7;
    pub const TERM: u8 = 8;
    pub const UNARY: u8 = 9;
    pub const POSTFIX: u8 = 10;
    pub const PRIMARY: u8 = 11;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(String),
    Ident(String),
    Array(Vec<Expr>),
    /// Inclusive integer range `start..end`.
    Range {
        start: Box<Expr>,
        end: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Conditional {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    /// `name(args)` when `target` is `None`, `target.name(args)` otherwise.
    Call {
        target: Option<Box<Expr>>,
        name: String,
        args: Args,
    },
    Member {
        target: Box<Expr>,
        name: String,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
}

impl Expr {
    pub fn ident(name: impl Into<String>) -> Self {
        Expr::Ident(name.into())
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn call(target: Option<Expr>, name: impl Into<String>, args: impl IntoIterator<Item = Expr>) -> Self {
        Expr::Call {
            target: target.map(Box::new),
            name: name.into(),
            args: args.into_iter().collect(),
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Int(i) if *i < 0 => prec::UNARY,
            Expr::Double(d) if d.is_sign_negative() => prec::UNARY,
            Expr::Null
            | Expr::Bool(_)
            | Expr::Int(_)
            | Expr::Double(_)
            | Expr::Str(_)
            | Expr::Ident(_)
            | Expr::Array(_) => prec::PRIMARY,
            Expr::Range { .. } => prec::RANGE,
            Expr::Unary { .. } => prec::UNARY,
            Expr::Binary { op, .. } => op.precedence(),
            Expr::Conditional { .. } => prec::CONDITIONAL,
            Expr::Call { .. } | Expr::Member { .. } | Expr::Index { .. } => prec::POSTFIX,
        }
    }

    fn fmt_prec(&self, f: &mut fmt::Formatter<'_>, min: u8) -> fmt::Result {
        if self.precedence() < min {
            write!(f, "(")?;
            self.fmt_bare(f)?;
            write!(f, ")")
        } else {
            self.fmt_bare(f)
        }
    }

    fn fmt_bare(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Null => write!(f, "null"),
            Expr::Bool(b) => write!(f, "{}", b),
            Expr::Int(i) => write!(f, "{}", i),
            Expr::Double(d) => write!(f, "{:?}", d),
            Expr::Str(s) => write_escaped(f, s),
            Expr::Ident(name) => write!(f, "{}", name),
            Expr::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    item.fmt_prec(f, prec::CONDITIONAL)?;
                }
                write!(f, "]")
            }
            Expr::Range { start, end } => {
                start.fmt_prec(f, prec::ADDITIVE)?;
                write!(f, "..")?;
                end.fmt_prec(f, prec::ADDITIVE)
            }
            Expr::Unary { op, operand } => {
                match op {
                    UnaryOp::Neg => write!(f, "-")?,
                    UnaryOp::Not => write!(f, "!")?,
                }
                operand.fmt_prec(f, prec::UNARY)
            }
            Expr::Binary { op, lhs, rhs } => {
                let p = op.precedence();
                lhs.fmt_prec(f, p)?;
                write!(f, " {} ", op.symbol())?;
                rhs.fmt_prec(f, p + 1)
            }
            Expr::Conditional { cond, then, otherwise } => {
                cond.fmt_prec(f, prec::OR)?;
                write!(f, " ? ")?;
                then.fmt_prec(f, prec::CONDITIONAL)?;
                write!(f, " : ")?;
                otherwise.fmt_prec(f, prec::CONDITIONAL)
            }
            Expr::Call { target, name, args } => {
                if let Some(target) = target {
                    target.fmt_prec(f, prec::POSTFIX)?;
                    write!(f, ".")?;
                }
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    arg.fmt_prec(f, prec::CONDITIONAL)?;
                }
                write!(f, ")")
            }
            Expr::Member { target, name } => {
                target.fmt_prec(f, prec::POSTFIX)?;
                write!(f, ".{}", name)
            }
            Expr::Index { target, index } => {
                target.fmt_prec(f, prec::POSTFIX)?;
                write!(f, "[")?;
                index.fmt_prec(f, prec::CONDITIONAL)?;
                write!(f, "]")
            }
        }
    }
}

fn write_escaped(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    write!(f, "\"")?;
    for c in s.chars() {
        match c {
            '"' => write!(f, "\\\"")?,
            '\\' => write!(f, "\\\\")?,
            '\n' => write!(f, "\\n")?,
            '\t' => write!(f, "\\t")?,
            '\r' => write!(f, "\\r")?,
            c => write!(f, "{}", c)?,
        }
    }
    write!(f, "\"")
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_prec(f, prec::CONDITIONAL)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Expr,
}

impl fmt::Display for FunctionDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "def {}({}) = {};", self.name, self.params.join(", "), self.body)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Import { library: String },
    FunctionDef(FunctionDef),
    Assign { target: String, value: Expr },
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub location: SourceLocation,
}

impl Stmt {
    pub fn new(kind: StmtKind, location: SourceLocation) -> Self {
        Self { kind, location }
    }

    pub fn assign(target: impl Into<String>, value: Expr) -> Self {
        Self::new(
            StmtKind::Assign {
                target: target.into(),
                value,
            },
            SourceLocation::default(),
        )
    }

    /// Name bound by this statement, if any.
    pub fn defined_name(&self) -> Option<&str> {
        match &self.kind {
            StmtKind::FunctionDef(def) => Some(&def.name),
            StmtKind::Assign { target, .. } => Some(target),
            StmtKind::Import { .. } | StmtKind::Expr(_) => None,
        }
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            StmtKind::Import { library } => {
                write!(f, "import(")?;
                write_escaped(f, library)?;
                write!(f, ");")
            }
            StmtKind::FunctionDef(def) => write!(f, "{}", def),
            StmtKind::Assign { target, value } => write!(f, "{} = {};", target, value),
            StmtKind::Expr(expr) => write!(f, "{};", expr),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub stmts: Vec<Stmt>,
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, stmt) in self.stmts.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", stmt)?;
        }
        Ok(())
    }
}
