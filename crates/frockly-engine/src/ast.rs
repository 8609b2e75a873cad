//! The abstract syntax tree shared by text parsing and block building.
//!
//! Nodes are immutable once constructed; transformations rebuild trees rather
//! than mutating in place.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Minus,
}

impl UnaryOp {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            UnaryOp::Minus => "-",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Pow,
    Mul,
    Div,
    Add,
    Sub,
    Concat,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl BinaryOp {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Pow => "^",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Concat => "&",
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
        }
    }

    /// Inverse of [`BinaryOp::as_str`], used when reading an operator back out
    /// of a block's dropdown field.
    #[must_use]
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "^" => BinaryOp::Pow,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "&" => BinaryOp::Concat,
            "=" => BinaryOp::Eq,
            "<>" => BinaryOp::Ne,
            "<" => BinaryOp::Lt,
            ">" => BinaryOp::Gt,
            "<=" => BinaryOp::Le,
            ">=" => BinaryOp::Ge,
            _ => return None,
        })
    }

    /// Comparison operators build comparison blocks; everything else builds
    /// arithmetic blocks.
    #[must_use]
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnaryExpr {
    pub op: UnaryOp,
    pub operand: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryExpr {
    pub op: BinaryOp,
    pub left: Box<Expr>,
    pub right: Box<Expr>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallExpr {
    /// Uppercased function name (function names are case-insensitive).
    pub name: String,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expr {
    /// Numeric literal, kept as its source text (`"2"`, `"1.5"`).
    Number(String),
    /// String literal content with the surrounding quotes stripped and `""`
    /// escapes collapsed to `"`.
    String(String),
    /// Raw reference text (`A1`, `$A$1`, `A1:B9`, `A:A`, `1:1`), uppercased.
    Reference(String),
    /// Parenthesized sub-expression.
    Paren(Box<Expr>),
    Unary(UnaryExpr),
    Binary(BinaryExpr),
    Call(CallExpr),
    /// Verbatim unparsed source text. Produced by parser recovery and for
    /// syntax this core does not model (e.g. bare identifiers that are not
    /// call targets). An empty `Opaque` stands for an elided argument.
    Opaque(String),
}

impl Expr {
    #[must_use]
    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary(BinaryExpr {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    #[must_use]
    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call(CallExpr {
            name: name.into(),
            args,
        })
    }

    /// Stable JSON serialization useful for debugging/tests.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("Expr should be JSON-serializable")
    }
}
