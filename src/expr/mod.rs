//! Expression algebra
//!
//! Filters, selections, defaults and ordering terms are all [`Expr`] trees.
//! Trees are built with [`col`], [`lit`], [`raw`], the comparison builders
//! on `Expr`, Rust operators and the [`F`] function catalogue:
//!
//! ```rust,ignore
//! use clickhouse_orm::expr::{col, F};
//!
//! let adults = col("age").gte(18) & !col("name").like("test%");
//! let monthly = F::to_start_of_month(col("created"));
//! let score = (col("points") + 5) * 2;
//! ```
//!
//! Rendering is pure: the same tree always renders to the same text.
//! Parentheses are emitted only where precedence requires them.

mod funcs;

pub use funcs::F;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::ops::{Add, BitAnd, BitOr, Div, Mul, Neg, Not, Rem, Sub};
use uuid::Uuid;

use crate::fields::{quote_ident, Value};

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
    In,
    NotIn,
    Like,
    NotLike,
    ILike,
    /// Right side is a two-element [`Expr::List`] of bounds
    Between,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOp {
    /// Binding strength; higher binds tighter
    pub fn precedence(self) -> u8 {
        match self {
            Self::Or => 1,
            Self::And => 2,
            Self::Eq
            | Self::Ne
            | Self::Lt
            | Self::Lte
            | Self::Gt
            | Self::Gte
            | Self::In
            | Self::NotIn
            | Self::Like
            | Self::NotLike
            | Self::ILike
            | Self::Between => 4,
            Self::Add | Self::Sub => 5,
            Self::Mul | Self::Div | Self::Mod => 6,
        }
    }

    /// `a op (b op c)` equals `(a op b) op c`
    pub fn is_associative(self) -> bool {
        matches!(self, Self::And | Self::Or | Self::Add | Self::Mul)
    }

    /// SQL spelling
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::And => "AND",
            Self::Or => "OR",
            Self::In => "IN",
            Self::NotIn => "NOT IN",
            Self::Like => "LIKE",
            Self::NotLike => "NOT LIKE",
            Self::ILike => "ILIKE",
            Self::Between => "BETWEEN",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
        }
    }
}

impl std::fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

impl UnaryOp {
    /// Binding strength; higher binds tighter
    pub fn precedence(self) -> u8 {
        match self {
            Self::Not => 3,
            Self::Neg => 7,
        }
    }
}

const ATOM: u8 = 10;

/// An expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A constant, rendered as an escaped SQL literal
    Literal(Value),
    /// A field of the queried model, rendered as a quoted identifier
    Field(String),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    /// `name(arg, ...)`; arity is not checked
    Function {
        name: String,
        args: Vec<Expr>,
    },
    /// SQL text inserted verbatim
    ///
    /// Raw text is never escaped or validated. Never build it from
    /// untrusted input. It is parenthesised whenever it is an operand of an
    /// operator, and left bare at the top level or as a function argument.
    Raw(String),
    /// `(a, b, ...)`, the right side of `IN` and the bounds of `BETWEEN`
    List(Vec<Expr>),
}

/// Reference a model field
pub fn col(name: impl Into<String>) -> Expr {
    Expr::Field(name.into())
}

/// A literal value
pub fn lit(value: impl Into<Value>) -> Expr {
    Expr::Literal(value.into())
}

/// Verbatim SQL text; see [`Expr::Raw`]
pub fn raw(sql: impl Into<String>) -> Expr {
    Expr::Raw(sql.into())
}

impl Expr {
    /// Build a binary node
    pub fn binary(op: BinaryOp, left: impl Into<Expr>, right: impl Into<Expr>) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left.into()),
            right: Box::new(right.into()),
        }
    }

    /// Build a unary node
    pub fn unary(op: UnaryOp, operand: impl Into<Expr>) -> Self {
        Expr::Unary {
            op,
            operand: Box::new(operand.into()),
        }
    }

    pub fn eq(self, other: impl Into<Expr>) -> Self {
        Self::binary(BinaryOp::Eq, self, other)
    }

    pub fn ne(self, other: impl Into<Expr>) -> Self {
        Self::binary(BinaryOp::Ne, self, other)
    }

    pub fn lt(self, other: impl Into<Expr>) -> Self {
        Self::binary(BinaryOp::Lt, self, other)
    }

    pub fn lte(self, other: impl Into<Expr>) -> Self {
        Self::binary(BinaryOp::Lte, self, other)
    }

    pub fn gt(self, other: impl Into<Expr>) -> Self {
        Self::binary(BinaryOp::Gt, self, other)
    }

    pub fn gte(self, other: impl Into<Expr>) -> Self {
        Self::binary(BinaryOp::Gte, self, other)
    }

    /// `self IN (items...)`
    pub fn is_in<I, T>(self, items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Expr>,
    {
        Self::binary(BinaryOp::In, self, list(items))
    }

    /// `self NOT IN (items...)`
    pub fn not_in<I, T>(self, items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Expr>,
    {
        Self::binary(BinaryOp::NotIn, self, list(items))
    }

    /// `self IN <subquery>`, e.g. `col("id").in_subquery(raw("SELECT id FROM t"))`
    pub fn in_subquery(self, subquery: Expr) -> Self {
        Self::binary(BinaryOp::In, self, subquery)
    }

    pub fn like(self, pattern: impl Into<Expr>) -> Self {
        Self::binary(BinaryOp::Like, self, pattern)
    }

    pub fn not_like(self, pattern: impl Into<Expr>) -> Self {
        Self::binary(BinaryOp::NotLike, self, pattern)
    }

    pub fn ilike(self, pattern: impl Into<Expr>) -> Self {
        Self::binary(BinaryOp::ILike, self, pattern)
    }

    /// `self BETWEEN low AND high`
    pub fn between(self, low: impl Into<Expr>, high: impl Into<Expr>) -> Self {
        Self::binary(
            BinaryOp::Between,
            self,
            Expr::List(vec![low.into(), high.into()]),
        )
    }

    /// `self AND other`
    pub fn and(self, other: impl Into<Expr>) -> Self {
        Self::binary(BinaryOp::And, self, other)
    }

    /// `self OR other`
    pub fn or(self, other: impl Into<Expr>) -> Self {
        Self::binary(BinaryOp::Or, self, other)
    }

    /// Render to SQL text
    pub fn render(&self) -> String {
        match self {
            Expr::Literal(v) => v.to_sql(),
            Expr::Field(name) => quote_ident(name),
            Expr::Raw(sql) => sql.clone(),
            Expr::List(items) => format!("({})", render_args(items)),
            Expr::Function { name, args } => format!("{}({})", name, render_args(args)),
            Expr::Unary { op, operand } => {
                let inner = operand.render_operand(op.precedence(), None, false);
                match op {
                    UnaryOp::Not => format!("NOT {}", inner),
                    // `--` would start a comment
                    UnaryOp::Neg if inner.starts_with('-') => format!("-({})", inner),
                    UnaryOp::Neg => format!("-{}", inner),
                }
            }
            Expr::Binary {
                op: BinaryOp::Between,
                left,
                right,
            } => {
                let prec = BinaryOp::Between.precedence();
                let subject = left.render_operand(prec, Some(BinaryOp::Between), false);
                match right.as_ref() {
                    Expr::List(bounds) if bounds.len() == 2 => format!(
                        "{} BETWEEN {} AND {}",
                        subject,
                        bounds[0].render_operand(prec, Some(BinaryOp::Between), true),
                        bounds[1].render_operand(prec, Some(BinaryOp::Between), true),
                    ),
                    other => format!(
                        "{} BETWEEN {}",
                        subject,
                        other.render_operand(prec, Some(BinaryOp::Between), true)
                    ),
                }
            }
            Expr::Binary { op, left, right } => {
                let prec = op.precedence();
                format!(
                    "{} {} {}",
                    left.render_operand(prec, Some(*op), false),
                    op.symbol(),
                    right.render_operand(prec, Some(*op), true)
                )
            }
        }
    }

    /// Binding strength of this node; `None` for raw text
    fn precedence(&self) -> Option<u8> {
        match self {
            Expr::Raw(_) => None,
            Expr::Binary { op, .. } => Some(op.precedence()),
            Expr::Unary { op, .. } => Some(op.precedence()),
            _ => Some(ATOM),
        }
    }

    /// Render as the operand of an operator with precedence `parent`
    fn render_operand(&self, parent: u8, parent_op: Option<BinaryOp>, right_side: bool) -> String {
        let wrap = match self.precedence() {
            None => true,
            Some(p) if p < parent => true,
            Some(p) if p == parent && right_side => {
                let same_assoc_op = match (self, parent_op) {
                    (Expr::Binary { op, .. }, Some(parent_op)) => {
                        *op == parent_op && parent_op.is_associative()
                    }
                    _ => false,
                };
                !same_assoc_op
            }
            _ => false,
        };
        if wrap {
            format!("({})", self.render())
        } else {
            self.render()
        }
    }

    /// Names of all fields referenced in this tree, in render order
    pub fn field_refs(&self) -> Vec<&str> {
        let mut refs = Vec::new();
        self.collect_refs(&mut refs);
        refs
    }

    fn collect_refs<'a>(&'a self, refs: &mut Vec<&'a str>) {
        match self {
            Expr::Field(name) => refs.push(name),
            Expr::Binary { left, right, .. } => {
                left.collect_refs(refs);
                right.collect_refs(refs);
            }
            Expr::Unary { operand, .. } => operand.collect_refs(refs),
            Expr::Function { args, .. } | Expr::List(args) => {
                for arg in args {
                    arg.collect_refs(refs);
                }
            }
            Expr::Literal(_) | Expr::Raw(_) => {}
        }
    }

    /// Copy of this tree with every field reference renamed by `rename`
    pub fn map_fields<F>(&self, rename: &F) -> Expr
    where
        F: Fn(&str) -> String,
    {
        match self {
            Expr::Field(name) => Expr::Field(rename(name)),
            Expr::Binary { op, left, right } => Expr::Binary {
                op: *op,
                left: Box::new(left.map_fields(rename)),
                right: Box::new(right.map_fields(rename)),
            },
            Expr::Unary { op, operand } => Expr::Unary {
                op: *op,
                operand: Box::new(operand.map_fields(rename)),
            },
            Expr::Function { name, args } => Expr::Function {
                name: name.clone(),
                args: args.iter().map(|a| a.map_fields(rename)).collect(),
            },
            Expr::List(items) => Expr::List(items.iter().map(|a| a.map_fields(rename)).collect()),
            Expr::Literal(_) | Expr::Raw(_) => self.clone(),
        }
    }
}

fn list<I, T>(items: I) -> Expr
where
    I: IntoIterator<Item = T>,
    T: Into<Expr>,
{
    Expr::List(items.into_iter().map(Into::into).collect())
}

fn render_args(args: &[Expr]) -> String {
    args.iter().map(Expr::render).collect::<Vec<_>>().join(", ")
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.render())
    }
}

macro_rules! expr_from_literal {
    ($($t:ty),* $(,)?) => {
        $(
            impl From<$t> for Expr {
                fn from(v: $t) -> Self {
                    Expr::Literal(Value::from(v))
                }
            }
        )*
    };
}

expr_from_literal!(
    bool,
    i8,
    i16,
    i32,
    i64,
    u8,
    u16,
    u32,
    u64,
    f32,
    f64,
    &str,
    String,
    Decimal,
    NaiveDate,
    DateTime<Utc>,
    Uuid,
    Ipv4Addr,
    Ipv6Addr,
);

impl From<Value> for Expr {
    fn from(v: Value) -> Self {
        Expr::Literal(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Expr {
    fn from(v: Vec<T>) -> Self {
        Expr::Literal(Value::from(v))
    }
}

impl From<&Expr> for Expr {
    fn from(e: &Expr) -> Self {
        e.clone()
    }
}

impl<R: Into<Expr>> BitAnd<R> for Expr {
    type Output = Expr;

    fn bitand(self, rhs: R) -> Expr {
        Expr::binary(BinaryOp::And, self, rhs)
    }
}

impl<R: Into<Expr>> BitOr<R> for Expr {
    type Output = Expr;

    fn bitor(self, rhs: R) -> Expr {
        Expr::binary(BinaryOp::Or, self, rhs)
    }
}

impl Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        Expr::unary(UnaryOp::Not, self)
    }
}

impl Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::unary(UnaryOp::Neg, self)
    }
}

macro_rules! arithmetic {
    ($($trait:ident $method:ident => $op:ident),*) => {
        $(
            impl<R: Into<Expr>> $trait<R> for Expr {
                type Output = Expr;

                fn $method(self, rhs: R) -> Expr {
                    Expr::binary(BinaryOp::$op, self, rhs)
                }
            }
        )*
    };
}

arithmetic!(Add add => Add, Sub sub => Sub, Mul mul => Mul, Div div => Div, Rem rem => Mod);
