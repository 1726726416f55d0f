//! Formula syntax tree

use std::collections::BTreeSet;

use crate::token::Span;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    /// Loose equality: numeric when both sides read as numbers
    Eq,
    Ne,
    StrictEq,
    StrictNe,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// Functions a formula may call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Builtin {
    Min,
    Max,
    Abs,
    Round,
    Floor,
    Ceil,
}

impl Builtin {
    /// Resolve a function name, accepting an optional `Math.` prefix
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "min" => Some(Builtin::Min),
            "max" => Some(Builtin::Max),
            "abs" => Some(Builtin::Abs),
            "round" => Some(Builtin::Round),
            "floor" => Some(Builtin::Floor),
            "ceil" => Some(Builtin::Ceil),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::Abs => "abs",
            Builtin::Round => "round",
            Builtin::Floor => "floor",
            Builtin::Ceil => "ceil",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Number(f64, Span),
    Str(String, Span),
    Bool(bool, Span),
    Null(Span),
    /// Reference to a field of the form
    Field(String, Span),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
        span: Span,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },
    Ternary {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
        span: Span,
    },
    Call {
        func: Builtin,
        args: Vec<Expr>,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Number(_, span)
            | Expr::Str(_, span)
            | Expr::Bool(_, span)
            | Expr::Null(span)
            | Expr::Field(_, span) => *span,
            Expr::Unary { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Ternary { span, .. }
            | Expr::Call { span, .. } => *span,
        }
    }

    /// Names of every field the expression reads
    pub fn field_refs(&self) -> BTreeSet<String> {
        let mut refs = BTreeSet::new();
        self.collect_refs(&mut refs);
        refs
    }

    fn collect_refs(&self, refs: &mut BTreeSet<String>) {
        match self {
            Expr::Field(name, _) => {
                refs.insert(name.clone());
            }
            Expr::Unary { expr, .. } => expr.collect_refs(refs),
            Expr::Binary { left, right, .. } => {
                left.collect_refs(refs);
                right.collect_refs(refs);
            }
            Expr::Ternary {
                cond,
                then_expr,
                else_expr,
                ..
            } => {
                cond.collect_refs(refs);
                then_expr.collect_refs(refs);
                else_expr.collect_refs(refs);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.collect_refs(refs);
                }
            }
            Expr::Number(..) | Expr::Str(..) | Expr::Bool(..) | Expr::Null(_) => {}
        }
    }
}

/// A parsed formula, ready to evaluate
#[derive(Clone, Debug, PartialEq)]
pub struct Formula {
    pub name: String,
    pub source: String,
    pub expr: Expr,
}

impl Formula {
    /// Parse a named formula body
    pub fn parse(name: impl Into<String>, source: &str) -> Result<Self, crate::ParseError> {
        let expr = crate::parse(source)?;
        Ok(Formula {
            name: name.into(),
            source: source.to_string(),
            expr,
        })
    }

    pub fn field_refs(&self) -> BTreeSet<String> {
        self.expr.field_refs()
    }
}
