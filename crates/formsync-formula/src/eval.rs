//! Formula interpreter
//!
//! Coercion rules:
//! - arithmetic reads both operands as numbers (numeric text is accepted)
//! - `+` concatenates when either operand is text that is not a number
//! - `==` compares numerically when one side is a number or boolean and
//!   both read as numbers, otherwise it is strict; `===` is always strict
//! - `&&` and `||` short-circuit and yield an operand, not a boolean
//!
//! Any non-finite numeric result is an error, so a bad formula can never
//! leak NaN or infinity into a form.

use std::cmp::Ordering;

use thiserror::Error;

use formsync_core::{FieldValue, FieldValues};

use crate::ast::{BinaryOp, Builtin, Expr, Formula, UnaryOp};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("Undefined field: {0}")]
    UndefinedField(String),

    #[error("Operator {op} expects numbers, got '{value}'")]
    NotANumber { op: &'static str, value: String },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Result is not a finite number")]
    NonFinite,

    #[error("{func} expects {expected} argument(s), got {got}")]
    Arity {
        func: &'static str,
        expected: &'static str,
        got: usize,
    },
}

/// Read-only name lookup handed to the interpreter
pub trait Bindings {
    fn lookup(&self, name: &str) -> Option<&FieldValue>;
}

impl Bindings for FieldValues {
    fn lookup(&self, name: &str) -> Option<&FieldValue> {
        self.get(name)
    }
}

impl Formula {
    /// Evaluate against the given bindings
    pub fn evaluate(&self, bindings: &dyn Bindings) -> Result<FieldValue, EvalError> {
        evaluate(&self.expr, bindings)
    }
}

/// Evaluate an expression to a scalar value
pub fn evaluate(expr: &Expr, bindings: &dyn Bindings) -> Result<FieldValue, EvalError> {
    let value = eval_expr(expr, bindings)?;
    match value {
        FieldValue::Number(n) if !n.is_finite() => Err(EvalError::NonFinite),
        other => Ok(other),
    }
}

fn eval_expr(expr: &Expr, bindings: &dyn Bindings) -> Result<FieldValue, EvalError> {
    match expr {
        Expr::Number(n, _) => Ok(FieldValue::Number(*n)),
        Expr::Str(s, _) => Ok(FieldValue::Text(s.clone())),
        Expr::Bool(b, _) => Ok(FieldValue::Bool(*b)),
        Expr::Null(_) => Ok(FieldValue::Null),

        Expr::Field(name, _) => bindings
            .lookup(name)
            .cloned()
            .ok_or_else(|| EvalError::UndefinedField(name.clone())),

        Expr::Unary { op, expr, .. } => {
            let value = eval_expr(expr, bindings)?;
            match op {
                UnaryOp::Not => Ok(FieldValue::Bool(!value.is_truthy())),
                UnaryOp::Neg => Ok(FieldValue::Number(-number("-", &value)?)),
                UnaryOp::Plus => Ok(FieldValue::Number(number("+", &value)?)),
            }
        }

        Expr::Binary {
            op: BinaryOp::And,
            left,
            right,
            ..
        } => {
            let l = eval_expr(left, bindings)?;
            if l.is_truthy() {
                eval_expr(right, bindings)
            } else {
                Ok(l)
            }
        }

        Expr::Binary {
            op: BinaryOp::Or,
            left,
            right,
            ..
        } => {
            let l = eval_expr(left, bindings)?;
            if l.is_truthy() {
                Ok(l)
            } else {
                eval_expr(right, bindings)
            }
        }

        Expr::Binary {
            op, left, right, ..
        } => {
            let l = eval_expr(left, bindings)?;
            let r = eval_expr(right, bindings)?;
            apply_binary(*op, &l, &r)
        }

        Expr::Ternary {
            cond,
            then_expr,
            else_expr,
            ..
        } => {
            if eval_expr(cond, bindings)?.is_truthy() {
                eval_expr(then_expr, bindings)
            } else {
                eval_expr(else_expr, bindings)
            }
        }

        Expr::Call { func, args, .. } => {
            let mut nums = Vec::with_capacity(args.len());
            for arg in args {
                nums.push(number(func.name(), &eval_expr(arg, bindings)?)?);
            }
            apply_builtin(*func, &nums).map(FieldValue::Number)
        }
    }
}

fn number(op: &'static str, value: &FieldValue) -> Result<f64, EvalError> {
    value.as_number().ok_or_else(|| EvalError::NotANumber {
        op,
        value: value.to_text(),
    })
}

fn apply_binary(op: BinaryOp, l: &FieldValue, r: &FieldValue) -> Result<FieldValue, EvalError> {
    let value = match op {
        BinaryOp::Add => match (l.as_number(), r.as_number()) {
            (Some(a), Some(b)) => FieldValue::Number(a + b),
            _ if matches!(l, FieldValue::Text(_)) || matches!(r, FieldValue::Text(_)) => {
                FieldValue::Text(format!("{}{}", l.to_text(), r.to_text()))
            }
            (None, _) => return Err(EvalError::NotANumber { op: "+", value: l.to_text() }),
            (_, None) => return Err(EvalError::NotANumber { op: "+", value: r.to_text() }),
        },
        BinaryOp::Sub => FieldValue::Number(number("-", l)? - number("-", r)?),
        BinaryOp::Mul => FieldValue::Number(number("*", l)? * number("*", r)?),
        BinaryOp::Div => {
            let divisor = number("/", r)?;
            if divisor == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            FieldValue::Number(number("/", l)? / divisor)
        }
        BinaryOp::Rem => {
            let divisor = number("%", r)?;
            if divisor == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            FieldValue::Number(number("%", l)? % divisor)
        }
        BinaryOp::StrictEq => FieldValue::Bool(l == r),
        BinaryOp::StrictNe => FieldValue::Bool(l != r),
        BinaryOp::Eq => FieldValue::Bool(loose_eq(l, r)),
        BinaryOp::Ne => FieldValue::Bool(!loose_eq(l, r)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = compare(op, l, r)?;
            let result = match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            };
            FieldValue::Bool(result)
        }
        // Normally short-circuited in eval_expr
        BinaryOp::And => {
            if l.is_truthy() {
                r.clone()
            } else {
                l.clone()
            }
        }
        BinaryOp::Or => {
            if l.is_truthy() {
                l.clone()
            } else {
                r.clone()
            }
        }
    };
    Ok(value)
}

fn loose_eq(l: &FieldValue, r: &FieldValue) -> bool {
    let numeric_side = |v: &FieldValue| matches!(v, FieldValue::Number(_) | FieldValue::Bool(_));
    if numeric_side(l) || numeric_side(r) {
        if let (Some(a), Some(b)) = (l.as_number(), r.as_number()) {
            return a == b;
        }
    }
    l == r
}

fn compare(op: BinaryOp, l: &FieldValue, r: &FieldValue) -> Result<Ordering, EvalError> {
    if let (FieldValue::Text(a), FieldValue::Text(b)) = (l, r) {
        if a.trim().parse::<f64>().is_err() || b.trim().parse::<f64>().is_err() {
            return Ok(a.cmp(b));
        }
    }
    let name = match op {
        BinaryOp::Lt => "<",
        BinaryOp::Le => "<=",
        BinaryOp::Gt => ">",
        _ => ">=",
    };
    let a = number(name, l)?;
    let b = number(name, r)?;
    Ok(a.partial_cmp(&b).unwrap_or(Ordering::Equal))
}

fn apply_builtin(func: Builtin, args: &[f64]) -> Result<f64, EvalError> {
    let arity = |expected: &'static str| EvalError::Arity {
        func: func.name(),
        expected,
        got: args.len(),
    };
    match func {
        Builtin::Min => args
            .iter()
            .copied()
            .reduce(f64::min)
            .ok_or_else(|| arity("at least 1")),
        Builtin::Max => args
            .iter()
            .copied()
            .reduce(f64::max)
            .ok_or_else(|| arity("at least 1")),
        Builtin::Abs | Builtin::Floor | Builtin::Ceil => {
            let [x] = args else {
                return Err(arity("1"));
            };
            Ok(match func {
                Builtin::Abs => x.abs(),
                Builtin::Floor => x.floor(),
                _ => x.ceil(),
            })
        }
        // Halves round toward positive infinity
        Builtin::Round => match args {
            [x] => Ok((x + 0.5).floor()),
            [x, digits] => {
                let factor = 10f64.powi(*digits as i32);
                Ok((x * factor + 0.5).floor() / factor)
            }
            _ => Err(arity("1 or 2")),
        },
    }
}
