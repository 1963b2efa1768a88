//! Expression evaluation, kept in its own module since it is the one piece of
//! [`Interpreter`] with no stateful side effects on the session registry.

use crate::ast::{BinaryOp, Expr, Number, UnaryOp};
use crate::value::Value;

use super::context::{ExecutionContext, RuntimeError};
use super::Interpreter;

impl Interpreter {
    pub(super) fn eval_expr(&self, expr: &Expr, ctx: &ExecutionContext) -> Result<Value, RuntimeError> {
        match expr {
            Expr::StringLit(s) => Ok(Value::String(s.clone())),
            Expr::NumberLit(Number::Int(i)) => Ok(Value::Int(*i)),
            Expr::NumberLit(Number::Float(f)) => Ok(Value::Float(*f)),
            Expr::Variable(name) => Ok(ctx.get_variable(name)),
            Expr::Unary { op, operand } => self.eval_unary(*op, operand, ctx),
            Expr::Binary { op, left, right } => self.eval_binary(*op, left, right, ctx),
            Expr::Call { name, args } => {
                let values = args.iter().map(|a| self.eval_expr(a, ctx)).collect::<Result<Vec<_>, _>>()?;
                Ok(call_builtin(name, &values))
            }
        }
    }

    fn eval_unary(&self, op: UnaryOp, operand: &Expr, ctx: &ExecutionContext) -> Result<Value, RuntimeError> {
        let value = self.eval_expr(operand, ctx)?;
        match op {
            UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
            UnaryOp::Neg => match value {
                Value::Int(i) => Ok(Value::Int(-i)),
                Value::Float(f) => Ok(Value::Float(-f)),
                other => Err(type_mismatch("-", &other, &other)),
            },
        }
    }

    fn eval_binary(&self, op: BinaryOp, left: &Expr, right: &Expr, ctx: &ExecutionContext) -> Result<Value, RuntimeError> {
        // `and`/`or` short-circuit: the right operand is only evaluated when needed.
        match op {
            BinaryOp::And => {
                let l = self.eval_expr(left, ctx)?;
                if !l.is_truthy() {
                    return Ok(Value::Bool(false));
                }
                let r = self.eval_expr(right, ctx)?;
                return Ok(Value::Bool(r.is_truthy()));
            }
            BinaryOp::Or => {
                let l = self.eval_expr(left, ctx)?;
                if l.is_truthy() {
                    return Ok(Value::Bool(true));
                }
                let r = self.eval_expr(right, ctx)?;
                return Ok(Value::Bool(r.is_truthy()));
            }
            _ => {}
        }

        let l = self.eval_expr(left, ctx)?;
        let r = self.eval_expr(right, ctx)?;

        match op {
            BinaryOp::Add => {
                if matches!(l, Value::String(_)) || matches!(r, Value::String(_)) {
                    Ok(Value::String(format!("{l}{r}")))
                } else {
                    numeric_op("+", &l, &r, |a, b| a + b, |a, b| a + b)
                }
            }
            BinaryOp::Sub => numeric_op("-", &l, &r, |a, b| a - b, |a, b| a - b),
            BinaryOp::Mul => numeric_op("*", &l, &r, |a, b| a * b, |a, b| a * b),
            BinaryOp::Div => {
                let (a, b) = (numeric(&l).ok_or_else(|| type_mismatch("/", &l, &r))?, numeric(&r).ok_or_else(|| type_mismatch("/", &l, &r))?);
                if b == 0.0 { Ok(Value::Int(0)) } else { Ok(Value::Float(a / b)) }
            }
            BinaryOp::Eq => Ok(Value::Bool(values_equal(&l, &r))),
            BinaryOp::Neq => Ok(Value::Bool(!values_equal(&l, &r))),
            BinaryOp::Gt => compare(&l, &r, ">", |a, b| a > b),
            BinaryOp::Lt => compare(&l, &r, "<", |a, b| a < b),
            BinaryOp::Ge => compare(&l, &r, ">=", |a, b| a >= b),
            BinaryOp::Le => compare(&l, &r, "<=", |a, b| a <= b),
            BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
        }
    }
}

fn numeric(v: &Value) -> Option<f64> {
    v.as_f64()
}

fn numeric_op(op: &str, l: &Value, r: &Value, int_op: fn(i64, i64) -> i64, float_op: fn(f64, f64) -> f64) -> Result<Value, RuntimeError> {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(int_op(*a, *b))),
        _ => {
            let a = numeric(l).ok_or_else(|| type_mismatch(op, l, r))?;
            let b = numeric(r).ok_or_else(|| type_mismatch(op, l, r))?;
            Ok(Value::Float(float_op(a, b)))
        }
    }
}

fn compare(l: &Value, r: &Value, op: &str, cmp: fn(f64, f64) -> bool) -> Result<Value, RuntimeError> {
    let a = numeric(l).ok_or_else(|| type_mismatch(op, l, r))?;
    let b = numeric(r).ok_or_else(|| type_mismatch(op, l, r))?;
    Ok(Value::Bool(cmp(a, b)))
}

fn values_equal(l: &Value, r: &Value) -> bool {
    match (l, r) {
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => l.as_f64() == r.as_f64(),
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Int(_) | Value::Float(_), Value::String(_)) | (Value::String(_), Value::Int(_) | Value::Float(_)) => false,
        _ => l == r,
    }
}

fn type_mismatch(op: &str, left: &Value, right: &Value) -> RuntimeError {
    RuntimeError::TypeMismatch { op: op.to_string(), left: left.to_string(), right: right.to_string() }
}

/// Built-in functions available to DSL expressions. An unknown name yields the
/// empty string rather than erroring, per specification.
fn call_builtin(name: &str, args: &[Value]) -> Value {
    match name {
        "len" => Value::Int(args.first().map(Value::len).unwrap_or(0) as i64),
        "str" => Value::String(args.first().map(Value::to_string).unwrap_or_default()),
        "int" => Value::Int(args.first().and_then(coerce_to_f64).unwrap_or(0.0) as i64),
        "float" => Value::Float(args.first().and_then(coerce_to_f64).unwrap_or(0.0)),
        _ => Value::String(String::new()),
    }
}

fn coerce_to_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}
