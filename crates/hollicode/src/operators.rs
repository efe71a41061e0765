//! Binary operator evaluation.
//!
//! Implements the `BOP` operator set: comparison (`>`, `<`, `>=`, `<=`),
//! equality (`==`, `!=`), boolean (`&&`, `||`), and arithmetic
//! (`+`, `-`, `*`, `/`). There is no silent coercion: a mismatched pair
//! such as `"a" - 1` is a runtime type error.

use std::cmp::Ordering;

use crate::bytecode::BinOp;
use crate::error::{Error, Result};
use crate::value::Value;

/// Apply a binary operator to two values.
///
/// `left` is the value the `BOP` handler popped first (the top of stack).
/// `&&` and `||` coerce both operands through truthiness and return a
/// strict bool. `+` also concatenates two strings.
pub fn apply_binop(op: BinOp, left: &Value, right: &Value) -> Result<Value> {
    match op {
        BinOp::Greater => compare_values(left, right, |o| o == Ordering::Greater),
        BinOp::Less => compare_values(left, right, |o| o == Ordering::Less),
        BinOp::GreaterEqual => compare_values(left, right, |o| o != Ordering::Less),
        BinOp::LessEqual => compare_values(left, right, |o| o != Ordering::Greater),
        BinOp::Equal => Ok(Value::Bool(left == right)),
        BinOp::NotEqual => Ok(Value::Bool(left != right)),
        BinOp::And => Ok(Value::Bool(left.is_truthy() && right.is_truthy())),
        BinOp::Or => Ok(Value::Bool(left.is_truthy() || right.is_truthy())),
        BinOp::Add => match (left, right) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
            (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{}{}", a, b))),
            _ => Err(mismatch("two numbers or two strings for +", left, right)),
        },
        BinOp::Subtract => numeric_binop(left, right, "-", |a, b| a - b),
        BinOp::Multiply => numeric_binop(left, right, "*", |a, b| a * b),
        // Division follows IEEE double semantics; dividing by zero
        // produces an infinity or NaN rather than an error.
        BinOp::Divide => numeric_binop(left, right, "/", |a, b| a / b),
    }
}

/// Apply an arithmetic operation defined over numbers only.
fn numeric_binop<F>(left: &Value, right: &Value, symbol: &str, op: F) -> Result<Value>
where
    F: Fn(f64, f64) -> f64,
{
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => Ok(Value::Number(op(*a, *b))),
        _ => Err(mismatch(&format!("numbers for {}", symbol), left, right)),
    }
}

/// Compare two values of the same ordered type.
///
/// Numbers compare numerically (comparisons involving NaN are false);
/// strings compare lexicographically. Anything else is a type error.
fn compare_values<F>(left: &Value, right: &Value, accept: F) -> Result<Value>
where
    F: Fn(Ordering) -> bool,
{
    let ordering = match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => return Err(mismatch("comparable values", left, right)),
    };
    Ok(Value::Bool(ordering.is_some_and(accept)))
}

fn mismatch(expected: &str, left: &Value, right: &Value) -> Error {
    Error::Type {
        expected: expected.to_string(),
        got: format!("{} and {}", left.type_name(), right.type_name()),
    }
}
