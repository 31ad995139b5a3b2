//! Arithmetic, comparison and conversion functions
//!
//! Ints stay ints until a float joins in; overflow and division by zero are
//! reported as invalid operands instead of wrapping or panicking.

use super::{fixed, type_error, variadic, OutputWriter};
use crate::value::{HostFunction, RuntimeError, Value};
use std::cmp::Ordering;
use std::io::Write;

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn of(name: &str, value: &Value) -> Result<Num, RuntimeError> {
        match value {
            Value::Int(n) => Ok(Num::Int(*n)),
            Value::Float(n) => Ok(Num::Float(*n)),
            other => Err(type_error(name, "numbers", other)),
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Num::Int(n) => n as f64,
            Num::Float(n) => n,
        }
    }

    fn into_value(self) -> Value {
        match self {
            Num::Int(n) => Value::Int(n),
            Num::Float(n) => Value::Float(n),
        }
    }
}

fn combine(
    name: &str,
    a: Num,
    b: Num,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Num, RuntimeError> {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => int_op(x, y)
            .map(Num::Int)
            .ok_or_else(|| RuntimeError::invalid_operand(format!("integer overflow in {}", name))),
        (x, y) => Ok(Num::Float(float_op(x.as_f64(), y.as_f64()))),
    }
}

fn fold(
    name: &str,
    start: Num,
    args: &[Value],
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value, RuntimeError> {
    args.iter()
        .try_fold(start, |acc, arg| {
            combine(name, acc, Num::of(name, arg)?, int_op, float_op)
        })
        .map(Num::into_value)
}

/// `+`: numeric sum, or string concatenation when any argument is a string
fn add(args: &[Value]) -> Result<Value, RuntimeError> {
    if args.iter().any(|a| matches!(a, Value::Str(_))) {
        return Ok(Value::string(concat(args)));
    }
    fold("+", Num::Int(0), args, i64::checked_add, |a, b| a + b)
}

/// `-`: negation with one argument, left fold otherwise
fn sub(args: &[Value]) -> Result<Value, RuntimeError> {
    match args {
        [] => Err(RuntimeError::ArityMismatch {
            name: "-".to_string(),
            expected: 1,
            found: 0,
        }),
        [only] => match Num::of("-", only)? {
            Num::Int(n) => n
                .checked_neg()
                .map(Value::Int)
                .ok_or_else(|| RuntimeError::invalid_operand("integer overflow in -")),
            Num::Float(n) => Ok(Value::Float(-n)),
        },
        [first, rest @ ..] => fold("-", Num::of("-", first)?, rest, i64::checked_sub, |a, b| {
            a - b
        }),
    }
}

fn mul(args: &[Value]) -> Result<Value, RuntimeError> {
    fold("*", Num::Int(1), args, i64::checked_mul, |a, b| a * b)
}

fn divide(
    name: &str,
    args: &[Value],
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value, RuntimeError> {
    let a = Num::of(name, &args[0])?;
    let b = Num::of(name, &args[1])?;
    if b.as_f64() == 0.0 {
        return Err(RuntimeError::invalid_operand("division by zero"));
    }
    combine(name, a, b, int_op, float_op).map(Num::into_value)
}

/// Ordering of two numbers or two strings
fn compare(name: &str, a: &Value, b: &Value) -> Result<Option<Ordering>, RuntimeError> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(Some(x.cmp(y))),
        (Value::Str(x), Value::Str(y)) => Ok(Some(x.cmp(y))),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            Ok(Num::of(name, a)?.as_f64().partial_cmp(&Num::of(name, b)?.as_f64()))
        }
        _ => Err(RuntimeError::invalid_operand(format!(
            "cannot compare {} and {} with {}",
            a.type_name(),
            b.type_name(),
            name
        ))),
    }
}

fn comparison(name: &'static str, accept: fn(Ordering) -> bool) -> HostFunction {
    fixed(name, 2, move |args| {
        Ok(Value::Bool(compare(name, &args[0], &args[1])?.is_some_and(accept)))
    })
}

fn concat(args: &[Value]) -> String {
    args.iter().map(|a| a.to_string()).collect()
}

fn print(output: &OutputWriter, args: &[Value]) -> Result<Value, RuntimeError> {
    let line: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    let mut writer = output
        .lock()
        .map_err(|_| RuntimeError::host("print", "output writer lock poisoned"))?;
    writeln!(writer, "{}", line.join(" ")).map_err(|e| RuntimeError::host("print", e.to_string()))?;
    Ok(Value::Null)
}

pub fn functions(output: &OutputWriter) -> Vec<HostFunction> {
    let output = output.clone();
    vec![
        variadic("+", add),
        variadic("-", sub),
        variadic("*", mul),
        fixed("/", 2, |args| {
            divide("/", args, i64::checked_div, |a, b| a / b)
        }),
        fixed("%", 2, |args| {
            divide("%", args, i64::checked_rem, |a, b| a % b)
        }),
        fixed("=", 2, |args| Ok(Value::Bool(args[0] == args[1]))),
        fixed("!=", 2, |args| Ok(Value::Bool(args[0] != args[1]))),
        comparison("<", Ordering::is_lt),
        comparison("<=", Ordering::is_le),
        comparison(">", Ordering::is_gt),
        comparison(">=", Ordering::is_ge),
        fixed("not", 1, |args| Ok(Value::Bool(!args[0].is_truthy()))),
        variadic("str", |args| Ok(Value::string(concat(args)))),
        variadic("print", move |args| print(&output, args)),
        variadic("list", |args| Ok(Value::list(args.to_vec()))),
    ]
}
