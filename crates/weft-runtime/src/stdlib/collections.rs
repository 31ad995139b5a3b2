//! Builtin methods on lists, maps and strings
//!
//! Methods receive their receiver as the first argument. Values are
//! immutable from the script's point of view, so `push` returns a new list.

use super::{fixed, type_error};
use crate::method_dispatch::TypeTag;
use crate::value::{HostFunction, RuntimeError, Value, ValueArray, ValueMap};

fn list<'a>(name: &str, value: &'a Value) -> Result<&'a ValueArray, RuntimeError> {
    match value {
        Value::List(items) => Ok(items),
        other => Err(type_error(name, "a list", other)),
    }
}

fn map<'a>(name: &str, value: &'a Value) -> Result<&'a ValueMap, RuntimeError> {
    match value {
        Value::Map(map) => Ok(map),
        other => Err(type_error(name, "a map", other)),
    }
}

fn string<'a>(name: &str, value: &'a Value) -> Result<&'a str, RuntimeError> {
    value.as_str().ok_or_else(|| type_error(name, "a string", value))
}

fn length(n: usize) -> Value {
    Value::Int(n as i64)
}

// ===== Lists =====

fn list_get(args: &[Value]) -> Result<Value, RuntimeError> {
    let items = list("get", &args[0])?;
    let index = args[1]
        .as_int()
        .ok_or_else(|| type_error("get", "an int index", &args[1]))?;
    Ok(usize::try_from(index)
        .ok()
        .and_then(|i| items.get(i))
        .cloned()
        .unwrap_or(Value::Null))
}

fn list_push(args: &[Value]) -> Result<Value, RuntimeError> {
    let mut items = list("push", &args[0])?.clone();
    items.push(args[1].clone());
    Ok(Value::List(items))
}

fn list_methods() -> Vec<(TypeTag, &'static str, HostFunction)> {
    vec![
        (
            TypeTag::List,
            "len",
            fixed("len", 1, |args| Ok(length(list("len", &args[0])?.len()))),
        ),
        (TypeTag::List, "get", fixed("get", 2, list_get)),
        (TypeTag::List, "push", fixed("push", 2, list_push)),
        (
            TypeTag::List,
            "first",
            fixed("first", 1, |args| {
                Ok(list("first", &args[0])?.get(0).cloned().unwrap_or(Value::Null))
            }),
        ),
        (
            TypeTag::List,
            "last",
            fixed("last", 1, |args| {
                let items = list("last", &args[0])?;
                Ok(items.as_slice().last().cloned().unwrap_or(Value::Null))
            }),
        ),
    ]
}

// ===== Maps =====

fn map_methods() -> Vec<(TypeTag, &'static str, HostFunction)> {
    vec![
        (
            TypeTag::Map,
            "len",
            fixed("len", 1, |args| Ok(length(map("len", &args[0])?.len()))),
        ),
        (
            TypeTag::Map,
            "get",
            fixed("get", 2, |args| {
                let key = string("get", &args[1])?;
                Ok(map("get", &args[0])?.get(key).cloned().unwrap_or(Value::Null))
            }),
        ),
        (
            TypeTag::Map,
            "keys",
            fixed("keys", 1, |args| {
                let keys = map("keys", &args[0])?
                    .sorted_keys()
                    .into_iter()
                    .map(Value::string)
                    .collect();
                Ok(Value::List(keys))
            }),
        ),
        (
            TypeTag::Map,
            "has",
            fixed("has", 2, |args| {
                let key = string("has", &args[1])?;
                Ok(Value::Bool(map("has", &args[0])?.contains_key(key)))
            }),
        ),
    ]
}

// ===== Strings =====

fn string_methods() -> Vec<(TypeTag, &'static str, HostFunction)> {
    vec![
        (
            TypeTag::Str,
            "len",
            fixed("len", 1, |args| {
                Ok(length(string("len", &args[0])?.chars().count()))
            }),
        ),
        (
            TypeTag::Str,
            "upper",
            fixed("upper", 1, |args| {
                Ok(Value::string(string("upper", &args[0])?.to_uppercase()))
            }),
        ),
        (
            TypeTag::Str,
            "lower",
            fixed("lower", 1, |args| {
                Ok(Value::string(string("lower", &args[0])?.to_lowercase()))
            }),
        ),
    ]
}

pub fn methods() -> Vec<(TypeTag, &'static str, HostFunction)> {
    let mut methods = list_methods();
    methods.extend(map_methods());
    methods.extend(string_methods());
    methods
}
