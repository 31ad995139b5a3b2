//! Type conversion between Rust and Weft values
//!
//! - `ToValue` converts Rust types into a [`Value`]
//! - `FromValue` converts a [`Value`] back into Rust types
//!
//! `serde_json::Value` converts both ways, which gives embedders a way in
//! and out for structured data.
//!
//! # Examples
//!
//! ```
//! use weft_runtime::api::{FromValue, ToValue};
//! use weft_runtime::Value;
//!
//! let value: Value = 42i64.to_value();
//! let back: i64 = FromValue::from_value(&value).unwrap();
//! assert_eq!(back, 42);
//! ```

use crate::value::{Value, ValueMap};
use std::collections::HashMap;
use thiserror::Error;

/// Error type for value conversion failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("List element type mismatch at index {index}: {source}")]
    Element {
        index: usize,
        #[source]
        source: Box<ConversionError>,
    },

    #[error("Map value type mismatch for key '{key}': {source}")]
    Entry {
        key: String,
        #[source]
        source: Box<ConversionError>,
    },

    /// Floats that JSON cannot represent (NaN, infinities)
    #[error("Float {0} has no JSON representation")]
    NonFiniteFloat(f64),
}

fn mismatch(expected: &str, found: &Value) -> ConversionError {
    ConversionError::TypeMismatch {
        expected: expected.to_string(),
        found: found.type_name().to_string(),
    }
}

/// Convert a Weft [`Value`] into a Rust type
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self, ConversionError>;
}

/// Convert a Rust type into a Weft [`Value`]
pub trait ToValue {
    fn to_value(self) -> Value;
}

impl ToValue for Value {
    fn to_value(self) -> Value {
        self
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        Ok(value.clone())
    }
}

// ===== Scalars =====

impl ToValue for () {
    fn to_value(self) -> Value {
        Value::Null
    }
}

impl FromValue for () {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Null => Ok(()),
            other => Err(mismatch("null", other)),
        }
    }
}

impl ToValue for bool {
    fn to_value(self) -> Value {
        Value::Bool(self)
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Bool(b) => Ok(*b),
            other => Err(mismatch("bool", other)),
        }
    }
}

impl ToValue for i64 {
    fn to_value(self) -> Value {
        Value::Int(self)
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Int(n) => Ok(*n),
            other => Err(mismatch("int", other)),
        }
    }
}

impl ToValue for i32 {
    fn to_value(self) -> Value {
        Value::Int(self.into())
    }
}

impl ToValue for f64 {
    fn to_value(self) -> Value {
        Value::Float(self)
    }
}

/// Ints widen to floats
impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Float(n) => Ok(*n),
            Value::Int(n) => Ok(*n as f64),
            other => Err(mismatch("float", other)),
        }
    }
}

impl ToValue for String {
    fn to_value(self) -> Value {
        Value::string(self)
    }
}

impl ToValue for &str {
    fn to_value(self) -> Value {
        Value::string(self)
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Str(s) => Ok(s.to_string()),
            other => Err(mismatch("string", other)),
        }
    }
}

// ===== Containers =====

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(self) -> Value {
        self.map_or(Value::Null, ToValue::to_value)
    }
}

/// Null becomes `None`
impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: ToValue> ToValue for Vec<T> {
    fn to_value(self) -> Value {
        Value::List(self.into_iter().map(ToValue::to_value).collect())
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        let Value::List(items) = value else {
            return Err(mismatch("list", value));
        };
        items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                T::from_value(item).map_err(|e| ConversionError::Element {
                    index,
                    source: Box::new(e),
                })
            })
            .collect()
    }
}

impl<T: ToValue> ToValue for HashMap<String, T> {
    fn to_value(self) -> Value {
        Value::Map(self.into_iter().map(|(k, v)| (k, v.to_value())).collect())
    }
}

impl<T: FromValue> FromValue for HashMap<String, T> {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        let Value::Map(map) = value else {
            return Err(mismatch("map", value));
        };
        map.iter()
            .map(|(key, item)| {
                T::from_value(item)
                    .map(|v| (key.clone(), v))
                    .map_err(|e| ConversionError::Entry {
                        key: key.clone(),
                        source: Box::new(e),
                    })
            })
            .collect()
    }
}

// ===== JSON =====

impl ToValue for serde_json::Value {
    fn to_value(self) -> Value {
        match self {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::string(s),
            serde_json::Value::Array(items) => items.to_value(),
            serde_json::Value::Object(entries) => {
                let map: ValueMap = entries.into_iter().map(|(k, v)| (k, v.to_value())).collect();
                Value::Map(map)
            }
        }
    }
}

/// Only data converts; callables, continuations and fibers are rejected
impl FromValue for serde_json::Value {
    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Null => Ok(serde_json::Value::Null),
            Value::Bool(b) => Ok(serde_json::Value::Bool(*b)),
            Value::Int(n) => Ok(serde_json::Value::from(*n)),
            Value::Float(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .ok_or(ConversionError::NonFiniteFloat(*n)),
            Value::Str(s) => Ok(serde_json::Value::String(s.to_string())),
            Value::List(_) => Vec::<serde_json::Value>::from_value(value).map(serde_json::Value::Array),
            Value::Map(map) => {
                let mut object = serde_json::Map::new();
                for key in map.sorted_keys() {
                    let item = map.get(key).unwrap_or(&Value::Null);
                    let converted = serde_json::Value::from_value(item).map_err(|e| {
                        ConversionError::Entry {
                            key: key.to_string(),
                            source: Box::new(e),
                        }
                    })?;
                    object.insert(key.to_string(), converted);
                }
                Ok(serde_json::Value::Object(object))
            }
            other => Err(mismatch("data", other)),
        }
    }
}
