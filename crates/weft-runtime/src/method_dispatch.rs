//! Builtin method dispatch table.
//!
//! Maps (TypeTag, method_name) to a host function. Applying a bound method
//! whose receiver has no callable field of that name consults this table,
//! then calls the method with the receiver prepended to the arguments.

use crate::value::{HostFunction, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Runtime-stable type tag for method dispatch.
/// One variant per builtin value kind that can carry methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeTag {
    Null,
    Bool,
    Int,
    Float,
    Str,
    List,
    Map,
    Function,
    Continuation,
    Fiber,
}

impl TypeTag {
    pub fn of(value: &Value) -> TypeTag {
        match value {
            Value::Null => TypeTag::Null,
            Value::Bool(_) => TypeTag::Bool,
            Value::Int(_) => TypeTag::Int,
            Value::Float(_) => TypeTag::Float,
            Value::Str(_) => TypeTag::Str,
            Value::List(_) => TypeTag::List,
            Value::Map(_) => TypeTag::Map,
            Value::Lambda(_) | Value::Host(_) | Value::BoundMethod(_) => TypeTag::Function,
            Value::Continuation(_) => TypeTag::Continuation,
            Value::Fiber(_) => TypeTag::Fiber,
        }
    }
}

/// Registered builtin methods
#[derive(Clone, Default)]
pub struct MethodRegistry {
    methods: HashMap<(TypeTag, String), HostFunction>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tag: TypeTag, name: &str, method: HostFunction) {
        self.methods.insert((tag, name.to_string()), method);
    }

    /// Resolve a method call to its host function.
    /// Returns None if the type/method combination is not registered.
    pub fn resolve(&self, tag: TypeTag, name: &str) -> Option<&HostFunction> {
        self.methods.get(&(tag, name.to_string()))
    }

    /// Method names registered for a type, sorted
    pub fn names_for(&self, tag: TypeTag) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .methods
            .keys()
            .filter(|(t, _)| *t == tag)
            .map(|(_, name)| name.as_str())
            .collect();
        names.sort_unstable();
        names
    }
}
