//! Runtime value representation
//!
//! - Null, Bool, Int, Float: immediate values
//! - Strings: `Arc<str>`, immutable
//! - Lists and maps: copy-on-write (`ValueArray` / `ValueMap` wrap an `Arc`)
//! - Lambdas: parameters, body nodes and the scope they were created in
//! - Host functions: Rust closures, synchronous or suspending
//! - Continuations: owned snapshots of a fiber's stacks
//!
//! `RuntimeError` and `SchedulingError` live here too, next to the values
//! they talk about.

use crate::continuation::Continuation;
use crate::fiber::token::FiberWaker;
use crate::fiber::FiberId;
use crate::node::NodeRef;
use crate::scope::ScopeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Copy-on-write list. Cheap to clone (refcount bump).
/// Mutations on a shared list clone the inner Vec first (Arc::make_mut).
#[derive(Clone, Debug, Default)]
pub struct ValueArray(Arc<Vec<Value>>);

impl ValueArray {
    pub fn new() -> Self {
        ValueArray(Arc::new(Vec::new()))
    }

    pub fn from_vec(v: Vec<Value>) -> Self {
        ValueArray(Arc::new(v))
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    /// Mutating access, triggers CoW if the Arc is shared.
    pub fn push(&mut self, value: Value) {
        Arc::make_mut(&mut self.0).push(value);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.0.iter()
    }

    /// Convert to owned Vec, cloning only if shared.
    pub fn into_vec(self) -> Vec<Value> {
        Arc::try_unwrap(self.0).unwrap_or_else(|arc| (*arc).clone())
    }
}

impl PartialEq for ValueArray {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_slice() == other.0.as_slice()
    }
}

impl From<Vec<Value>> for ValueArray {
    fn from(v: Vec<Value>) -> Self {
        ValueArray::from_vec(v)
    }
}

impl FromIterator<Value> for ValueArray {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        ValueArray(Arc::new(iter.into_iter().collect()))
    }
}

/// Copy-on-write string-keyed map. Cheap to clone (refcount bump).
#[derive(Clone, Debug, Default)]
pub struct ValueMap(Arc<HashMap<String, Value>>);

impl ValueMap {
    pub fn new() -> Self {
        ValueMap(Arc::new(HashMap::new()))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        Arc::make_mut(&mut self.0).insert(key.into(), value);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Keys in sorted order, so iteration and display are deterministic
    pub fn sorted_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.0.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl PartialEq for ValueMap {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_ref() == other.0.as_ref()
    }
}

impl From<HashMap<String, Value>> for ValueMap {
    fn from(m: HashMap<String, Value>) -> Self {
        ValueMap(Arc::new(m))
    }
}

impl FromIterator<(String, Value)> for ValueMap {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        ValueMap(Arc::new(iter.into_iter().collect()))
    }
}

/// Synchronous host function
pub type NativeFn = Arc<dyn Fn(&[Value]) -> Result<Value, RuntimeError> + Send + Sync>;

/// Host function that finishes later by waking the calling fiber
pub type SuspendingFn =
    Arc<dyn Fn(Vec<Value>, FiberWaker) -> Result<(), RuntimeError> + Send + Sync>;

#[derive(Clone)]
pub enum HostCallable {
    Sync(NativeFn),
    Suspending(SuspendingFn),
}

/// A named host callable
#[derive(Clone)]
pub struct HostFunction {
    pub name: Arc<str>,
    pub callable: HostCallable,
}

impl HostFunction {
    pub fn sync(name: impl Into<Arc<str>>, f: NativeFn) -> Self {
        Self {
            name: name.into(),
            callable: HostCallable::Sync(f),
        }
    }

    pub fn suspending(name: impl Into<Arc<str>>, f: SuspendingFn) -> Self {
        Self {
            name: name.into(),
            callable: HostCallable::Suspending(f),
        }
    }

    pub fn is_suspending(&self) -> bool {
        matches!(self.callable, HostCallable::Suspending(_))
    }
}

/// A closure created by evaluating a lambda node
#[derive(Debug, Clone)]
pub struct Lambda {
    /// Set when the lambda is first bound by `var`
    pub name: Option<Arc<str>>,
    pub params: Arc<[Arc<str>]>,
    pub body: Arc<[NodeRef]>,
    /// Definition scope; closures capture scope identity, not values
    pub scope: ScopeId,
}

impl Lambda {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<lambda>")
    }
}

/// A receiver paired with a method name, resolved when applied
#[derive(Debug, Clone, PartialEq)]
pub struct BoundMethod {
    pub receiver: Value,
    pub name: Arc<str>,
}

/// Runtime value
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    List(ValueArray),
    Map(ValueMap),
    Lambda(Arc<Lambda>),
    Host(HostFunction),
    BoundMethod(Arc<BoundMethod>),
    Continuation(Arc<Continuation>),
    Fiber(FiberId),
}

impl Value {
    pub fn string(s: impl Into<Arc<str>>) -> Self {
        Value::Str(s.into())
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(ValueArray::from_vec(items))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Lambda(_) => "function",
            Value::Host(_) => "host-function",
            Value::BoundMethod(_) => "bound-method",
            Value::Continuation(_) => "continuation",
            Value::Fiber(_) => "fiber",
        }
    }

    /// `Null` and `false` are falsy, everything else is truthy
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Null | Value::Bool(false))
    }

    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            Value::Lambda(_) | Value::Host(_) | Value::BoundMethod(_) | Value::Continuation(_)
        )
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            // Callables compare by identity
            (Value::Lambda(a), Value::Lambda(b)) => Arc::ptr_eq(a, b),
            (Value::Host(a), Value::Host(b)) => match (&a.callable, &b.callable) {
                (HostCallable::Sync(x), HostCallable::Sync(y)) => Arc::ptr_eq(x, y),
                (HostCallable::Suspending(x), HostCallable::Suspending(y)) => Arc::ptr_eq(x, y),
                _ => false,
            },
            (Value::BoundMethod(a), Value::BoundMethod(b)) => a == b,
            (Value::Continuation(a), Value::Continuation(b)) => Arc::ptr_eq(a, b),
            (Value::Fiber(a), Value::Fiber(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => {
                // Keep a trailing .0 so floats stay distinguishable from ints
                if n.fract() == 0.0 && n.is_finite() {
                    write!(f, "{:.1}", n)
                } else {
                    write!(f, "{}", n)
                }
            }
            Value::Str(s) => write!(f, "{}", s),
            Value::List(items) => {
                let elements: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", elements.join(", "))
            }
            Value::Map(map) => {
                let entries: Vec<String> = map
                    .sorted_keys()
                    .into_iter()
                    .map(|k| format!("{}: {}", k, map.get(k).unwrap_or(&Value::Null)))
                    .collect();
                write!(f, "{{{}}}", entries.join(", "))
            }
            Value::Lambda(l) => write!(f, "<fn {}>", l.display_name()),
            Value::Host(h) => write!(f, "<host fn {}>", h.name),
            Value::BoundMethod(m) => write!(f, "<method {}.{}>", m.receiver.type_name(), m.name),
            Value::Continuation(_) => write!(f, "<continuation>"),
            Value::Fiber(id) => write!(f, "<fiber {}>", id),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Int(n) => write!(f, "Int({})", n),
            Value::Float(n) => write!(f, "Float({})", n),
            Value::Str(s) => write!(f, "Str({:?})", s),
            Value::List(items) => write!(f, "List({:?})", items.as_slice()),
            Value::Map(map) => {
                let mut dbg = f.debug_map();
                for key in map.sorted_keys() {
                    dbg.entry(&key, &map.get(key));
                }
                dbg.finish()
            }
            Value::Lambda(l) => write!(f, "Lambda({})", l.display_name()),
            Value::Host(h) => write!(f, "Host({})", h.name),
            Value::BoundMethod(m) => write!(f, "BoundMethod({:?}.{})", m.receiver, m.name),
            Value::Continuation(k) => write!(f, "Continuation({:?})", k),
            Value::Fiber(id) => write!(f, "Fiber({})", id),
        }
    }
}

/// Scheduler failures; always fatal to the evaluation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchedulingError {
    #[error("Unknown fiber: {0}")]
    UnknownFiber(FiberId),

    #[error("Timed out after {waited_ms}ms waiting for a resume token")]
    Timeout { waited_ms: u64 },

    #[error("Deadlock: no fiber is runnable and none is waiting on an external event")]
    Deadlock,
}

/// Runtime errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    /// Pop on an empty frame (machine invariant broken)
    #[error("Stack underflow")]
    StackUnderflow,

    #[error("Variable not found: {name}")]
    VariableNotFound { name: String },

    #[error("Invalid operand: {msg}")]
    InvalidOperand { msg: String },

    #[error("Effect not handled: {effect}")]
    EffectNotHandled { effect: String },

    #[error("Arity mismatch calling {name}: expected {expected} arguments, found {found}")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },

    /// Failure reported by a host function
    #[error("Host function {name} failed: {msg}")]
    Host { name: String, msg: String },

    #[error(transparent)]
    Scheduling(#[from] SchedulingError),

    #[error("Step limit of {limit} instructions exceeded")]
    StepLimitExceeded { limit: u64 },
}

impl RuntimeError {
    pub fn invalid_operand(msg: impl Into<String>) -> Self {
        RuntimeError::InvalidOperand { msg: msg.into() }
    }

    pub fn host(name: impl Into<String>, msg: impl Into<String>) -> Self {
        RuntimeError::Host {
            name: name.into(),
            msg: msg.into(),
        }
    }

    /// Fatal errors always abort the evaluation; the rest can be caught
    /// through the runtime-error effect.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RuntimeError::StackUnderflow
                | RuntimeError::Scheduling(_)
                | RuntimeError::StepLimitExceeded { .. }
        )
    }

    /// Stable kind string, used in the runtime-error effect payload
    pub fn kind(&self) -> &'static str {
        match self {
            RuntimeError::StackUnderflow => "stack-underflow",
            RuntimeError::VariableNotFound { .. } => "variable-not-found",
            RuntimeError::InvalidOperand { .. } => "invalid-operand",
            RuntimeError::EffectNotHandled { .. } => "effect-not-handled",
            RuntimeError::ArityMismatch { .. } => "arity-mismatch",
            RuntimeError::Host { .. } => "host",
            RuntimeError::Scheduling(_) => "scheduling",
            RuntimeError::StepLimitExceeded { .. } => "step-limit-exceeded",
        }
    }
}
