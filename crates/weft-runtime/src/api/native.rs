//! Host function builder
//!
//! Provides a fluent API for wrapping Rust closures as host functions, with
//! automatic argument-count checking.
//!
//! # Examples
//!
//! ```
//! use weft_runtime::api::HostFunctionBuilder;
//! use weft_runtime::Value;
//!
//! let double = HostFunctionBuilder::new("double")
//!     .with_arity(1)
//!     .with_implementation(|args| match &args[0] {
//!         Value::Int(n) => Ok(Value::Int(n * 2)),
//!         other => Err(weft_runtime::RuntimeError::invalid_operand(format!(
//!             "double expects an int, got {}",
//!             other.type_name()
//!         ))),
//!     })
//!     .build()
//!     .unwrap();
//! assert_eq!(&*double.name, "double");
//! ```

use crate::value::{HostFunction, NativeFn, RuntimeError, Value};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur when building a host function
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("Host function '{0}' missing implementation")]
    MissingImplementation(String),
}

/// Builder for [`HostFunction`] values
pub struct HostFunctionBuilder {
    name: String,
    /// `None` means variadic
    arity: Option<usize>,
    implementation: Option<NativeFn>,
}

impl HostFunctionBuilder {
    /// Start a builder for a function called `name`
    ///
    /// The function is variadic until [`with_arity`](Self::with_arity) is
    /// called.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arity: None,
            implementation: None,
        }
    }

    /// Require exactly `arity` arguments
    pub fn with_arity(mut self, arity: usize) -> Self {
        self.arity = Some(arity);
        self
    }

    /// Accept any number of arguments
    pub fn variadic(mut self) -> Self {
        self.arity = None;
        self
    }

    pub fn with_implementation<F>(mut self, f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, RuntimeError> + Send + Sync + 'static,
    {
        self.implementation = Some(Arc::new(f));
        self
    }

    /// Finish the builder
    ///
    /// Fixed-arity functions reject calls with the wrong number of
    /// arguments with [`RuntimeError::ArityMismatch`] before the
    /// implementation runs.
    pub fn build(self) -> Result<HostFunction, BuildError> {
        let implementation = self
            .implementation
            .ok_or_else(|| BuildError::MissingImplementation(self.name.clone()))?;

        let wrapped: NativeFn = match self.arity {
            Some(expected) => {
                let name = self.name.clone();
                Arc::new(move |args: &[Value]| {
                    check_arity(&name, args, expected)?;
                    implementation(args)
                })
            }
            None => implementation,
        };

        Ok(HostFunction::sync(self.name, wrapped))
    }
}

/// Reject `args` unless it holds exactly `expected` values
pub(crate) fn check_arity(name: &str, args: &[Value], expected: usize) -> Result<(), RuntimeError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(RuntimeError::ArityMismatch {
            name: name.to_string(),
            expected,
            found: args.len(),
        })
    }
}
