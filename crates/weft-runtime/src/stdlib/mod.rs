//! Host-function prelude
//!
//! An opt-in set of host functions and builtin methods, installed by
//! [`Runtime::with_prelude`](crate::api::Runtime::with_prelude):
//!
//! - `ops`: arithmetic, comparison, `not`, `str`, `print`, `list`
//! - `collections`: list, map and string methods
//! - `time`: the suspending `sleep`
//!
//! Functions live in the builtin scope, so scripts can shadow them.

pub mod collections;
pub mod ops;
pub mod time;

use crate::api::native::check_arity;
use crate::method_dispatch::TypeTag;
use crate::value::{HostFunction, RuntimeError, Value};
use crate::vm::Machine;
use std::io::Write;
use std::sync::{Arc, Mutex};

/// Shared sink for `print`
///
/// The box can be swapped behind the lock, so functions that captured the
/// writer pick up the replacement.
pub type OutputWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// Writer that forwards to the process stdout
pub fn stdout_writer() -> OutputWriter {
    writer(std::io::stdout())
}

/// Wrap any writer as an [`OutputWriter`]
pub fn writer(w: impl Write + Send + 'static) -> OutputWriter {
    let boxed: Box<dyn Write + Send> = Box::new(w);
    Arc::new(Mutex::new(boxed))
}

/// In-memory output sink for capturing `print`
#[derive(Clone, Default)]
pub struct CapturedOutput(Arc<Mutex<Vec<u8>>>);

impl CapturedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded
    pub fn contents(&self) -> String {
        match self.0.lock() {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(poisoned) => String::from_utf8_lossy(&poisoned.into_inner()).into_owned(),
        }
    }
}

impl Write for CapturedOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0
            .lock()
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::Other, "captured output lock poisoned"))?
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Every prelude function, `print` bound to `output`
pub fn functions(output: &OutputWriter) -> Vec<HostFunction> {
    let mut functions = ops::functions(output);
    functions.push(time::sleep());
    functions
}

/// Every prelude method as (receiver type, name, implementation)
pub fn methods() -> Vec<(TypeTag, &'static str, HostFunction)> {
    collections::methods()
}

/// Define the prelude in the machine's builtin scope and method table
pub(crate) fn install(machine: &mut Machine, output: &OutputWriter) {
    let builtin = machine.scopes.builtin();
    for function in functions(output) {
        let name = function.name.clone();
        machine.scopes.define(builtin, &name, Value::Host(function));
    }
    for (tag, name, method) in methods() {
        machine.methods.register(tag, name, method);
    }
    tracing::debug!(scope = %builtin, "prelude installed");
}

// ===== Helpers =====

/// Host function taking exactly `arity` arguments
pub(crate) fn fixed<F>(name: &'static str, arity: usize, f: F) -> HostFunction
where
    F: Fn(&[Value]) -> Result<Value, RuntimeError> + Send + Sync + 'static,
{
    HostFunction::sync(
        name,
        Arc::new(move |args: &[Value]| {
            check_arity(name, args, arity)?;
            f(args)
        }),
    )
}

/// Host function taking any number of arguments
pub(crate) fn variadic<F>(name: &'static str, f: F) -> HostFunction
where
    F: Fn(&[Value]) -> Result<Value, RuntimeError> + Send + Sync + 'static,
{
    HostFunction::sync(name, Arc::new(f))
}

pub(crate) fn type_error(name: &str, expected: &str, found: &Value) -> RuntimeError {
    RuntimeError::invalid_operand(format!(
        "{} expects {}, got {}",
        name,
        expected,
        found.type_name()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_captured_output_collects_writes() {
        let captured = CapturedOutput::new();
        let mut writer = captured.clone();
        write!(writer, "hello ").unwrap();
        writeln!(writer, "world").unwrap();
        assert_eq!(captured.contents(), "hello world\n");
    }

    #[test]
    fn test_fixed_checks_arity() {
        let f = fixed("id", 1, |args| Ok(args[0].clone()));
        let crate::value::HostCallable::Sync(call) = &f.callable else {
            panic!("expected a synchronous host function");
        };
        assert_eq!(call(&[Value::Int(1)]), Ok(Value::Int(1)));
        assert!(matches!(
            call(&[]),
            Err(RuntimeError::ArityMismatch { expected: 1, found: 0, .. })
        ));
    }

    #[test]
    fn test_prelude_names_are_unique() {
        let output = stdout_writer();
        let mut names: Vec<String> = functions(&output)
            .iter()
            .map(|f| f.name.to_string())
            .collect();
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total);
        assert!(names.contains(&"sleep".to_string()));
    }
}
