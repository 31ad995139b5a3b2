//! Runtime execution API
//!
//! Provides the `Runtime` struct, the embedding entry point. It owns one
//! [`Machine`] whose scope graph persists across evaluations, so globals
//! defined by one tree are visible to the next.
//!
//! # Examples
//!
//! ```
//! use weft_runtime::api::Runtime;
//! use weft_runtime::node::build::*;
//! use weft_runtime::Value;
//!
//! let mut runtime = Runtime::new().with_prelude();
//!
//! runtime.evaluate(&call("var", vec![ident("x"), int(40)])).unwrap();
//! let result = runtime.evaluate(&call("+", vec![ident("x"), int(2)])).unwrap();
//! assert_eq!(result, Value::Int(42));
//! ```

use super::conversion::ToValue;
use crate::fiber::token::FiberWaker;
use crate::fiber::FiberId;
use crate::method_dispatch::TypeTag;
use crate::node::{Node, NodeRef};
use crate::scope::{ScopeGraph, ScopeId};
use crate::stdlib::{self, OutputWriter};
use crate::value::{HostFunction, RuntimeError, Value};
use crate::vm::dispatch::MacroExpander;
use crate::vm::{Machine, StepResult};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;
use weft_config::{ConfigError, ConfigLoader, RuntimeConfig};

/// Runtime instance managing execution state
pub struct Runtime {
    machine: Machine,
    output: OutputWriter,
}

impl Runtime {
    /// Create a runtime with default configuration and no prelude
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            machine: Machine::new(config),
            output: stdlib::stdout_writer(),
        }
    }

    /// Create a runtime configured from the project around `dir`
    ///
    /// Merges defaults, the global config, the nearest `weft.toml` and
    /// `WEFT_*` environment variables.
    pub fn from_project_dir(dir: &Path) -> Result<Self, ConfigError> {
        let config = ConfigLoader::new().load_from_directory(dir)?;
        Ok(Self::with_config(config))
    }

    /// Install the host-function prelude and builtin methods
    pub fn with_prelude(mut self) -> Self {
        stdlib::install(&mut self.machine, &self.output);
        self
    }

    pub fn config(&self) -> &RuntimeConfig {
        self.machine.config()
    }

    /// Evaluate `tree` on a fresh root fiber and drive it to completion
    ///
    /// Fibers spawned by an earlier evaluation are discarded; scopes and
    /// globals persist.
    pub fn evaluate(&mut self, tree: &Node) -> Result<Value, RuntimeError> {
        debug!(tree = %tree.summary(), "evaluate");
        self.machine.load(Arc::new(tree.clone()))?;
        self.machine.run()
    }

    /// Install `tree` without running it; drive it with [`step`](Self::step)
    pub fn load(&mut self, tree: NodeRef) -> Result<FiberId, RuntimeError> {
        self.machine.load(tree)
    }

    /// Dispatch a single instruction of the loaded evaluation
    pub fn step(&mut self) -> Result<StepResult, RuntimeError> {
        self.machine.step()
    }

    /// Pending instructions of the current fiber, next first
    pub fn dump_tape(&self) -> Result<String, RuntimeError> {
        self.machine.dump_tape()
    }

    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    // ===== Host functions =====

    /// Register a synchronous host function in the builtin scope
    ///
    /// The implementation sees every argument and validates count and types
    /// itself; use [`HostFunctionBuilder`](super::HostFunctionBuilder) with
    /// [`register`](Self::register) for automatic arity checks.
    pub fn register_host_function<F>(&mut self, name: &str, implementation: F)
    where
        F: Fn(&[Value]) -> Result<Value, RuntimeError> + Send + Sync + 'static,
    {
        self.register(HostFunction::sync(name, Arc::new(implementation)));
    }

    /// Register a host function that completes later
    ///
    /// The calling fiber suspends after the implementation returns and
    /// resumes when the [`FiberWaker`] is used; the woken value becomes the
    /// result of the call.
    pub fn register_suspending_host_function<F>(&mut self, name: &str, implementation: F)
    where
        F: Fn(Vec<Value>, FiberWaker) -> Result<(), RuntimeError> + Send + Sync + 'static,
    {
        self.register(HostFunction::suspending(name, Arc::new(implementation)));
    }

    /// Define an already built host function in the builtin scope
    pub fn register(&mut self, function: HostFunction) {
        let builtin = self.machine.scopes.builtin();
        let name = function.name.clone();
        debug!(name = %name, suspending = function.is_suspending(), "registering host function");
        self.machine
            .scopes
            .define(builtin, &name, Value::Host(function));
    }

    /// Register a macro keyword
    ///
    /// A call whose head is `keyword` is handed to `expander` unevaluated,
    /// together with the scope it appears in. Core keywords can be replaced
    /// the same way.
    pub fn register_macro(&mut self, keyword: &str, expander: MacroExpander) {
        debug!(keyword, "registering macro");
        self.machine.registry.register_macro(keyword, expander);
    }

    /// Register a builtin method for receivers of type `tag`
    ///
    /// The receiver is passed as the first argument.
    pub fn register_method<F>(&mut self, tag: TypeTag, name: &str, implementation: F)
    where
        F: Fn(&[Value]) -> Result<Value, RuntimeError> + Send + Sync + 'static,
    {
        self.machine
            .methods
            .register(tag, name, HostFunction::sync(name, Arc::new(implementation)));
    }

    // ===== Globals =====

    pub fn global_scope(&self) -> ScopeId {
        self.machine.scopes.global()
    }

    pub fn define_global(&mut self, name: &str, value: impl ToValue) {
        let global = self.machine.scopes.global();
        self.machine.scopes.define(global, name, value.to_value());
    }

    /// Look `name` up from the global scope (builtins included)
    pub fn global(&self, name: &str) -> Option<Value> {
        let global = self.machine.scopes.global();
        self.machine.scopes.lookup(global, name).ok().cloned()
    }

    pub fn scopes(&self) -> &ScopeGraph {
        self.machine.scopes()
    }

    /// Send `print` output to `writer` from now on
    pub fn set_output_writer(&mut self, writer: impl Write + Send + 'static) {
        let mut slot = match self.output.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = Box::new(writer);
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

/// Evaluate `tree` with `runtime`
pub fn evaluate(tree: &Node, runtime: &mut Runtime) -> Result<Value, RuntimeError> {
    runtime.evaluate(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::build::*;
    use crate::stdlib::CapturedOutput;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_evaluate_literal() {
        let mut runtime = Runtime::new();
        assert_eq!(runtime.evaluate(&string("hi")), Ok(Value::string("hi")));
        assert_eq!(runtime.evaluate(&null()), Ok(Value::Null));
    }

    #[test]
    fn test_globals_persist_across_evaluations() {
        let mut runtime = Runtime::new();
        runtime
            .evaluate(&call("var", vec![ident("answer"), int(42)]))
            .unwrap();
        assert_eq!(runtime.evaluate(&ident("answer")), Ok(Value::Int(42)));
        assert_eq!(runtime.global("answer"), Some(Value::Int(42)));
    }

    #[test]
    fn test_define_global_is_visible_to_scripts() {
        let mut runtime = Runtime::new();
        runtime.define_global("limit", 10i64);
        assert_eq!(runtime.evaluate(&ident("limit")), Ok(Value::Int(10)));
    }

    #[test]
    fn test_unknown_variable() {
        let mut runtime = Runtime::new();
        assert_eq!(
            runtime.evaluate(&ident("nope")),
            Err(RuntimeError::VariableNotFound {
                name: "nope".to_string()
            })
        );
    }

    #[test]
    fn test_host_function_lives_in_builtin_scope() {
        let mut runtime = Runtime::new();
        runtime.register_host_function("twice", |args| match args {
            [Value::Int(n)] => Ok(Value::Int(n * 2)),
            _ => Err(RuntimeError::invalid_operand("twice expects one int")),
        });

        let builtin = runtime.scopes().builtin();
        assert!(runtime.scopes().bindings(builtin).unwrap().contains_key("twice"));
        assert_eq!(
            runtime.evaluate(&call("twice", vec![int(21)])),
            Ok(Value::Int(42))
        );
    }

    #[test]
    fn test_registered_method() {
        let mut runtime = Runtime::new();
        runtime.register_method(TypeTag::Int, "succ", |args| match args {
            [Value::Int(n)] => Ok(Value::Int(n + 1)),
            _ => Err(RuntimeError::invalid_operand("succ")),
        });
        assert_eq!(
            runtime.evaluate(&method(int(1), "succ", vec![])),
            Ok(Value::Int(2))
        );
    }

    #[test]
    fn test_output_writer_can_be_swapped() {
        let captured = CapturedOutput::new();
        let mut runtime = Runtime::new().with_prelude();
        runtime.set_output_writer(captured.clone());
        runtime
            .evaluate(&call("print", vec![string("total"), int(3)]))
            .unwrap();
        assert_eq!(captured.contents(), "total 3\n");
    }

    #[test]
    fn test_free_evaluate() {
        let mut runtime = Runtime::new().with_prelude();
        assert_eq!(
            evaluate(&call("+", vec![int(1), int(2)]), &mut runtime),
            Ok(Value::Int(3))
        );
    }
}
