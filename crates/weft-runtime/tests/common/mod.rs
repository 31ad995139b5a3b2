//! Shared test utilities
//!
//! Trees are built with `weft_runtime::build`; these helpers cut the
//! boilerplate of running them.

#![allow(dead_code)]

use pretty_assertions::assert_eq;
use weft_runtime::stdlib::CapturedOutput;
use weft_runtime::{NodeRef, Runtime, RuntimeConfig, RuntimeError, Value};

/// Runtime with the prelude installed
pub fn runtime() -> Runtime {
    Runtime::new().with_prelude()
}

/// Runtime with the prelude and a short resume timeout
pub fn fast_runtime(timeout_ms: u64) -> Runtime {
    Runtime::with_config(RuntimeConfig::default().with_resume_timeout_ms(timeout_ms)).with_prelude()
}

/// Evaluate a sequence of top-level forms; the last one's value wins
pub fn eval_all(forms: Vec<NodeRef>) -> Result<Value, RuntimeError> {
    let mut runtime = runtime();
    let mut last = Value::Null;
    for form in forms {
        last = runtime.evaluate(&form)?;
    }
    Ok(last)
}

/// Evaluate one tree with the prelude
pub fn eval(tree: NodeRef) -> Result<Value, RuntimeError> {
    runtime().evaluate(&tree)
}

/// Assert that a tree evaluates to `expected`
pub fn assert_eval(tree: NodeRef, expected: Value) {
    match eval(tree) {
        Ok(value) => assert_eq!(value, expected),
        Err(err) => panic!("Expected {:?}, got error: {}", expected, err),
    }
}

/// Evaluate with `print` output captured; returns (value, output)
pub fn eval_capturing(tree: NodeRef) -> (Result<Value, RuntimeError>, String) {
    let captured = CapturedOutput::new();
    let mut runtime = runtime();
    runtime.set_output_writer(captured.clone());
    let result = runtime.evaluate(&tree);
    (result, captured.contents())
}
