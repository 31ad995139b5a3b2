//! Weft Runtime - execution core of the Weft scripting language
//!
//! This library evaluates already-parsed Weft trees:
//! - A frame-indexed stack machine with per-fiber operand stacks and
//!   instruction tapes
//! - Lexical scopes kept in an arena
//! - Cooperative fibers with an explicit scheduler and resume tokens
//! - First-class continuations, `try`/`perform` effect handlers, loops with
//!   `break`/`continue`, and `return`
//! - An embedding API with host functions and an optional prelude

/// Weft runtime version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Public API modules
pub mod api;
pub mod async_runtime;
pub mod continuation;
pub mod fiber;
pub mod instruction;
pub mod logging;
pub mod method_dispatch;
pub mod node;
pub mod scope;
pub mod stdlib;
pub mod value;
pub mod vm;

mod interpreter;

// Re-export commonly used types
pub use api::{evaluate, FromValue, HostFunctionBuilder, Runtime, ToValue};
pub use continuation::Continuation;
pub use fiber::token::{FiberWaker, ResumeFiberToken};
pub use fiber::{FiberId, FiberState};
pub use instruction::{Instruction, Opcode};
pub use method_dispatch::TypeTag;
pub use node::{build, Node, NodeRef};
pub use scope::{ScopeGraph, ScopeId, ScopeKind};
pub use value::{HostFunction, RuntimeError, SchedulingError, Value};
pub use vm::dispatch::MacroExpander;
pub use vm::{Machine, StepResult};
pub use weft_config::{ArityPolicy, RuntimeConfig};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smoke() {
        assert_eq!(VERSION, "0.1.0");
    }
}
