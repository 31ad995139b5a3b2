//! Instruction handlers and macro expanders
//!
//! Every handler runs one instruction and lowers at most one node level,
//! emitting the rest of the work as further instructions:
//! - `eval`: node lowering, operand frames, bindings, indexing
//! - `apply`: function application and member access
//! - `control`: `if`/`cond`/`var`/`set` and the loops
//! - `effects`: `try`/`perform` and runtime errors as effects
//! - `fibers`: `spawn`/`yield`/`await` and the landing sentinel

pub(crate) mod apply;
pub(crate) mod control;
pub(crate) mod effects;
pub(crate) mod eval;
pub(crate) mod fibers;

use crate::instruction::{Instruction, Opcode};
use crate::node::{Node, NodeRef};
use crate::scope::ScopeId;
use crate::value::{RuntimeError, Value};
use crate::vm::Machine;
use std::sync::Arc;

/// Continuation bound in a loop scope that exits the loop
pub const BREAK: &str = "break";
/// Continuation bound in a loop scope that ends the current iteration
pub const CONTINUE: &str = "continue";
/// Continuation bound in every call scope that returns from the call
pub const RETURN: &str = "return";
/// Continuation bound in a `try` scope for "right after the try"
pub const TRY_EXIT: &str = "*try-exit*";
/// Map of effect name to handler bound in a `try` scope
pub const HANDLERS: &str = "*handlers*";

/// Emit the instructions of a block: its value is the last item's, Null if
/// empty
pub(crate) fn emit_block(
    m: &mut Machine,
    scope: ScopeId,
    items: &[NodeRef],
) -> Result<(), RuntimeError> {
    if items.is_empty() {
        return m.emit(Instruction::push(scope, Value::Null).with_comment("empty block"));
    }
    m.batch(|m| {
        m.emit(Instruction::bare(Opcode::PushFrame, scope))?;
        for item in items {
            m.emit(Instruction::eval(scope, item.clone()))?;
        }
        m.emit(Instruction::bare(Opcode::CollapseFrame, scope))
    })
}

/// Error for an instruction whose memo does not fit its opcode
pub(crate) fn bad_memo(instr: &Instruction) -> RuntimeError {
    RuntimeError::invalid_operand(format!(
        "{:?} carries an unexpected memo '{}'",
        instr.opcode, instr.memo
    ))
}

/// Name argument of a macro: an identifier or a string literal
pub(crate) fn name_arg(node: &Node, keyword: &str) -> Result<Arc<str>, RuntimeError> {
    match node {
        Node::Ident(name) => Ok(name.clone()),
        Node::Literal(Value::Str(s)) => Ok(s.clone()),
        other => Err(RuntimeError::invalid_operand(format!(
            "{} expects a name, got {}",
            keyword,
            other.summary()
        ))),
    }
}
