//! First-class continuations
//!
//! A continuation is an owned snapshot of a fiber's operand stack, its
//! instruction tape (optionally truncated to a resume point) and its current
//! scope. Resuming clones the snapshot back into the fiber, so the same
//! continuation can be applied any number of times without the captures
//! affecting each other.
//!
//! A continuation remembers the fiber it was captured on. Handler lookup
//! uses that to keep a `try` on one fiber from unwinding another.

use crate::fiber::{Fiber, FiberId};
use crate::instruction::Instruction;
use crate::scope::ScopeId;
use crate::value::Value;
use crate::vm::frame::FrameStack;
use std::fmt;

#[derive(Clone)]
pub struct Continuation {
    fiber: FiberId,
    scope: ScopeId,
    operands: FrameStack<Value>,
    tape: FrameStack<Instruction>,
}

impl Continuation {
    /// Snapshot the whole fiber
    pub fn capture(fiber: &Fiber) -> Self {
        Self {
            fiber: fiber.id,
            scope: fiber.scope,
            operands: fiber.operands.copy(),
            tape: fiber.tape.copy(),
        }
    }

    /// Snapshot the fiber's operands and its tape truncated to `resume_at`,
    /// resuming in `scope`
    pub fn capture_at(fiber: &Fiber, resume_at: usize, scope: ScopeId) -> Self {
        Self {
            fiber: fiber.id,
            scope,
            operands: fiber.operands.copy(),
            tape: fiber.tape.snapshot_to(resume_at),
        }
    }

    /// Replace the fiber's stacks and scope with a copy of this snapshot
    pub fn restore_into(&self, fiber: &mut Fiber) {
        fiber.operands.restore(&self.operands);
        fiber.tape.restore(&self.tape);
        fiber.scope = self.scope;
    }

    /// Fiber the snapshot was taken from
    pub fn fiber(&self) -> FiberId {
        self.fiber
    }

    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    pub fn operands(&self) -> &FrameStack<Value> {
        &self.operands
    }

    pub fn tape(&self) -> &FrameStack<Instruction> {
        &self.tape
    }
}

impl fmt::Debug for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<{}: {} operands, {} instructions, {}>",
            self.fiber,
            self.operands.len(),
            self.tape.len(),
            self.scope
        )
    }
}
