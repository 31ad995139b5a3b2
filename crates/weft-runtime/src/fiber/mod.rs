//! Fibers: cooperative execution contexts
//!
//! Each fiber owns an operand stack, an instruction tape and the id of its
//! current scope. Fibers never share stacks; values move between them only
//! through [`scheduler::Scheduler::transfer_frame`] or a resume token.

pub mod scheduler;
pub mod token;

use crate::instruction::{Instruction, Opcode};
use crate::scope::ScopeId;
use crate::value::Value;
use crate::vm::frame::FrameStack;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fiber identifier, unique within one scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FiberId(pub u64);

impl fmt::Display for FiberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Why a fiber stopped without finishing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuspendReason {
    /// Waiting for the given fiber to yield or finish
    Awaiting(FiberId),
    /// Waiting for a resume token from a suspending host function
    External,
}

/// Fiber status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FiberState {
    /// Queued to run
    Runnable,
    /// Currently executing (exactly one fiber at a time)
    Running,
    /// Yielded with nobody waiting; resumes when awaited
    Idle,
    Suspended(SuspendReason),
    /// Reached `LandSuccess`
    Dead,
}

#[derive(Debug, Clone)]
pub struct Fiber {
    pub id: FiberId,
    /// None for the root fiber
    pub parent: Option<FiberId>,
    pub state: FiberState,
    pub scope: ScopeId,
    pub operands: FrameStack<Value>,
    pub tape: FrameStack<Instruction>,
    /// Fiber suspended in `await` on this one
    pub awaited_by: Option<FiberId>,
    /// Yielded value nobody has awaited yet
    pub outbox: Option<Value>,
    /// Final value once Dead
    pub result: Option<Value>,
}

impl Fiber {
    /// New runnable fiber whose tape holds only the `LandSuccess` sentinel
    pub fn new(id: FiberId, parent: Option<FiberId>, scope: ScopeId) -> Self {
        let mut tape = FrameStack::new();
        tape.push_value(Instruction::bare(Opcode::LandSuccess, scope));
        Self {
            id,
            parent,
            state: FiberState::Runnable,
            scope,
            operands: FrameStack::new(),
            tape,
            awaited_by: None,
            outbox: None,
            result: None,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn is_dead(&self) -> bool {
        self.state == FiberState::Dead
    }

    /// Opcode the dispatcher will run next
    pub fn next_opcode(&self) -> Option<Opcode> {
        self.tape.peek_top().map(|instr| instr.opcode)
    }

    /// Tape listing, next instruction first
    pub fn dump_tape(&self) -> String {
        self.tape
            .iter()
            .rev()
            .map(|instr| instr.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
