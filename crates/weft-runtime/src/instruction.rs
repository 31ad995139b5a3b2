//! Instruction set
//!
//! An instruction is an opcode, the scope that was active when it was
//! enqueued, an opcode-specific memo and an optional debug comment.
//! Instructions are immutable once emitted; loop and foreach state advances by
//! emitting a fresh instruction.

use crate::node::NodeRef;
use crate::scope::ScopeId;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Instruction opcode
///
/// Explicit byte values index the dispatch table.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    // ===== Evaluation (0x01-0x0F) =====
    /// Lower the node in the memo by one step
    Eval = 0x01,
    /// Push the memo value
    Push = 0x02,
    /// Discard the top operand
    Pop = 0x03,
    /// Resolve the memo name through the scope chain
    Lookup = 0x04,

    // ===== Frames (0x10-0x1F) =====
    /// Open an operand frame
    PushFrame = 0x10,
    /// Close the operand frame keeping its last value (Null if empty)
    CollapseFrame = 0x11,
    /// Clear the operand frame but keep its last value in it
    KeepLast = 0x12,
    /// Close the operand frame into a list
    MakeList = 0x13,
    /// Close the operand frame into a map keyed by the memo names
    MakeMap = 0x14,

    // ===== Bindings (0x20-0x2F) =====
    /// Define the memo name in the instruction scope; keeps the value on the stack
    Define = 0x20,
    /// Overwrite the memo name in its declaring scope; keeps the value on the stack
    Assign = 0x21,
    /// Capture a continuation at a resume point and bind it
    BindContinuation = 0x22,

    // ===== Application (0x30-0x3F) =====
    /// Pop the operand frame `[callee, args...]` and apply it
    Apply = 0x30,
    /// Apply the memo values `[callee, args...]`
    Invoke = 0x31,
    /// Pop a receiver, push its field or a bound method
    GetMember = 0x32,
    /// Pop index, pop target, push the element
    Index = 0x33,

    // ===== Control flow (0x40-0x4F) =====
    /// Truncate the tape to the memo index
    Jump = 0x40,
    /// Pop a condition, truncate the tape to the memo index when falsy
    JumpIfFalse = 0x41,
    /// Expand one `while`/`for` iteration
    LoopIter = 0x42,
    /// Pop the iterable and start a `foreach`
    ForeachStart = 0x43,
    /// Expand one `foreach` iteration
    ForeachIter = 0x44,

    // ===== Effects (0x50-0x5F) =====
    /// Close the operand frame into the `*handlers*` map of the scope
    InstallHandlers = 0x50,
    /// Pop the operand frame of arguments and perform the memo effect
    Perform = 0x51,

    // ===== Fibers (0x60-0x6F) =====
    /// Pop the operand frame `[callee, args...]` into a new fiber
    Spawn = 0x60,
    /// Hand the operand frame to the awaiting fiber
    Yield = 0x61,
    /// Pop a fiber handle and wait for its next value
    Await = 0x62,
    /// Bottom-of-tape sentinel: the fiber is done
    LandSuccess = 0x6F,
}

impl Opcode {
    pub const ALL: [Opcode; 27] = [
        Opcode::Eval,
        Opcode::Push,
        Opcode::Pop,
        Opcode::Lookup,
        Opcode::PushFrame,
        Opcode::CollapseFrame,
        Opcode::KeepLast,
        Opcode::MakeList,
        Opcode::MakeMap,
        Opcode::Define,
        Opcode::Assign,
        Opcode::BindContinuation,
        Opcode::Apply,
        Opcode::Invoke,
        Opcode::GetMember,
        Opcode::Index,
        Opcode::Jump,
        Opcode::JumpIfFalse,
        Opcode::LoopIter,
        Opcode::ForeachStart,
        Opcode::ForeachIter,
        Opcode::InstallHandlers,
        Opcode::Perform,
        Opcode::Spawn,
        Opcode::Yield,
        Opcode::Await,
        Opcode::LandSuccess,
    ];
}

impl TryFrom<u8> for Opcode {
    type Error = ();

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Opcode::ALL
            .iter()
            .copied()
            .find(|op| *op as u8 == byte)
            .ok_or(())
    }
}

/// `while`/`for` loop record, shared by every iteration
#[derive(Debug, Clone)]
pub struct LoopSpec {
    pub cond: NodeRef,
    pub step: Option<NodeRef>,
    pub body: Arc<[NodeRef]>,
}

/// `foreach` cursor; each iteration emits a new one with `index + 1`
#[derive(Debug, Clone)]
pub struct ForeachState {
    pub name: Arc<str>,
    pub items: Arc<[Value]>,
    pub index: usize,
    pub body: Arc<[NodeRef]>,
}

/// Continuation to capture when a `BindContinuation` runs
#[derive(Debug, Clone)]
pub struct ContinuationBinding {
    pub name: Arc<str>,
    /// Absolute tape index the continuation resumes at
    pub resume_at: usize,
    /// Scope restored on resume
    pub scope: ScopeId,
}

/// Opcode-specific payload
#[derive(Debug, Clone, Default)]
pub enum Memo {
    #[default]
    None,
    Value(Value),
    Node(NodeRef),
    Index(usize),
    Name(Arc<str>),
    Names(Arc<[Arc<str>]>),
    Values(Arc<[Value]>),
    Loop(Arc<LoopSpec>),
    Foreach(Arc<ForeachState>),
    Bind(ContinuationBinding),
}

impl fmt::Display for Memo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Memo::None => Ok(()),
            Memo::Value(v) => write!(f, "{}", v),
            Memo::Node(n) => write!(f, "{}", n.summary()),
            Memo::Index(i) => write!(f, "->{}", i),
            Memo::Name(n) => write!(f, "{}", n),
            Memo::Names(ns) => write!(f, "[{}]", ns.join(" ")),
            Memo::Values(vs) => {
                let items: Vec<String> = vs.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", items.join(", "))
            }
            Memo::Loop(_) => write!(f, "loop"),
            Memo::Foreach(st) => write!(f, "{} {}/{}", st.name, st.index, st.items.len()),
            Memo::Bind(b) => write!(f, "{} ->{} {}", b.name, b.resume_at, b.scope),
        }
    }
}

/// One entry of an instruction tape
#[derive(Debug, Clone)]
pub struct Instruction {
    pub opcode: Opcode,
    pub scope: ScopeId,
    pub memo: Memo,
    pub comment: Option<&'static str>,
}

impl Instruction {
    pub fn new(opcode: Opcode, scope: ScopeId, memo: Memo) -> Self {
        Self {
            opcode,
            scope,
            memo,
            comment: None,
        }
    }

    pub fn bare(opcode: Opcode, scope: ScopeId) -> Self {
        Self::new(opcode, scope, Memo::None)
    }

    pub fn eval(scope: ScopeId, node: NodeRef) -> Self {
        Self::new(Opcode::Eval, scope, Memo::Node(node))
    }

    pub fn push(scope: ScopeId, value: Value) -> Self {
        Self::new(Opcode::Push, scope, Memo::Value(value))
    }

    pub fn named(opcode: Opcode, scope: ScopeId, name: Arc<str>) -> Self {
        Self::new(opcode, scope, Memo::Name(name))
    }

    pub fn jump(opcode: Opcode, scope: ScopeId, target: usize) -> Self {
        Self::new(opcode, scope, Memo::Index(target))
    }

    pub fn with_comment(mut self, comment: &'static str) -> Self {
        self.comment = Some(comment);
        self
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {}", self.opcode, self.scope)?;
        if !matches!(self.memo, Memo::None) {
            write!(f, " {}", self.memo)?;
        }
        if let Some(comment) = self.comment {
            write!(f, "  ; {}", comment)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::build;

    #[test]
    fn test_opcode_byte_roundtrip() {
        for op in Opcode::ALL {
            assert_eq!(Opcode::try_from(op as u8), Ok(op));
        }
        assert_eq!(Opcode::try_from(0xFF), Err(()));
    }

    #[test]
    fn test_instruction_display() {
        let instr = Instruction::eval(ScopeId(1), build::ident("x")).with_comment("lookup");
        assert_eq!(instr.to_string(), "Eval s1 x  ; lookup");
        let jump = Instruction::jump(Opcode::JumpIfFalse, ScopeId(2), 7);
        assert_eq!(jump.to_string(), "JumpIfFalse s2 ->7");
        assert_eq!(Instruction::bare(Opcode::Pop, ScopeId(1)).to_string(), "Pop s1");
    }
}
