//! Operation registry
//!
//! Opcodes map to handler functions through a 256-entry table indexed by the
//! opcode byte, so dispatch is one array load. Macro keywords map to
//! expander functions that lower a `Call` node into instructions instead of
//! applying a function. Embedders add keywords through
//! [`Runtime::register_macro`](crate::Runtime::register_macro); an expander
//! emits through [`Machine::batch`] and [`Machine::emit`].

use crate::instruction::{Instruction, Opcode};
use crate::interpreter::{apply, control, effects, eval, fibers};
use crate::node::NodeRef;
use crate::scope::ScopeId;
use crate::value::RuntimeError;
use crate::vm::Machine;
use std::collections::HashMap;

/// Executes one dispatched instruction
pub type OpHandler = fn(&mut Machine, Instruction) -> Result<(), RuntimeError>;

/// Lowers the arguments of a macro call evaluated in `scope`
pub type MacroExpander = fn(&mut Machine, ScopeId, &[NodeRef]) -> Result<(), RuntimeError>;

/// Static table of the core handlers, indexed by opcode byte.
static CORE_HANDLERS: [Option<OpHandler>; 256] = {
    let mut table: [Option<OpHandler>; 256] = [None; 256];

    // Evaluation (0x01-0x04)
    table[Opcode::Eval as usize] = Some(eval::op_eval as OpHandler);
    table[Opcode::Push as usize] = Some(eval::op_push as OpHandler);
    table[Opcode::Pop as usize] = Some(eval::op_pop as OpHandler);
    table[Opcode::Lookup as usize] = Some(eval::op_lookup as OpHandler);

    // Frames (0x10-0x14)
    table[Opcode::PushFrame as usize] = Some(eval::op_push_frame as OpHandler);
    table[Opcode::CollapseFrame as usize] = Some(eval::op_collapse_frame as OpHandler);
    table[Opcode::KeepLast as usize] = Some(eval::op_keep_last as OpHandler);
    table[Opcode::MakeList as usize] = Some(eval::op_make_list as OpHandler);
    table[Opcode::MakeMap as usize] = Some(eval::op_make_map as OpHandler);

    // Bindings (0x20-0x22)
    table[Opcode::Define as usize] = Some(eval::op_define as OpHandler);
    table[Opcode::Assign as usize] = Some(eval::op_assign as OpHandler);
    table[Opcode::BindContinuation as usize] = Some(control::op_bind_continuation as OpHandler);

    // Application (0x30-0x33)
    table[Opcode::Apply as usize] = Some(apply::op_apply as OpHandler);
    table[Opcode::Invoke as usize] = Some(apply::op_invoke as OpHandler);
    table[Opcode::GetMember as usize] = Some(apply::op_get_member as OpHandler);
    table[Opcode::Index as usize] = Some(eval::op_index as OpHandler);

    // Control flow (0x40-0x44)
    table[Opcode::Jump as usize] = Some(control::op_jump as OpHandler);
    table[Opcode::JumpIfFalse as usize] = Some(control::op_jump_if_false as OpHandler);
    table[Opcode::LoopIter as usize] = Some(control::op_loop_iter as OpHandler);
    table[Opcode::ForeachStart as usize] = Some(control::op_foreach_start as OpHandler);
    table[Opcode::ForeachIter as usize] = Some(control::op_foreach_iter as OpHandler);

    // Effects (0x50-0x51)
    table[Opcode::InstallHandlers as usize] = Some(effects::op_install_handlers as OpHandler);
    table[Opcode::Perform as usize] = Some(effects::op_perform as OpHandler);

    // Fibers (0x60-0x6F)
    table[Opcode::Spawn as usize] = Some(fibers::op_spawn as OpHandler);
    table[Opcode::Yield as usize] = Some(fibers::op_yield as OpHandler);
    table[Opcode::Await as usize] = Some(fibers::op_await as OpHandler);
    table[Opcode::LandSuccess as usize] = Some(fibers::op_land_success as OpHandler);

    table
};

/// Opcode handlers plus macro expanders
#[derive(Clone)]
pub struct OperationRegistry {
    handlers: [Option<OpHandler>; 256],
    macros: HashMap<String, MacroExpander>,
}

impl OperationRegistry {
    /// Registry with every core opcode and keyword
    pub fn with_core() -> Self {
        let mut registry = Self {
            handlers: CORE_HANDLERS,
            macros: HashMap::new(),
        };
        registry.register_macro("if", control::expand_if);
        registry.register_macro("cond", control::expand_cond);
        registry.register_macro("var", control::expand_var);
        registry.register_macro("set", control::expand_set);
        registry.register_macro("while", control::expand_while);
        registry.register_macro("for", control::expand_for);
        registry.register_macro("foreach", control::expand_foreach);
        registry.register_macro("try", effects::expand_try);
        registry.register_macro("perform", effects::expand_perform);
        registry.register_macro("spawn", fibers::expand_spawn);
        registry.register_macro("yield", fibers::expand_yield);
        registry.register_macro("await", fibers::expand_await);
        registry
    }

    /// Handler for an opcode, if registered
    #[inline(always)]
    pub fn handler(&self, opcode: Opcode) -> Option<OpHandler> {
        self.handlers[opcode as usize]
    }

    /// Register (or replace) the expander for `keyword`
    pub fn register_macro(&mut self, keyword: &str, expander: MacroExpander) {
        self.macros.insert(keyword.to_string(), expander);
    }

    pub fn macro_for(&self, keyword: &str) -> Option<MacroExpander> {
        self.macros.get(keyword).copied()
    }

    /// Registered keywords, sorted
    pub fn keywords(&self) -> Vec<&str> {
        let mut keywords: Vec<&str> = self.macros.keys().map(String::as_str).collect();
        keywords.sort_unstable();
        keywords
    }
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::with_core()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_opcode_has_a_core_handler() {
        let registry = OperationRegistry::with_core();
        for op in Opcode::ALL {
            assert!(registry.handler(op).is_some(), "missing handler for {:?}", op);
        }
    }

    #[test]
    fn test_core_keywords() {
        let registry = OperationRegistry::with_core();
        assert_eq!(
            registry.keywords(),
            vec![
                "await", "cond", "for", "foreach", "if", "perform", "set", "spawn", "try", "var",
                "while", "yield"
            ]
        );
        assert!(registry.macro_for("unless").is_none());
    }
}
