//! Algebraic effects: `try`, `perform` and `handle`
//!
//! `(try body... (handle name handler)...)` creates a scope holding two
//! reserved bindings: `*try-exit*`, a continuation for "right after the
//! try", and `*handlers*`, a map from effect name to handler.
//!
//! `(perform name args...)` searches the lexical scope chain of the perform
//! itself for the nearest `*handlers*` map containing `name`. It captures a
//! `resume` continuation for "right after the perform", unwinds to the
//! matching try-exit continuation and applies the handler to
//! `(resume, args...)`. Whatever the handler returns becomes the value of
//! the whole `try`, unless it calls `resume` first.

use super::apply::apply_value;
use super::{bad_memo, emit_block, name_arg, HANDLERS, TRY_EXIT};
use crate::continuation::Continuation;
use crate::fiber::FiberId;
use crate::instruction::{Instruction, Memo, Opcode};
use crate::node::{Node, NodeRef};
use crate::scope::{ScopeGraph, ScopeId, ScopeKind};
use crate::value::{RuntimeError, Value, ValueMap};
use crate::vm::Machine;
use std::sync::Arc;
use tracing::trace;

/// Handler found for an effect, with the try it belongs to
pub(crate) struct HandlerMatch {
    pub(crate) handler: Value,
    pub(crate) exit: Arc<Continuation>,
}

/// Nearest handler for `effect` on the lexical chain starting at `from`
///
/// Only a `try` entered on `fiber` counts: a closure spawned inside a try
/// sees its handlers lexically but cannot unwind to its exit.
pub(crate) fn find_handler(
    scopes: &ScopeGraph,
    from: ScopeId,
    fiber: FiberId,
    effect: &str,
) -> Option<HandlerMatch> {
    scopes.ancestors(from).find_map(|scope| {
        let Some(Value::Map(handlers)) = scope.get(HANDLERS) else {
            return None;
        };
        let handler = handlers.get(effect)?;
        match scope.get(TRY_EXIT) {
            Some(Value::Continuation(exit)) if exit.fiber() == fiber => Some(HandlerMatch {
                handler: handler.clone(),
                exit: exit.clone(),
            }),
            _ => None,
        }
    })
}

/// Unwind to the handler's try and apply it to `(resume, args...)`
pub(crate) fn perform_with(
    m: &mut Machine,
    scope: ScopeId,
    found: HandlerMatch,
    args: Vec<Value>,
) -> Result<(), RuntimeError> {
    let resume = m.capture_at(m.tape_top()?, scope)?;
    found.exit.restore_into(m.fiber_mut()?);

    let mut full = Vec::with_capacity(args.len() + 1);
    full.push(Value::Continuation(Arc::new(resume)));
    full.extend(args);
    apply_value(m, found.exit.scope(), found.handler, full)
}

/// `(try body... (handle name handler)...)`
pub(crate) fn expand_try(
    m: &mut Machine,
    scope: ScopeId,
    args: &[NodeRef],
) -> Result<(), RuntimeError> {
    let mut names: Vec<Arc<str>> = Vec::new();
    let mut handlers: Vec<NodeRef> = Vec::new();
    let mut body: Vec<NodeRef> = Vec::new();
    for arg in args {
        match handle_clause(arg)? {
            Some((name, handler)) => {
                names.push(name);
                handlers.push(handler);
            }
            None => body.push(arg.clone()),
        }
    }

    let exit = m.capture_at(m.tape_top()?, scope)?;
    let try_scope = m
        .scopes
        .create_child(ScopeKind::Local, Some(scope), Some("try".into()));
    m.scopes
        .define(try_scope, TRY_EXIT, Value::Continuation(Arc::new(exit)));

    m.batch(|m| {
        // Handlers close over the enclosing scope, so a perform inside a
        // handler reaches the next try out
        m.emit(Instruction::bare(Opcode::PushFrame, scope))?;
        for handler in handlers {
            m.emit(Instruction::eval(scope, handler))?;
        }
        m.emit(Instruction::new(
            Opcode::InstallHandlers,
            try_scope,
            Memo::Names(names.into()),
        ))?;
        emit_block(m, try_scope, &body)
    })
}

/// `(handle name handler)` inside a try, as (name, handler)
fn handle_clause(node: &NodeRef) -> Result<Option<(Arc<str>, NodeRef)>, RuntimeError> {
    let Node::Call { head, args } = node.as_ref() else {
        return Ok(None);
    };
    if head.as_ident().map(|h| h.as_ref()) != Some("handle") {
        return Ok(None);
    }
    let [name, handler] = args.as_ref() else {
        return Err(RuntimeError::invalid_operand(
            "handle expects an effect name and a handler",
        ));
    };
    Ok(Some((name_arg(name, "handle")?, handler.clone())))
}

/// Close the frame of handler values into the scope's `*handlers*` map
pub(crate) fn op_install_handlers(
    m: &mut Machine,
    instr: Instruction,
) -> Result<(), RuntimeError> {
    let Memo::Names(names) = &instr.memo else {
        return Err(bad_memo(&instr));
    };
    let values = m.pop_frame()?;
    if values.len() != names.len() {
        return Err(RuntimeError::StackUnderflow);
    }
    let handlers: ValueMap = names.iter().map(|n| n.to_string()).zip(values).collect();
    m.scopes
        .define(instr.scope, HANDLERS, Value::Map(handlers));
    Ok(())
}

/// `(perform name args...)`
pub(crate) fn expand_perform(
    m: &mut Machine,
    scope: ScopeId,
    args: &[NodeRef],
) -> Result<(), RuntimeError> {
    let Some((name, args)) = args.split_first() else {
        return Err(RuntimeError::invalid_operand("perform expects an effect name"));
    };
    let name = name_arg(name, "perform")?;
    m.batch(|m| {
        m.emit(Instruction::bare(Opcode::PushFrame, scope))?;
        for arg in args {
            m.emit(Instruction::eval(scope, arg.clone()))?;
        }
        m.emit(Instruction::named(Opcode::Perform, scope, name))
    })
}

pub(crate) fn op_perform(m: &mut Machine, instr: Instruction) -> Result<(), RuntimeError> {
    let Memo::Name(effect) = &instr.memo else {
        return Err(bad_memo(&instr));
    };
    let args = m.pop_frame()?;
    let fiber = m.scheduler.current_id()?;
    let found = find_handler(&m.scopes, instr.scope, fiber, effect).ok_or_else(|| {
        RuntimeError::EffectNotHandled {
            effect: effect.to_string(),
        }
    })?;
    trace!(effect = %effect, args = args.len(), "performing effect");
    perform_with(m, instr.scope, found, args)
}
