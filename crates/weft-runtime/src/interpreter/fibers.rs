//! Fiber primitives: `spawn`, `yield`, `await` and the landing sentinel

use super::bad_memo;
use crate::fiber::{FiberState, SuspendReason};
use crate::instruction::{Instruction, Memo, Opcode};
use crate::node::NodeRef;
use crate::scope::{ScopeId, ScopeKind};
use crate::value::{RuntimeError, Value};
use crate::vm::Machine;
use tracing::debug;

/// `(spawn f args...)`
pub(crate) fn expand_spawn(
    m: &mut Machine,
    scope: ScopeId,
    args: &[NodeRef],
) -> Result<(), RuntimeError> {
    if args.is_empty() {
        return Err(RuntimeError::invalid_operand("spawn expects a function"));
    }
    m.batch(|m| {
        m.emit(Instruction::bare(Opcode::PushFrame, scope))?;
        for arg in args {
            m.emit(Instruction::eval(scope, arg.clone()))?;
        }
        m.emit(Instruction::bare(Opcode::Spawn, scope))
    })
}

/// Pop `[callee, args...]` into a new fiber and push its handle
pub(crate) fn op_spawn(m: &mut Machine, _instr: Instruction) -> Result<(), RuntimeError> {
    let values = m.pop_frame()?;
    match values.first() {
        Some(callee) if callee.is_callable() => {}
        Some(other) => {
            return Err(RuntimeError::invalid_operand(format!(
                "cannot spawn a {}",
                other.type_name()
            )))
        }
        None => return Err(RuntimeError::StackUnderflow),
    }

    let parent = m.scheduler.current_id()?;
    let global = m.scopes.global();
    let process = m
        .scopes
        .create_child(ScopeKind::Process, Some(global), Some("fiber".into()));
    let child = m.scheduler.spawn(parent, process);
    m.scheduler.get_mut(child)?.tape.push_value(Instruction::new(
        Opcode::Invoke,
        process,
        Memo::Values(values.into()),
    ));
    m.push(Value::Fiber(child))
}

/// `(yield value?)`
pub(crate) fn expand_yield(
    m: &mut Machine,
    scope: ScopeId,
    args: &[NodeRef],
) -> Result<(), RuntimeError> {
    let value = match args {
        [] => Instruction::push(scope, Value::Null),
        [value] => Instruction::eval(scope, value.clone()),
        _ => return Err(RuntimeError::invalid_operand("yield expects at most one value")),
    };
    m.batch(|m| {
        m.emit(Instruction::bare(Opcode::PushFrame, scope))?;
        m.emit(value)?;
        m.emit(Instruction::bare(Opcode::Yield, scope))
    })
}

/// Hand the operand frame to the awaiting fiber, or park it in the outbox
///
/// The yielding fiber goes idle; when resumed, `yield` evaluates to Null.
pub(crate) fn op_yield(m: &mut Machine, _instr: Instruction) -> Result<(), RuntimeError> {
    let fiber = m.fiber_mut()?;
    if fiber.is_root() {
        fiber.operands.pop_frame_all_values()?;
        return Err(RuntimeError::invalid_operand("the root fiber cannot yield"));
    }
    let me = fiber.id;

    match fiber.awaited_by.take() {
        Some(awaiter) => {
            m.scheduler.transfer_frame(me, awaiter)?;
            m.scheduler.deliver(me, Value::Null)?;
            m.scheduler.idle_current()?;
            m.scheduler.promote(awaiter);
        }
        None => {
            let mut values = fiber.operands.pop_frame_all_values()?;
            fiber.outbox = Some(values.pop().unwrap_or(Value::Null));
            fiber.operands.push_value(Value::Null);
            m.scheduler.idle_current()?;
        }
    }
    Ok(())
}

/// `(await fiber)`
pub(crate) fn expand_await(
    m: &mut Machine,
    scope: ScopeId,
    args: &[NodeRef],
) -> Result<(), RuntimeError> {
    let [target] = args else {
        return Err(RuntimeError::invalid_operand("await expects one fiber"));
    };
    m.batch(|m| {
        m.emit(Instruction::eval(scope, target.clone()))?;
        m.emit(Instruction::bare(Opcode::Await, scope))
    })
}

pub(crate) fn op_await(m: &mut Machine, _instr: Instruction) -> Result<(), RuntimeError> {
    let target = match m.pop()? {
        Value::Fiber(id) => id,
        other => {
            return Err(RuntimeError::invalid_operand(format!(
                "cannot await a {}",
                other.type_name()
            )))
        }
    };
    let me = m.scheduler.current_id()?;
    if target == me {
        return Err(RuntimeError::invalid_operand("a fiber cannot await itself"));
    }

    let fiber = m.scheduler.get_mut(target)?;
    if let Some(value) = fiber.outbox.take() {
        return m.push(value);
    }
    if fiber.state == FiberState::Dead {
        let value = fiber.result.clone().unwrap_or(Value::Null);
        return m.push(value);
    }
    if let Some(other) = fiber.awaited_by.filter(|other| *other != me) {
        return Err(RuntimeError::invalid_operand(format!(
            "fiber {} is already awaited by fiber {}",
            target, other
        )));
    }
    fiber.awaited_by = Some(me);
    let target_state = fiber.state;

    m.scheduler
        .suspend_current(SuspendReason::Awaiting(target))?;
    if matches!(target_state, FiberState::Idle | FiberState::Runnable) {
        m.scheduler.make_runnable(target)?;
        m.scheduler.promote(target);
    }
    Ok(())
}

/// Bottom-of-tape sentinel
///
/// The root landing ends the evaluation. Any other fiber dies with its top
/// operand as result, delivered to its awaiter if there is one.
pub(crate) fn op_land_success(m: &mut Machine, _instr: Instruction) -> Result<(), RuntimeError> {
    let fiber = m.fiber_mut()?;
    let result = fiber.operands.peek_top().cloned().unwrap_or(Value::Null);
    let is_root = fiber.is_root();
    let awaiter = fiber.awaited_by.take();
    m.scheduler.finish_current(result.clone())?;

    if is_root {
        let abandoned = m.scheduler.fibers().filter(|f| !f.is_dead()).count();
        if abandoned > 0 {
            debug!(abandoned, "root fiber landed with unfinished fibers");
        }
        m.set_finished(result);
        return Ok(());
    }

    if let Some(awaiter) = awaiter {
        m.scheduler.deliver(awaiter, result)?;
        m.scheduler.promote(awaiter);
    }
    Ok(())
}
