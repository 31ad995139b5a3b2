//! Function application and member access

use super::{bad_memo, emit_block, RETURN};
use crate::fiber::SuspendReason;
use crate::instruction::{Instruction, Memo};
use crate::method_dispatch::TypeTag;
use crate::scope::{ScopeId, ScopeKind};
use crate::value::{BoundMethod, HostCallable, HostFunction, Lambda, RuntimeError, Value};
use crate::vm::Machine;
use std::sync::Arc;
use weft_config::ArityPolicy;

/// Pop the operand frame `[callee, args...]` and apply it
pub(crate) fn op_apply(m: &mut Machine, instr: Instruction) -> Result<(), RuntimeError> {
    let mut values = m.pop_frame()?.into_iter();
    let callee = values.next().ok_or(RuntimeError::StackUnderflow)?;
    apply_value(m, instr.scope, callee, values.collect())
}

/// Apply the memo values `[callee, args...]`
pub(crate) fn op_invoke(m: &mut Machine, instr: Instruction) -> Result<(), RuntimeError> {
    let Memo::Values(values) = &instr.memo else {
        return Err(bad_memo(&instr));
    };
    let Some((callee, args)) = values.split_first() else {
        return Err(RuntimeError::invalid_operand("invoke needs a callee"));
    };
    apply_value(m, instr.scope, callee.clone(), args.to_vec())
}

/// Apply `callee` to `args` on behalf of code running in `caller_scope`
pub(crate) fn apply_value(
    m: &mut Machine,
    caller_scope: ScopeId,
    callee: Value,
    mut args: Vec<Value>,
) -> Result<(), RuntimeError> {
    match callee {
        Value::Lambda(lambda) => apply_lambda(m, caller_scope, &lambda, args),
        Value::Host(host) => apply_host(m, &host, args),
        Value::BoundMethod(bound) => {
            let target = resolve_method(m, &bound)?;
            args.insert(0, bound.receiver.clone());
            apply_value(m, caller_scope, target, args)
        }
        Value::Continuation(k) => {
            let value = match args.len() {
                0 => Value::Null,
                1 => args.pop().unwrap_or(Value::Null),
                _ => Value::list(args),
            };
            m.resume(&k, value)
        }
        other => Err(RuntimeError::invalid_operand(format!(
            "cannot apply a {}",
            other.type_name()
        ))),
    }
}

fn apply_lambda(
    m: &mut Machine,
    caller_scope: ScopeId,
    lambda: &Lambda,
    args: Vec<Value>,
) -> Result<(), RuntimeError> {
    if m.config.arity() == ArityPolicy::Strict && args.len() != lambda.params.len() {
        return Err(RuntimeError::ArityMismatch {
            name: lambda.display_name().to_string(),
            expected: lambda.params.len(),
            found: args.len(),
        });
    }

    let scope = m
        .scopes
        .create_child(ScopeKind::Local, Some(lambda.scope), lambda.name.clone());
    let mut args = args.into_iter();
    for param in lambda.params.iter() {
        m.scopes
            .define(scope, param, args.next().unwrap_or(Value::Null));
    }

    let ret = m.capture_at(m.tape_top()?, caller_scope)?;
    m.scopes
        .define(scope, RETURN, Value::Continuation(Arc::new(ret)));

    emit_block(m, scope, &lambda.body)
}

fn apply_host(m: &mut Machine, host: &HostFunction, args: Vec<Value>) -> Result<(), RuntimeError> {
    match &host.callable {
        HostCallable::Sync(f) => {
            let value = f(&args)?;
            m.push(value)
        }
        HostCallable::Suspending(f) => {
            let id = m.scheduler.current_id()?;
            f(args, m.scheduler.waker(id))?;
            m.scheduler.suspend_current(SuspendReason::External)?;
            Ok(())
        }
    }
}

/// The receiver's own callable field first, then the builtin method table
fn resolve_method(m: &Machine, bound: &BoundMethod) -> Result<Value, RuntimeError> {
    if let Value::Map(map) = &bound.receiver {
        if let Some(field) = map.get(&bound.name) {
            if field.is_callable() {
                return Ok(field.clone());
            }
        }
    }
    m.methods
        .resolve(TypeTag::of(&bound.receiver), &bound.name)
        .map(|host| Value::Host(host.clone()))
        .ok_or_else(|| no_method(&bound.receiver, &bound.name))
}

/// Pop a receiver; push its plain field, or a bound method
pub(crate) fn op_get_member(m: &mut Machine, instr: Instruction) -> Result<(), RuntimeError> {
    let Memo::Name(name) = &instr.memo else {
        return Err(bad_memo(&instr));
    };
    let receiver = m.pop()?;

    let own_field = match &receiver {
        Value::Map(map) => map.get(name).cloned(),
        _ => None,
    };
    match own_field {
        Some(field) if !field.is_callable() => m.push(field),
        Some(_) => push_bound(m, receiver, name.clone()),
        None if m.methods.resolve(TypeTag::of(&receiver), name).is_some() => {
            push_bound(m, receiver, name.clone())
        }
        None => Err(no_method(&receiver, name)),
    }
}

fn push_bound(m: &mut Machine, receiver: Value, name: Arc<str>) -> Result<(), RuntimeError> {
    m.push(Value::BoundMethod(Arc::new(BoundMethod { receiver, name })))
}

fn no_method(receiver: &Value, name: &str) -> RuntimeError {
    RuntimeError::invalid_operand(format!(
        "{} has no field or method '{}'",
        receiver.type_name(),
        name
    ))
}
