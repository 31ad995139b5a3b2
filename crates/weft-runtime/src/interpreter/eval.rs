//! Node lowering, operand frames and bindings

use super::{bad_memo, emit_block};
use crate::instruction::{Instruction, Memo, Opcode};
use crate::node::Node;
use crate::value::{Lambda, RuntimeError, Value, ValueArray, ValueMap};
use crate::vm::Machine;
use std::sync::Arc;

/// Lower one node level
pub(crate) fn op_eval(m: &mut Machine, instr: Instruction) -> Result<(), RuntimeError> {
    let Memo::Node(node) = &instr.memo else {
        return Err(bad_memo(&instr));
    };
    let scope = instr.scope;

    match node.as_ref() {
        Node::Literal(value) => m.push(value.clone()),
        Node::Ident(name) => m.emit(Instruction::named(Opcode::Lookup, scope, name.clone())),
        Node::List(items) => m.batch(|m| {
            m.emit(Instruction::bare(Opcode::PushFrame, scope))?;
            for item in items.iter() {
                m.emit(Instruction::eval(scope, item.clone()))?;
            }
            m.emit(Instruction::bare(Opcode::MakeList, scope))
        }),
        Node::Map(entries) => m.batch(|m| {
            m.emit(Instruction::bare(Opcode::PushFrame, scope))?;
            for (_, value) in entries.iter() {
                m.emit(Instruction::eval(scope, value.clone()))?;
            }
            let keys: Vec<Arc<str>> = entries.iter().map(|(k, _)| k.clone()).collect();
            m.emit(Instruction::new(
                Opcode::MakeMap,
                scope,
                Memo::Names(keys.into()),
            ))
        }),
        Node::Lambda { params, body } => m.push(Value::Lambda(Arc::new(Lambda {
            name: None,
            params: params.clone(),
            body: body.clone(),
            scope,
        }))),
        Node::Block(items) => emit_block(m, scope, items),
        Node::Call { head, args } => {
            let expander = head
                .as_ident()
                .and_then(|keyword| m.registry.macro_for(keyword));
            if let Some(expand) = expander {
                return expand(m, scope, args);
            }
            m.batch(|m| {
                m.emit(Instruction::bare(Opcode::PushFrame, scope))?;
                m.emit(Instruction::eval(scope, head.clone()))?;
                for arg in args.iter() {
                    m.emit(Instruction::eval(scope, arg.clone()))?;
                }
                m.emit(Instruction::bare(Opcode::Apply, scope))
            })
        }
        Node::Member { object, name } => m.batch(|m| {
            m.emit(Instruction::eval(scope, object.clone()))?;
            m.emit(Instruction::named(Opcode::GetMember, scope, name.clone()))
        }),
        Node::Index { target, index } => m.batch(|m| {
            m.emit(Instruction::eval(scope, target.clone()))?;
            m.emit(Instruction::eval(scope, index.clone()))?;
            m.emit(Instruction::bare(Opcode::Index, scope))
        }),
    }
}

pub(crate) fn op_push(m: &mut Machine, instr: Instruction) -> Result<(), RuntimeError> {
    match instr.memo {
        Memo::Value(value) => m.push(value),
        _ => Err(bad_memo(&instr)),
    }
}

pub(crate) fn op_pop(m: &mut Machine, _instr: Instruction) -> Result<(), RuntimeError> {
    m.pop().map(drop)
}

pub(crate) fn op_lookup(m: &mut Machine, instr: Instruction) -> Result<(), RuntimeError> {
    let Memo::Name(name) = &instr.memo else {
        return Err(bad_memo(&instr));
    };
    let value = m.scopes.lookup(instr.scope, name)?.clone();
    m.push(value)
}

pub(crate) fn op_push_frame(m: &mut Machine, _instr: Instruction) -> Result<(), RuntimeError> {
    m.fiber_mut()?.operands.push_frame();
    Ok(())
}

pub(crate) fn op_collapse_frame(m: &mut Machine, _instr: Instruction) -> Result<(), RuntimeError> {
    let fiber = m.fiber_mut()?;
    if !fiber.operands.pop_frame_and_push_top_val()? {
        fiber.operands.push_value(Value::Null);
    }
    Ok(())
}

pub(crate) fn op_keep_last(m: &mut Machine, _instr: Instruction) -> Result<(), RuntimeError> {
    let fiber = m.fiber_mut()?;
    let mut values = fiber.operands.peek_and_clear_frame_all_values()?;
    fiber
        .operands
        .push_value(values.pop().unwrap_or(Value::Null));
    Ok(())
}

pub(crate) fn op_make_list(m: &mut Machine, _instr: Instruction) -> Result<(), RuntimeError> {
    let values = m.pop_frame()?;
    m.push(Value::List(ValueArray::from_vec(values)))
}

pub(crate) fn op_make_map(m: &mut Machine, instr: Instruction) -> Result<(), RuntimeError> {
    let Memo::Names(keys) = &instr.memo else {
        return Err(bad_memo(&instr));
    };
    let values = m.pop_frame()?;
    if values.len() != keys.len() {
        return Err(RuntimeError::invalid_operand(format!(
            "map literal has {} keys but {} values",
            keys.len(),
            values.len()
        )));
    }
    let map: ValueMap = keys
        .iter()
        .map(|k| k.to_string())
        .zip(values)
        .collect();
    m.push(Value::Map(map))
}

pub(crate) fn op_define(m: &mut Machine, instr: Instruction) -> Result<(), RuntimeError> {
    let Memo::Name(name) = &instr.memo else {
        return Err(bad_memo(&instr));
    };
    let value = match m.pop()? {
        // First binding names an anonymous lambda
        Value::Lambda(l) if l.name.is_none() => Value::Lambda(Arc::new(Lambda {
            name: Some(name.clone()),
            ..(*l).clone()
        })),
        other => other,
    };
    m.scopes.define(instr.scope, name, value.clone());
    m.push(value)
}

pub(crate) fn op_assign(m: &mut Machine, instr: Instruction) -> Result<(), RuntimeError> {
    let Memo::Name(name) = &instr.memo else {
        return Err(bad_memo(&instr));
    };
    let value = m.pop()?;
    m.scopes.assign(instr.scope, name, value.clone())?;
    m.push(value)
}

pub(crate) fn op_index(m: &mut Machine, _instr: Instruction) -> Result<(), RuntimeError> {
    let index = m.pop()?;
    let target = m.pop()?;
    let value = index_value(&target, &index)?;
    m.push(value)
}

fn index_value(target: &Value, index: &Value) -> Result<Value, RuntimeError> {
    match (target, index) {
        (Value::List(items), Value::Int(i)) => usize::try_from(*i)
            .ok()
            .and_then(|i| items.get(i))
            .cloned()
            .ok_or_else(|| {
                RuntimeError::invalid_operand(format!(
                    "list index {} out of range for length {}",
                    i,
                    items.len()
                ))
            }),
        (Value::Map(map), Value::Str(key)) => Ok(map.get(key).cloned().unwrap_or(Value::Null)),
        (Value::Str(s), Value::Int(i)) => usize::try_from(*i)
            .ok()
            .and_then(|i| s.chars().nth(i))
            .map(|c| Value::string(c.to_string()))
            .ok_or_else(|| {
                RuntimeError::invalid_operand(format!("string index {} out of range", i))
            }),
        (target, index) => Err(RuntimeError::invalid_operand(format!(
            "cannot index a {} with a {}",
            target.type_name(),
            index.type_name()
        ))),
    }
}
