//! Conditionals, bindings and loops
//!
//! Expanders run when the `Eval` of their call node is dispatched, so the
//! tape below is exactly what follows the form and `tape_top()` is a valid
//! resume point for "after this form".
//!
//! Loops hold one operand frame with the latest body value. Each iteration
//! is expanded fresh from the tape top at the time it starts:
//!
//! ```text
//! Eval cond
//! JumpIfFalse -> iteration base
//! BindContinuation continue -> after the body
//! <body block>
//! KeepLast
//! [Eval step, Pop]
//! LoopIter
//! ```

use super::{bad_memo, emit_block, name_arg, BREAK, CONTINUE};
use crate::instruction::{
    ContinuationBinding, ForeachState, Instruction, LoopSpec, Memo, Opcode,
};
use crate::node::NodeRef;
use crate::scope::{ScopeId, ScopeKind};
use crate::value::{RuntimeError, Value};
use crate::vm::Machine;
use std::sync::Arc;

// ===== Jumps =====

pub(crate) fn op_jump(m: &mut Machine, instr: Instruction) -> Result<(), RuntimeError> {
    let Memo::Index(target) = instr.memo else {
        return Err(bad_memo(&instr));
    };
    m.fiber_mut()?.tape.jump_to(target)
}

pub(crate) fn op_jump_if_false(m: &mut Machine, instr: Instruction) -> Result<(), RuntimeError> {
    let Memo::Index(target) = instr.memo else {
        return Err(bad_memo(&instr));
    };
    if !m.pop()?.is_truthy() {
        m.fiber_mut()?.tape.jump_to(target)?;
    }
    Ok(())
}

pub(crate) fn op_bind_continuation(
    m: &mut Machine,
    instr: Instruction,
) -> Result<(), RuntimeError> {
    let Memo::Bind(binding) = &instr.memo else {
        return Err(bad_memo(&instr));
    };
    let k = m.capture_at(binding.resume_at, binding.scope)?;
    m.scopes
        .define(instr.scope, &binding.name, Value::Continuation(Arc::new(k)));
    Ok(())
}

fn bind(name: &str, scope: ScopeId, resume_at: usize, resume_scope: ScopeId) -> Instruction {
    Instruction::new(
        Opcode::BindContinuation,
        scope,
        Memo::Bind(ContinuationBinding {
            name: name.into(),
            resume_at,
            scope: resume_scope,
        }),
    )
}

// ===== Conditionals =====

/// `(if cond then else?)`
pub(crate) fn expand_if(
    m: &mut Machine,
    scope: ScopeId,
    args: &[NodeRef],
) -> Result<(), RuntimeError> {
    let (cond, then, otherwise) = match args {
        [cond, then] => (cond, then, None),
        [cond, then, otherwise] => (cond, then, Some(otherwise)),
        _ => {
            return Err(RuntimeError::invalid_operand(
                "if expects a condition, a branch and an optional else branch",
            ))
        }
    };

    let base = m.tape_top()?;
    m.batch(|m| {
        m.emit(Instruction::eval(scope, cond.clone()))?;
        m.emit(Instruction::jump(Opcode::JumpIfFalse, scope, base + 1))?;
        m.emit(Instruction::eval(scope, then.clone()))?;
        m.emit(Instruction::jump(Opcode::Jump, scope, base))?;
        m.emit(match otherwise {
            Some(node) => Instruction::eval(scope, node.clone()),
            None => Instruction::push(scope, Value::Null).with_comment("no else branch"),
        })
    })
}

/// `(cond c1 e1 c2 e2 ... default?)`
pub(crate) fn expand_cond(
    m: &mut Machine,
    scope: ScopeId,
    args: &[NodeRef],
) -> Result<(), RuntimeError> {
    let clauses: Vec<&[NodeRef]> = args.chunks_exact(2).collect();
    let default = args.chunks_exact(2).remainder().first();

    // Four instructions per clause plus the default
    let total = 4 * clauses.len() + 1;
    let base = m.tape_top()?;
    m.batch(|m| {
        for (i, clause) in clauses.iter().enumerate() {
            let next_clause = base + total - 4 * (i + 1);
            m.emit(Instruction::eval(scope, clause[0].clone()))?;
            m.emit(Instruction::jump(Opcode::JumpIfFalse, scope, next_clause))?;
            m.emit(Instruction::eval(scope, clause[1].clone()))?;
            m.emit(Instruction::jump(Opcode::Jump, scope, base))?;
        }
        m.emit(match default {
            Some(node) => Instruction::eval(scope, node.clone()),
            None => Instruction::push(scope, Value::Null).with_comment("no clause matched"),
        })
    })
}

// ===== Bindings =====

/// `(var name expr?)`
pub(crate) fn expand_var(
    m: &mut Machine,
    scope: ScopeId,
    args: &[NodeRef],
) -> Result<(), RuntimeError> {
    let (name, expr) = match args {
        [name] => (name, None),
        [name, expr] => (name, Some(expr)),
        _ => return Err(RuntimeError::invalid_operand("var expects a name and a value")),
    };
    let name = name_arg(name, "var")?;
    m.batch(|m| {
        m.emit(match expr {
            Some(expr) => Instruction::eval(scope, expr.clone()),
            None => Instruction::push(scope, Value::Null),
        })?;
        m.emit(Instruction::named(Opcode::Define, scope, name))
    })
}

/// `(set name expr)`
pub(crate) fn expand_set(
    m: &mut Machine,
    scope: ScopeId,
    args: &[NodeRef],
) -> Result<(), RuntimeError> {
    let [name, expr] = args else {
        return Err(RuntimeError::invalid_operand("set expects a name and a value"));
    };
    let name = name_arg(name, "set")?;
    m.batch(|m| {
        m.emit(Instruction::eval(scope, expr.clone()))?;
        m.emit(Instruction::named(Opcode::Assign, scope, name))
    })
}

// ===== Loops =====

/// `(while cond body...)`
pub(crate) fn expand_while(
    m: &mut Machine,
    scope: ScopeId,
    args: &[NodeRef],
) -> Result<(), RuntimeError> {
    let Some((cond, body)) = args.split_first() else {
        return Err(RuntimeError::invalid_operand("while expects a condition"));
    };
    let spec = LoopSpec {
        cond: cond.clone(),
        step: None,
        body: body.into(),
    };
    emit_loop(m, scope, "while", None, spec)
}

/// `(for init cond step body...)`
pub(crate) fn expand_for(
    m: &mut Machine,
    scope: ScopeId,
    args: &[NodeRef],
) -> Result<(), RuntimeError> {
    let [init, cond, step, body @ ..] = args else {
        return Err(RuntimeError::invalid_operand(
            "for expects an initializer, a condition and a step",
        ));
    };
    let spec = LoopSpec {
        cond: cond.clone(),
        step: Some(step.clone()),
        body: body.into(),
    };
    emit_loop(m, scope, "for", Some(init.clone()), spec)
}

fn emit_loop(
    m: &mut Machine,
    scope: ScopeId,
    label: &str,
    init: Option<NodeRef>,
    spec: LoopSpec,
) -> Result<(), RuntimeError> {
    let exit = m.tape_top()?;
    let loop_scope = m
        .scopes
        .create_child(ScopeKind::Local, Some(scope), Some(label.into()));

    m.batch(|m| {
        m.emit(bind(BREAK, loop_scope, exit, scope))?;
        if let Some(init) = init {
            m.emit(Instruction::eval(loop_scope, init))?;
            m.emit(Instruction::bare(Opcode::Pop, loop_scope))?;
        }
        m.emit(Instruction::bare(Opcode::PushFrame, loop_scope))?;
        m.emit(Instruction::new(
            Opcode::LoopIter,
            loop_scope,
            Memo::Loop(Arc::new(spec)),
        ))?;
        m.emit(Instruction::bare(Opcode::CollapseFrame, loop_scope).with_comment("loop value"))
    })
}

/// Expand one `while`/`for` iteration
pub(crate) fn op_loop_iter(m: &mut Machine, instr: Instruction) -> Result<(), RuntimeError> {
    let Memo::Loop(spec) = &instr.memo else {
        return Err(bad_memo(&instr));
    };
    let scope = instr.scope;
    let iter_base = m.tape_top()?;
    // KeepLast, the step pair, LoopIter
    let tail_len = if spec.step.is_some() { 4 } else { 2 };

    m.batch(|m| {
        m.emit(Instruction::eval(scope, spec.cond.clone()))?;
        m.emit(Instruction::jump(Opcode::JumpIfFalse, scope, iter_base))?;
        m.emit(bind(CONTINUE, scope, iter_base + tail_len, scope))?;
        emit_block(m, scope, &spec.body)?;
        m.emit(Instruction::bare(Opcode::KeepLast, scope))?;
        if let Some(step) = &spec.step {
            m.emit(Instruction::eval(scope, step.clone()))?;
            m.emit(Instruction::bare(Opcode::Pop, scope))?;
        }
        m.emit(Instruction::new(Opcode::LoopIter, scope, instr.memo.clone()))
    })
}

/// `(foreach name iterable body...)`
pub(crate) fn expand_foreach(
    m: &mut Machine,
    scope: ScopeId,
    args: &[NodeRef],
) -> Result<(), RuntimeError> {
    let [name, iterable, body @ ..] = args else {
        return Err(RuntimeError::invalid_operand(
            "foreach expects a name and an iterable",
        ));
    };
    let name = name_arg(name, "foreach")?;
    let exit = m.tape_top()?;
    let loop_scope = m
        .scopes
        .create_child(ScopeKind::Local, Some(scope), Some("foreach".into()));
    let state = ForeachState {
        name,
        items: Arc::from(Vec::new()),
        index: 0,
        body: body.into(),
    };

    m.batch(|m| {
        m.emit(bind(BREAK, loop_scope, exit, scope))?;
        m.emit(Instruction::eval(loop_scope, iterable.clone()))?;
        m.emit(Instruction::new(
            Opcode::ForeachStart,
            loop_scope,
            Memo::Foreach(Arc::new(state)),
        ))?;
        m.emit(Instruction::bare(Opcode::CollapseFrame, loop_scope).with_comment("loop value"))
    })
}

/// Pop the iterable, open the loop frame and emit the first iteration
pub(crate) fn op_foreach_start(m: &mut Machine, instr: Instruction) -> Result<(), RuntimeError> {
    let Memo::Foreach(state) = &instr.memo else {
        return Err(bad_memo(&instr));
    };
    let items: Vec<Value> = match m.pop()? {
        Value::List(items) => items.into_vec(),
        Value::Map(map) => map.sorted_keys().into_iter().map(Value::string).collect(),
        Value::Str(s) => s.chars().map(|c| Value::string(c.to_string())).collect(),
        other => {
            return Err(RuntimeError::invalid_operand(format!(
                "cannot iterate over a {}",
                other.type_name()
            )))
        }
    };

    m.fiber_mut()?.operands.push_frame();
    let first = ForeachState {
        items: items.into(),
        index: 0,
        ..(**state).clone()
    };
    m.emit(Instruction::new(
        Opcode::ForeachIter,
        instr.scope,
        Memo::Foreach(Arc::new(first)),
    ))
}

/// Bind the next item and expand one `foreach` iteration
pub(crate) fn op_foreach_iter(m: &mut Machine, instr: Instruction) -> Result<(), RuntimeError> {
    let Memo::Foreach(state) = &instr.memo else {
        return Err(bad_memo(&instr));
    };
    let Some(item) = state.items.get(state.index) else {
        return Ok(());
    };
    let scope = instr.scope;
    let iter_base = m.tape_top()?;
    m.scopes.define(scope, &state.name, item.clone());

    let next = ForeachState {
        index: state.index + 1,
        ..(**state).clone()
    };
    m.batch(|m| {
        // KeepLast and the next ForeachIter stay below the resume point
        m.emit(bind(CONTINUE, scope, iter_base + 2, scope))?;
        emit_block(m, scope, &state.body)?;
        m.emit(Instruction::bare(Opcode::KeepLast, scope))?;
        m.emit(Instruction::new(
            Opcode::ForeachIter,
            scope,
            Memo::Foreach(Arc::new(next)),
        ))
    })
}
