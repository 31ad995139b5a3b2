//! Frame-indexed stack machine
//!
//! The machine holds the scope graph, the scheduler with every fiber, the
//! operation registry and the builtin method table. [`Machine::step`] pops
//! one instruction from the current fiber's tape and runs its handler;
//! handlers lower nodes lazily by emitting further instructions, so the host
//! stack never grows with script nesting depth.
//!
//! Handlers emit through a batch: the outermost commit pushes the batch onto
//! the tape in reverse, so the first emitted instruction runs first. Fiber
//! switches happen only between instructions.

pub mod dispatch;
pub mod frame;

use crate::async_runtime::Backoff;
use crate::continuation::Continuation;
use crate::fiber::scheduler::Scheduler;
use crate::fiber::{Fiber, FiberId};
use crate::instruction::Instruction;
use crate::interpreter::effects;
use crate::method_dispatch::MethodRegistry;
use crate::node::NodeRef;
use crate::scope::{ScopeGraph, ScopeId};
use crate::value::{RuntimeError, Value, ValueMap};
use dispatch::OperationRegistry;
use std::sync::Arc;
use tracing::{debug, warn};
use weft_config::RuntimeConfig;

/// Result of a single [`Machine::step`]
#[derive(Debug, Clone, PartialEq)]
pub enum StepResult {
    /// More instructions remain
    Continue,
    /// The root fiber landed with this value
    Complete(Value),
}

#[derive(Debug, Default)]
struct Batch {
    depth: usize,
    fiber: Option<FiberId>,
    pending: Vec<Instruction>,
}

/// Execution state shared by every fiber of a runtime
pub struct Machine {
    pub(crate) scopes: ScopeGraph,
    pub(crate) scheduler: Scheduler,
    pub(crate) registry: OperationRegistry,
    pub(crate) methods: MethodRegistry,
    pub(crate) config: RuntimeConfig,
    batch: Batch,
    steps: u64,
    finished: Option<Value>,
}

impl Machine {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            scopes: ScopeGraph::new(),
            scheduler: Scheduler::new(),
            registry: OperationRegistry::with_core(),
            methods: MethodRegistry::new(),
            config,
            batch: Batch::default(),
            steps: 0,
            finished: None,
        }
    }

    pub fn scopes(&self) -> &ScopeGraph {
        &self.scopes
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    /// Instructions dispatched since the last [`load`](Self::load)
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Install `node` on a fresh root fiber running in the global scope
    pub fn load(&mut self, node: NodeRef) -> Result<FiberId, RuntimeError> {
        self.scheduler.reset();
        self.batch = Batch::default();
        self.steps = 0;
        self.finished = None;

        let global = self.scopes.global();
        let root = self.scheduler.spawn_root(global);
        self.scheduler
            .get_mut(root)?
            .tape
            .push_value(Instruction::eval(global, node));
        debug!(fiber = %root, "evaluation loaded");
        Ok(root)
    }

    /// Run until the root fiber lands
    pub fn run(&mut self) -> Result<Value, RuntimeError> {
        loop {
            if let StepResult::Complete(value) = self.step()? {
                debug!(steps = self.steps, "evaluation finished");
                return Ok(value);
            }
        }
    }

    /// Dispatch one instruction
    pub fn step(&mut self) -> Result<StepResult, RuntimeError> {
        if let Some(value) = self.finished.take() {
            return Ok(StepResult::Complete(value));
        }

        self.scheduler.schedule(Backoff::from_config(&self.config))?;
        self.count_step()?;

        let fiber = self.scheduler.current_mut()?;
        let instr = fiber.tape.pop_value()?;
        let scope = instr.scope;
        fiber.scope = scope;

        let opcode = instr.opcode;
        let handler = self.registry.handler(opcode).ok_or_else(|| {
            RuntimeError::invalid_operand(format!("no handler registered for {:?}", opcode))
        })?;

        if let Err(err) = handler(self, instr) {
            self.abort_batch();
            self.recover(err, scope)?;
        }

        Ok(match self.finished.take() {
            Some(value) => StepResult::Complete(value),
            None => StepResult::Continue,
        })
    }

    /// Current fiber's tape, next instruction first
    pub fn dump_tape(&self) -> Result<String, RuntimeError> {
        Ok(self.scheduler.current()?.dump_tape())
    }

    fn count_step(&mut self) -> Result<(), RuntimeError> {
        if let Some(limit) = self.config.max_steps() {
            if self.steps >= limit {
                return Err(RuntimeError::StepLimitExceeded { limit });
            }
        }
        self.steps += 1;
        Ok(())
    }

    /// Route a recoverable error to the runtime-error effect handler visible
    /// from `scope`, or give it back
    fn recover(&mut self, err: RuntimeError, scope: ScopeId) -> Result<(), RuntimeError> {
        if err.is_fatal() {
            return Err(err);
        }
        let effect: Arc<str> = self.config.error_effect().into();
        if matches!(&err, RuntimeError::EffectNotHandled { effect: e } if e.as_str() == &*effect) {
            return Err(err);
        }
        let fiber = self.scheduler.current_id()?;
        let Some(handler) = effects::find_handler(&self.scopes, scope, fiber, &effect) else {
            return Err(err);
        };

        warn!(kind = err.kind(), error = %err, "runtime error raised as effect");
        let mut payload = ValueMap::new();
        payload.insert("kind", Value::string(err.kind()));
        payload.insert("message", Value::string(err.to_string()));
        effects::perform_with(self, scope, handler, vec![Value::Map(payload)])
    }

    pub(crate) fn set_finished(&mut self, value: Value) {
        self.finished = Some(value);
    }

    // ===== Fiber access =====

    pub(crate) fn fiber(&self) -> Result<&Fiber, RuntimeError> {
        Ok(self.scheduler.current()?)
    }

    pub(crate) fn fiber_mut(&mut self) -> Result<&mut Fiber, RuntimeError> {
        Ok(self.scheduler.current_mut()?)
    }

    pub(crate) fn push(&mut self, value: Value) -> Result<(), RuntimeError> {
        self.fiber_mut()?.operands.push_value(value);
        Ok(())
    }

    pub(crate) fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.fiber_mut()?.operands.pop_value()
    }

    pub(crate) fn pop_frame(&mut self) -> Result<Vec<Value>, RuntimeError> {
        self.fiber_mut()?.operands.pop_frame_all_values()
    }

    /// Current tape length, a valid resume point when nothing is pending
    pub(crate) fn tape_top(&self) -> Result<usize, RuntimeError> {
        Ok(self.fiber()?.tape.cur_top_idx())
    }

    /// Continuation resuming at `resume_at` in `scope`
    pub(crate) fn capture_at(
        &self,
        resume_at: usize,
        scope: ScopeId,
    ) -> Result<Continuation, RuntimeError> {
        debug_assert!(self.batch.pending.is_empty());
        Ok(Continuation::capture_at(self.fiber()?, resume_at, scope))
    }

    /// Restore a continuation into the current fiber and push `value`
    pub(crate) fn resume(&mut self, k: &Continuation, value: Value) -> Result<(), RuntimeError> {
        let fiber = self.fiber_mut()?;
        k.restore_into(fiber);
        fiber.operands.push_value(value);
        Ok(())
    }

    // ===== Batches =====

    pub(crate) fn begin_batch(&mut self) -> Result<(), RuntimeError> {
        if self.batch.depth == 0 {
            self.batch.fiber = Some(self.scheduler.current_id()?);
        }
        self.batch.depth += 1;
        Ok(())
    }

    /// Queue an instruction; outside a batch it goes straight onto the tape
    pub fn emit(&mut self, instr: Instruction) -> Result<(), RuntimeError> {
        if self.batch.depth == 0 {
            self.fiber_mut()?.tape.push_value(instr);
        } else {
            self.batch.pending.push(instr);
        }
        Ok(())
    }

    pub(crate) fn commit_batch(&mut self) -> Result<(), RuntimeError> {
        self.batch.depth = self.batch.depth.saturating_sub(1);
        if self.batch.depth > 0 {
            return Ok(());
        }
        let pending = std::mem::take(&mut self.batch.pending);
        let Some(fiber) = self.batch.fiber.take() else {
            return Ok(());
        };
        let tape = &mut self.scheduler.get_mut(fiber)?.tape;
        for instr in pending.into_iter().rev() {
            tape.push_value(instr);
        }
        Ok(())
    }

    pub(crate) fn abort_batch(&mut self) {
        self.batch = Batch::default();
    }

    /// Run `f` inside a batch, committing on success and discarding on error
    ///
    /// Instructions emitted inside run in emission order.
    pub fn batch<F>(&mut self, f: F) -> Result<(), RuntimeError>
    where
        F: FnOnce(&mut Self) -> Result<(), RuntimeError>,
    {
        self.begin_batch()?;
        match f(self) {
            Ok(()) => self.commit_batch(),
            Err(err) => {
                self.abort_batch();
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Opcode;
    use crate::node::build::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_batch_runs_first_emitted_first() {
        let mut machine = Machine::new(RuntimeConfig::default());
        machine.load(null()).unwrap();
        let scope = machine.scopes.global();

        machine
            .batch(|m| {
                m.emit(Instruction::push(scope, Value::Int(1)))?;
                m.batch(|m| m.emit(Instruction::push(scope, Value::Int(2))))?;
                m.emit(Instruction::bare(Opcode::Pop, scope))
            })
            .unwrap();

        let tape: Vec<Opcode> = machine
            .fiber()
            .unwrap()
            .tape
            .iter()
            .rev()
            .map(|i| i.opcode)
            .collect();
        assert_eq!(
            tape,
            vec![
                Opcode::Push,
                Opcode::Push,
                Opcode::Pop,
                Opcode::Eval,
                Opcode::LandSuccess
            ]
        );
    }

    #[test]
    fn test_failed_batch_leaves_tape_untouched() {
        let mut machine = Machine::new(RuntimeConfig::default());
        machine.load(null()).unwrap();
        let scope = machine.scopes.global();
        let before = machine.fiber().unwrap().tape.len();

        let result = machine.batch(|m| {
            m.emit(Instruction::push(scope, Value::Int(1)))?;
            Err(RuntimeError::invalid_operand("boom"))
        });

        assert!(result.is_err());
        assert_eq!(machine.fiber().unwrap().tape.len(), before);
    }

    #[test]
    fn test_step_limit_is_fatal() {
        let config = RuntimeConfig::default().with_max_steps(3);
        let mut machine = Machine::new(config);
        machine
            .load(block(vec![int(1), int(2), int(3), int(4)]))
            .unwrap();
        assert_eq!(
            machine.run(),
            Err(RuntimeError::StepLimitExceeded { limit: 3 })
        );
    }

    #[test]
    fn test_step_by_step() {
        let mut machine = Machine::new(RuntimeConfig::default());
        machine.load(int(7)).unwrap();
        assert_eq!(machine.step().unwrap(), StepResult::Continue);
        assert_eq!(machine.step().unwrap(), StepResult::Complete(Value::Int(7)));
        assert_eq!(machine.steps(), 2);
    }
}
