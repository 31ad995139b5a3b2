//! Cooperative fiber scheduler
//!
//! The scheduler owns every fiber of an evaluation and decides which one the
//! dispatcher runs next:
//! - the current fiber keeps running until it yields, awaits, suspends or
//!   dies
//! - the root fiber steps aside when it is about to land while other fibers
//!   are still runnable (root preference rule)
//! - with nothing runnable, it waits for resume tokens if some fiber is
//!   suspended on an external event, and reports a deadlock otherwise

use crate::async_runtime::{self, Backoff};
use crate::fiber::token::{FiberWaker, ResumeFiberToken};
use crate::fiber::{Fiber, FiberId, FiberState, SuspendReason};
use crate::instruction::Opcode;
use crate::scope::ScopeId;
use crate::value::{RuntimeError, SchedulingError, Value};
use std::collections::{BTreeMap, VecDeque};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, trace, warn};

pub struct Scheduler {
    fibers: BTreeMap<FiberId, Fiber>,
    runnable: VecDeque<FiberId>,
    current: Option<FiberId>,
    root: Option<FiberId>,
    next_id: u64,
    tokens_tx: UnboundedSender<ResumeFiberToken>,
    tokens_rx: UnboundedReceiver<ResumeFiberToken>,
}

impl Scheduler {
    pub fn new() -> Self {
        let (tokens_tx, tokens_rx) = unbounded_channel();
        Self {
            fibers: BTreeMap::new(),
            runnable: VecDeque::new(),
            current: None,
            root: None,
            next_id: 0,
            tokens_tx,
            tokens_rx,
        }
    }

    /// Drop every fiber and any stale token from a previous evaluation
    ///
    /// Fiber ids keep counting up so a late token can never hit a new fiber.
    pub fn reset(&mut self) {
        while let Ok(token) = self.tokens_rx.try_recv() {
            warn!(fiber = %token.fiber, "discarding resume token from a previous evaluation");
        }
        self.fibers.clear();
        self.runnable.clear();
        self.current = None;
        self.root = None;
    }

    /// Create the root fiber and make it current
    pub fn spawn_root(&mut self, scope: ScopeId) -> FiberId {
        let id = self.allocate_id();
        self.fibers.insert(id, Fiber::new(id, None, scope));
        self.root = Some(id);
        self.promote(id);
        debug!(fiber = %id, "root fiber created");
        id
    }

    /// Create a runnable child fiber at the back of the queue
    pub fn spawn(&mut self, parent: FiberId, scope: ScopeId) -> FiberId {
        let id = self.allocate_id();
        self.fibers.insert(id, Fiber::new(id, Some(parent), scope));
        self.runnable.push_back(id);
        debug!(fiber = %id, parent = %parent, "fiber spawned");
        id
    }

    pub fn root_id(&self) -> Option<FiberId> {
        self.root
    }

    pub fn current_id(&self) -> Result<FiberId, SchedulingError> {
        self.current.ok_or(SchedulingError::Deadlock)
    }

    pub fn get(&self, id: FiberId) -> Result<&Fiber, SchedulingError> {
        self.fibers.get(&id).ok_or(SchedulingError::UnknownFiber(id))
    }

    pub fn get_mut(&mut self, id: FiberId) -> Result<&mut Fiber, SchedulingError> {
        self.fibers
            .get_mut(&id)
            .ok_or(SchedulingError::UnknownFiber(id))
    }

    pub fn current(&self) -> Result<&Fiber, SchedulingError> {
        self.get(self.current_id()?)
    }

    pub fn current_mut(&mut self) -> Result<&mut Fiber, SchedulingError> {
        let id = self.current_id()?;
        self.get_mut(id)
    }

    pub fn fibers(&self) -> impl Iterator<Item = &Fiber> {
        self.fibers.values()
    }

    /// Handle for resuming `id` from host code
    pub fn waker(&self, id: FiberId) -> FiberWaker {
        FiberWaker::new(id, self.tokens_tx.clone())
    }

    // ===== State transitions =====

    /// Queue `id` to run (no-op for the running or a dead fiber)
    pub fn make_runnable(&mut self, id: FiberId) -> Result<(), SchedulingError> {
        let fiber = self.get_mut(id)?;
        match fiber.state {
            FiberState::Running | FiberState::Dead => return Ok(()),
            FiberState::Runnable => {}
            FiberState::Idle | FiberState::Suspended(_) => fiber.state = FiberState::Runnable,
        }
        if !self.runnable.contains(&id) {
            self.runnable.push_back(id);
        }
        Ok(())
    }

    /// Make `id` the running fiber
    ///
    /// The previous current fiber must already have left `Running`.
    pub fn promote(&mut self, id: FiberId) {
        self.runnable.retain(|queued| *queued != id);
        if let Some(fiber) = self.fibers.get_mut(&id) {
            fiber.state = FiberState::Running;
        }
        if self.current != Some(id) {
            trace!(fiber = %id, "switching fiber");
        }
        self.current = Some(id);
    }

    /// Promote the front of the runnable queue; false if it is empty
    pub fn promote_next(&mut self) -> bool {
        while let Some(id) = self.runnable.pop_front() {
            if self
                .fibers
                .get(&id)
                .is_some_and(|f| f.state == FiberState::Runnable)
            {
                self.promote(id);
                return true;
            }
        }
        false
    }

    pub fn suspend_current(&mut self, reason: SuspendReason) -> Result<(), SchedulingError> {
        let fiber = self.current_mut()?;
        fiber.state = FiberState::Suspended(reason);
        trace!(fiber = %fiber.id, ?reason, "fiber suspended");
        Ok(())
    }

    pub fn idle_current(&mut self) -> Result<(), SchedulingError> {
        let fiber = self.current_mut()?;
        fiber.state = FiberState::Idle;
        trace!(fiber = %fiber.id, "fiber idle");
        Ok(())
    }

    /// Mark the current fiber dead with its final value
    pub fn finish_current(&mut self, result: Value) -> Result<FiberId, SchedulingError> {
        let fiber = self.current_mut()?;
        fiber.state = FiberState::Dead;
        fiber.result = Some(result);
        debug!(fiber = %fiber.id, "fiber finished");
        Ok(fiber.id)
    }

    /// Pop an entire operand frame from `from` and push its values onto `to`
    pub fn transfer_frame(&mut self, from: FiberId, to: FiberId) -> Result<(), RuntimeError> {
        self.get(to)?;
        let values = self.get_mut(from)?.operands.pop_frame_all_values()?;
        let dest = self.get_mut(to)?;
        for value in values {
            dest.operands.push_value(value);
        }
        Ok(())
    }

    /// Push a single value onto another fiber's operand stack
    pub fn deliver(&mut self, to: FiberId, value: Value) -> Result<(), SchedulingError> {
        self.get_mut(to)?.operands.push_value(value);
        Ok(())
    }

    // ===== Scheduling decisions =====

    /// Number of fibers waiting on an external event
    pub fn external_waits(&self) -> usize {
        self.fibers
            .values()
            .filter(|f| f.state == FiberState::Suspended(SuspendReason::External))
            .count()
    }

    fn current_is_running(&self) -> bool {
        self.current
            .and_then(|id| self.fibers.get(&id))
            .is_some_and(|f| f.state == FiberState::Running)
    }

    fn root_about_to_land(&self) -> bool {
        self.current.is_some()
            && self.current == self.root
            && self.current_is_running()
            && self
                .current
                .and_then(|id| self.fibers.get(&id))
                .and_then(Fiber::next_opcode)
                == Some(Opcode::LandSuccess)
    }

    fn other_runnable(&self) -> Option<FiberId> {
        self.runnable.iter().copied().find(|id| {
            Some(*id) != self.root
                && self
                    .fibers
                    .get(id)
                    .is_some_and(|f| f.state == FiberState::Runnable)
        })
    }

    /// Ensure a fiber is running, applying the root preference rule and
    /// waiting for tokens when that is the only way forward
    pub fn schedule(&mut self, backoff: Backoff) -> Result<(), RuntimeError> {
        loop {
            self.drain_tokens()?;

            if self.current_is_running() {
                if self.root_about_to_land() {
                    if let Some(next) = self.other_runnable() {
                        if let Some(root) = self.root {
                            self.make_root_wait(root);
                        }
                        self.promote(next);
                        return Ok(());
                    }
                    if self.external_waits() > 0 {
                        self.wait_for_token(backoff)?;
                        continue;
                    }
                }
                return Ok(());
            }

            if self.promote_next() {
                continue;
            }

            if self.external_waits() > 0 {
                self.wait_for_token(backoff)?;
                continue;
            }

            return Err(SchedulingError::Deadlock.into());
        }
    }

    fn make_root_wait(&mut self, root: FiberId) {
        if let Some(fiber) = self.fibers.get_mut(&root) {
            fiber.state = FiberState::Runnable;
        }
        self.runnable.push_back(root);
        trace!(fiber = %root, "root fiber yields to runnable fibers before landing");
    }

    // ===== Resume tokens =====

    /// Apply every token already in the channel
    pub fn drain_tokens(&mut self) -> Result<usize, SchedulingError> {
        let mut applied = 0;
        while let Ok(token) = self.tokens_rx.try_recv() {
            if self.apply_token(token)? {
                applied += 1;
            }
        }
        Ok(applied)
    }

    /// Block (bounded) until one token arrives, then apply it
    pub fn wait_for_token(&mut self, backoff: Backoff) -> Result<(), SchedulingError> {
        debug!(
            waiting = self.external_waits(),
            timeout_ms = backoff.timeout.as_millis() as u64,
            "waiting for resume token"
        );
        let rx = &mut self.tokens_rx;
        let token = async_runtime::poll_with_backoff(|| rx.try_recv().ok(), backoff)?;
        self.apply_token(token)?;
        Ok(())
    }

    /// Resume the token's fiber with its values and instructions
    ///
    /// Only a fiber suspended on an external event takes a token. A token for
    /// any other live fiber (a second wake, say) is dropped and `Ok(false)`
    /// returned, leaving that fiber's stacks untouched.
    pub fn apply_token(&mut self, token: ResumeFiberToken) -> Result<bool, SchedulingError> {
        let id = token.fiber;
        let Some(fiber) = self.fibers.get_mut(&id) else {
            return Err(SchedulingError::UnknownFiber(id));
        };
        if fiber.state != FiberState::Suspended(SuspendReason::External) {
            warn!(fiber = %id, state = ?fiber.state, "dropping resume token for a fiber not waiting on one");
            return Ok(false);
        }
        trace!(fiber = %id, values = token.values.len(), "applying resume token");

        for value in token.values {
            fiber.operands.push_value(value);
        }
        for instr in token.instructions.into_iter().rev() {
            fiber.tape.push_value(instr);
        }
        self.make_runnable(id)?;
        Ok(true)
    }

    fn allocate_id(&mut self) -> FiberId {
        let id = FiberId(self.next_id);
        self.next_id += 1;
        id
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
