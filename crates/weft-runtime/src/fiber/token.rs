//! Resume tokens: external wake-ups for suspended fibers

use crate::async_runtime;
use crate::fiber::FiberId;
use crate::instruction::Instruction;
use crate::value::Value;
use std::future::Future;
use tokio::sync::mpsc::UnboundedSender;

/// Wake-up message for a fiber
///
/// Applying a token pushes `values` onto the fiber's operand stack, splices
/// `instructions` onto its tape (first instruction runs first) and makes the
/// fiber runnable.
#[derive(Debug, Clone)]
pub struct ResumeFiberToken {
    pub fiber: FiberId,
    pub values: Vec<Value>,
    pub instructions: Vec<Instruction>,
}

/// Handle given to suspending host functions to resume the calling fiber
#[derive(Clone)]
pub struct FiberWaker {
    fiber: FiberId,
    sender: UnboundedSender<ResumeFiberToken>,
}

impl FiberWaker {
    pub(crate) fn new(fiber: FiberId, sender: UnboundedSender<ResumeFiberToken>) -> Self {
        Self { fiber, sender }
    }

    /// Fiber this waker resumes
    pub fn fiber(&self) -> FiberId {
        self.fiber
    }

    /// Resume the fiber with `value` as the result of the suspended call
    ///
    /// Returns false if the scheduler is gone.
    pub fn wake(&self, value: Value) -> bool {
        self.send(ResumeFiberToken {
            fiber: self.fiber,
            values: vec![value],
            instructions: Vec::new(),
        })
    }

    /// Send a fully custom token
    pub fn send(&self, token: ResumeFiberToken) -> bool {
        tracing::trace!(fiber = %token.fiber, values = token.values.len(), "sending resume token");
        self.sender.send(token).is_ok()
    }

    /// Run `future` on the async runtime and wake the fiber with its output
    pub fn wake_with<F>(self, future: F)
    where
        F: Future<Output = Value> + Send + 'static,
    {
        async_runtime::spawn(async move {
            let value = future.await;
            self.wake(value);
        });
    }
}

impl std::fmt::Debug for FiberWaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FiberWaker").field("fiber", &self.fiber).finish()
    }
}
