//! Async runtime infrastructure
//!
//! Suspending host functions spawn their work on a process-wide
//! current-thread tokio runtime. That work only makes progress while some
//! thread is inside [`block_on`], which is what the scheduler's bounded poll
//! loop ([`poll_with_backoff`]) does while it waits for resume tokens.

use crate::value::SchedulingError;
use std::future::Future;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use weft_config::RuntimeConfig;

/// Global tokio runtime for async host work
static TOKIO_RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// Get a reference to the global tokio runtime
///
/// Initializes the runtime if it hasn't been initialized yet.
///
/// # Panics
/// Panics if the runtime fails to initialize
pub fn runtime() -> &'static Runtime {
    TOKIO_RUNTIME.get_or_init(|| {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("Failed to initialize tokio runtime")
    })
}

/// Spawn async host work on the global runtime
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    runtime().spawn(future)
}

/// Block on a future until it completes, driving spawned work meanwhile
pub fn block_on<F: Future>(future: F) -> F::Output {
    runtime().block_on(future)
}

/// Timing of the resume-token poll loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
    pub timeout: Duration,
}

impl Backoff {
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            initial: config.poll_initial_backoff(),
            max: config.poll_max_backoff(),
            timeout: config.resume_timeout(),
        }
    }
}

/// Call `poll` until it yields a value, sleeping with exponential backoff
/// in between
///
/// The first attempt is synchronous. Gives up with
/// [`SchedulingError::Timeout`] once `backoff.timeout` has elapsed.
pub fn poll_with_backoff<T>(
    mut poll: impl FnMut() -> Option<T>,
    backoff: Backoff,
) -> Result<T, SchedulingError> {
    if let Some(value) = poll() {
        return Ok(value);
    }

    block_on(async {
        let start = Instant::now();
        let mut delay = backoff.initial;
        loop {
            let elapsed = start.elapsed();
            if elapsed >= backoff.timeout {
                return Err(SchedulingError::Timeout {
                    waited_ms: elapsed.as_millis() as u64,
                });
            }
            tokio::time::sleep(delay.min(backoff.timeout - elapsed)).await;
            if let Some(value) = poll() {
                return Ok(value);
            }
            delay = (delay * 2).min(backoff.max);
        }
    })
}
