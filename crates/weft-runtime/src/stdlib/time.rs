//! Timers

use super::type_error;
use crate::api::native::check_arity;
use crate::fiber::token::FiberWaker;
use crate::value::{HostFunction, RuntimeError, Value};
use std::sync::Arc;
use std::time::Duration;

/// `(sleep ms)`: suspend the calling fiber for `ms` milliseconds
///
/// The fiber resumes with Null once the tokio timer fires. Other fibers keep
/// running in the meantime.
pub fn sleep() -> HostFunction {
    HostFunction::suspending(
        "sleep",
        Arc::new(|args: Vec<Value>, waker: FiberWaker| -> Result<(), RuntimeError> {
            check_arity("sleep", &args, 1)?;
            let ms = match &args[0] {
                Value::Int(ms) if *ms >= 0 => *ms as u64,
                Value::Float(ms) if *ms >= 0.0 && ms.is_finite() => *ms as u64,
                other => return Err(type_error("sleep", "a non-negative duration", other)),
            };
            tracing::trace!(fiber = %waker.fiber(), ms, "sleeping");
            waker.wake_with(async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Value::Null
            });
            Ok(())
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sleep_is_suspending() {
        assert!(sleep().is_suspending());
    }
}
