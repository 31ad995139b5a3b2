//! Logging setup
//!
//! The runtime only emits `tracing` events. Embedders that want them printed
//! call [`init_tracing`] once, or install their own subscriber.

use tracing_subscriber::{fmt, EnvFilter};
use weft_config::RuntimeConfig;

/// Install a fmt subscriber filtered by `config.log_filter()`
///
/// `RUST_LOG` takes precedence when set. Returns false when a global
/// subscriber is already installed, which leaves that one in place.
pub fn init_tracing(config: &RuntimeConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_filter()))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_harmless() {
        let config = RuntimeConfig::default();
        init_tracing(&config);
        assert!(!init_tracing(&config));
    }
}
