//! Weft Configuration System
//!
//! Provides configuration for the Weft execution core:
//! - Scheduler timing (resume-token timeout and poll backoff)
//! - Execution limits
//! - Language semantics switches (arity policy, runtime-error effect name)
//! - Logging filter
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded and merged in the following order (later overrides earlier):
//! 1. Built-in defaults
//! 2. Global config (~/.weft/config.toml)
//! 3. Project config (./weft.toml, searched upwards from a directory)
//! 4. Environment variables (WEFT_*)
//!
//! # Example
//!
//! ```no_run
//! use weft_config::ConfigLoader;
//! use std::path::Path;
//!
//! let mut loader = ConfigLoader::new();
//! let config = loader.load_from_directory(Path::new(".")).unwrap();
//! println!("timeout: {:?}", config.resume_timeout());
//! ```

pub mod loader;
pub mod runtime;

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Home directory not found")]
    HomeNotFound,
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

// Re-export main types
pub use loader::ConfigLoader;
pub use runtime::{
    ArityPolicy, LimitsConfig, LoggingConfig, RuntimeConfig, SchedulerConfig, SemanticsConfig,
};
