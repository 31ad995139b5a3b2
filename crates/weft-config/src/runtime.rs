//! Runtime Configuration (weft.toml / ~/.weft/config.toml)
//!
//! Every section and every key is optional. Accessors on [`RuntimeConfig`]
//! resolve missing values to the built-in defaults.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Default time the scheduler waits for a resume token before failing.
pub const DEFAULT_RESUME_TIMEOUT_MS: u64 = 5_000;
/// Default first sleep of the token poll loop.
pub const DEFAULT_POLL_INITIAL_BACKOFF_MS: u64 = 1;
/// Default cap on the token poll loop's sleep.
pub const DEFAULT_POLL_MAX_BACKOFF_MS: u64 = 50;
/// Default name of the effect raised for recoverable runtime errors.
pub const DEFAULT_ERROR_EFFECT: &str = "runtime-error";
/// Default tracing filter directive.
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Top-level runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Fiber scheduler settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduler: Option<SchedulerConfig>,

    /// Execution limits
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limits: Option<LimitsConfig>,

    /// Language semantics switches
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantics: Option<SemanticsConfig>,

    /// Logging settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

/// Scheduler settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    /// How long to wait for a resume token before failing (default: 5000)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume_timeout_ms: Option<u64>,

    /// First sleep of the poll loop (default: 1)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_initial_backoff_ms: Option<u64>,

    /// Upper bound for the poll loop's exponential backoff (default: 50)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_max_backoff_ms: Option<u64>,
}

/// Execution limits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    /// Maximum number of dispatched instructions per evaluation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<u64>,
}

/// Language semantics switches
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct SemanticsConfig {
    /// What happens when a lambda receives the wrong number of arguments
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arity: Option<ArityPolicy>,

    /// Effect performed when a recoverable runtime error occurs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_effect: Option<String>,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// `tracing` EnvFilter directive, e.g. "weft_runtime=debug"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

/// Lambda arity policy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ArityPolicy {
    /// Missing trailing parameters bind to null, extra arguments are ignored
    #[default]
    Lenient,
    /// Any argument count mismatch is an error
    Strict,
}

impl FromStr for ArityPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lenient" => Ok(ArityPolicy::Lenient),
            "strict" => Ok(ArityPolicy::Strict),
            other => Err(ConfigError::InvalidValue {
                field: "semantics.arity".to_string(),
                reason: format!("must be 'lenient' or 'strict', got '{}'", other),
            }),
        }
    }
}

impl RuntimeConfig {
    /// Load runtime configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let config = Self::parse(&content).map_err(|e| match e {
            ConfigError::TomlParseError { error, .. } => ConfigError::TomlParseError {
                file: path.to_path_buf(),
                error,
            },
            other => other,
        })?;
        Ok(config)
    }

    /// Parse and validate configuration from TOML text
    pub fn parse(content: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::TomlParseError {
            file: "<inline>".into(),
            error: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(scheduler) = &self.scheduler {
            if scheduler.resume_timeout_ms == Some(0) {
                return Err(ConfigError::InvalidValue {
                    field: "scheduler.resume_timeout_ms".to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
            if scheduler.poll_initial_backoff_ms == Some(0) {
                return Err(ConfigError::InvalidValue {
                    field: "scheduler.poll_initial_backoff_ms".to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        if self.poll_initial_backoff() > self.poll_max_backoff() {
            return Err(ConfigError::InvalidValue {
                field: "scheduler.poll_max_backoff_ms".to_string(),
                reason: format!(
                    "must not be smaller than poll_initial_backoff_ms ({} < {})",
                    self.poll_max_backoff().as_millis(),
                    self.poll_initial_backoff().as_millis()
                ),
            });
        }

        if let Some(limits) = &self.limits {
            if limits.max_steps == Some(0) {
                return Err(ConfigError::InvalidValue {
                    field: "limits.max_steps".to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        if let Some(effect) = self.semantics.as_ref().and_then(|s| s.error_effect.as_ref()) {
            if effect.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "semantics.error_effect".to_string(),
                    reason: "must not be empty".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Merge another config into this one.
    /// Values set in `other` take precedence, key by key.
    pub fn merge(&mut self, other: &RuntimeConfig) {
        if let Some(theirs) = &other.scheduler {
            let ours = self.scheduler.get_or_insert_with(Default::default);
            if theirs.resume_timeout_ms.is_some() {
                ours.resume_timeout_ms = theirs.resume_timeout_ms;
            }
            if theirs.poll_initial_backoff_ms.is_some() {
                ours.poll_initial_backoff_ms = theirs.poll_initial_backoff_ms;
            }
            if theirs.poll_max_backoff_ms.is_some() {
                ours.poll_max_backoff_ms = theirs.poll_max_backoff_ms;
            }
        }
        if let Some(theirs) = &other.limits {
            let ours = self.limits.get_or_insert_with(Default::default);
            if theirs.max_steps.is_some() {
                ours.max_steps = theirs.max_steps;
            }
        }
        if let Some(theirs) = &other.semantics {
            let ours = self.semantics.get_or_insert_with(Default::default);
            if theirs.arity.is_some() {
                ours.arity = theirs.arity;
            }
            if theirs.error_effect.is_some() {
                ours.error_effect = theirs.error_effect.clone();
            }
        }
        if let Some(theirs) = &other.logging {
            let ours = self.logging.get_or_insert_with(Default::default);
            if theirs.filter.is_some() {
                ours.filter = theirs.filter.clone();
            }
        }
    }

    /// Time to wait for a resume token before failing
    pub fn resume_timeout(&self) -> Duration {
        Duration::from_millis(
            self.scheduler
                .as_ref()
                .and_then(|s| s.resume_timeout_ms)
                .unwrap_or(DEFAULT_RESUME_TIMEOUT_MS),
        )
    }

    /// First sleep of the token poll loop
    pub fn poll_initial_backoff(&self) -> Duration {
        Duration::from_millis(
            self.scheduler
                .as_ref()
                .and_then(|s| s.poll_initial_backoff_ms)
                .unwrap_or(DEFAULT_POLL_INITIAL_BACKOFF_MS),
        )
    }

    /// Cap on the token poll loop's sleep
    pub fn poll_max_backoff(&self) -> Duration {
        Duration::from_millis(
            self.scheduler
                .as_ref()
                .and_then(|s| s.poll_max_backoff_ms)
                .unwrap_or(DEFAULT_POLL_MAX_BACKOFF_MS),
        )
    }

    /// Instruction budget per evaluation, if any
    pub fn max_steps(&self) -> Option<u64> {
        self.limits.as_ref().and_then(|l| l.max_steps)
    }

    /// Effective arity policy
    pub fn arity(&self) -> ArityPolicy {
        self.semantics
            .as_ref()
            .and_then(|s| s.arity)
            .unwrap_or_default()
    }

    /// Effective runtime-error effect name
    pub fn error_effect(&self) -> &str {
        self.semantics
            .as_ref()
            .and_then(|s| s.error_effect.as_deref())
            .unwrap_or(DEFAULT_ERROR_EFFECT)
    }

    /// Effective logging filter
    pub fn log_filter(&self) -> &str {
        self.logging
            .as_ref()
            .and_then(|l| l.filter.as_deref())
            .unwrap_or(DEFAULT_LOG_FILTER)
    }

    /// Builder-style override of the resume timeout
    pub fn with_resume_timeout_ms(mut self, ms: u64) -> Self {
        self.scheduler
            .get_or_insert_with(Default::default)
            .resume_timeout_ms = Some(ms);
        self
    }

    /// Builder-style override of the step limit
    pub fn with_max_steps(mut self, steps: u64) -> Self {
        self.limits.get_or_insert_with(Default::default).max_steps = Some(steps);
        self
    }

    /// Builder-style override of the arity policy
    pub fn with_arity(mut self, arity: ArityPolicy) -> Self {
        self.semantics.get_or_insert_with(Default::default).arity = Some(arity);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.resume_timeout(), Duration::from_millis(5_000));
        assert_eq!(config.poll_initial_backoff(), Duration::from_millis(1));
        assert_eq!(config.poll_max_backoff(), Duration::from_millis(50));
        assert_eq!(config.max_steps(), None);
        assert_eq!(config.arity(), ArityPolicy::Lenient);
        assert_eq!(config.error_effect(), "runtime-error");
        assert_eq!(config.log_filter(), "warn");
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[scheduler]
resume_timeout_ms = 250
poll_initial_backoff_ms = 2
poll_max_backoff_ms = 20

[limits]
max_steps = 10000

[semantics]
arity = "strict"
error_effect = "oops"

[logging]
filter = "weft_runtime=debug"
"#;

        let config = RuntimeConfig::parse(toml).unwrap();
        assert_eq!(config.resume_timeout(), Duration::from_millis(250));
        assert_eq!(config.poll_initial_backoff(), Duration::from_millis(2));
        assert_eq!(config.poll_max_backoff(), Duration::from_millis(20));
        assert_eq!(config.max_steps(), Some(10_000));
        assert_eq!(config.arity(), ArityPolicy::Strict);
        assert_eq!(config.error_effect(), "oops");
        assert_eq!(config.log_filter(), "weft_runtime=debug");
    }

    #[test]
    fn test_unknown_field_rejected() {
        let toml = r#"
[scheduler]
resume_timeout = 10
"#;
        assert!(matches!(
            RuntimeConfig::parse(toml),
            Err(ConfigError::TomlParseError { .. })
        ));
    }

    #[test]
    fn test_unknown_arity_rejected() {
        let toml = r#"
[semantics]
arity = "sloppy"
"#;
        assert!(RuntimeConfig::parse(toml).is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = RuntimeConfig::default().with_resume_timeout_ms(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "scheduler.resume_timeout_ms"
        ));
    }

    #[test]
    fn test_backoff_order_rejected() {
        let toml = r#"
[scheduler]
poll_initial_backoff_ms = 100
poll_max_backoff_ms = 10
"#;
        assert!(RuntimeConfig::parse(toml).is_err());
    }

    #[test]
    fn test_empty_error_effect_rejected() {
        let toml = r#"
[semantics]
error_effect = "  "
"#;
        assert!(RuntimeConfig::parse(toml).is_err());
    }

    #[test]
    fn test_merge_is_key_by_key() {
        let mut base = RuntimeConfig::parse(
            r#"
[scheduler]
resume_timeout_ms = 100
poll_max_backoff_ms = 30
"#,
        )
        .unwrap();
        let overlay = RuntimeConfig::parse(
            r#"
[scheduler]
resume_timeout_ms = 900

[semantics]
arity = "strict"
"#,
        )
        .unwrap();

        base.merge(&overlay);
        assert_eq!(base.resume_timeout(), Duration::from_millis(900));
        assert_eq!(base.poll_max_backoff(), Duration::from_millis(30));
        assert_eq!(base.arity(), ArityPolicy::Strict);
    }

    #[test]
    fn test_arity_from_str() {
        assert_eq!("Strict".parse::<ArityPolicy>().unwrap(), ArityPolicy::Strict);
        assert_eq!("lenient".parse::<ArityPolicy>().unwrap(), ArityPolicy::Lenient);
        assert!("other".parse::<ArityPolicy>().is_err());
    }
}
