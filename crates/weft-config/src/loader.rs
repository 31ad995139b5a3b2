//! Configuration Loader
//!
//! Handles loading and merging configuration from multiple sources with proper precedence.

use crate::runtime::{ArityPolicy, RuntimeConfig};
use crate::{ConfigError, ConfigResult};
use std::env;
use std::path::{Path, PathBuf};

/// Project configuration file name
pub const PROJECT_CONFIG_FILE: &str = "weft.toml";

/// Configuration loader
///
/// Loads configuration from multiple sources and merges them with proper precedence:
/// 1. Built-in defaults - lowest priority
/// 2. Global config (~/.weft/config.toml) - overrides defaults
/// 3. Project config (weft.toml) - overrides global
/// 4. Environment variables (WEFT_*) - highest priority
pub struct ConfigLoader {
    /// Cached global config path
    global_config_path: Option<PathBuf>,
    /// Directory where the last project config was found
    project_root: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            global_config_path: None,
            project_root: None,
        }
    }

    /// Create a loader that reads the global config from an explicit path
    pub fn with_global_config_path(path: impl Into<PathBuf>) -> Self {
        Self {
            global_config_path: Some(path.into()),
            project_root: None,
        }
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find weft.toml, merges it over the
    /// global config (if any), then applies environment overrides.
    pub fn load_from_directory(&mut self, start_dir: &Path) -> ConfigResult<RuntimeConfig> {
        let mut config = self.load_global_config().unwrap_or_default();

        let (project_root, project_config) = self.find_project_config(start_dir)?;
        self.project_root = project_root;
        config.merge(&project_config);

        let config = self.apply_env_overrides(config)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file (plus global config and env)
    pub fn load_from_file(&mut self, config_path: &Path) -> ConfigResult<RuntimeConfig> {
        let mut config = self.load_global_config().unwrap_or_default();
        config.merge(&RuntimeConfig::load_from_file(config_path)?);
        self.project_root = config_path.parent().map(|p| p.to_path_buf());

        let config = self.apply_env_overrides(config)?;
        config.validate()?;
        Ok(config)
    }

    /// Directory containing the project config used by the last load, if any
    pub fn project_root(&self) -> Option<&Path> {
        self.project_root.as_deref()
    }

    /// Find project configuration by walking up directory tree
    ///
    /// Returns (project_root, project_config); defaults when none is found.
    fn find_project_config(
        &self,
        start_dir: &Path,
    ) -> ConfigResult<(Option<PathBuf>, RuntimeConfig)> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(PROJECT_CONFIG_FILE);

            if config_path.exists() {
                let config = RuntimeConfig::load_from_file(&config_path)?;
                return Ok((Some(current), config));
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Ok((None, RuntimeConfig::default())),
            }
        }
    }

    /// Load global configuration from ~/.weft/config.toml
    fn load_global_config(&mut self) -> ConfigResult<RuntimeConfig> {
        if self.global_config_path.is_none() {
            self.global_config_path = Some(Self::global_config_dir()?.join("config.toml"));
        }

        let Some(path) = self.global_config_path.as_ref() else {
            return Ok(RuntimeConfig::default());
        };

        // Global config is optional
        if !path.exists() {
            return Ok(RuntimeConfig::default());
        }

        RuntimeConfig::load_from_file(path)
    }

    /// Apply environment variable overrides
    ///
    /// Recognised variables: WEFT_RESUME_TIMEOUT_MS, WEFT_MAX_STEPS,
    /// WEFT_ARITY, WEFT_LOG.
    fn apply_env_overrides(&self, mut config: RuntimeConfig) -> ConfigResult<RuntimeConfig> {
        if let Ok(timeout) = env::var("WEFT_RESUME_TIMEOUT_MS") {
            let ms = parse_u64("WEFT_RESUME_TIMEOUT_MS", &timeout)?;
            config = config.with_resume_timeout_ms(ms);
        }

        if let Ok(steps) = env::var("WEFT_MAX_STEPS") {
            let steps = parse_u64("WEFT_MAX_STEPS", &steps)?;
            config = config.with_max_steps(steps);
        }

        if let Ok(arity) = env::var("WEFT_ARITY") {
            config = config.with_arity(arity.parse::<ArityPolicy>()?);
        }

        if let Ok(filter) = env::var("WEFT_LOG") {
            config.logging.get_or_insert_with(Default::default).filter = Some(filter);
        }

        Ok(config)
    }

    /// Get the global configuration directory (~/.weft)
    pub fn global_config_dir() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".weft"))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_u64(field: &str, raw: &str) -> ConfigResult<u64> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        field: field.to_string(),
        reason: format!("expected an unsigned integer, got '{}'", raw),
    })
}
