//! Configuration loading and precedence tests

use pretty_assertions::assert_eq;
use serial_test::serial;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use weft_config::{ArityPolicy, ConfigError, ConfigLoader, RuntimeConfig};

fn create_config_file(dir: &Path, content: &str) -> std::path::PathBuf {
    let config_path = dir.join("weft.toml");
    fs::write(&config_path, content).unwrap();
    config_path
}

/// Loader that never sees the real ~/.weft
fn isolated_loader(temp_dir: &TempDir) -> ConfigLoader {
    ConfigLoader::with_global_config_path(temp_dir.path().join("no-global.toml"))
}

// ============================================================================
// Config Loading Tests
// ============================================================================

#[test]
#[serial]
fn test_load_when_no_config_exists() {
    let temp_dir = TempDir::new().unwrap();

    let mut loader = isolated_loader(&temp_dir);
    let config = loader.load_from_directory(temp_dir.path()).unwrap();

    assert_eq!(config.resume_timeout(), Duration::from_millis(5000));
    assert_eq!(config.max_steps(), None);
    assert_eq!(config.arity(), ArityPolicy::Lenient);
    assert_eq!(config.error_effect(), "runtime-error");
}

#[test]
#[serial]
fn test_load_with_empty_config() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(temp_dir.path(), "");

    let mut loader = isolated_loader(&temp_dir);
    let config = loader.load_from_directory(temp_dir.path()).unwrap();

    assert_eq!(config, RuntimeConfig::default());
    assert_eq!(loader.project_root(), Some(temp_dir.path()));
}

#[test]
#[serial]
fn test_load_from_subdirectory_finds_parent() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(
        temp_dir.path(),
        r#"
[semantics]
error_effect = "oops"
"#,
    );

    let sub2 = temp_dir.path().join("sub1").join("sub2");
    fs::create_dir_all(&sub2).unwrap();

    let mut loader = isolated_loader(&temp_dir);
    let config = loader.load_from_directory(&sub2).unwrap();

    assert_eq!(config.error_effect(), "oops");
    assert_eq!(loader.project_root(), Some(temp_dir.path()));
}

#[test]
#[serial]
fn test_load_with_partial_config() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(
        temp_dir.path(),
        r#"
[scheduler]
poll_max_backoff_ms = 10
"#,
    );

    let mut loader = isolated_loader(&temp_dir);
    let config = loader.load_from_directory(temp_dir.path()).unwrap();

    assert_eq!(config.poll_max_backoff(), Duration::from_millis(10));
    assert_eq!(config.poll_initial_backoff(), Duration::from_millis(1));
    assert_eq!(config.resume_timeout(), Duration::from_millis(5000));
}

// ============================================================================
// Invalid Config Tests
// ============================================================================

#[test]
#[serial]
fn test_invalid_toml_syntax_names_the_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = create_config_file(temp_dir.path(), "[scheduler\nresume_timeout_ms = 1");

    let mut loader = isolated_loader(&temp_dir);
    match loader.load_from_directory(temp_dir.path()) {
        Err(ConfigError::TomlParseError { file, .. }) => assert_eq!(file, path),
        other => panic!("expected a parse error, got {:?}", other),
    }
}

#[test]
#[serial]
fn test_unknown_section_rejected() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(
        temp_dir.path(),
        r#"
[package]
name = "not-a-runtime-setting"
"#,
    );

    let mut loader = isolated_loader(&temp_dir);
    assert!(matches!(
        loader.load_from_directory(temp_dir.path()),
        Err(ConfigError::TomlParseError { .. })
    ));
}

#[test]
#[serial]
fn test_invalid_value_rejected_after_merge() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(
        temp_dir.path(),
        r#"
[scheduler]
poll_initial_backoff_ms = 100
poll_max_backoff_ms = 5
"#,
    );

    let mut loader = isolated_loader(&temp_dir);
    assert!(matches!(
        loader.load_from_directory(temp_dir.path()),
        Err(ConfigError::InvalidValue { .. })
    ));
}

#[test]
#[serial]
fn test_load_from_missing_file() {
    let temp_dir = TempDir::new().unwrap();
    let mut loader = isolated_loader(&temp_dir);
    let missing = temp_dir.path().join("nope.toml");
    assert!(matches!(
        loader.load_from_file(&missing),
        Err(ConfigError::NotFound(path)) if path == missing
    ));
}

// ============================================================================
// Precedence Tests
// ============================================================================

#[test]
#[serial]
fn test_env_override_max_steps() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(
        temp_dir.path(),
        r#"
[limits]
max_steps = 10
"#,
    );

    env::set_var("WEFT_MAX_STEPS", "500");
    let mut loader = isolated_loader(&temp_dir);
    let result = loader.load_from_directory(temp_dir.path());
    env::remove_var("WEFT_MAX_STEPS");

    assert_eq!(result.unwrap().max_steps(), Some(500));
}

#[test]
#[serial]
fn test_env_override_arity_is_validated() {
    let temp_dir = TempDir::new().unwrap();

    env::set_var("WEFT_ARITY", "sloppy");
    let mut loader = isolated_loader(&temp_dir);
    let result = loader.load_from_directory(temp_dir.path());
    env::remove_var("WEFT_ARITY");

    assert!(matches!(result, Err(ConfigError::InvalidValue { field, .. }) if field == "semantics.arity"));
}

#[test]
#[serial]
fn test_default_log_filter_when_none_specified() {
    let temp_dir = TempDir::new().unwrap();
    env::remove_var("WEFT_LOG");

    let mut loader = isolated_loader(&temp_dir);
    let config = loader.load_from_directory(temp_dir.path()).unwrap();

    assert_eq!(config.log_filter(), "warn");
}
