//! Configuration loading and precedence tests

use nifbridge_config::{BridgeConfig, ConfigError, ConfigLoader, CONFIG_FILE_NAME};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serial_test::serial;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn create_config_file(dir: &Path, content: &str) -> PathBuf {
    let config_path = dir.join(CONFIG_FILE_NAME);
    fs::write(&config_path, content).unwrap();
    config_path
}

/// Loader whose global layer points at a file that does not exist
fn isolated_loader(temp: &TempDir) -> ConfigLoader {
    ConfigLoader::with_global_path(temp.path().join("no-global.toml"))
}

// ============================================================================
// Config Loading Tests
// ============================================================================

#[test]
#[serial]
fn test_load_project_config_basic() {
    let temp_dir = TempDir::new().unwrap();
    let path = create_config_file(
        temp_dir.path(),
        r#"
[call]
env_capacity = 512
"#,
    );

    let loaded = isolated_loader(&temp_dir)
        .load_from_directory(temp_dir.path())
        .unwrap();

    assert_eq!(loaded.config.env_capacity(), 512);
    assert_eq!(loaded.source, Some(path));
}

#[test]
#[serial]
fn test_load_when_no_config_exists() {
    let temp_dir = TempDir::new().unwrap();

    let loaded = isolated_loader(&temp_dir)
        .load_from_directory(temp_dir.path())
        .unwrap();

    assert_eq!(loaded.source, None);
    assert_eq!(loaded.config, BridgeConfig::default());
}

#[test]
#[serial]
fn test_load_from_subdirectory_finds_parent() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(
        temp_dir.path(),
        r#"
[runtime]
worker_threads = 4
"#,
    );

    let nested = temp_dir.path().join("a").join("b");
    fs::create_dir_all(&nested).unwrap();

    let loaded = isolated_loader(&temp_dir)
        .load_from_directory(&nested)
        .unwrap();

    assert_eq!(loaded.config.worker_threads(), 4);
}

#[test]
#[serial]
fn test_project_overrides_global() {
    let temp_dir = TempDir::new().unwrap();
    let global = temp_dir.path().join("global.toml");
    fs::write(
        &global,
        r#"
[call]
env_capacity = 64
initial_reserve = 2

[logging]
filter = "nifbridge=warn"
"#,
    )
    .unwrap();

    let project = temp_dir.path().join("project");
    fs::create_dir_all(&project).unwrap();
    create_config_file(
        &project,
        r#"
[call]
env_capacity = 128
"#,
    );

    let loaded = ConfigLoader::with_global_path(&global)
        .load_from_directory(&project)
        .unwrap();

    assert_eq!(loaded.config.env_capacity(), 128);
    assert_eq!(loaded.config.initial_reserve(), 2);
    assert_eq!(loaded.config.log_filter(), "nifbridge=warn");
}

#[test]
#[serial]
fn test_load_from_missing_file() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("missing.toml");

    let result = isolated_loader(&temp_dir).load_from_file(&missing);
    assert!(matches!(result, Err(ConfigError::NotFound(_))));
}

#[test]
#[serial]
fn test_invalid_toml_reports_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = create_config_file(temp_dir.path(), "[call\nenv_capacity = ");

    match isolated_loader(&temp_dir).load_from_file(&path) {
        Err(ConfigError::TomlParseError { file, .. }) => assert_eq!(file, path),
        other => panic!("expected TomlParseError, got {:?}", other),
    }
}

// ============================================================================
// Environment Override Tests
// ============================================================================

#[rstest]
#[case("NIFBRIDGE_ENV_CAPACITY", "2048")]
#[case("NIFBRIDGE_WORKER_THREADS", "6")]
#[case("NIFBRIDGE_LOG", "nifbridge=trace")]
#[serial]
fn test_env_override_applies(#[case] var: &str, #[case] value: &str) {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(temp_dir.path(), "");

    env::set_var(var, value);
    let loaded = isolated_loader(&temp_dir).load_from_directory(temp_dir.path());
    env::remove_var(var);
    let config = loaded.unwrap().config;

    match var {
        "NIFBRIDGE_ENV_CAPACITY" => assert_eq!(config.env_capacity(), 2048),
        "NIFBRIDGE_WORKER_THREADS" => assert_eq!(config.worker_threads(), 6),
        _ => assert_eq!(config.log_filter(), "nifbridge=trace"),
    }
}

#[test]
#[serial]
fn test_env_override_beats_project() {
    let temp_dir = TempDir::new().unwrap();
    create_config_file(
        temp_dir.path(),
        r#"
[call]
env_capacity = 10
"#,
    );

    env::set_var("NIFBRIDGE_ENV_CAPACITY", "20");
    let loaded = isolated_loader(&temp_dir).load_from_directory(temp_dir.path());
    env::remove_var("NIFBRIDGE_ENV_CAPACITY");

    assert_eq!(loaded.unwrap().config.env_capacity(), 20);
}

#[test]
#[serial]
fn test_env_override_is_validated() {
    let temp_dir = TempDir::new().unwrap();

    env::set_var("NIFBRIDGE_WORKER_THREADS", "0");
    let loaded = isolated_loader(&temp_dir).load_from_directory(temp_dir.path());
    env::remove_var("NIFBRIDGE_WORKER_THREADS");

    assert!(matches!(loaded, Err(ConfigError::InvalidValue { .. })));
}

#[test]
#[serial]
fn test_env_override_rejects_non_numeric() {
    let temp_dir = TempDir::new().unwrap();

    env::set_var("NIFBRIDGE_ENV_CAPACITY", "plenty");
    let loaded = isolated_loader(&temp_dir).load_from_directory(temp_dir.path());
    env::remove_var("NIFBRIDGE_ENV_CAPACITY");

    match loaded {
        Err(ConfigError::InvalidValue { field, .. }) => {
            assert_eq!(field, "NIFBRIDGE_ENV_CAPACITY")
        }
        other => panic!("expected InvalidValue, got {:?}", other),
    }
}
