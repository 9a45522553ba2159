//! Building hosts from configuration files

use nifbridge_config::CONFIG_FILE_NAME;
use nifbridge_runtime::{BridgeError, CallBridge, Host};
use pretty_assertions::assert_eq;
use serial_test::serial;
use std::env;
use std::fs;
use tempfile::TempDir;

fn project_with_config(content: &str) -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join(CONFIG_FILE_NAME), content).unwrap();
    temp_dir
}

#[test]
#[serial]
fn test_from_directory_reads_project_config() {
    let temp_dir = project_with_config(
        r#"
[call]
env_capacity = 2048

[runtime]
worker_threads = 3
"#,
    );

    let host = Host::from_directory(temp_dir.path()).unwrap();

    assert_eq!(host.config().env_capacity(), 2048);
    assert_eq!(host.config().worker_threads(), 3);

    // Contexts opened on this host get the configured budget
    let bridge = CallBridge::load(&host).unwrap();
    assert!(format!("{:?}", bridge).contains("env_capacity: 2048"));
}

#[test]
#[serial]
fn test_from_directory_applies_env_overrides() {
    let temp_dir = project_with_config(
        r#"
[runtime]
worker_threads = 3
"#,
    );

    env::set_var("NIFBRIDGE_WORKER_THREADS", "1");
    let host = Host::from_directory(temp_dir.path());
    env::remove_var("NIFBRIDGE_WORKER_THREADS");

    assert_eq!(host.unwrap().config().worker_threads(), 1);
}

#[test]
#[serial]
fn test_from_directory_rejects_invalid_config() {
    let temp_dir = project_with_config(
        r#"
[call]
env_capacity = 0
"#,
    );

    let result = Host::from_directory(temp_dir.path());
    assert!(matches!(result, Err(BridgeError::Config(ref m)) if m.contains("call.env_capacity")));
}
