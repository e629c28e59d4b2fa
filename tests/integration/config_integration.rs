//! Integration tests for the configuration system

use entity_sync::config::{ConfigLoader, SyncConfig, WORKSPACE_CONFIG_FILE};
use entity_sync::remote::GraphqlRemote;
use entity_sync::SyncError;
use std::sync::Mutex;
use tempfile::TempDir;

/// Serializes tests that read or write `ENTITY_SYNC__*` variables.
static ENV_MUTEX: Mutex<()> = Mutex::new(());

fn workspace(contents: &str) -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(temp_dir.path().join(WORKSPACE_CONFIG_FILE), contents).unwrap();
    temp_dir
}

#[test]
fn test_workspace_file_overrides_defaults() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let temp_dir = workspace(
        r#"
[remote]
endpoint = "https://data.example.com/graphql"

[remote.headers]
x-tenant = "acme"

[controller]
event_capacity = 8

[schema]
descriptor_paths = ["schemas/customer.json", "/abs/region.json"]
"#,
    );

    let config = ConfigLoader::load(temp_dir.path()).unwrap();
    assert_eq!(config.remote.endpoint.as_deref(), Some("https://data.example.com/graphql"));
    assert_eq!(config.remote.headers.get("x-tenant").map(String::as_str), Some("acme"));
    assert_eq!(config.controller.event_capacity, 8);
    assert!(config.controller.subscribe_on_start);

    let paths = ConfigLoader::descriptor_paths(&config, temp_dir.path());
    assert_eq!(paths[0], temp_dir.path().join("schemas/customer.json"));
    assert_eq!(paths[1], std::path::PathBuf::from("/abs/region.json"));

    assert!(GraphqlRemote::new(&config.remote).is_ok());
}

#[test]
fn test_environment_overrides_workspace_file() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let temp_dir = workspace("[remote]\ntimeout_ms = 5000\n");

    std::env::set_var("ENTITY_SYNC__REMOTE__TIMEOUT_MS", "1200");
    let loaded = ConfigLoader::load(temp_dir.path());
    std::env::remove_var("ENTITY_SYNC__REMOTE__TIMEOUT_MS");

    assert_eq!(loaded.unwrap().remote.timeout_ms, 1200);
}

#[test]
fn test_invalid_workspace_file_is_reported() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let temp_dir = workspace("[remote]\nendpoint = \"ftp://nope\"\ntimeout_ms = 0\n");

    let err = ConfigLoader::load(temp_dir.path()).unwrap_err();
    assert!(matches!(err, SyncError::Config(_)));
    let message = err.to_string();
    assert!(message.contains("endpoint"));
}

#[test]
fn test_missing_workspace_file_uses_defaults() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let temp_dir = TempDir::new().unwrap();
    let config = ConfigLoader::load(temp_dir.path()).unwrap();
    assert_eq!(config.controller, SyncConfig::default().controller);
    assert!(matches!(
        GraphqlRemote::new(&SyncConfig::default().remote),
        Err(SyncError::Config(_))
    ));
}
