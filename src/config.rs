//! Configuration System
//!
//! Layered configuration: built-in defaults, the user's global file, the
//! workspace file and `ENTITY_SYNC__SECTION__KEY` environment variables, in
//! increasing precedence. See [`ConfigLoader`].

use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;
pub use sources::global_file::global_config_path;
pub use sources::workspace_file::WORKSPACE_CONFIG_FILE;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub controller: ControllerConfig,

    #[serde(default)]
    pub schema: SchemaConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote data service endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// GraphQL endpoint URL
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Request timeout (milliseconds)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Extra headers sent with every request
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: default_timeout_ms(),
            headers: BTreeMap::new(),
        }
    }
}

/// Controller behaviour shared by every controller of a context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Capacity of each controller's event channel
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Subscribe to push notifications when a query is enabled
    #[serde(default = "default_true")]
    pub subscribe_on_start: bool,
}

fn default_event_capacity() -> usize {
    64
}

fn default_true() -> bool {
    true
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            event_capacity: default_event_capacity(),
            subscribe_on_start: default_true(),
        }
    }
}

/// Where schema descriptors are loaded from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// Descriptor files, relative to the workspace root unless absolute
    #[serde(default)]
    pub descriptor_paths: Vec<PathBuf>,
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValidationError {
    Remote(String),
    Controller(String),
    Schema(String),
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValidationError::Remote(msg) => write!(f, "remote: {}", msg),
            ConfigValidationError::Controller(msg) => write!(f, "controller: {}", msg),
            ConfigValidationError::Schema(msg) => write!(f, "schema: {}", msg),
        }
    }
}

impl std::error::Error for ConfigValidationError {}

impl RemoteConfig {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(endpoint) = &self.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(format!("endpoint must be an http(s) URL, got '{}'", endpoint));
            }
        }
        if self.timeout_ms == 0 {
            return Err("timeout_ms must be positive".to_string());
        }
        Ok(())
    }
}

impl SyncConfig {
    /// Validate the entire configuration, collecting every problem.
    pub fn validate(&self) -> Result<(), Vec<ConfigValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = self.remote.validate() {
            errors.push(ConfigValidationError::Remote(e));
        }
        if self.controller.event_capacity == 0 {
            errors.push(ConfigValidationError::Controller(
                "event_capacity must be positive".to_string(),
            ));
        }
        for path in &self.schema.descriptor_paths {
            if path.as_os_str().is_empty() {
                errors.push(ConfigValidationError::Schema(
                    "descriptor path cannot be empty".to_string(),
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
