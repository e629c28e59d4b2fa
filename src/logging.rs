//! Logging System
//!
//! Structured logging on top of `tracing`. Level, format and destination come
//! from the `[logging]` config section and can be overridden through
//! `ENTITY_SYNC_LOG`, `ENTITY_SYNC_LOG_MODULES`, `ENTITY_SYNC_LOG_FORMAT` and
//! `ENTITY_SYNC_LOG_OUTPUT`.

use crate::error::SyncError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error, off
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: json, text
    #[serde(default = "default_format")]
    pub format: String,

    /// Output destination: stdout, stderr, file
    #[serde(default = "default_output")]
    pub output: String,

    /// Log file path when output is "file"
    #[serde(default = "default_log_file")]
    pub file: PathBuf,

    /// Colored output (text format on a terminal only)
    #[serde(default = "default_true")]
    pub color: bool,

    /// Per-module levels, e.g. `entity_sync::controller = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

// stdout carries command output
fn default_output() -> String {
    "stderr".to_string()
}

fn default_log_file() -> PathBuf {
    directories::ProjectDirs::from("", "", "entity-sync")
        .map(|dirs| dirs.data_local_dir().join("entity-sync.log"))
        .unwrap_or_else(|| PathBuf::from(".entity-sync/entity-sync.log"))
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_format(),
            output: default_output(),
            file: default_log_file(),
            color: default_true(),
            modules: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Output {
    Stdout,
    Stderr,
    File,
}

/// Install the global subscriber.
///
/// Environment variables win over `config`, which wins over defaults. Fails
/// if a subscriber is already installed.
pub fn init_logging(config: Option<&LoggingConfig>) -> Result<(), SyncError> {
    let defaults = LoggingConfig::default();
    let config = config.unwrap_or(&defaults);

    let filter = build_env_filter(config)?;
    let format = determine_format(config)?;
    let output = determine_output(config)?;

    let writer = match output {
        Output::Stdout => BoxMakeWriter::new(std::io::stdout),
        Output::Stderr => BoxMakeWriter::new(std::io::stderr),
        Output::File => BoxMakeWriter::new(open_log_file(config)?),
    };
    let ansi = config.color && output != Output::File;

    let subscriber = Registry::default().with(filter);
    let installed = match format {
        Format::Json => subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(writer),
            )
            .try_init(),
        Format::Text => subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(ansi)
                    .with_writer(writer),
            )
            .try_init(),
    };
    installed.map_err(|e| SyncError::Config(format!("Failed to install logger: {}", e)))
}

fn open_log_file(config: &LoggingConfig) -> Result<std::fs::File, SyncError> {
    if let Some(parent) = config.file.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| SyncError::Config(format!("Failed to create log directory: {}", e)))?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.file)
        .map_err(|e| {
            SyncError::Config(format!("Failed to open log file {}: {}", config.file.display(), e))
        })
}

/// Filter from `ENTITY_SYNC_LOG`, else from the config level plus module
/// directives from the config and `ENTITY_SYNC_LOG_MODULES`.
fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter, SyncError> {
    if let Ok(filter) = EnvFilter::try_from_env("ENTITY_SYNC_LOG") {
        return Ok(filter);
    }
    if config.level == "off" {
        return Ok(EnvFilter::new("off"));
    }

    let mut filter = EnvFilter::new(&config.level);
    for (module, level) in &config.modules {
        filter = filter.add_directive(parse_directive(module, level)?);
    }
    if let Ok(modules) = std::env::var("ENTITY_SYNC_LOG_MODULES") {
        for (module, level) in parse_module_list(&modules) {
            filter = filter.add_directive(parse_directive(module, level)?);
        }
    }
    Ok(filter)
}

fn parse_directive(
    module: &str,
    level: &str,
) -> Result<tracing_subscriber::filter::Directive, SyncError> {
    format!("{}={}", module, level)
        .parse()
        .map_err(|e| SyncError::Config(format!("Invalid log directive {}={}: {}", module, level, e)))
}

/// `a=debug, b=trace` into pairs; malformed entries are skipped.
fn parse_module_list(spec: &str) -> Vec<(&str, &str)> {
    spec.split(',')
        .filter_map(|entry| {
            let (module, level) = entry.split_once('=')?;
            let (module, level) = (module.trim(), level.trim());
            (!module.is_empty() && !level.is_empty()).then_some((module, level))
        })
        .collect()
}

fn determine_format(config: &LoggingConfig) -> Result<Format, SyncError> {
    let from_env = std::env::var("ENTITY_SYNC_LOG_FORMAT").ok();
    match from_env.as_deref().unwrap_or(config.format.as_str()) {
        "json" => Ok(Format::Json),
        "text" => Ok(Format::Text),
        other => Err(SyncError::Config(format!(
            "Invalid log format: {} (must be 'json' or 'text')",
            other
        ))),
    }
}

fn determine_output(config: &LoggingConfig) -> Result<Output, SyncError> {
    let from_env = std::env::var("ENTITY_SYNC_LOG_OUTPUT").ok();
    parse_output(from_env.as_deref().unwrap_or(config.output.as_str()))
}

fn parse_output(output: &str) -> Result<Output, SyncError> {
    match output {
        "stdout" => Ok(Output::Stdout),
        "stderr" => Ok(Output::Stderr),
        "file" => Ok(Output::File),
        _ => Err(SyncError::Config(format!(
            "Invalid log output: {} (must be 'stdout', 'stderr' or 'file')",
            output
        ))),
    }
}
