//! CLI parse: clap types for entity-sync. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// entity-sync CLI - inspect schemas and query the remote data service
#[derive(Parser)]
#[command(name = "entity-sync")]
#[command(about = "Schema-driven entity controllers over a GraphQL data service")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Schema descriptor commands (check, documents)
    Schema {
        #[command(subcommand)]
        command: SchemaCommands,
    },
    /// Run one query against the configured endpoint and print the rows
    Query {
        /// Schema descriptor file (defaults to the configured descriptor paths)
        file: Option<PathBuf>,
        /// Entity type to query when the descriptors hold several
        #[arg(long = "type")]
        type_name: Option<String>,
        /// Query variables as JSON, e.g. '{"where": {"id": 1}}'
        #[arg(long)]
        vars: Option<String>,
        /// Maximum number of rows
        #[arg(long)]
        limit: Option<u64>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Configuration commands
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum SchemaCommands {
    /// Load descriptors and print their fields
    Check {
        /// Schema descriptor file (defaults to the configured descriptor paths)
        file: Option<PathBuf>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Print the GraphQL documents derived from a descriptor
    Documents {
        /// Schema descriptor file (defaults to the configured descriptor paths)
        file: Option<PathBuf>,
        /// Only this entity type
        #[arg(long = "type")]
        type_name: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,
}
