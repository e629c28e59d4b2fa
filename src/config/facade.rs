//! Configuration loader facade.

use super::merge::merge_policy;
use super::sources::{environment, global_file, workspace_file};
use super::SyncConfig;
use crate::error::SyncError;
use config::{Config, File, FileFormat};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Loads [`SyncConfig`] from all layers.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for `workspace_root`.
    ///
    /// Precedence, lowest first: defaults, global file, workspace file,
    /// environment. The result is validated.
    pub fn load(workspace_root: &Path) -> Result<SyncConfig, SyncError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = environment::add_to_builder(builder);

        let config: SyncConfig = builder.build()?.try_deserialize()?;
        debug!(workspace = %workspace_root.display(), "Configuration loaded");
        Self::validated(config)
    }

    /// Load a single TOML file on top of the defaults, ignoring every other
    /// layer.
    pub fn load_from_file(path: &Path) -> Result<SyncConfig, SyncError> {
        if !path.exists() {
            return Err(SyncError::Config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }
        let config: SyncConfig = merge_policy::builder_with_defaults()?
            .add_source(File::from(path).format(FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        Self::validated(config)
    }

    /// Only the defaults.
    pub fn defaults() -> Result<SyncConfig, SyncError> {
        let config: SyncConfig = Config::builder().build()?.try_deserialize()?;
        Ok(config)
    }

    /// Descriptor paths resolved against `workspace_root`.
    pub fn descriptor_paths(config: &SyncConfig, workspace_root: &Path) -> Vec<PathBuf> {
        config
            .schema
            .descriptor_paths
            .iter()
            .map(|path| {
                if path.is_absolute() {
                    path.clone()
                } else {
                    workspace_root.join(path)
                }
            })
            .collect()
    }

    fn validated(config: SyncConfig) -> Result<SyncConfig, SyncError> {
        config.validate().map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            SyncError::Config(format!(
                "Configuration validation failed:\n{}",
                messages.join("\n")
            ))
        })?;
        Ok(config)
    }
}
