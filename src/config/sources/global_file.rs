//! Global config file source: `<config dir>/entity-sync/config.toml`

use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, File, FileFormat};
use std::path::PathBuf;
use tracing::debug;

/// Path to the global config file for this user, if a home exists.
pub fn global_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "entity-sync")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Add the global config file to `builder` when it exists.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let Some(path) = global_config_path() else {
        return Ok(builder);
    };
    if !path.exists() {
        debug!(config_path = %path.display(), "No global configuration file");
        return Ok(builder);
    }
    Ok(builder.add_source(File::from(path).format(FileFormat::Toml).required(false)))
}
