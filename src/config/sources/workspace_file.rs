//! Workspace config file source: `entity-sync.toml` and `entity-sync.{env}.toml`

use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, File, FileFormat};
use std::path::Path;

pub const WORKSPACE_CONFIG_FILE: &str = "entity-sync.toml";

/// Add workspace config files to `builder`.
/// The base file comes first, then the one named by `ENTITY_SYNC_ENV`.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
    workspace_root: &Path,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let mut builder = builder;

    let base = workspace_root.join(WORKSPACE_CONFIG_FILE);
    if base.exists() {
        builder = builder.add_source(File::from(base).format(FileFormat::Toml).required(false));
    }

    if let Ok(env_name) = std::env::var("ENTITY_SYNC_ENV") {
        let env_path = workspace_root.join(format!("entity-sync.{}.toml", env_name));
        if env_path.exists() {
            builder = builder.add_source(File::from(env_path).format(FileFormat::Toml).required(false));
        }
    }

    Ok(builder)
}
