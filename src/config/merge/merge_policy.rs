//! Merge rules: defaults, override order, conflict handling.
//!
//! Later sources replace earlier ones key by key; tables merge, arrays and
//! scalars are replaced wholesale.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError};

/// Create a Config builder with the built-in defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("remote.timeout_ms", 30_000i64)?
        .set_default("controller.event_capacity", 64i64)?
        .set_default("controller.subscribe_on_start", true)?
        .set_default("logging.level", "info")?
        .set_default("logging.format", "text")?
        .set_default("logging.output", "stderr")
}
