//! CLI domain: parse, route, presentation and output only.
//! The route table dispatches to the schema, remote and controller layers.

mod output;
mod parse;
mod presentation;
mod route;

pub use output::map_error;
pub use parse::{Cli, Commands, ConfigCommands, SchemaCommands};
pub use route::RunContext;
