//! CLI output: error mapping from domain errors to the CLI surface.

use crate::error::SyncError;

/// Map an engine error to the message printed on stderr.
pub fn map_error(e: &SyncError) -> String {
    match e {
        SyncError::Validation(_) => format!("error: {}", e),
        SyncError::Remote(_) | SyncError::Orchestration { .. } => {
            format!("error: {} (remote data service)", e)
        }
        SyncError::Schema(_) | SyncError::UnknownType(_) => format!("error: {}", e),
        SyncError::Config(_) => format!("error: {}", e),
    }
}
