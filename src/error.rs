//! Error types for the entity synchronization engine.

use thiserror::Error;

/// Local, pre-network input errors. Never sent to the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{type_name}.{field} is mandatory and has no default")]
    MissingMandatory { type_name: String, field: String },

    #[error("{type_name} entity is missing identity field {field}")]
    MissingIdentity { type_name: String, field: String },

    #[error("{type_name} has no field named {field}")]
    UnknownField { type_name: String, field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("{field}: {message}")]
    RuleViolation { field: String, message: String },
}

/// Errors reported by (or on the way to) the remote data service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("Remote service rejected the request: {0}")]
    Rejected(String),

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Operation not supported by this transport: {0}")]
    Unsupported(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

/// Malformed schema descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("Type {0} declares no identity fields")]
    EmptyIdentity(String),

    #[error("Identity field {field} is not a field of {type_name}")]
    UnknownIdentityField { type_name: String, field: String },

    #[error("Unknown type kind {kind} on {location}")]
    UnknownKind { location: String, kind: String },

    #[error("Type reference on {0} has neither a name nor an inner type")]
    IncompleteTypeRef(String),

    #[error("Invalid validator on {field}: {reason}")]
    InvalidValidator { field: String, reason: String },

    #[error("Failed to read schema descriptor: {0}")]
    Io(String),

    #[error("Failed to parse schema descriptor: {0}")]
    Parse(String),
}

/// Top-level error surfaced by controllers and the CLI.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("Nested save of field {field} failed: {source}")]
    Orchestration {
        field: String,
        #[source]
        source: Box<SyncError>,
    },

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Unknown entity type: {0}")]
    UnknownType(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Whether the error was raised locally, before any network call.
    pub fn is_local(&self) -> bool {
        match self {
            SyncError::Validation(_) | SyncError::Schema(_) | SyncError::UnknownType(_) => true,
            SyncError::Config(_) => true,
            SyncError::Remote(_) => false,
            SyncError::Orchestration { source, .. } => source.is_local(),
        }
    }
}

impl From<config::ConfigError> for SyncError {
    fn from(err: config::ConfigError) -> Self {
        SyncError::Config(err.to_string())
    }
}
