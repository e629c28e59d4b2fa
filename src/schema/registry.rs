//! Schema registry: schemas handed to controllers, keyed by type name.

use crate::error::{SchemaError, SyncError};
use crate::schema::introspection::from_introspection;
use crate::schema::EntitySchema;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// In-memory set of loaded schemas.
#[derive(Debug, Default, Clone)]
pub struct SchemaRegistry {
    schemas: HashMap<String, Arc<EntitySchema>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema, replacing any previous one of the same name.
    pub fn register(&mut self, schema: EntitySchema) -> Arc<EntitySchema> {
        let schema = Arc::new(schema);
        if let Some(previous) = self
            .schemas
            .insert(schema.name().to_string(), Arc::clone(&schema))
        {
            if *previous != *schema {
                warn!(type_name = %schema.name(), "Replacing registered schema with a different descriptor");
            }
        }
        schema
    }

    /// Register a resolved introspection document.
    pub fn register_introspection(&mut self, document: &Value) -> Result<Arc<EntitySchema>, SchemaError> {
        let schema = from_introspection(document)?;
        Ok(self.register(schema))
    }

    /// Load a descriptor file holding one document or an array of documents.
    ///
    /// Each document may be either the native descriptor
    /// (`{name, identity_fields, fields}`) or a resolved introspection
    /// document (`{name, ids, fields}`).
    pub fn load_file(&mut self, path: &Path) -> Result<Vec<Arc<EntitySchema>>, SchemaError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| SchemaError::Io(format!("{}: {}", path.display(), e)))?;
        let document: Value =
            serde_json::from_str(&text).map_err(|e| SchemaError::Parse(format!("{}: {}", path.display(), e)))?;

        let documents = match document {
            Value::Array(items) => items,
            single => vec![single],
        };
        let mut loaded = Vec::with_capacity(documents.len());
        for document in documents {
            let schema = if document.get("identity_fields").is_some() {
                serde_json::from_value::<EntitySchema>(document)
                    .map_err(|e| SchemaError::Parse(e.to_string()))?
            } else {
                from_introspection(&document)?
            };
            debug!(type_name = %schema.name(), path = %path.display(), "Loaded schema");
            loaded.push(self.register(schema));
        }
        Ok(loaded)
    }

    pub fn get(&self, name: &str) -> Option<Arc<EntitySchema>> {
        self.schemas.get(name).cloned()
    }

    pub fn get_or_error(&self, name: &str) -> Result<Arc<EntitySchema>, SyncError> {
        self.get(name)
            .ok_or_else(|| SyncError::UnknownType(name.to_string()))
    }

    /// Registered type names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.schemas.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
