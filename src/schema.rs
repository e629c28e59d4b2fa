//! Entity Schema
//!
//! Immutable descriptors of entity types: ordered fields, identity fields and
//! per-field input metadata. Schemas are produced outside the engine (by an
//! introspection collaborator or a descriptor file) and are read-only here.

use crate::entity::{Entity, Identity};
use crate::error::{SchemaError, ValidationError};
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

pub mod input;
pub mod introspection;
pub mod kind;
pub mod registry;
pub mod validate;

pub use input::{default_entity, shape, to_input, to_input_ids, to_input_ids_or_as_is};
pub use kind::{FieldKind, NamedKind, ObjectRef, ScalarKind};
pub use registry::SchemaRegistry;

/// `is` rule: the value must match a regular expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternRule {
    pub pattern: String,
    pub message: String,
}

/// `len` rule: the value's character count must lie within `[min, max]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthRule {
    pub min: usize,
    pub max: usize,
    pub message: String,
}

/// Validator rules attached to an input field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorRules {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is: Option<PatternRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub len: Option<LengthRule>,
}

/// Input side of a field: its input kind, default and validator rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputShape {
    pub kind: FieldKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validator: Option<ValidatorRules>,
}

impl InputShape {
    pub fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            default_value: None,
            validator: None,
        }
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn with_validator(mut self, rules: ValidatorRules) -> Self {
        self.validator = Some(rules);
        self
    }

    /// Mandatory and nothing to fall back on.
    pub fn is_required(&self) -> bool {
        self.kind.is_mandatory() && self.default_value.is_none()
    }
}

/// One field of an entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
    /// `None` for read-only fields that no input type accepts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<InputShape>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            input: None,
        }
    }

    /// Field whose input shape mirrors its output kind.
    pub fn writable(name: impl Into<String>, kind: FieldKind) -> Self {
        let input = InputShape::new(kind.clone());
        Self {
            name: name.into(),
            kind,
            input: Some(input),
        }
    }

    pub fn with_input(mut self, input: InputShape) -> Self {
        self.input = Some(input);
        self
    }

    pub fn is_relational(&self) -> bool {
        self.kind.is_object()
    }
}

/// Serialized form of an [`EntitySchema`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    pub name: String,
    pub identity_fields: Vec<String>,
    pub fields: Vec<FieldDescriptor>,
}

/// Immutable descriptor of an entity type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "SchemaDescriptor", into = "SchemaDescriptor")]
pub struct EntitySchema {
    name: String,
    identity_fields: Vec<String>,
    fields: IndexMap<String, FieldDescriptor>,
    /// Compiled `is` rules, by field name.
    patterns: HashMap<String, Regex>,
}

impl PartialEq for EntitySchema {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.identity_fields == other.identity_fields && self.fields == other.fields
    }
}

impl EntitySchema {
    /// Build a schema; identity fields must be non-empty and name existing fields.
    pub fn new(
        name: impl Into<String>,
        identity_fields: Vec<String>,
        fields: Vec<FieldDescriptor>,
    ) -> Result<Self, SchemaError> {
        let name = name.into();
        if identity_fields.is_empty() {
            return Err(SchemaError::EmptyIdentity(name));
        }
        let fields: IndexMap<String, FieldDescriptor> = fields
            .into_iter()
            .map(|field| (field.name.clone(), field))
            .collect();
        for id in &identity_fields {
            if !fields.contains_key(id) {
                return Err(SchemaError::UnknownIdentityField {
                    type_name: name,
                    field: id.clone(),
                });
            }
        }
        let mut patterns = HashMap::new();
        for field in fields.values() {
            if let Some(rules) = field.input.as_ref().and_then(|input| input.validator.as_ref()) {
                if let Some(regex) = validate::compile_rules(&field.name, rules)? {
                    patterns.insert(field.name.clone(), regex);
                }
            }
        }
        Ok(Self {
            name,
            identity_fields,
            fields,
            patterns,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn identity_fields(&self) -> &[String] {
        &self.identity_fields
    }

    pub fn is_identity_field(&self, field: &str) -> bool {
        self.identity_fields.iter().any(|id| id == field)
    }

    /// Fields in display order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.values()
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.get(name)
    }

    /// Compiled `is` rule of `field`, if it has one.
    pub fn pattern(&self, field: &str) -> Option<&Regex> {
        self.patterns.get(field)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Fields whose leaf type is another entity type.
    pub fn relational_fields(&self) -> impl Iterator<Item = (&FieldDescriptor, &ObjectRef)> {
        self.fields
            .values()
            .filter_map(|field| field.kind.object_ref().map(|object| (field, object)))
    }

    /// Identity of `entity` under this schema.
    pub fn identity_of(&self, entity: &Entity) -> Result<Identity, ValidationError> {
        entity.identity(&self.identity_fields).ok_or_else(|| {
            let field = self
                .identity_fields
                .iter()
                .find(|id| matches!(entity.get(id), None | Some(Value::Null)))
                .cloned()
                .unwrap_or_default();
            ValidationError::MissingIdentity {
                type_name: self.name.clone(),
                field,
            }
        })
    }
}

impl TryFrom<SchemaDescriptor> for EntitySchema {
    type Error = SchemaError;

    fn try_from(descriptor: SchemaDescriptor) -> Result<Self, Self::Error> {
        EntitySchema::new(descriptor.name, descriptor.identity_fields, descriptor.fields)
    }
}

impl From<EntitySchema> for SchemaDescriptor {
    fn from(schema: EntitySchema) -> Self {
        Self {
            name: schema.name,
            identity_fields: schema.identity_fields,
            fields: schema.fields.into_values().collect(),
        }
    }
}
