//! Field kinds
//!
//! Closed description of a field's shape, decided once when the schema is
//! loaded. Every use site matches on [`FieldKind`] instead of re-deriving the
//! shape from kind strings.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Built-in and custom scalar types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ScalarKind {
    Id,
    String,
    Int,
    Float,
    Boolean,
    Date,
    Json,
    Custom(String),
}

impl ScalarKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "ID" => ScalarKind::Id,
            "String" => ScalarKind::String,
            "Int" => ScalarKind::Int,
            "Float" => ScalarKind::Float,
            "Boolean" => ScalarKind::Boolean,
            "Date" => ScalarKind::Date,
            "JSON" => ScalarKind::Json,
            other => ScalarKind::Custom(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ScalarKind::Id => "ID",
            ScalarKind::String => "String",
            ScalarKind::Int => "Int",
            ScalarKind::Float => "Float",
            ScalarKind::Boolean => "Boolean",
            ScalarKind::Date => "Date",
            ScalarKind::Json => "JSON",
            ScalarKind::Custom(name) => name,
        }
    }
}

impl From<String> for ScalarKind {
    fn from(name: String) -> Self {
        ScalarKind::from_name(&name)
    }
}

impl From<ScalarKind> for String {
    fn from(kind: ScalarKind) -> Self {
        kind.name().to_string()
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Reference from a relational field to another entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub type_name: String,
    pub identity_fields: Vec<String>,
}

impl ObjectRef {
    pub fn new(type_name: impl Into<String>, identity_fields: Vec<String>) -> Self {
        Self {
            type_name: type_name.into(),
            identity_fields,
        }
    }
}

/// Shape of a field: a named leaf wrapped in any combination of list and
/// non-null wrappers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "of", rename_all = "snake_case")]
pub enum FieldKind {
    Scalar(ScalarKind),
    Enum(String),
    Object(ObjectRef),
    List(Box<FieldKind>),
    NonNull(Box<FieldKind>),
}

/// The named leaf at the bottom of a [`FieldKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedKind<'a> {
    Scalar(&'a ScalarKind),
    Enum(&'a str),
    Object(&'a ObjectRef),
}

impl FieldKind {
    pub fn scalar(kind: ScalarKind) -> Self {
        FieldKind::Scalar(kind)
    }

    pub fn object(type_name: impl Into<String>, identity_fields: Vec<String>) -> Self {
        FieldKind::Object(ObjectRef::new(type_name, identity_fields))
    }

    pub fn list(inner: FieldKind) -> Self {
        FieldKind::List(Box::new(inner))
    }

    pub fn non_null(inner: FieldKind) -> Self {
        FieldKind::NonNull(Box::new(inner))
    }

    /// Outermost wrapper is non-null.
    pub fn is_mandatory(&self) -> bool {
        matches!(self, FieldKind::NonNull(_))
    }

    /// A list wrapper appears anywhere in the chain.
    pub fn is_list(&self) -> bool {
        match self {
            FieldKind::List(_) => true,
            FieldKind::NonNull(inner) => inner.is_list(),
            FieldKind::Scalar(_) | FieldKind::Enum(_) | FieldKind::Object(_) => false,
        }
    }

    pub fn is_object(&self) -> bool {
        matches!(self.named(), NamedKind::Object(_))
    }

    pub fn named(&self) -> NamedKind<'_> {
        match self {
            FieldKind::Scalar(scalar) => NamedKind::Scalar(scalar),
            FieldKind::Enum(name) => NamedKind::Enum(name),
            FieldKind::Object(object) => NamedKind::Object(object),
            FieldKind::List(inner) | FieldKind::NonNull(inner) => inner.named(),
        }
    }

    pub fn object_ref(&self) -> Option<&ObjectRef> {
        match self.named() {
            NamedKind::Object(object) => Some(object),
            NamedKind::Scalar(_) | NamedKind::Enum(_) => None,
        }
    }

    /// Scalar leaf of a non-list field.
    pub fn single_scalar(&self) -> Option<&ScalarKind> {
        if self.is_list() {
            return None;
        }
        match self.named() {
            NamedKind::Scalar(scalar) => Some(scalar),
            NamedKind::Enum(_) | NamedKind::Object(_) => None,
        }
    }

    /// Name of the leaf type (`Int`, `Region`, ...).
    pub fn type_name(&self) -> &str {
        match self.named() {
            NamedKind::Scalar(scalar) => scalar.name(),
            NamedKind::Enum(name) => name,
            NamedKind::Object(object) => &object.type_name,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Scalar(scalar) => write!(f, "{}", scalar),
            FieldKind::Enum(name) => write!(f, "{}", name),
            FieldKind::Object(object) => write!(f, "{}", object.type_name),
            FieldKind::List(inner) => write!(f, "[{}]", inner),
            FieldKind::NonNull(inner) => write!(f, "{}!", inner),
        }
    }
}
