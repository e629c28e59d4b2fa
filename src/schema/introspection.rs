//! Conversion of resolved introspection documents into [`EntitySchema`].
//!
//! The introspection collaborator emits GraphQL-style type references
//! (`{kind, name, ofType}` chains) with identity fields and validators already
//! attached. They are classified into [`FieldKind`] here, once, at load time.

use crate::error::SchemaError;
use crate::schema::{
    EntitySchema, FieldDescriptor, FieldKind, InputShape, LengthRule, ObjectRef, PatternRule,
    ScalarKind, ValidatorRules,
};
use serde::Deserialize;
use serde_json::Value;

/// `{kind, name, ofType}` type reference as introspected.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTypeRef {
    pub kind: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub of_type: Option<Box<RawTypeRef>>,
    /// Identity fields of an object type, attached by the collaborator.
    #[serde(default)]
    pub ids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawRule<A> {
    pub args: A,
    #[serde(default)]
    pub msg: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawValidator {
    #[serde(default)]
    pub is: Option<RawRule<String>>,
    #[serde(default)]
    pub len: Option<RawRule<(usize, usize)>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawInputField {
    #[serde(rename = "type")]
    pub type_ref: RawTypeRef,
    #[serde(default)]
    pub default_value: Option<Value>,
    #[serde(default)]
    pub validator: Option<RawValidator>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawField {
    pub name: String,
    #[serde(rename = "type")]
    pub type_ref: RawTypeRef,
    #[serde(default)]
    pub input_type: Option<RawInputField>,
}

/// Resolved introspection document for one type.
#[derive(Debug, Clone, Deserialize)]
pub struct IntrospectedType {
    pub name: String,
    pub ids: Vec<String>,
    pub fields: Vec<RawField>,
}

impl RawTypeRef {
    /// Classify this reference. `ids_hint` supplies identity fields for object
    /// leaves that do not carry their own (input-side references).
    pub fn classify(&self, location: &str, ids_hint: &[String]) -> Result<FieldKind, SchemaError> {
        match self.kind.as_str() {
            "NON_NULL" => Ok(FieldKind::non_null(self.inner(location, ids_hint)?)),
            "LIST" => Ok(FieldKind::list(self.inner(location, ids_hint)?)),
            "SCALAR" => Ok(FieldKind::Scalar(ScalarKind::from_name(self.leaf_name(location)?))),
            "ENUM" => Ok(FieldKind::Enum(self.leaf_name(location)?.to_string())),
            "OBJECT" | "INPUT_OBJECT" => {
                let type_name = self.leaf_name(location)?;
                let ids = if self.ids.is_empty() {
                    ids_hint.to_vec()
                } else {
                    self.ids.clone()
                };
                if ids.is_empty() {
                    return Err(SchemaError::EmptyIdentity(type_name.to_string()));
                }
                Ok(FieldKind::Object(ObjectRef::new(type_name, ids)))
            }
            other => Err(SchemaError::UnknownKind {
                location: location.to_string(),
                kind: other.to_string(),
            }),
        }
    }

    fn inner(&self, location: &str, ids_hint: &[String]) -> Result<FieldKind, SchemaError> {
        self.of_type
            .as_ref()
            .ok_or_else(|| SchemaError::IncompleteTypeRef(location.to_string()))?
            .classify(location, ids_hint)
    }

    fn leaf_name(&self, location: &str) -> Result<&str, SchemaError> {
        self.name
            .as_deref()
            .ok_or_else(|| SchemaError::IncompleteTypeRef(location.to_string()))
    }
}

impl RawValidator {
    fn into_rules(self) -> ValidatorRules {
        ValidatorRules {
            is: self.is.map(|rule| PatternRule {
                pattern: rule.args,
                message: rule.msg,
            }),
            len: self.len.map(|rule| LengthRule {
                min: rule.args.0,
                max: rule.args.1,
                message: rule.msg,
            }),
        }
    }
}

impl TryFrom<IntrospectedType> for EntitySchema {
    type Error = SchemaError;

    fn try_from(raw: IntrospectedType) -> Result<Self, Self::Error> {
        let mut fields = Vec::with_capacity(raw.fields.len());
        for raw_field in raw.fields {
            let location = format!("{}.{}", raw.name, raw_field.name);
            let kind = raw_field.type_ref.classify(&location, &[])?;
            let hint: Vec<String> = kind
                .object_ref()
                .map(|object| object.identity_fields.clone())
                .unwrap_or_default();

            let input = raw_field
                .input_type
                .map(|input| -> Result<InputShape, SchemaError> {
                    Ok(InputShape {
                        kind: input.type_ref.classify(&format!("{} (input)", location), &hint)?,
                        default_value: input.default_value,
                        validator: input.validator.map(RawValidator::into_rules),
                    })
                })
                .transpose()?;

            fields.push(FieldDescriptor {
                name: raw_field.name,
                kind,
                input,
            });
        }
        EntitySchema::new(raw.name, raw.ids, fields)
    }
}

/// Parse and classify one introspection document.
pub fn from_introspection(document: &Value) -> Result<EntitySchema, SchemaError> {
    let raw: IntrospectedType = serde_json::from_value(document.clone())
        .map_err(|e| SchemaError::Parse(e.to_string()))?;
    EntitySchema::try_from(raw)
}
