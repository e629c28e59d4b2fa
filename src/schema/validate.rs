//! Input validation: mandatory fields and validator rules, checked before any
//! remote call is issued.

use crate::entity::Entity;
use crate::error::{SchemaError, ValidationError};
use crate::schema::{EntitySchema, FieldKind, InputShape, ScalarKind, ValidatorRules};
use regex::Regex;
use serde_json::Value;

/// Whether `value` counts as "not filled in" for a field of `kind`.
///
/// Booleans are empty unless they hold `true` or `false`; everything else is
/// empty when null or an empty string.
pub fn is_empty(kind: &FieldKind, value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(value) => match kind.single_scalar() {
            Some(ScalarKind::Boolean) => !value.is_boolean(),
            _ => value.as_str().is_some_and(str::is_empty),
        },
    }
}

/// Check the `len` bounds and compile the `is` pattern once, when the schema
/// is built.
pub(crate) fn compile_rules(field: &str, rules: &ValidatorRules) -> Result<Option<Regex>, SchemaError> {
    if let Some(len) = &rules.len {
        if len.min > len.max {
            return Err(SchemaError::InvalidValidator {
                field: field.to_string(),
                reason: format!("len min {} exceeds max {}", len.min, len.max),
            });
        }
    }
    rules
        .is
        .as_ref()
        .map(|rule| {
            Regex::new(&rule.pattern).map_err(|e| SchemaError::InvalidValidator {
                field: field.to_string(),
                reason: e.to_string(),
            })
        })
        .transpose()
}

/// Validate a create payload and drop optional fields left null.
///
/// Fails on the first unknown field, missing mandatory field without a
/// default, or rule violation.
pub fn prepare_create(schema: &EntitySchema, input: &Entity) -> Result<Entity, ValidationError> {
    reject_unknown_fields(schema, input)?;

    for field in schema.fields() {
        let Some(shape) = &field.input else {
            continue;
        };
        if shape.is_required() && is_empty(&shape.kind, input.get(&field.name)) {
            return Err(ValidationError::MissingMandatory {
                type_name: schema.name().to_string(),
                field: field.name.clone(),
            });
        }
    }

    check_rules(schema, input)?;

    Ok(input.filtered(|name| {
        let mandatory = schema
            .field(name)
            .and_then(|f| f.input.as_ref())
            .is_some_and(|shape| shape.kind.is_mandatory());
        mandatory || !matches!(input.get(name), Some(Value::Null))
    }))
}

/// Validate the fields present in an update change-set.
///
/// Absent fields are left alone; a mandatory field present but emptied is a
/// violation unless it has a default.
pub fn check_update(schema: &EntitySchema, changes: &Entity) -> Result<(), ValidationError> {
    reject_unknown_fields(schema, changes)?;
    for (name, value) in changes.fields() {
        let Some(shape) = schema.field(name).and_then(|f| f.input.as_ref()) else {
            continue;
        };
        if shape.is_required() && is_empty(&shape.kind, Some(value)) {
            return Err(ValidationError::MissingMandatory {
                type_name: schema.name().to_string(),
                field: name.clone(),
            });
        }
    }
    check_rules(schema, changes)
}

fn reject_unknown_fields(schema: &EntitySchema, input: &Entity) -> Result<(), ValidationError> {
    match input.field_names().find(|name| !schema.has_field(name)) {
        Some(name) => Err(ValidationError::UnknownField {
            type_name: schema.name().to_string(),
            field: name.clone(),
        }),
        None => Ok(()),
    }
}

/// Apply validator rules to every field of `input` that carries them.
pub fn check_rules(schema: &EntitySchema, input: &Entity) -> Result<(), ValidationError> {
    for (name, value) in input.fields() {
        let Some(shape) = schema.field(name).and_then(|f| f.input.as_ref()) else {
            continue;
        };
        let Some(rules) = &shape.validator else {
            continue;
        };
        match value {
            Value::Array(items) if shape.kind.is_list() => {
                for item in items {
                    check_value(schema, name, shape, rules, item)?;
                }
            }
            _ => check_value(schema, name, shape, rules, value)?,
        }
    }
    Ok(())
}

fn check_value(
    schema: &EntitySchema,
    field: &str,
    shape: &InputShape,
    rules: &ValidatorRules,
    value: &Value,
) -> Result<(), ValidationError> {
    if !shape.kind.is_mandatory() && is_empty(&shape.kind, Some(value)) {
        return Ok(());
    }
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    };

    if let (Some(regex), Some(rule)) = (schema.pattern(field), &rules.is) {
        if !regex.is_match(&text) {
            return Err(ValidationError::RuleViolation {
                field: field.to_string(),
                message: rule.message.clone(),
            });
        }
    }

    if let Some(rule) = &rules.len {
        let len = text.chars().count();
        if len < rule.min || len > rule.max {
            return Err(ValidationError::RuleViolation {
                field: field.to_string(),
                message: rule.message.clone(),
            });
        }
    }
    Ok(())
}
