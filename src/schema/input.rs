//! Input shaping: turning edited values into mutation payloads.

use crate::entity::{Entity, Identity};
use crate::error::ValidationError;
use crate::schema::validate::is_empty;
use crate::schema::{EntitySchema, FieldDescriptor, InputShape, ObjectRef, ScalarKind};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde_json::{Number, Value};
use tracing::debug;

/// Identity of `entity` as required by update and delete filters.
pub fn to_input_ids(schema: &EntitySchema, entity: &Entity) -> Result<Identity, ValidationError> {
    schema.identity_of(entity)
}

/// Reduce a nested reference to its identity fields when all are present,
/// otherwise pass it through unchanged (an inline new object).
pub fn to_input_ids_or_as_is(target: &ObjectRef, value: &Value) -> Value {
    let Value::Object(map) = value else {
        return value.clone();
    };
    let complete = target
        .identity_fields
        .iter()
        .all(|id| map.get(id).is_some_and(|v| !v.is_null()));
    if !complete {
        return value.clone();
    }
    Value::Object(
        target
            .identity_fields
            .iter()
            .filter_map(|id| map.get(id).map(|v| (id.clone(), v.clone())))
            .collect(),
    )
}

/// Coerce every field of `partial` into its input representation.
///
/// Read-only fields are dropped. Relational fields are reduced to identities,
/// dates normalised to RFC 3339, numbers parsed from their text form, and
/// empty values replaced by the field's input default when it has one.
pub fn to_input(schema: &EntitySchema, partial: &Entity) -> Result<Entity, ValidationError> {
    let mut input = Entity::new();
    for (name, value) in partial.fields() {
        let field = schema
            .field(name)
            .ok_or_else(|| ValidationError::UnknownField {
                type_name: schema.name().to_string(),
                field: name.clone(),
            })?;
        let Some(shape) = &field.input else {
            debug!(type_name = %schema.name(), field = %name, "Dropping read-only field from input");
            continue;
        };
        input.insert(name.clone(), coerce_field(field, shape, value)?);
    }
    Ok(input)
}

fn coerce_field(field: &FieldDescriptor, shape: &InputShape, value: &Value) -> Result<Value, ValidationError> {
    if let Some(target) = field.kind.object_ref() {
        return Ok(match value {
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| to_input_ids_or_as_is(target, item))
                    .collect(),
            ),
            other => to_input_ids_or_as_is(target, other),
        });
    }

    if is_empty(&shape.kind, Some(value)) {
        if let Some(default) = &shape.default_value {
            return Ok(default.clone());
        }
    }

    match field.kind.single_scalar() {
        Some(ScalarKind::Date) => coerce_date(&field.name, value),
        Some(ScalarKind::Int) => coerce_int(&field.name, value),
        Some(ScalarKind::Float) => coerce_float(&field.name, value),
        _ => Ok(value.clone()),
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        reason: reason.into(),
    }
}

fn coerce_date(field: &str, value: &Value) -> Result<Value, ValidationError> {
    let text = match value {
        Value::Null => return Ok(Value::Null),
        Value::String(s) if s.is_empty() => return Ok(Value::Null),
        Value::String(s) => s,
        other => return Err(invalid(field, format!("expected a date string, got {}", other))),
    };
    let parsed = DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .map(|d| d.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc())
        })
        .map_err(|e| invalid(field, format!("unparseable date {:?}: {}", text, e)))?;
    Ok(Value::String(parsed.to_rfc3339_opts(SecondsFormat::Millis, true)))
}

fn coerce_int(field: &str, value: &Value) -> Result<Value, ValidationError> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::String(s) if s.trim().is_empty() => Ok(Value::Null),
        Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value.clone()),
        Value::Number(n) => n
            .as_f64()
            .map(|f| Value::from(f.trunc() as i64))
            .ok_or_else(|| invalid(field, "not an integer")),
        Value::String(s) => {
            let trimmed = s.trim();
            trimmed
                .parse::<i64>()
                .map(Value::from)
                .or_else(|_| trimmed.parse::<f64>().map(|f| Value::from(f.trunc() as i64)))
                .map_err(|_| invalid(field, format!("{:?} is not an integer", s)))
        }
        other => Err(invalid(field, format!("{} is not an integer", other))),
    }
}

fn coerce_float(field: &str, value: &Value) -> Result<Value, ValidationError> {
    match value {
        Value::Null | Value::Number(_) => Ok(value.clone()),
        Value::String(s) if s.trim().is_empty() => Ok(Value::Null),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| invalid(field, format!("{:?} is not a number", s))),
        other => Err(invalid(field, format!("{} is not a number", other))),
    }
}

/// Blank value for a create form.
///
/// Identity fields are omitted. Lists start empty, defaults are used when
/// present (numbers rendered as text), booleans start `false`, strings `""`
/// and everything else `null`.
pub fn default_entity(schema: &EntitySchema) -> Entity {
    schema
        .fields()
        .filter(|field| !schema.is_identity_field(&field.name))
        .map(|field| {
            let default = field.input.as_ref().and_then(|input| input.default_value.clone());
            let value = match (default, field.kind.single_scalar()) {
                (Some(_), _) if field.kind.is_list() => Value::Array(Vec::new()),
                (Some(Value::Number(n)), Some(ScalarKind::Int | ScalarKind::Float)) => {
                    Value::String(n.to_string())
                }
                (Some(default), _) => default,
                (None, _) if field.kind.is_list() => Value::Array(Vec::new()),
                (None, Some(ScalarKind::Boolean)) => Value::Bool(false),
                (None, Some(ScalarKind::String)) => Value::String(String::new()),
                (None, _) => Value::Null,
            };
            (field.name.clone(), value)
        })
        .collect()
}

/// Keep only the keys of `value` that are fields of `schema`.
pub fn shape(schema: &EntitySchema, value: &Entity) -> Entity {
    value.filtered(|name| schema.has_field(name))
}
