//! CLI presentation: tables and JSON for command results.

use crate::entity::Entity;
use crate::error::SyncError;
use crate::remote::documents;
use crate::remote::PushKind;
use crate::schema::EntitySchema;
use comfy_table::Table;
use serde_json::{json, Value};
use std::sync::Arc;

fn to_json(value: &Value) -> Result<String, SyncError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| SyncError::Config(format!("Failed to render JSON: {}", e)))
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "-".to_string(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

/// One row per field of every schema.
pub fn format_schemas(schemas: &[Arc<EntitySchema>], format: &str) -> Result<String, SyncError> {
    if format == "json" {
        let schemas: Vec<&EntitySchema> = schemas.iter().map(|schema| schema.as_ref()).collect();
        let described = serde_json::to_value(&schemas)
            .map_err(|e| SyncError::Config(format!("Failed to render JSON: {}", e)))?;
        return to_json(&described);
    }

    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["Type", "Field", "Kind", "Identity", "Input", "Relation"]);
    for schema in schemas {
        for field in schema.fields() {
            let identity = if schema.is_identity_field(&field.name) { "yes" } else { "" };
            let input = match &field.input {
                Some(shape) if shape.is_required() => format!("{} (required)", shape.kind),
                Some(shape) => shape.kind.to_string(),
                None => "read-only".to_string(),
            };
            let relation = field
                .kind
                .object_ref()
                .map(|target| format!("{} by {}", target.type_name, target.identity_fields.join(", ")))
                .unwrap_or_default();
            table.add_row(vec![
                schema.name().to_string(),
                field.name.clone(),
                field.kind.to_string(),
                identity.to_string(),
                input,
                relation,
            ]);
        }
    }
    Ok(table.to_string())
}

/// Every document the GraphQL adapter derives for `schema`.
pub fn format_documents(schema: &EntitySchema) -> String {
    let mut sections = vec![
        format!("# {} fragment\n{}", schema.name(), documents::fragment(schema)),
        format!("# query\n{}", documents::query_document(schema)),
        format!("# create\n{}", documents::create_document(schema)),
        format!("# update\n{}", documents::update_document(schema)),
        format!("# delete\n{}", documents::delete_document(schema)),
    ];
    for kind in PushKind::ALL {
        sections.push(format!(
            "# subscription ({})\n{}",
            kind,
            documents::subscription_document(schema, kind)
        ));
    }
    sections.join("\n\n")
}

/// Query results, columns in schema field order.
pub fn format_rows(schema: &EntitySchema, rows: &[Entity], format: &str) -> Result<String, SyncError> {
    if format == "json" {
        let rows: Vec<Value> = rows.iter().map(|row| row.clone().into_value()).collect();
        return to_json(&json!({ "type": schema.name(), "rows": rows }));
    }
    if rows.is_empty() {
        return Ok(format!("No {} rows", schema.name()));
    }

    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(schema.fields().map(|field| field.name.clone()).collect::<Vec<_>>());
    for row in rows {
        table.add_row(
            schema
                .fields()
                .map(|field| cell(row.get(&field.name)))
                .collect::<Vec<_>>(),
        );
    }
    Ok(format!("{}\n{} row(s)", table, rows.len()))
}
