//! GraphQL documents derived from an entity schema.
//!
//! Every type exposes the same CRUD surface: a plural list query, three
//! mutations and three subscriptions, all returning the `<Type>Details`
//! fragment.

use crate::entity::Identity;
use crate::remote::PushKind;
use crate::schema::EntitySchema;
use serde_json::{json, Map, Value};

/// English plural of a type name, as used for list query fields.
pub fn plural(name: &str) -> String {
    let lower = name.to_ascii_lowercase();
    if let Some(stem) = name.strip_suffix('y') {
        let before = stem.chars().last().map(|c| c.to_ascii_lowercase());
        if !matches!(before, Some('a' | 'e' | 'i' | 'o' | 'u') | None) {
            return format!("{}ies", stem);
        }
    }
    if ["s", "x", "z", "ch", "sh"].iter().any(|end| lower.ends_with(end)) {
        return format!("{}es", name);
    }
    format!("{}s", name)
}

pub fn fragment_name(schema: &EntitySchema) -> String {
    format!("{}Details", schema.name())
}

/// `fragment <Type>Details on <Type> { ... }`; references select only the
/// identity fields of their target type.
pub fn fragment(schema: &EntitySchema) -> String {
    let mut selection = String::new();
    for field in schema.fields() {
        match field.kind.object_ref() {
            Some(target) => {
                selection.push_str(&format!(
                    "    {} {{ {} }}\n",
                    field.name,
                    target.identity_fields.join(" ")
                ));
            }
            None => selection.push_str(&format!("    {}\n", field.name)),
        }
    }
    format!(
        "fragment {} on {} {{\n{}}}\n",
        fragment_name(schema),
        schema.name(),
        selection
    )
}

/// Name of the top-level response field for each operation.
pub fn query_field(schema: &EntitySchema) -> String {
    plural(schema.name())
}

pub fn create_field(schema: &EntitySchema) -> String {
    format!("create{}", schema.name())
}

pub fn update_field(schema: &EntitySchema) -> String {
    format!("update{}", schema.name())
}

pub fn delete_field(schema: &EntitySchema) -> String {
    format!("delete{}", schema.name())
}

pub fn subscription_field(schema: &EntitySchema, kind: PushKind) -> String {
    format!("{}{}", kind.as_str(), schema.name())
}

pub fn query_document(schema: &EntitySchema) -> String {
    let field = query_field(schema);
    format!(
        "query {field}($query: JSON!) {{\n  {field}(query: $query) {{\n    ...{frag}\n  }}\n}}\n{fragment}",
        field = field,
        frag = fragment_name(schema),
        fragment = fragment(schema),
    )
}

pub fn create_document(schema: &EntitySchema) -> String {
    format!(
        "mutation {field}($input: {name}CreateInput) {{\n  {field}(input: $input, atomic: true) {{\n    ...{frag}\n  }}\n}}\n{fragment}",
        field = create_field(schema),
        name = schema.name(),
        frag = fragment_name(schema),
        fragment = fragment(schema),
    )
}

pub fn update_document(schema: &EntitySchema) -> String {
    format!(
        "mutation {field}($input: {name}UpdateInput, $query: JSON!) {{\n  {field}(input: $input, query: $query, atomic: true) {{\n    ...{frag}\n  }}\n}}\n{fragment}",
        field = update_field(schema),
        name = schema.name(),
        frag = fragment_name(schema),
        fragment = fragment(schema),
    )
}

pub fn delete_document(schema: &EntitySchema) -> String {
    format!(
        "mutation {field}($query: JSON!) {{\n  {field}(query: $query, atomic: true) {{\n    {ids}\n  }}\n}}\n",
        field = delete_field(schema),
        ids = schema.identity_fields().join("\n    "),
    )
}

/// Deleted notifications only carry identities.
pub fn subscription_document(schema: &EntitySchema, kind: PushKind) -> String {
    let field = subscription_field(schema, kind);
    match kind {
        PushKind::Deleted => format!(
            "subscription {field}($query: JSON) {{\n  {field}(query: $query) {{\n    {ids}\n  }}\n}}\n",
            field = field,
            ids = schema.identity_fields().join("\n    "),
        ),
        _ => format!(
            "subscription {field}($query: JSON) {{\n  {field}(query: $query) {{\n    ...{frag}\n  }}\n}}\n{fragment}",
            field = field,
            frag = fragment_name(schema),
            fragment = fragment(schema),
        ),
    }
}

/// `{"where": ...}` selecting exactly `identities`.
///
/// Single-field identities use one `_inOp` membership test; composite
/// identities use an `_or` of per-entity equalities.
pub fn identity_filter(schema: &EntitySchema, identities: &[Identity]) -> Value {
    let where_clause = match schema.identity_fields() {
        [single] => {
            let values: Vec<Value> = identities.iter().map(|id| id.primary().clone()).collect();
            let mut clause = Map::new();
            clause.insert(single.clone(), json!({ "_inOp": values }));
            Value::Object(clause)
        }
        _ => json!({
            "_or": identities
                .iter()
                .map(|id| id.to_entity().into_value())
                .collect::<Vec<_>>()
        }),
    };
    json!({ "where": where_clause })
}
