//! Entities and identities
//!
//! An [`Entity`] is one record of a given type: an ordered map from field name
//! to JSON value. Its [`Identity`] is the ordered tuple of identity-field values
//! that addresses it both locally and remotely.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::hash::{Hash, Hasher};

/// One record of an entity type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Entity(Map<String, Value>);

/// Field-level change payload sent with an update mutation.
pub type ChangeSet = Entity;

impl Entity {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wrap a JSON value; only objects are entities.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(field.into(), value)
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.shift_remove(field)
    }

    pub fn contains_field(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Identity of this entity, or `None` when any identity field is absent or null.
    pub fn identity(&self, identity_fields: &[String]) -> Option<Identity> {
        let mut parts = Vec::with_capacity(identity_fields.len());
        for field in identity_fields {
            match self.0.get(field) {
                None | Some(Value::Null) => return None,
                Some(value) => parts.push((field.clone(), value.clone())),
            }
        }
        Identity::from_parts(parts)
    }

    /// Shallow merge: every top-level field of `patch` replaces ours wholesale.
    pub fn merge(&mut self, patch: &Entity) {
        for (field, value) in patch.fields() {
            self.0.insert(field.clone(), value.clone());
        }
    }

    /// Whether merging `patch` would change any field.
    pub fn differs_from_patch(&self, patch: &Entity) -> bool {
        patch
            .fields()
            .any(|(field, value)| self.0.get(field) != Some(value))
    }

    /// Minimal change-set of `self` (the edited value) against `original`.
    ///
    /// Contains every field of `self` that is absent from `original` or whose
    /// value differs from it. Fields only present in `original` are ignored.
    pub fn diff(&self, original: &Entity) -> ChangeSet {
        self.0
            .iter()
            .filter(|(field, value)| original.get(field) != Some(*value))
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect()
    }

    /// Copy of this entity restricted to fields accepted by `keep`.
    pub fn filtered(&self, mut keep: impl FnMut(&str) -> bool) -> Entity {
        self.0
            .iter()
            .filter(|(field, _)| keep(field))
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect()
    }
}

impl From<Map<String, Value>> for Entity {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Entity> for Value {
    fn from(entity: Entity) -> Self {
        entity.into_value()
    }
}

impl FromIterator<(String, Value)> for Entity {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Ordered identity-field values of one entity.
///
/// Equality and hashing go through a canonical JSON key of the `(field,
/// value)` pairs sorted by field name, so identities can index maps
/// regardless of how the values were produced or which order the fields
/// arrived in.
#[derive(Debug, Clone)]
pub struct Identity {
    parts: Vec<(String, Value)>,
    key: String,
}

impl Identity {
    /// Build an identity; `None` when `parts` is empty.
    pub fn from_parts(parts: Vec<(String, Value)>) -> Option<Self> {
        if parts.is_empty() {
            return None;
        }
        let key = canonical_key(&parts);
        Some(Self { parts, key })
    }

    /// Single-field identity, the common `{id: ...}` case.
    pub fn single(field: impl Into<String>, value: impl Into<Value>) -> Self {
        let parts = vec![(field.into(), value.into())];
        let key = canonical_key(&parts);
        Self { parts, key }
    }

    pub fn parts(&self) -> &[(String, Value)] {
        &self.parts
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.parts.iter().map(|(_, value)| value)
    }

    /// Value of the first identity field; what single-key filters are built from.
    pub fn primary(&self) -> &Value {
        &self.parts[0].1
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Identity as an input object (`{field: value, ...}`).
    pub fn to_entity(&self) -> Entity {
        self.parts.iter().cloned().collect()
    }

    /// Whether `entity` carries exactly these identity values.
    pub fn matches(&self, entity: &Entity) -> bool {
        self.parts
            .iter()
            .all(|(field, value)| entity.get(field) == Some(value))
    }
}

fn canonical_key(parts: &[(String, Value)]) -> String {
    let mut pairs: Vec<&(String, Value)> = parts.iter().collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    Value::Array(
        pairs
            .into_iter()
            .map(|(field, value)| Value::Array(vec![Value::String(field.clone()), value.clone()]))
            .collect(),
    )
    .to_string()
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Identity {}

impl Hash for Identity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (field, value)) in self.parts.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", field, value)?;
        }
        write!(f, "}}")
    }
}

impl Serialize for Identity {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_entity().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Identity {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let map = Map::<String, Value>::deserialize(deserializer)?;
        Identity::from_parts(map.into_iter().collect())
            .ok_or_else(|| serde::de::Error::custom("identity must have at least one field"))
    }
}
