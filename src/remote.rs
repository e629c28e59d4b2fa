//! Remote Data Service Port
//!
//! The engine talks to exactly one logical data service through
//! [`RemoteService`]. Every endpoint is derived from an [`EntitySchema`], so
//! adapters receive the schema alongside each call.

use crate::entity::{Entity, Identity};
use crate::error::RemoteError;
use crate::schema::EntitySchema;
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::pin::Pin;

pub mod documents;
pub mod http;
pub mod memory;

pub use http::GraphqlRemote;
pub use memory::InMemoryRemote;

/// Sort direction of one ordering key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// Filter and ordering variables of a controller's query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryVariables {
    /// Field constraints: a plain value means equality, `{"_inOp": [...]}`
    /// means membership.
    #[serde(default, rename = "where", skip_serializing_if = "Map::is_empty")]
    pub filter: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order: Vec<OrderBy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

impl QueryVariables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Variables selecting exactly the entity with `identity`.
    pub fn for_identity(identity: &Identity) -> Self {
        Self {
            filter: identity.to_entity().into_map(),
            ..Self::default()
        }
    }

    /// Variables selecting every entity in `identities`.
    pub fn for_identities(identities: &[Identity]) -> Self {
        match identities {
            [single] => Self::for_identity(single),
            _ if identities.iter().all(|id| id.parts().len() == 1) => {
                let field = identities
                    .first()
                    .map(|id| id.parts()[0].0.clone())
                    .unwrap_or_default();
                Self::new().filter_in(field, identities.iter().map(|id| id.primary().clone()).collect())
            }
            _ => {
                let mut vars = Self::new();
                vars.filter.insert(
                    "_or".to_string(),
                    Value::Array(identities.iter().map(|id| id.to_entity().into_value()).collect()),
                );
                vars
            }
        }
    }

    pub fn filter_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter.insert(field.into(), value.into());
        self
    }

    pub fn filter_in(mut self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.filter.insert(field.into(), json!({ "_inOp": values }));
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order.push(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether `entity` satisfies every filter constraint.
    pub fn matches(&self, entity: &Entity) -> bool {
        filter_matches(&self.filter, entity)
    }

    /// The `{"query": ...}` JSON argument sent with list queries.
    pub fn to_query_argument(&self) -> Value {
        let order: Vec<Value> = self
            .order
            .iter()
            .map(|o| json!([o.field, o.direction]))
            .collect();
        let mut query = Map::new();
        if !self.filter.is_empty() {
            query.insert("where".to_string(), Value::Object(self.filter.clone()));
        }
        if !order.is_empty() {
            query.insert("order".to_string(), Value::Array(order));
        }
        if let Some(limit) = self.limit {
            query.insert("limit".to_string(), json!(limit));
        }
        Value::Object(query)
    }
}

fn filter_matches(filter: &Map<String, Value>, entity: &Entity) -> bool {
    filter.iter().all(|(field, constraint)| {
        if field == "_or" {
            return constraint.as_array().is_some_and(|alternatives| {
                alternatives.iter().any(|alt| {
                    alt.as_object()
                        .is_some_and(|alt| filter_matches(alt, entity))
                })
            });
        }
        let actual = entity.get(field).unwrap_or(&Value::Null);
        match constraint.get("_inOp").and_then(Value::as_array) {
            Some(allowed) => allowed.iter().any(|candidate| candidate == actual),
            None => match (constraint, actual) {
                // references compare by their own fields only
                (Value::Object(expected), Value::Object(row)) => expected
                    .iter()
                    .all(|(key, value)| row.get(key) == Some(value)),
                _ => constraint == actual,
            },
        }
    })
}

/// Kind of push notification stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushKind {
    Created,
    Updated,
    Deleted,
}

impl PushKind {
    pub const ALL: [PushKind; 3] = [PushKind::Created, PushKind::Updated, PushKind::Deleted];

    pub fn as_str(self) -> &'static str {
        match self {
            PushKind::Created => "created",
            PushKind::Updated => "updated",
            PushKind::Deleted => "deleted",
        }
    }
}

impl fmt::Display for PushKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One remote-originated change notification.
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    Created(Vec<Entity>),
    Updated(Vec<Entity>),
    Deleted(Vec<Identity>),
}

impl PushEvent {
    pub fn kind(&self) -> PushKind {
        match self {
            PushEvent::Created(_) => PushKind::Created,
            PushEvent::Updated(_) => PushKind::Updated,
            PushEvent::Deleted(_) => PushKind::Deleted,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PushEvent::Created(rows) | PushEvent::Updated(rows) => rows.len(),
            PushEvent::Deleted(ids) => ids.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Stream of push notifications for one (type, kind, variables) subscription.
pub type PushStream = Pin<Box<dyn Stream<Item = Result<PushEvent, RemoteError>> + Send>>;

/// The remote typed data service.
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// List entities matching `variables`.
    async fn query(
        &self,
        schema: &EntitySchema,
        variables: &QueryVariables,
    ) -> Result<Vec<Entity>, RemoteError>;

    /// Persist a new entity; the response carries its assigned identity.
    async fn create(&self, schema: &EntitySchema, input: Entity) -> Result<Entity, RemoteError>;

    /// Apply `changes` to every entity in `filter`.
    async fn update(
        &self,
        schema: &EntitySchema,
        changes: Entity,
        filter: Vec<Identity>,
    ) -> Result<Vec<Entity>, RemoteError>;

    /// Delete every entity in `filter`, returning the identities deleted.
    async fn delete(
        &self,
        schema: &EntitySchema,
        filter: Vec<Identity>,
    ) -> Result<Vec<Identity>, RemoteError>;

    /// Subscribe to push notifications of one kind.
    async fn subscribe(
        &self,
        schema: &EntitySchema,
        kind: PushKind,
        variables: &QueryVariables,
    ) -> Result<PushStream, RemoteError>;

    /// Adapter name for logs.
    fn name(&self) -> &str;
}
