//! In-process remote data service.
//!
//! Keeps one table per type and broadcasts a push notification for every
//! mutation, including those made by other clients through [`InMemoryRemote::publish`].

use crate::entity::{Entity, Identity};
use crate::error::RemoteError;
use crate::remote::{Direction, PushEvent, PushKind, PushStream, QueryVariables, RemoteService};
use crate::schema::EntitySchema;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

const PUSH_CAPACITY: usize = 256;

pub struct InMemoryRemote {
    tables: Mutex<HashMap<String, Vec<Entity>>>,
    next_id: AtomicU64,
    pushes: broadcast::Sender<(String, PushEvent)>,
}

impl Default for InMemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRemote {
    pub fn new() -> Self {
        let (pushes, _) = broadcast::channel(PUSH_CAPACITY);
        Self {
            tables: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            pushes,
        }
    }

    /// Replace a table's rows. No notification is sent.
    pub fn seed(&self, type_name: &str, rows: Vec<Entity>) {
        self.tables.lock().insert(type_name.to_string(), rows);
    }

    pub fn rows(&self, type_name: &str) -> Vec<Entity> {
        self.tables.lock().get(type_name).cloned().unwrap_or_default()
    }

    /// Number of open push subscriptions across all types and kinds.
    pub fn subscriber_count(&self) -> usize {
        self.pushes.receiver_count()
    }

    /// Apply a change made by another client and notify subscribers.
    pub fn publish(&self, schema: &EntitySchema, event: PushEvent) {
        {
            let mut tables = self.tables.lock();
            let table = tables.entry(schema.name().to_string()).or_default();
            match &event {
                PushEvent::Created(rows) => table.extend(rows.iter().cloned()),
                PushEvent::Updated(rows) => {
                    for patch in rows {
                        if let Some(identity) = patch.identity(schema.identity_fields()) {
                            for row in table.iter_mut().filter(|row| identity.matches(row)) {
                                row.merge(patch);
                            }
                        }
                    }
                }
                PushEvent::Deleted(ids) => table.retain(|row| !ids.iter().any(|id| id.matches(row))),
            }
        }
        self.notify(schema.name(), event);
    }

    fn notify(&self, type_name: &str, event: PushEvent) {
        if event.is_empty() {
            return;
        }
        // no subscribers is fine
        let _ = self.pushes.send((type_name.to_string(), event));
    }

    /// Fill missing single-field identities with a fresh sequence number.
    fn assign_identity(&self, schema: &EntitySchema, entity: &mut Entity) -> Result<(), RemoteError> {
        if entity.identity(schema.identity_fields()).is_some() {
            return Ok(());
        }
        match schema.identity_fields() {
            [single] => {
                let next = self.next_id.fetch_add(1, AtomicOrdering::SeqCst);
                entity.insert(single.clone(), Value::from(next));
                Ok(())
            }
            _ => Err(RemoteError::Rejected(format!(
                "{} requires an explicit composite identity",
                schema.name()
            ))),
        }
    }
}

fn compare(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        _ => a.to_string().cmp(&b.to_string()),
    }
}

fn sort_rows(rows: &mut [Entity], variables: &QueryVariables) {
    if variables.order.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        for key in &variables.order {
            let ordering = compare(
                a.get(&key.field).unwrap_or(&Value::Null),
                b.get(&key.field).unwrap_or(&Value::Null),
            );
            let ordering = match key.direction {
                Direction::Asc => ordering,
                Direction::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

#[async_trait]
impl RemoteService for InMemoryRemote {
    async fn query(
        &self,
        schema: &EntitySchema,
        variables: &QueryVariables,
    ) -> Result<Vec<Entity>, RemoteError> {
        let mut rows: Vec<Entity> = {
            let tables = self.tables.lock();
            tables
                .get(schema.name())
                .map(|table| table.iter().filter(|row| variables.matches(row)).cloned().collect())
                .unwrap_or_default()
        };
        sort_rows(&mut rows, variables);
        if let Some(limit) = variables.limit {
            rows.truncate(limit as usize);
        }
        debug!(type_name = %schema.name(), rows = rows.len(), "In-memory query");
        Ok(rows)
    }

    async fn create(&self, schema: &EntitySchema, mut input: Entity) -> Result<Entity, RemoteError> {
        self.assign_identity(schema, &mut input)?;
        let identity = schema
            .identity_of(&input)
            .map_err(|e| RemoteError::Rejected(e.to_string()))?;
        {
            let mut tables = self.tables.lock();
            let table = tables.entry(schema.name().to_string()).or_default();
            if table.iter().any(|row| identity.matches(row)) {
                return Err(RemoteError::Rejected(format!(
                    "{} {} already exists",
                    schema.name(),
                    identity
                )));
            }
            table.push(input.clone());
        }
        self.notify(schema.name(), PushEvent::Created(vec![input.clone()]));
        Ok(input)
    }

    async fn update(
        &self,
        schema: &EntitySchema,
        changes: Entity,
        filter: Vec<Identity>,
    ) -> Result<Vec<Entity>, RemoteError> {
        let updated: Vec<Entity> = {
            let mut tables = self.tables.lock();
            let table = tables.entry(schema.name().to_string()).or_default();
            table
                .iter_mut()
                .filter(|row| filter.iter().any(|id| id.matches(row)))
                .map(|row| {
                    row.merge(&changes);
                    row.clone()
                })
                .collect()
        };
        if updated.is_empty() {
            warn!(type_name = %schema.name(), "Update matched no rows");
        }
        self.notify(schema.name(), PushEvent::Updated(updated.clone()));
        Ok(updated)
    }

    async fn delete(
        &self,
        schema: &EntitySchema,
        filter: Vec<Identity>,
    ) -> Result<Vec<Identity>, RemoteError> {
        let deleted: Vec<Identity> = {
            let mut tables = self.tables.lock();
            let table = tables.entry(schema.name().to_string()).or_default();
            let mut deleted = Vec::new();
            table.retain(|row| match filter.iter().find(|id| id.matches(row)) {
                Some(identity) => {
                    deleted.push(identity.clone());
                    false
                }
                None => true,
            });
            deleted
        };
        self.notify(schema.name(), PushEvent::Deleted(deleted.clone()));
        Ok(deleted)
    }

    async fn subscribe(
        &self,
        schema: &EntitySchema,
        kind: PushKind,
        variables: &QueryVariables,
    ) -> Result<PushStream, RemoteError> {
        let receiver = self.pushes.subscribe();
        let type_name = schema.name().to_string();
        let variables = variables.clone();

        let stream = futures::stream::unfold(receiver, move |mut receiver| {
            let type_name = type_name.clone();
            let variables = variables.clone();
            async move {
                loop {
                    match receiver.recv().await {
                        Ok((name, event)) if name == type_name && event.kind() == kind => {
                            let event = match event {
                                PushEvent::Created(rows) => PushEvent::Created(
                                    rows.into_iter().filter(|row| variables.matches(row)).collect(),
                                ),
                                PushEvent::Updated(rows) => PushEvent::Updated(
                                    rows.into_iter().filter(|row| variables.matches(row)).collect(),
                                ),
                                deleted => deleted,
                            };
                            if event.is_empty() {
                                continue;
                            }
                            return Some((Ok(event), receiver));
                        }
                        Ok(_) => continue,
                        Err(RecvError::Lagged(skipped)) => {
                            let err = RemoteError::Transport(format!("subscriber lagged by {} events", skipped));
                            return Some((Err(err), receiver));
                        }
                        Err(RecvError::Closed) => return None,
                    }
                }
            }
        });
        Ok(Box::pin(stream))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
