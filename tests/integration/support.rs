//! Shared fixtures for integration tests
//!
//! [`ScriptedRemote`] wraps the in-memory service and records every call at
//! dispatch time. Calls can be held until a test releases them, or made to
//! fail once.

use async_trait::async_trait;
use entity_sync::config::ControllerConfig;
use entity_sync::remote::{InMemoryRemote, PushKind, PushStream, QueryVariables, RemoteService};
use entity_sync::schema::{EntitySchema, FieldDescriptor, FieldKind, InputShape, ScalarKind};
use entity_sync::{Entity, Identity, RemoteError, SyncContext};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Query,
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub op: Op,
    pub type_name: String,
    pub payload: Value,
}

pub struct ScriptedRemote {
    pub inner: InMemoryRemote,
    calls: Mutex<Vec<Call>>,
    holds: Mutex<HashMap<(Op, String), VecDeque<oneshot::Receiver<()>>>>,
    failures: Mutex<HashMap<(Op, String), RemoteError>>,
}

impl ScriptedRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryRemote::new(),
            calls: Mutex::new(Vec::new()),
            holds: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
        })
    }

    /// Hold the next `op` on `type_name` until the returned sender fires.
    /// Holds queue up in FIFO order.
    pub fn hold(&self, op: Op, type_name: &str) -> oneshot::Sender<()> {
        let (release, gate) = oneshot::channel();
        self.holds
            .lock()
            .entry((op, type_name.to_string()))
            .or_default()
            .push_back(gate);
        release
    }

    /// Fail the next `op` on `type_name` with `error`.
    pub fn fail_next(&self, op: Op, type_name: &str, error: RemoteError) {
        self.failures.lock().insert((op, type_name.to_string()), error);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn calls_of(&self, op: Op, type_name: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| call.op == op && call.type_name == type_name)
            .collect()
    }

    /// Record the call and wait out any hold; the outcome decides failure.
    async fn dispatch(&self, op: Op, type_name: &str, payload: Value) -> Result<(), RemoteError> {
        self.calls.lock().push(Call {
            op,
            type_name: type_name.to_string(),
            payload,
        });
        let gate = self
            .holds
            .lock()
            .get_mut(&(op, type_name.to_string()))
            .and_then(|queue| queue.pop_front());
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        match self.failures.lock().remove(&(op, type_name.to_string())) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

fn identities(filter: &[Identity]) -> Value {
    Value::Array(filter.iter().map(|id| id.to_entity().into_value()).collect())
}

#[async_trait]
impl RemoteService for ScriptedRemote {
    async fn query(&self, schema: &EntitySchema, variables: &QueryVariables) -> Result<Vec<Entity>, RemoteError> {
        self.dispatch(Op::Query, schema.name(), variables.to_query_argument())
            .await?;
        self.inner.query(schema, variables).await
    }

    async fn create(&self, schema: &EntitySchema, input: Entity) -> Result<Entity, RemoteError> {
        self.dispatch(Op::Create, schema.name(), input.clone().into_value())
            .await?;
        self.inner.create(schema, input).await
    }

    async fn update(
        &self,
        schema: &EntitySchema,
        changes: Entity,
        filter: Vec<Identity>,
    ) -> Result<Vec<Entity>, RemoteError> {
        let payload = json!({"changes": changes.clone().into_value(), "filter": identities(&filter)});
        self.dispatch(Op::Update, schema.name(), payload).await?;
        self.inner.update(schema, changes, filter).await
    }

    async fn delete(&self, schema: &EntitySchema, filter: Vec<Identity>) -> Result<Vec<Identity>, RemoteError> {
        self.dispatch(Op::Delete, schema.name(), identities(&filter))
            .await?;
        self.inner.delete(schema, filter).await
    }

    async fn subscribe(
        &self,
        schema: &EntitySchema,
        kind: PushKind,
        variables: &QueryVariables,
    ) -> Result<PushStream, RemoteError> {
        self.inner.subscribe(schema, kind, variables).await
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Context without push listeners, so only explicit calls reach the remote.
pub fn quiet_context(remote: &Arc<ScriptedRemote>) -> SyncContext {
    let config = ControllerConfig {
        subscribe_on_start: false,
        ..ControllerConfig::default()
    };
    SyncContext::with_config(remote.clone(), config)
}

pub fn entity(value: Value) -> Entity {
    Entity::from_value(value).unwrap()
}

fn ids() -> Vec<String> {
    vec!["id".to_string()]
}

pub fn region_schema() -> Arc<EntitySchema> {
    Arc::new(
        EntitySchema::new(
            "Region",
            ids(),
            vec![
                FieldDescriptor::new("id", FieldKind::scalar(ScalarKind::Id)),
                FieldDescriptor::writable("label", FieldKind::scalar(ScalarKind::String)),
            ],
        )
        .unwrap(),
    )
}

/// Customer with a mandatory name and a single Region reference.
pub fn customer_schema() -> Arc<EntitySchema> {
    Arc::new(
        EntitySchema::new(
            "Customer",
            ids(),
            vec![
                FieldDescriptor::new("id", FieldKind::scalar(ScalarKind::Id)),
                FieldDescriptor::writable(
                    "name",
                    FieldKind::non_null(FieldKind::scalar(ScalarKind::String)),
                ),
                FieldDescriptor::new("region", FieldKind::object("Region", ids()))
                    .with_input(InputShape::new(FieldKind::object("Region", ids()))),
            ],
        )
        .unwrap(),
    )
}

/// Order with a list of Line entries.
pub fn order_schema() -> Arc<EntitySchema> {
    Arc::new(
        EntitySchema::new(
            "Order",
            ids(),
            vec![
                FieldDescriptor::new("id", FieldKind::scalar(ScalarKind::Id)),
                FieldDescriptor::writable("note", FieldKind::scalar(ScalarKind::String)),
                FieldDescriptor::new("lines", FieldKind::list(FieldKind::object("Line", ids())))
                    .with_input(InputShape::new(FieldKind::list(FieldKind::object("Line", ids())))),
            ],
        )
        .unwrap(),
    )
}

pub fn line_schema() -> Arc<EntitySchema> {
    Arc::new(
        EntitySchema::new(
            "Line",
            ids(),
            vec![
                FieldDescriptor::new("id", FieldKind::scalar(ScalarKind::Id)),
                FieldDescriptor::writable("qty", FieldKind::scalar(ScalarKind::Int)),
            ],
        )
        .unwrap(),
    )
}

/// Wait for the first event matching `pred`, failing after one second.
pub async fn wait_for<T: Clone, F>(events: &mut broadcast::Receiver<T>, mut pred: F) -> T
where
    F: FnMut(&T) -> bool,
{
    tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Let spawned tasks run until `done` holds, failing after one second.
pub async fn settle_until<F: FnMut() -> bool>(mut done: F) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while !done() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("timed out waiting for background tasks")
}
