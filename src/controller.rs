//! Entity Controller
//!
//! One controller owns the live view of a single entity type under one set of
//! query variables: the fetched result list, the status tags of rows changed
//! elsewhere, and the create/update/delete operations on that type.
//!
//! Controllers are cheap handles over shared state. Nested editors attach
//! their own controller to a parent under the field they edit; saving the
//! parent then saves those children first (see [`crate::orchestrator`]).

use crate::cache::ResultCache;
use crate::entity::{Entity, Identity};
use crate::error::{RemoteError, SyncError, ValidationError};
use crate::invalidation::{ControllerId, Refetch, SyncContext};
use crate::orchestrator::NestedOutcome;
use crate::remote::{PushEvent, QueryVariables, RemoteService};
use crate::schema::{default_entity, EntitySchema};
use crate::status::{EntityStatus, StatusRegistry};
use futures::future::{BoxFuture, FutureExt};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;

pub mod events;
pub mod mutation;
pub mod push;
pub mod query;

pub use events::ControllerEvent;
pub use mutation::MutationKind;
pub use query::QueryState;

/// Link from a sub-controller to the controller it is registered with.
struct Binding {
    parent: Weak<ControllerInner>,
    parent_id: ControllerId,
    field: String,
}

#[derive(Debug, Default, Clone, Copy)]
struct PendingMutations {
    create: usize,
    update: usize,
    delete: usize,
}

impl PendingMutations {
    fn slot(&mut self, kind: MutationKind) -> &mut usize {
        match kind {
            MutationKind::Create => &mut self.create,
            MutationKind::Update => &mut self.update,
            MutationKind::Delete => &mut self.delete,
        }
    }

    fn get(&self, kind: MutationKind) -> usize {
        match kind {
            MutationKind::Create => self.create,
            MutationKind::Update => self.update,
            MutationKind::Delete => self.delete,
        }
    }
}

struct ControllerState {
    enabled: bool,
    torn_down: bool,
    variables: QueryVariables,
    /// Bumped on every fetch; responses stamped with an older value are stale.
    generation: u64,
    query_state: QueryState,
    cache: ResultCache,
    status: StatusRegistry,
    last_query_error: Option<RemoteError>,
    last_mutation_error: Option<SyncError>,
    pending: PendingMutations,
    sub_controllers: IndexMap<String, EntityController>,
    listeners: Vec<JoinHandle<()>>,
    binding: Option<Binding>,
}

pub(crate) struct ControllerInner {
    id: ControllerId,
    schema: Arc<EntitySchema>,
    ctx: SyncContext,
    remote: Arc<dyn RemoteService>,
    state: Mutex<ControllerState>,
    events: broadcast::Sender<ControllerEvent>,
}

impl ControllerInner {
    fn emit(&self, event: ControllerEvent) {
        // nobody listening is fine
        let _ = self.events.send(event);
    }

    fn type_name(&self) -> &str {
        self.schema.name()
    }

    /// Drop the binding to `parent_id`, if that is still our parent.
    fn clear_binding(&self, parent_id: ControllerId) {
        let mut state = self.state.lock();
        if state
            .binding
            .as_ref()
            .is_some_and(|binding| binding.parent_id == parent_id)
        {
            state.binding = None;
        }
    }

    /// Forget the sub-controller under `field` if it is `child_id`.
    fn detach_child(&self, field: &str, child_id: ControllerId) {
        let removed = {
            let mut state = self.state.lock();
            match state.sub_controllers.get(field) {
                Some(child) if child.id() == child_id => state.sub_controllers.shift_remove(field),
                _ => None,
            }
        };
        if removed.is_some() {
            debug!(controller = %self.id, field, child = %child_id, "Sub-controller detached");
            self.emit(ControllerEvent::SubControllersChanged);
        }
    }
}

impl Refetch for ControllerInner {
    fn type_name(&self) -> &str {
        self.schema.name()
    }

    fn is_enabled(&self) -> bool {
        let state = self.state.lock();
        state.enabled && !state.torn_down
    }

    fn refetch_boxed(self: Arc<Self>) -> BoxFuture<'static, Result<(), SyncError>> {
        async move { self.fetch(query::FetchReason::Invalidation).await }.boxed()
    }
}

impl Drop for ControllerInner {
    fn drop(&mut self) {
        for listener in self.state.get_mut().listeners.drain(..) {
            listener.abort();
        }
        self.ctx.unregister(self.id);
    }
}

/// Construction options for [`EntityController::with_options`].
#[derive(Debug, Clone, Default)]
pub struct ControllerOptions {
    pub variables: QueryVariables,
    /// Register the new controller with this parent under this field.
    pub parent: Option<(EntityController, String)>,
}

impl ControllerOptions {
    pub fn variables(mut self, variables: QueryVariables) -> Self {
        self.variables = variables;
        self
    }

    pub fn parent(mut self, parent: &EntityController, field: impl Into<String>) -> Self {
        self.parent = Some((parent.clone(), field.into()));
        self
    }
}

/// Handle to one entity controller.
#[derive(Clone)]
pub struct EntityController {
    inner: Arc<ControllerInner>,
}

impl fmt::Debug for EntityController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityController")
            .field("id", &self.inner.id)
            .field("type_name", &self.inner.type_name())
            .finish()
    }
}

impl EntityController {
    /// A disabled controller with empty query variables.
    pub fn new(ctx: &SyncContext, schema: Arc<EntitySchema>) -> Self {
        Self::with_variables(ctx, schema, QueryVariables::default())
    }

    pub fn with_variables(ctx: &SyncContext, schema: Arc<EntitySchema>, variables: QueryVariables) -> Self {
        Self::build(ctx, schema, variables)
    }

    /// Controller with initial variables and, optionally, a parent binding.
    ///
    /// Fails only when the parent binding is rejected (see
    /// [`EntityController::register_sub_controller`]).
    pub fn with_options(
        ctx: &SyncContext,
        schema: Arc<EntitySchema>,
        options: ControllerOptions,
    ) -> Result<Self, SyncError> {
        let controller = Self::build(ctx, schema, options.variables);
        if let Some((parent, field)) = options.parent {
            if let Err(err) = parent.register_sub_controller(&field, &controller) {
                controller.teardown();
                return Err(err);
            }
        }
        Ok(controller)
    }

    fn build(ctx: &SyncContext, schema: Arc<EntitySchema>, variables: QueryVariables) -> Self {
        let id = ctx.next_controller_id();
        let (events, _) = broadcast::channel(ctx.controller_config().event_capacity.max(1));
        let inner = Arc::new(ControllerInner {
            id,
            remote: ctx.remote(),
            ctx: ctx.clone(),
            state: Mutex::new(ControllerState {
                enabled: false,
                torn_down: false,
                variables,
                generation: 0,
                query_state: QueryState::Idle,
                cache: ResultCache::new(schema.identity_fields()),
                status: StatusRegistry::new(),
                last_query_error: None,
                last_mutation_error: None,
                pending: PendingMutations::default(),
                sub_controllers: IndexMap::new(),
                listeners: Vec::new(),
                binding: None,
            }),
            schema,
            events,
        });

        let as_refetch: Arc<dyn Refetch> = inner.clone();
        ctx.register(id, Arc::downgrade(&as_refetch));
        debug!(controller = %id, type_name = %inner.type_name(), "Controller created");
        Self { inner }
    }

    /// Controller for the value of `field` on an entity edited by `parent`.
    ///
    /// Its query selects exactly the entities referenced by `value` (one
    /// object or a list of them) and it is registered with `parent` under
    /// `field`.
    pub fn nested(
        ctx: &SyncContext,
        schema: Arc<EntitySchema>,
        parent: &EntityController,
        field: &str,
        value: &Value,
    ) -> Result<Self, SyncError> {
        let identities: Vec<Identity> = match value {
            Value::Array(items) => items
                .iter()
                .filter_map(|item| item.as_object())
                .filter_map(|item| Entity::from(item.clone()).identity(schema.identity_fields()))
                .collect(),
            Value::Object(map) => vec![schema.identity_of(&Entity::from(map.clone()))?],
            other => {
                return Err(ValidationError::InvalidValue {
                    field: field.to_string(),
                    reason: format!("cannot edit {} as a nested entity", other),
                }
                .into())
            }
        };
        let variables = if identities.is_empty() {
            // nothing referenced yet; select nothing
            QueryVariables::new().filter_in(
                schema.identity_fields().first().cloned().unwrap_or_default(),
                Vec::new(),
            )
        } else {
            QueryVariables::for_identities(&identities)
        };
        Self::with_options(
            ctx,
            schema,
            ControllerOptions::default().variables(variables).parent(parent, field),
        )
    }

    pub fn id(&self) -> ControllerId {
        self.inner.id
    }

    pub fn type_name(&self) -> &str {
        self.inner.type_name()
    }

    pub fn schema(&self) -> &Arc<EntitySchema> {
        &self.inner.schema
    }

    pub fn context(&self) -> &SyncContext {
        &self.inner.ctx
    }

    /// Current result list; `None` until the first fetch resolves.
    pub fn query_data(&self) -> Option<Arc<Vec<Entity>>> {
        self.inner.state.lock().cache.data()
    }

    pub fn query_loading(&self) -> bool {
        self.inner.state.lock().query_state == QueryState::Loading
    }

    pub fn query_state(&self) -> QueryState {
        self.inner.state.lock().query_state
    }

    pub fn query_variables(&self) -> QueryVariables {
        self.inner.state.lock().variables.clone()
    }

    pub fn last_query_error(&self) -> Option<RemoteError> {
        self.inner.state.lock().last_query_error.clone()
    }

    pub fn last_mutation_error(&self) -> Option<SyncError> {
        self.inner.state.lock().last_mutation_error.clone()
    }

    /// Whether a mutation of `kind` is in flight.
    pub fn mutation_pending(&self, kind: MutationKind) -> bool {
        self.inner.state.lock().pending.get(kind) > 0
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.state.lock().enabled
    }

    pub fn is_torn_down(&self) -> bool {
        self.inner.state.lock().torn_down
    }

    /// Status tag of the row with `identity`, if it was changed elsewhere.
    pub fn status(&self, identity: &Identity) -> Option<EntityStatus> {
        self.inner.state.lock().status.get(identity)
    }

    pub fn statuses(&self) -> HashMap<Identity, EntityStatus> {
        self.inner.state.lock().status.snapshot()
    }

    /// Blank entity for a create form.
    pub fn default_value(&self) -> Entity {
        default_entity(&self.inner.schema)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ControllerEvent> {
        self.inner.events.subscribe()
    }

    pub fn sub_controller(&self, field: &str) -> Option<EntityController> {
        self.inner.state.lock().sub_controllers.get(field).cloned()
    }

    /// Fields with a registered sub-controller, in registration order.
    pub fn sub_controller_fields(&self) -> Vec<String> {
        self.inner.state.lock().sub_controllers.keys().cloned().collect()
    }

    pub fn parent(&self) -> Option<EntityController> {
        let state = self.inner.state.lock();
        let binding = state.binding.as_ref()?;
        binding.parent.upgrade().map(|inner| EntityController { inner })
    }

    /// Enable or disable the query. Enabling fetches and subscribes to push
    /// notifications; calling with the current value does nothing.
    pub async fn start_query(&self, enabled: bool) -> Result<(), SyncError> {
        self.inner.start_query(enabled).await
    }

    /// Replace the query variables and refetch if enabled.
    pub async fn set_variables(&self, variables: QueryVariables) -> Result<(), SyncError> {
        self.inner.set_variables(variables).await
    }

    /// Refetch with the current variables, clearing status tags. No-op while
    /// the query is disabled.
    pub async fn refetch(&self) -> Result<(), SyncError> {
        self.inner.fetch(query::FetchReason::Refetch).await
    }

    /// Validate `input` the way [`EntityController::create_save`] does,
    /// without sending anything.
    pub fn validate_create(&self, input: &Entity) -> Result<Entity, ValidationError> {
        crate::schema::validate::prepare_create(&self.inner.schema, input)
    }

    /// Create an entity and append the response to the result list.
    pub async fn create_save(&self, input: Entity) -> Result<Entity, SyncError> {
        self.inner.create_save(input).await
    }

    /// Save the difference between `edited` and `original`, nested fields
    /// first.
    pub async fn update_save(&self, edited: Entity, original: Entity) -> Result<Vec<Entity>, SyncError> {
        Arc::clone(&self.inner).update_save(edited, original).await
    }

    /// Delete `entity`, addressed by its identity.
    pub async fn delete(&self, entity: &Entity) -> Result<Vec<Identity>, SyncError> {
        self.inner.delete(entity).await
    }

    /// Apply one remote-originated change notification.
    ///
    /// Returns the number of rows whose status tag was written.
    pub fn apply_push(&self, event: PushEvent) -> usize {
        self.inner.apply_push(event)
    }

    pub(crate) fn save_nested(&self, edited: Value, original: Value) -> BoxFuture<'static, Result<NestedOutcome, SyncError>> {
        Arc::clone(&self.inner).save_nested(edited, original)
    }

    /// Register `child` as the controller saving `field`.
    ///
    /// A controller previously registered under `field` is detached.
    pub fn register_sub_controller(&self, field: &str, child: &EntityController) -> Result<(), SyncError> {
        let descriptor = self.inner.schema.field(field).ok_or_else(|| ValidationError::UnknownField {
            type_name: self.type_name().to_string(),
            field: field.to_string(),
        })?;
        let Some(target) = descriptor.kind.object_ref() else {
            return Err(ValidationError::InvalidValue {
                field: field.to_string(),
                reason: "only relational fields can have a sub-controller".to_string(),
            }
            .into());
        };
        if target.type_name != child.type_name() {
            return Err(ValidationError::InvalidValue {
                field: field.to_string(),
                reason: format!(
                    "expects a {} controller, got {}",
                    target.type_name,
                    child.type_name()
                ),
            }
            .into());
        }

        let previous_binding = {
            let mut child_state = child.inner.state.lock();
            child_state.binding.replace(Binding {
                parent: Arc::downgrade(&self.inner),
                parent_id: self.id(),
                field: field.to_string(),
            })
        };
        if let Some(previous) = previous_binding {
            if previous.parent_id != self.id() || previous.field != field {
                if let Some(old_parent) = previous.parent.upgrade() {
                    old_parent.detach_child(&previous.field, child.id());
                }
            }
        }

        let replaced = {
            let mut state = self.inner.state.lock();
            state.sub_controllers.insert(field.to_string(), child.clone())
        };
        if let Some(replaced) = replaced {
            if replaced.id() != child.id() {
                replaced.inner.clear_binding(self.id());
            }
        }

        debug!(controller = %self.id(), field, child = %child.id(), "Sub-controller registered");
        self.inner.emit(ControllerEvent::SubControllersChanged);
        Ok(())
    }

    /// Detach the sub-controller under `field`, returning it.
    pub fn unregister_sub_controller(&self, field: &str) -> Option<EntityController> {
        let removed = self.inner.state.lock().sub_controllers.shift_remove(field)?;
        removed.inner.clear_binding(self.id());
        debug!(controller = %self.id(), field, "Sub-controller unregistered");
        self.inner.emit(ControllerEvent::SubControllersChanged);
        Some(removed)
    }

    /// Stop listening, discard in-flight responses and leave the bus.
    ///
    /// Mutations already in flight still resolve for their caller, but their
    /// results are no longer applied here. Idempotent.
    pub fn teardown(&self) {
        let (listeners, children, binding) = {
            let mut state = self.inner.state.lock();
            if state.torn_down {
                return;
            }
            state.torn_down = true;
            state.enabled = false;
            state.generation += 1;
            state.status.clear();
            if state.query_state == QueryState::Loading {
                state.query_state = QueryState::Idle;
            }
            (
                std::mem::take(&mut state.listeners),
                std::mem::take(&mut state.sub_controllers),
                state.binding.take(),
            )
        };

        for listener in listeners {
            listener.abort();
        }
        for child in children.values() {
            child.inner.clear_binding(self.id());
        }
        self.inner.ctx.unregister(self.id());
        if let Some(binding) = binding {
            if let Some(parent) = binding.parent.upgrade() {
                parent.detach_child(&binding.field, self.id());
            }
        }

        debug!(controller = %self.id(), type_name = %self.type_name(), "Controller torn down");
        self.inner.emit(ControllerEvent::TornDown);
    }
}
