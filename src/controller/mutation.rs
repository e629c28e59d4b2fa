//! Create, update and delete.
//!
//! Local mutations patch this controller's result list from the server
//! response and never write status tags. Afterwards the controllers of every
//! type the mutation touched are invalidated:
//!
//! - create and delete: the entity's own type (other controllers only) and
//!   the targets of its non-null relational fields;
//! - update: the targets of relational fields whose value changed.
//!
//! Fields owned by sub-controllers are saved by those controllers first; the
//! parent then sends only the reference to what they saved, and only when it
//! differs from the reference it held before.

use super::{ControllerEvent, ControllerInner};
use crate::entity::{Entity, Identity};
use crate::error::{RemoteError, SyncError, ValidationError};
use crate::orchestrator::{self, NestedOutcome, NestedSave};
use crate::schema::input::{to_input, to_input_ids, to_input_ids_or_as_is};
use crate::schema::validate::{check_update, prepare_create};
use crate::schema::{EntitySchema, ObjectRef};
use futures::future::{join_all, BoxFuture, FutureExt};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MutationKind::Create => "create",
            MutationKind::Update => "update",
            MutationKind::Delete => "delete",
        })
    }
}

/// Target types of the non-null relational fields of `entity`.
fn relational_targets(schema: &EntitySchema, entity: &Entity) -> BTreeSet<String> {
    schema
        .relational_fields()
        .filter(|(field, _)| !matches!(entity.get(&field.name), None | Some(Value::Null)))
        .map(|(_, target)| target.type_name.clone())
        .collect()
}

/// Target types of relational fields of `after` whose value differs in `before`.
fn changed_relational_targets(schema: &EntitySchema, before: &Entity, after: &Entity) -> BTreeSet<String> {
    schema
        .relational_fields()
        .filter(|(field, _)| {
            after
                .get(&field.name)
                .is_some_and(|value| before.get(&field.name) != Some(value))
        })
        .map(|(_, target)| target.type_name.clone())
        .collect()
}

/// `value` as the parent stores it: identities for complete references, a
/// list of them for list fields.
fn reference_value(target: &ObjectRef, value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| to_input_ids_or_as_is(target, item))
                .collect(),
        ),
        other => to_input_ids_or_as_is(target, other),
    }
}

impl ControllerInner {
    /// Add each saved nested reference to `changes` when it differs from the
    /// one in `original`.
    fn with_references(&self, mut changes: Entity, references: Vec<(String, Value)>, original: &Entity) -> Entity {
        for (field, reference) in references {
            let before = original.get(&field).unwrap_or(&Value::Null);
            let before = match self.schema.field(&field).and_then(|f| f.kind.object_ref()) {
                Some(target) => reference_value(target, before),
                None => before.clone(),
            };
            if before != reference {
                debug!(controller = %self.id, field = %field, "Nested reference changed");
                changes.insert(field, reference);
            }
        }
        changes
    }

    fn begin_mutation(&self, kind: MutationKind) {
        *self.state.lock().pending.slot(kind) += 1;
        self.emit(ControllerEvent::MutationStarted(kind));
    }

    fn finish_mutation(&self, kind: MutationKind, error: Option<&RemoteError>) {
        {
            let mut state = self.state.lock();
            let slot = state.pending.slot(kind);
            *slot = slot.saturating_sub(1);
            if let Some(err) = error {
                state.last_mutation_error = Some(SyncError::Remote(err.clone()));
            }
        }
        if let Some(err) = error {
            warn!(controller = %self.id, type_name = %self.type_name(), %kind, error = %err, "Mutation failed");
        }
        self.emit(ControllerEvent::MutationFinished {
            kind,
            succeeded: error.is_none(),
        });
    }

    fn invalidate_types(&self, types: BTreeSet<String>) {
        if types.is_empty() {
            return;
        }
        debug!(controller = %self.id, types = ?types, "Invalidating after mutation");
        // refetches run detached
        let _ = self.ctx.invalidate_all(types, Some(self.id));
    }

    pub(super) async fn create_save(self: &Arc<Self>, input: Entity) -> Result<Entity, SyncError> {
        let payload = prepare_create(&self.schema, &input)?;
        let payload = to_input(&self.schema, &payload)?;

        self.begin_mutation(MutationKind::Create);
        let result = self.remote.create(&self.schema, payload).await;
        self.finish_mutation(MutationKind::Create, result.as_ref().err());
        let created = result?;

        let rows = {
            let mut state = self.state.lock();
            if state.torn_down {
                debug!(controller = %self.id, "Create resolved after teardown, not applied");
                return Ok(created);
            }
            state.cache.add(std::slice::from_ref(&created));
            state.cache.len()
        };
        info!(controller = %self.id, type_name = %self.type_name(), "Entity created");
        self.emit(ControllerEvent::DataChanged { rows });

        let mut types = relational_targets(&self.schema, &created);
        types.insert(self.type_name().to_string());
        self.invalidate_types(types);
        Ok(created)
    }

    /// Boxed so nested saves can recurse through sub-controllers.
    pub(super) fn update_save(
        self: Arc<Self>,
        edited: Entity,
        original: Entity,
    ) -> BoxFuture<'static, Result<Vec<Entity>, SyncError>> {
        async move {
            let identity = to_input_ids(&self.schema, &original)?;
            let changes = edited.diff(&original);
            if changes.is_empty() {
                debug!(controller = %self.id, identity = %identity, "Nothing changed, update skipped");
                return Ok(Vec::new());
            }
            check_update(&self.schema, &changes)?;

            let children: Vec<NestedSave> = {
                let state = self.state.lock();
                state
                    .sub_controllers
                    .iter()
                    .filter(|(field, _)| changes.contains_field(field))
                    .map(|(field, controller)| NestedSave {
                        field: field.clone(),
                        controller: controller.clone(),
                        edited: changes.get(field).cloned().unwrap_or(Value::Null),
                        original: original.get(field).cloned().unwrap_or(Value::Null),
                    })
                    .collect()
            };
            let parent_changes = changes.filtered(|field| !children.iter().any(|child| child.field == field));

            let parent = Arc::clone(&self);
            orchestrator::orchestrate(self.schema.name(), children, move |references| {
                let changes = parent.with_references(parent_changes, references, &original);
                parent.issue_update(changes, identity, original)
            })
            .await
        }
        .boxed()
    }

    async fn issue_update(
        self: Arc<Self>,
        changes: Entity,
        identity: Identity,
        original: Entity,
    ) -> Result<Vec<Entity>, SyncError> {
        let payload = to_input(&self.schema, &changes)?;

        self.begin_mutation(MutationKind::Update);
        let result = self
            .remote
            .update(&self.schema, payload, vec![identity.clone()])
            .await;
        self.finish_mutation(MutationKind::Update, result.as_ref().err());
        let updated = result?;

        let applied = {
            let mut state = self.state.lock();
            if state.torn_down {
                None
            } else {
                let mut types = BTreeSet::new();
                for row in &updated {
                    let before = row
                        .identity(self.schema.identity_fields())
                        .and_then(|id| state.cache.get(&id).cloned())
                        .unwrap_or_else(|| original.clone());
                    types.extend(changed_relational_targets(&self.schema, &before, row));
                }
                state.cache.patch(&updated);
                Some((types, state.cache.len()))
            }
        };

        match applied {
            Some((types, rows)) => {
                info!(controller = %self.id, type_name = %self.type_name(), identity = %identity, "Entity updated");
                self.emit(ControllerEvent::DataChanged { rows });
                self.emit(ControllerEvent::SaveCompleted);
                self.invalidate_types(types);
            }
            None => debug!(controller = %self.id, "Update resolved after teardown, not applied"),
        }
        Ok(updated)
    }

    pub(super) async fn delete(self: &Arc<Self>, entity: &Entity) -> Result<Vec<Identity>, SyncError> {
        let identity = to_input_ids(&self.schema, entity)?;

        self.begin_mutation(MutationKind::Delete);
        let result = self.remote.delete(&self.schema, vec![identity]).await;
        self.finish_mutation(MutationKind::Delete, result.as_ref().err());
        let deleted = result?;

        let (removed, rows) = {
            let mut state = self.state.lock();
            if state.torn_down {
                debug!(controller = %self.id, "Delete resolved after teardown, not applied");
                return Ok(deleted);
            }
            let removed = state.cache.remove(&deleted);
            state.status.prune(&deleted);
            (removed, state.cache.len())
        };
        info!(controller = %self.id, type_name = %self.type_name(), count = deleted.len(), "Entities deleted");
        self.emit(ControllerEvent::DataChanged { rows });

        let mut types = relational_targets(&self.schema, entity);
        for row in &removed {
            types.extend(relational_targets(&self.schema, row));
        }
        types.insert(self.type_name().to_string());
        self.invalidate_types(types);
        Ok(deleted)
    }

    /// Save the value of a field this controller was registered for.
    ///
    /// Objects without an identity are created. Objects whose identity
    /// matches the original entry are updated against it; any other identity
    /// is a link to an existing row and is not saved. Lists are saved item by
    /// item; entries removed from a list are left alone.
    pub(super) fn save_nested(
        self: Arc<Self>,
        edited: Value,
        original: Value,
    ) -> BoxFuture<'static, Result<NestedOutcome, SyncError>> {
        async move {
            let ids = self.schema.identity_fields().to_vec();
            let originals: Vec<Entity> = match original {
                Value::Array(items) => items.into_iter().filter_map(Entity::from_value).collect(),
                Value::Object(map) => vec![Entity::from(map)],
                _ => Vec::new(),
            };
            let (items, is_list): (Vec<Entity>, bool) = match edited {
                Value::Null => {
                    return Ok(NestedOutcome {
                        saved: Vec::new(),
                        reference: Value::Null,
                    })
                }
                Value::Object(map) => (vec![Entity::from(map)], false),
                Value::Array(items) => (
                    items
                        .into_iter()
                        .map(|item| {
                            Entity::from_value(item).ok_or_else(|| ValidationError::InvalidValue {
                                field: self.type_name().to_string(),
                                reason: "list entries must be objects".to_string(),
                            })
                        })
                        .collect::<Result<_, _>>()?,
                    true,
                ),
                other => {
                    return Err(ValidationError::InvalidValue {
                        field: self.type_name().to_string(),
                        reason: format!("cannot save {} as a nested entity", other),
                    }
                    .into())
                }
            };

            let saves = items.into_iter().map(|item| {
                let identity = item.identity(&ids);
                let matching = identity
                    .as_ref()
                    .and_then(|identity| originals.iter().find(|candidate| identity.matches(candidate)).cloned());
                Arc::clone(&self).save_item(item, identity, matching)
            });

            let mut saved = Vec::new();
            let mut references = Vec::new();
            for result in join_all(saves).await {
                let (identity, rows) = result?;
                references.push(identity.to_entity().into_value());
                saved.extend(rows);
            }
            debug!(controller = %self.id, saved = saved.len(), "Nested save done");

            let reference = if is_list {
                Value::Array(references)
            } else {
                references.pop().unwrap_or(Value::Null)
            };
            Ok::<_, SyncError>(NestedOutcome { saved, reference })
        }
        .boxed()
    }

    /// Save one nested entry and return the identity the parent links to.
    async fn save_item(
        self: Arc<Self>,
        item: Entity,
        identity: Option<Identity>,
        original: Option<Entity>,
    ) -> Result<(Identity, Vec<Entity>), SyncError> {
        match (identity, original) {
            (Some(identity), Some(original)) => {
                let saved = self.update_save(item, original).await?;
                Ok((identity, saved))
            }
            (Some(identity), None) => {
                debug!(controller = %self.id, identity = %identity, "Linking existing entry");
                Ok((identity, Vec::new()))
            }
            (None, _) => {
                let created = self.create_save(item).await?;
                let identity = to_input_ids(&self.schema, &created)?;
                Ok((identity, vec![created]))
            }
        }
    }
}
