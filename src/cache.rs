//! Result Cache
//!
//! The materialized entity list of one controller's current query. Writes
//! are copy-on-write: readers keep the `Arc` snapshot they were handed while
//! the cache moves on to a new version.

use crate::entity::{Entity, Identity};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct ResultCache {
    identity_fields: Arc<[String]>,
    rows: Option<Arc<Vec<Entity>>>,
}

impl ResultCache {
    pub fn new(identity_fields: &[String]) -> Self {
        Self {
            identity_fields: identity_fields.into(),
            rows: None,
        }
    }

    /// Current snapshot; `None` until a fetch has resolved.
    pub fn data(&self) -> Option<Arc<Vec<Entity>>> {
        self.rows.clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.rows.is_some()
    }

    pub fn len(&self) -> usize {
        self.rows.as_ref().map_or(0, |rows| rows.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn identity(&self, entity: &Entity) -> Option<Identity> {
        entity.identity(&self.identity_fields)
    }

    pub fn get(&self, identity: &Identity) -> Option<&Entity> {
        self.rows
            .as_ref()?
            .iter()
            .find(|row| identity.matches(row))
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        self.get(identity).is_some()
    }

    /// Identities of every cached row.
    pub fn identities(&self) -> HashSet<Identity> {
        self.rows
            .iter()
            .flat_map(|rows| rows.iter())
            .filter_map(|row| self.identity(row))
            .collect()
    }

    /// Replace the whole list with a fetch result.
    ///
    /// Rows without a full identity, and repeats of an identity already seen,
    /// are skipped.
    pub fn replace(&mut self, entities: Vec<Entity>) {
        let mut seen = HashSet::with_capacity(entities.len());
        let rows: Vec<Entity> = entities
            .into_iter()
            .filter(|entity| match self.identity(entity) {
                Some(identity) => seen.insert(identity),
                None => {
                    warn!("Dropping fetched row without a full identity");
                    false
                }
            })
            .collect();
        self.rows = Some(Arc::new(rows));
    }

    /// Forget everything, back to "not fetched".
    pub fn reset(&mut self) {
        self.rows = None;
    }

    /// Append entities whose identity is not cached yet.
    ///
    /// Returns the identities actually appended. No-op while nothing has
    /// been fetched.
    pub fn add(&mut self, entities: &[Entity]) -> Vec<Identity> {
        if entities.is_empty() {
            return Vec::new();
        }
        let mut present = self.identities();
        let Some(rows) = self.rows.as_mut() else {
            return Vec::new();
        };

        let mut added = Vec::new();
        let mut pending = Vec::new();
        for entity in entities {
            let Some(identity) = entity.identity(&self.identity_fields) else {
                warn!("Refusing to cache a row without a full identity");
                continue;
            };
            if !present.insert(identity.clone()) {
                debug!(identity = %identity, "Row already cached, add skipped");
                continue;
            }
            pending.push(entity.clone());
            added.push(identity);
        }
        if !pending.is_empty() {
            Arc::make_mut(rows).extend(pending);
        }
        added
    }

    /// Shallow-merge each incoming entity into its cached row.
    ///
    /// Only the fields carried by the payload change. Entities whose identity
    /// is not cached are ignored. Returns the identities actually patched.
    pub fn patch(&mut self, entities: &[Entity]) -> Vec<Identity> {
        let mut patched = Vec::new();
        for entity in entities {
            let Some(identity) = entity.identity(&self.identity_fields) else {
                continue;
            };
            let Some(rows) = self.rows.as_mut() else {
                return patched;
            };
            let Some(index) = rows.iter().position(|row| identity.matches(row)) else {
                debug!(identity = %identity, "Patched row is not cached, ignoring");
                continue;
            };
            Arc::make_mut(rows)[index].merge(entity);
            patched.push(identity);
        }
        patched
    }

    /// Drop rows by identity; absent identities are ignored.
    ///
    /// Returns the removed rows.
    pub fn remove(&mut self, identities: &[Identity]) -> Vec<Entity> {
        let Some(rows) = self.rows.as_mut() else {
            return Vec::new();
        };
        if !rows
            .iter()
            .any(|row| identities.iter().any(|identity| identity.matches(row)))
        {
            return Vec::new();
        }
        let (removed, kept): (Vec<Entity>, Vec<Entity>) = rows
            .iter()
            .cloned()
            .partition(|row| identities.iter().any(|identity| identity.matches(row)));
        *rows = Arc::new(kept);
        removed
    }
}
