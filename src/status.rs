//! Status Registry
//!
//! Per-controller map from identity to the lifecycle tag of the last
//! remote-originated change. Local mutations never write here; an in-flight
//! local mutation is tracked as pending state on the controller instead.

use crate::entity::Identity;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Lifecycle tag for a row changed elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityStatus {
    Created,
    Updated,
    Deleted,
}

#[derive(Debug, Clone, Default)]
pub struct StatusRegistry {
    entries: HashMap<Identity, EntityStatus>,
}

impl StatusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tag `identity`; the latest tag per identity wins.
    pub fn mark(&mut self, identity: Identity, status: EntityStatus) {
        self.entries.insert(identity, status);
    }

    pub fn get(&self, identity: &Identity) -> Option<EntityStatus> {
        self.entries.get(identity).copied()
    }

    /// Drop tags of identities no longer in the result list.
    pub fn prune<'a>(&mut self, identities: impl IntoIterator<Item = &'a Identity>) {
        for identity in identities {
            self.entries.remove(identity);
        }
    }

    /// Keep only tags for which `present` holds.
    pub fn retain(&mut self, mut present: impl FnMut(&Identity) -> bool) {
        self.entries.retain(|identity, _| present(identity));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn snapshot(&self) -> HashMap<Identity, EntityStatus> {
        self.entries.clone()
    }
}
