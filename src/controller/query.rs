//! Query lifecycle: enabling, variable changes and fetches.

use super::{ControllerEvent, ControllerInner};
use crate::error::SyncError;
use crate::remote::QueryVariables;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Lifecycle of a controller's query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryState {
    /// Nothing fetched yet.
    Idle,
    Loading,
    /// Data present.
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FetchReason {
    Start,
    Variables,
    Refetch,
    /// Requested by another controller's mutation.
    Invalidation,
}

impl FetchReason {
    /// Status tags survive only refetches the user did not ask for.
    fn clears_status(self) -> bool {
        !matches!(self, FetchReason::Invalidation)
    }
}

impl ControllerInner {
    /// Fetch with the current variables and apply the result unless a newer
    /// fetch was issued meanwhile.
    pub(super) async fn fetch(&self, reason: FetchReason) -> Result<(), SyncError> {
        let (generation, variables) = {
            let mut state = self.state.lock();
            if state.torn_down {
                return Ok(());
            }
            if !state.enabled {
                debug!(controller = %self.id, ?reason, "Query disabled, fetch skipped");
                return Ok(());
            }
            state.generation += 1;
            state.query_state = QueryState::Loading;
            (state.generation, state.variables.clone())
        };
        self.emit(ControllerEvent::QueryStateChanged(QueryState::Loading));
        debug!(controller = %self.id, type_name = %self.type_name(), generation, ?reason, "Fetching");

        let result = self.remote.query(&self.schema, &variables).await;

        let outcome = {
            let mut state = self.state.lock();
            if state.torn_down {
                debug!(controller = %self.id, "Fetch resolved after teardown, discarded");
                return Ok(());
            }
            if state.generation != generation {
                debug!(
                    controller = %self.id,
                    generation,
                    current = state.generation,
                    "Stale fetch response discarded"
                );
                return Ok(());
            }
            match result {
                Ok(rows) => {
                    state.cache.replace(rows);
                    if reason.clears_status() {
                        state.status.clear();
                    } else {
                        let present = state.cache.identities();
                        state.status.retain(|identity| present.contains(identity));
                    }
                    state.last_query_error = None;
                    state.query_state = QueryState::Ready;
                    Ok(state.cache.len())
                }
                Err(err) => {
                    state.last_query_error = Some(err.clone());
                    state.query_state = if state.cache.is_loaded() {
                        QueryState::Ready
                    } else {
                        QueryState::Idle
                    };
                    Err((err, state.query_state))
                }
            }
        };

        match outcome {
            Ok(rows) => {
                debug!(controller = %self.id, rows, "Fetch applied");
                self.emit(ControllerEvent::QueryStateChanged(QueryState::Ready));
                self.emit(ControllerEvent::DataChanged { rows });
                Ok(())
            }
            Err((err, restored)) => {
                warn!(controller = %self.id, type_name = %self.type_name(), error = %err, "Fetch failed");
                self.emit(ControllerEvent::QueryFailed(err.clone()));
                self.emit(ControllerEvent::QueryStateChanged(restored));
                Err(err.into())
            }
        }
    }

    pub(super) async fn start_query(self: &Arc<Self>, enabled: bool) -> Result<(), SyncError> {
        let changed = {
            let mut state = self.state.lock();
            if state.torn_down || state.enabled == enabled {
                false
            } else {
                state.enabled = enabled;
                true
            }
        };
        if !changed {
            return Ok(());
        }
        info!(controller = %self.id, type_name = %self.type_name(), enabled, "Query toggled");
        if !enabled {
            self.stop_listeners();
            return Ok(());
        }
        self.restart_listeners();
        self.fetch(FetchReason::Start).await
    }

    pub(super) async fn set_variables(self: &Arc<Self>, variables: QueryVariables) -> Result<(), SyncError> {
        let enabled = {
            let mut state = self.state.lock();
            if state.torn_down {
                return Ok(());
            }
            state.variables = variables;
            state.enabled
        };
        if !enabled {
            debug!(controller = %self.id, "Variables stored while disabled");
            return Ok(());
        }
        self.restart_listeners();
        self.fetch(FetchReason::Variables).await
    }
}
