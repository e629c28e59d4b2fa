//! Push notifications: subscription listeners and remote-originated changes.
//!
//! Remote changes patch the result list in place and tag the affected rows;
//! they never trigger invalidation. A change that leaves the cached row as it
//! was (for example the echo of our own mutation) is not tagged.

use super::{ControllerEvent, ControllerInner};
use crate::entity::Identity;
use crate::remote::{PushEvent, PushKind};
use crate::status::EntityStatus;
use futures::StreamExt;
use std::slice;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, warn};

impl ControllerInner {
    /// (Re)subscribe to all push kinds with the current variables.
    pub(super) fn restart_listeners(self: &Arc<Self>) {
        if !self.ctx.controller_config().subscribe_on_start {
            return;
        }
        let Ok(runtime) = Handle::try_current() else {
            warn!(controller = %self.id, "No async runtime, push notifications disabled");
            return;
        };
        let variables = self.state.lock().variables.clone();

        let mut handles = Vec::with_capacity(PushKind::ALL.len());
        for kind in PushKind::ALL {
            let weak = Arc::downgrade(self);
            let remote = Arc::clone(&self.remote);
            let schema = Arc::clone(&self.schema);
            let variables = variables.clone();
            let id = self.id;
            handles.push(runtime.spawn(async move {
                let mut stream = match remote.subscribe(&schema, kind, &variables).await {
                    Ok(stream) => stream,
                    Err(err) => {
                        debug!(controller = %id, %kind, error = %err, "Subscription unavailable");
                        return;
                    }
                };
                while let Some(item) = stream.next().await {
                    let Some(inner) = weak.upgrade() else {
                        break;
                    };
                    match item {
                        Ok(event) => {
                            inner.apply_push(event);
                        }
                        Err(err) => warn!(controller = %id, %kind, error = %err, "Push notification error"),
                    }
                }
                debug!(controller = %id, %kind, "Subscription ended");
            }));
        }

        let (previous, stale) = {
            let mut state = self.state.lock();
            if state.torn_down || !state.enabled {
                (Vec::new(), handles)
            } else {
                (std::mem::replace(&mut state.listeners, handles), Vec::new())
            }
        };
        for handle in previous.into_iter().chain(stale) {
            handle.abort();
        }
    }

    pub(super) fn stop_listeners(&self) {
        let listeners = std::mem::take(&mut self.state.lock().listeners);
        for listener in listeners {
            listener.abort();
        }
    }

    /// Apply a remote change to the result list and tag what changed.
    pub(super) fn apply_push(&self, event: PushEvent) -> usize {
        let kind = event.kind();
        let (tagged, rows) = {
            let mut state = self.state.lock();
            if state.torn_down || !state.cache.is_loaded() {
                return 0;
            }
            let ids = self.schema.identity_fields();
            let mut tagged: Vec<(Identity, EntityStatus)> = Vec::new();
            match event {
                PushEvent::Created(rows) => {
                    for row in rows {
                        let Some(identity) = row.identity(ids) else {
                            continue;
                        };
                        match state.cache.get(&identity).map(|cached| cached.differs_from_patch(&row)) {
                            Some(false) => {}
                            Some(true) => {
                                state.cache.patch(slice::from_ref(&row));
                                tagged.push((identity, EntityStatus::Updated));
                            }
                            None => {
                                state.cache.add(slice::from_ref(&row));
                                tagged.push((identity, EntityStatus::Created));
                            }
                        }
                    }
                }
                PushEvent::Updated(rows) => {
                    for row in rows {
                        let Some(identity) = row.identity(ids) else {
                            continue;
                        };
                        if state.cache.get(&identity).is_some_and(|cached| cached.differs_from_patch(&row)) {
                            state.cache.patch(slice::from_ref(&row));
                            tagged.push((identity, EntityStatus::Updated));
                        }
                    }
                }
                PushEvent::Deleted(identities) => {
                    for identity in identities {
                        // the row stays visible, tagged, until the next local refetch
                        if state.cache.contains(&identity) {
                            tagged.push((identity, EntityStatus::Deleted));
                        }
                    }
                }
            }
            for (identity, status) in &tagged {
                state.status.mark(identity.clone(), *status);
            }
            (tagged, state.cache.len())
        };

        if tagged.is_empty() {
            return 0;
        }
        debug!(controller = %self.id, %kind, rows = tagged.len(), "Applied remote change");
        for (identity, status) in &tagged {
            self.emit(ControllerEvent::StatusChanged {
                identity: identity.clone(),
                status: *status,
            });
        }
        self.emit(ControllerEvent::DataChanged { rows });
        tagged.len()
    }
}
