//! Invalidation Bus
//!
//! Shared context handed to every controller of one application. It owns the
//! remote service handle, the controller settings, and a registry of live
//! controllers keyed by entity type so that a mutation in one controller can
//! ask every other controller displaying an affected type to refetch.
//!
//! Controllers are held weakly: dropping the last handle of a controller
//! removes it from the bus without an explicit unregister.

use crate::config::ControllerConfig;
use crate::error::SyncError;
use crate::remote::RemoteService;
use futures::future::{join_all, BoxFuture};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Process-unique controller id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControllerId(u64);

impl ControllerId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ControllerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// What the bus needs from a controller.
pub(crate) trait Refetch: Send + Sync {
    fn type_name(&self) -> &str;

    /// Enabled and not torn down.
    fn is_enabled(&self) -> bool;

    fn refetch_boxed(self: Arc<Self>) -> BoxFuture<'static, Result<(), SyncError>>;
}

struct Entry {
    id: ControllerId,
    target: Weak<dyn Refetch>,
}

struct ContextInner {
    remote: Arc<dyn RemoteService>,
    config: ControllerConfig,
    next_id: AtomicU64,
    registry: Mutex<HashMap<String, Vec<Entry>>>,
}

/// Explicitly passed synchronization context.
#[derive(Clone)]
pub struct SyncContext {
    inner: Arc<ContextInner>,
}

impl fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncContext")
            .field("remote", &self.inner.remote.name())
            .field("types", &self.registered_types())
            .finish()
    }
}

/// Refetches started by one invalidation.
#[derive(Debug, Default)]
pub struct Invalidation {
    handles: Vec<JoinHandle<Result<(), SyncError>>>,
}

impl Invalidation {
    /// Number of controllers asked to refetch.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every refetch; failures were already recorded on their
    /// controllers and are only counted here.
    pub async fn settled(self) -> usize {
        let results = join_all(self.handles).await;
        results
            .into_iter()
            .filter(|result| !matches!(result, Ok(Ok(()))))
            .count()
    }
}

impl SyncContext {
    pub fn new(remote: Arc<dyn RemoteService>) -> Self {
        Self::with_config(remote, ControllerConfig::default())
    }

    pub fn with_config(remote: Arc<dyn RemoteService>, config: ControllerConfig) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                remote,
                config,
                next_id: AtomicU64::new(1),
                registry: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn remote(&self) -> Arc<dyn RemoteService> {
        Arc::clone(&self.inner.remote)
    }

    pub fn controller_config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    pub(crate) fn next_controller_id(&self) -> ControllerId {
        ControllerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn register(&self, id: ControllerId, target: Weak<dyn Refetch>) {
        let Some(live) = target.upgrade() else {
            return;
        };
        let type_name = live.type_name().to_string();
        debug!(controller = %id, type_name = %type_name, "Registering controller");
        let mut registry = self.inner.registry.lock();
        let entries = registry.entry(type_name).or_default();
        entries.retain(|entry| entry.target.strong_count() > 0 && entry.id != id);
        entries.push(Entry { id, target });
    }

    pub(crate) fn unregister(&self, id: ControllerId) {
        let mut registry = self.inner.registry.lock();
        for entries in registry.values_mut() {
            entries.retain(|entry| entry.id != id);
        }
        registry.retain(|_, entries| !entries.is_empty());
    }

    /// Live controllers currently registered for `type_name`.
    pub fn live_controllers(&self, type_name: &str) -> usize {
        let registry = self.inner.registry.lock();
        registry
            .get(type_name)
            .map_or(0, |entries| entries.iter().filter(|e| e.target.strong_count() > 0).count())
    }

    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.inner.registry.lock().keys().cloned().collect();
        types.sort();
        types
    }

    /// Ask every enabled controller of `type_name` to refetch.
    pub fn invalidate(&self, type_name: &str) -> Invalidation {
        self.invalidate_except(type_name, None)
    }

    /// Like [`SyncContext::invalidate`], skipping the controller `except`.
    ///
    /// Refetches run as spawned tasks and are not awaited. Without a Tokio
    /// runtime nothing can be spawned and the invalidation is dropped.
    pub fn invalidate_except(&self, type_name: &str, except: Option<ControllerId>) -> Invalidation {
        let targets: Vec<(ControllerId, Arc<dyn Refetch>)> = {
            let mut registry = self.inner.registry.lock();
            let Some(entries) = registry.get_mut(type_name) else {
                return Invalidation::default();
            };
            entries.retain(|entry| entry.target.strong_count() > 0);
            entries
                .iter()
                .filter(|entry| Some(entry.id) != except)
                .filter_map(|entry| entry.target.upgrade().map(|target| (entry.id, target)))
                .collect()
        };

        let Ok(runtime) = Handle::try_current() else {
            warn!(type_name, "No async runtime, invalidation dropped");
            return Invalidation::default();
        };

        let mut handles = Vec::new();
        for (id, target) in targets {
            if !target.is_enabled() {
                debug!(controller = %id, type_name, "Skipping disabled controller");
                continue;
            }
            debug!(controller = %id, type_name, "Invalidating controller");
            handles.push(runtime.spawn(target.refetch_boxed()));
        }
        Invalidation { handles }
    }

    /// Invalidate several types at once, skipping `except` in each.
    pub fn invalidate_all<I, S>(&self, type_names: I, except: Option<ControllerId>) -> Invalidation
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut combined = Invalidation::default();
        for type_name in type_names {
            combined
                .handles
                .extend(self.invalidate_except(type_name.as_ref(), except).handles);
        }
        combined
    }
}
