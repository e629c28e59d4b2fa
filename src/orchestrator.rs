//! Save Orchestrator
//!
//! An update whose change-set touches fields owned by registered
//! sub-controllers is saved children first. Each child save reports into a
//! [`SaveCycle`] created for this save alone; when the last child reports,
//! the cycle fires once and the parent mutation is dispatched with the
//! references the children saved. A failing child aborts the cycle and the
//! parent mutation is never sent.

use crate::controller::EntityController;
use crate::entity::Entity;
use crate::error::SyncError;
use futures::future::join_all;
use parking_lot::Mutex;
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, warn};

static NEXT_CYCLE: AtomicU64 = AtomicU64::new(1);

/// One child save: the edited and original value of a field owned by a
/// sub-controller.
#[derive(Debug, Clone)]
pub struct NestedSave {
    pub field: String,
    pub controller: EntityController,
    pub edited: Value,
    pub original: Value,
}

/// What a child save produced: the rows it wrote and the value the parent
/// now references (identities of the saved entries, a list of them for list
/// fields, `null` when unlinked).
#[derive(Debug, Clone, PartialEq)]
pub struct NestedOutcome {
    pub saved: Vec<Entity>,
    pub reference: Value,
}

/// Completion counter for one save. Fires exactly once, when `completed`
/// reaches `target`.
#[derive(Debug)]
pub struct SaveCycle {
    id: u64,
    target: usize,
    completed: AtomicUsize,
    fire: Mutex<Option<oneshot::Sender<()>>>,
}

impl SaveCycle {
    /// A cycle awaiting `target` completions and the receiver it fires.
    pub fn new(target: usize) -> (Arc<Self>, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        let cycle = Arc::new(Self {
            id: NEXT_CYCLE.fetch_add(1, Ordering::Relaxed),
            target,
            completed: AtomicUsize::new(0),
            fire: Mutex::new(Some(tx)),
        });
        if target == 0 {
            cycle.fire_once();
        }
        (cycle, rx)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Count one finished child. Returns `true` for the report that fired
    /// the cycle.
    pub fn report_completion(&self) -> bool {
        let completed = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(cycle = self.id, completed, target = self.target, "Nested save completed");
        if completed == self.target {
            return self.fire_once();
        }
        if completed > self.target {
            warn!(cycle = self.id, completed, "Completion reported past target");
        }
        false
    }

    fn fire_once(&self) -> bool {
        match self.fire.lock().take() {
            Some(tx) => {
                // the receiver may already be gone if the save was abandoned
                let _ = tx.send(());
                true
            }
            None => false,
        }
    }
}

/// Save every child, then run `parent` exactly once with the `(field,
/// reference)` pair of every child.
///
/// Without children `parent` runs immediately. The first child failure is
/// returned wrapped with its field name and `parent` is not run.
pub async fn orchestrate<F, Fut>(
    type_name: &str,
    children: Vec<NestedSave>,
    parent: F,
) -> Result<Vec<Entity>, SyncError>
where
    F: FnOnce(Vec<(String, Value)>) -> Fut,
    Fut: Future<Output = Result<Vec<Entity>, SyncError>>,
{
    if children.is_empty() {
        return parent(Vec::new()).await;
    }

    let (cycle, fired) = SaveCycle::new(children.len());
    debug!(
        cycle = cycle.id(),
        type_name,
        children = cycle.target(),
        "Saving nested fields before parent"
    );

    let saves = children.into_iter().map(|child| {
        let cycle = Arc::clone(&cycle);
        async move {
            let NestedSave {
                field,
                controller,
                edited,
                original,
            } = child;
            match controller.save_nested(edited, original).await {
                Ok(outcome) => {
                    cycle.report_completion();
                    Ok((field, outcome.reference))
                }
                Err(source) => Err(SyncError::Orchestration {
                    field,
                    source: Box::new(source),
                }),
            }
        }
    });
    let mut references = Vec::new();
    for result in join_all(saves).await {
        match result {
            Ok(reference) => references.push(reference),
            Err(err) => {
                warn!(cycle = cycle.id(), type_name, error = %err, "Nested save failed, parent not saved");
                return Err(err);
            }
        }
    }

    if fired.await.is_err() {
        return Err(SyncError::Orchestration {
            field: type_name.to_string(),
            source: Box::new(SyncError::Config(format!(
                "save cycle {} closed before firing",
                cycle.id()
            ))),
        });
    }

    debug!(cycle = cycle.id(), type_name, "Nested saves done, saving parent");
    parent(references).await
}
