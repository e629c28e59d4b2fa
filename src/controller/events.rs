//! Change notifications published by a controller.

use super::{MutationKind, QueryState};
use crate::entity::Identity;
use crate::error::RemoteError;
use crate::status::EntityStatus;

/// Observable change of one controller's state.
///
/// Delivered on a bounded broadcast channel; a slow subscriber may miss
/// events and should then re-read the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    QueryStateChanged(QueryState),
    /// The result list changed; `rows` is its new length.
    DataChanged { rows: usize },
    QueryFailed(RemoteError),
    StatusChanged {
        identity: Identity,
        status: EntityStatus,
    },
    MutationStarted(MutationKind),
    MutationFinished { kind: MutationKind, succeeded: bool },
    /// An update of this controller's entity was applied.
    SaveCompleted,
    SubControllersChanged,
    TornDown,
}
