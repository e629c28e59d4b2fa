//! entity-sync: Entity Controllers over a Remote Data Service
//!
//! Schema-driven controllers that keep a filtered, ordered result set of one
//! entity type in sync with a remote typed data service. Local mutations
//! invalidate the controllers of every related type, remote change
//! notifications patch result sets in place and tag the rows they touched,
//! and saving an entity saves its nested sub-entities first.
//!
//! Push notifications need a [`RemoteService`] that can stream them. The
//! in-process [`remote::InMemoryRemote`] does; the HTTP adapter
//! [`remote::GraphqlRemote`] does not and reports subscriptions as
//! unsupported.

pub mod cache;
pub mod cli;
pub mod config;
pub mod controller;
pub mod entity;
pub mod error;
pub mod invalidation;
pub mod logging;
pub mod orchestrator;
pub mod remote;
pub mod schema;
pub mod status;

pub use controller::{ControllerEvent, ControllerOptions, EntityController, MutationKind, QueryState};
pub use entity::{ChangeSet, Entity, Identity};
pub use error::{RemoteError, SchemaError, SyncError, ValidationError};
pub use invalidation::{ControllerId, Invalidation, SyncContext};
pub use remote::{PushEvent, PushKind, QueryVariables, RemoteService};
pub use schema::{EntitySchema, FieldDescriptor, FieldKind, SchemaRegistry};
pub use status::EntityStatus;
