//! meshcfg event model
//!
//! Every configuration source in meshcfg (Kubernetes watchers, the filesystem
//! source, the protocol sink) normalises what it sees into one canonical
//! stream of [`Event`]s and pushes them into a [`Handler`].
//!
//! # Core Concepts
//!
//! - **Schema**: registered resource-kind descriptor (group/version/kind/plural)
//! - **Resource**: metadata + opaque JSON body
//! - **Event**: `Added` / `Updated` / `Deleted` for a resource, or a per-schema `FullSync` marker
//! - **Handler**: fire-and-forget sink for events; several combine into an ordered broadcast

pub mod error;
pub mod event;
pub mod handler;
pub mod resource;
pub mod schema;
pub mod source;

/// Cooperative shutdown signal shared by every background task.
pub use tokio_util::sync::CancellationToken;
pub use error::{ModelError, Result};
pub use event::{Event, Kind};
pub use handler::{
    combine_handlers, handler_fn, sentinel_handler, Accumulator, FnHandler, Handler, Handlers,
};
pub use resource::{Body, FullName, Metadata, Resource, Version};
pub use schema::{Schema, SchemaBuilder, Schemas, SchemasBuilder, ValidateFn};
pub use source::Source;
