//! Capability interfaces injected by the Kubernetes client layer.
//!
//! The watcher never talks to an API server itself. A backend supplies an
//! [`Adapter`] per object representation (typed objects, unstructured JSON, ...)
//! and the adapter builds the [`Informer`] that lists and watches.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use meshcfg_event::{Body, CancellationToken};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Object metadata as reported by the API server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMeta {
    pub namespace: String,
    pub name: String,
    pub resource_version: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub creation_timestamp: Option<DateTime<Utc>>,
}

/// Payload of a delete notification.
///
/// When the watch missed the actual delete, the cache reports a tombstone that
/// may or may not still hold the last state it saw.
#[derive(Debug, Clone, PartialEq)]
pub enum DeletedObject<O> {
    Object(O),
    Tombstone { key: String, last_known: Option<O> },
}

/// Result of unwrapping a [`DeletedObject`].
#[derive(Debug, Clone, PartialEq)]
pub enum Recovery<O> {
    Recovered(O),
    Unrecoverable { key: String },
}

impl<O> DeletedObject<O> {
    pub fn recover(self) -> Recovery<O> {
        match self {
            DeletedObject::Object(obj) => Recovery::Recovered(obj),
            DeletedObject::Tombstone {
                last_known: Some(obj),
                ..
            } => Recovery::Recovered(obj),
            DeletedObject::Tombstone {
                key,
                last_known: None,
            } => Recovery::Unrecoverable { key },
        }
    }
}

/// Callbacks invoked by an informer. Implementations must not block.
pub trait InformerHandler<O>: Send + Sync {
    fn on_add(&self, obj: O);

    fn on_update(&self, old: O, new: O);

    fn on_delete(&self, obj: DeletedObject<O>);
}

/// A list/watch cache for one resource kind.
#[async_trait]
pub trait Informer: Send + Sync + 'static {
    type Object: Send + 'static;

    fn add_event_handler(&self, handler: Arc<dyn InformerHandler<Self::Object>>);

    /// Run until `stop` is cancelled.
    async fn run(&self, stop: CancellationToken);

    /// True once the initial list has been delivered to the handlers.
    fn has_synced(&self) -> bool;
}

/// Per-representation glue between backend objects and canonical resources.
pub trait Adapter: Send + Sync + 'static {
    type Object: Send + 'static;
    type Informer: Informer<Object = Self::Object>;

    /// Fails when the kind is not served (e.g. the CRD is not installed).
    fn new_informer(&self) -> Result<Self::Informer>;

    fn extract_object(&self, obj: &Self::Object) -> Result<ObjectMeta>;

    fn extract_resource(&self, obj: &Self::Object) -> Result<Body>;

    /// Resyncs report unchanged objects as updates; equal pairs are suppressed.
    fn is_equal(&self, old: &Self::Object, new: &Self::Object) -> bool;
}
