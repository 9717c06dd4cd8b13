//! Stream sink: requests collections, applies pushes, ACKs or NACKs them.

use crate::error::{Status, StreamError, UpdateError};
use crate::metrics::SINK_METRICS;
use crate::stream::ResourceStream;
use crate::types::{ErrorDetail, RequestResources, Resources, SinkNode, WireResource};
use async_trait::async_trait;
use meshcfg_event::{
    Event, FullName, Handler, Kind, Metadata, Resource, Schemas, Version,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// One collection's worth of pushed state, handed to the [`Updater`].
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub collection: String,
    pub objects: Vec<WireResource>,
    pub removed: Vec<String>,
    pub incremental: bool,
    pub system_version_info: String,
}

/// Consumer of pushed state. An error NACKs the push.
pub trait Updater: Send + Sync {
    fn apply(&self, change: &Change) -> Result<(), UpdateError>;
}

/// Something that drives a whole resource stream to completion.
#[async_trait]
pub trait StreamProcessor: Send + Sync {
    async fn process_stream(&self, stream: &mut dyn ResourceStream) -> Result<(), StreamError>;
}

#[derive(Clone)]
pub struct SinkOptions {
    pub collections: Vec<String>,
    pub updater: Arc<dyn Updater>,
    pub id: String,
    pub annotations: BTreeMap<String, String>,
}

pub struct Sink {
    node: SinkNode,
    collections: BTreeSet<String>,
    updater: Arc<dyn Updater>,
}

impl Sink {
    pub fn new(options: SinkOptions) -> Self {
        Self {
            node: SinkNode {
                id: options.id,
                annotations: options.annotations,
            },
            collections: options.collections.into_iter().collect(),
            updater: options.updater,
        }
    }

    pub fn collections(&self) -> impl Iterator<Item = &str> {
        self.collections.iter().map(String::as_str)
    }

    fn request(&self, collection: &str, nonce: &str, error: Option<Status>) -> RequestResources {
        RequestResources {
            sink_node: self.node.clone(),
            collection: collection.to_string(),
            response_nonce: nonce.to_string(),
            error_detail: error.as_ref().map(ErrorDetail::from),
            incremental: false,
        }
    }

    /// Build the ACK or NACK for one push.
    pub fn handle_response(&self, resources: Resources) -> RequestResources {
        let collection = resources.collection.clone();
        let nonce = resources.nonce.clone();

        if !self.collections.contains(&collection) {
            return self.nack(
                &collection,
                &nonce,
                Status::invalid_argument(format!("unsupported collection {:?}", collection)),
            );
        }
        if resources.incremental {
            return self.nack(
                &collection,
                &nonce,
                Status::unimplemented("incremental resource updates are not supported"),
            );
        }

        let change = Change {
            collection: resources.collection,
            objects: resources.resources,
            removed: resources.removed_resources,
            incremental: false,
            system_version_info: resources.system_version_info,
        };
        match self.updater.apply(&change) {
            Ok(()) => {
                SINK_METRICS.inc_requests_acked();
                debug!(collection = %collection, nonce = %nonce, "ACK");
                self.request(&collection, &nonce, None)
            }
            Err(e) => self.nack(&collection, &nonce, Status::invalid_argument(e.to_string())),
        }
    }

    fn nack(&self, collection: &str, nonce: &str, status: Status) -> RequestResources {
        SINK_METRICS.inc_requests_nacked();
        warn!(collection = %collection, nonce = %nonce, "NACK: {}", status);
        self.request(collection, nonce, Some(status))
    }
}

#[async_trait]
impl StreamProcessor for Sink {
    async fn process_stream(&self, stream: &mut dyn ResourceStream) -> Result<(), StreamError> {
        let cancel = stream.context().cancel.clone();

        for collection in &self.collections {
            stream.send(self.request(collection, "", None)).await?;
        }

        loop {
            let resources = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(Status::cancelled("stream cancelled").into());
                }
                r = stream.recv() => r?,
            };
            let response = self.handle_response(resources);
            stream.send(response).await?;
        }
    }
}

#[derive(Default)]
struct CollectionState {
    resources: BTreeMap<FullName, Resource>,
    synced: bool,
}

/// Turns full-state pushes into canonical events.
///
/// Each push is diffed against the previous state of the collection; the
/// first push of a collection is followed by its FullSync marker.
pub struct EventUpdater {
    schemas: Schemas,
    handler: Arc<dyn Handler>,
    state: Mutex<HashMap<String, CollectionState>>,
}

impl EventUpdater {
    pub fn new(schemas: Schemas, handler: Arc<dyn Handler>) -> Self {
        Self {
            schemas,
            handler,
            state: Mutex::new(HashMap::new()),
        }
    }

    fn convert(&self, change: &Change) -> Result<BTreeMap<FullName, Resource>, UpdateError> {
        let schema = self
            .schemas
            .get(&change.collection)
            .ok_or_else(|| UpdateError::new(format!("unknown collection {}", change.collection)))?;

        let mut out = BTreeMap::new();
        for obj in &change.objects {
            let full_name = FullName::parse(&obj.metadata.name)
                .map_err(|e| UpdateError::new(e.to_string()))?;
            schema
                .validate(&full_name, &obj.body)
                .map_err(|e| UpdateError::new(format!("{}: {}", full_name, e)))?;

            let mut metadata = Metadata::new(schema.clone(), full_name.clone());
            metadata.labels = obj.metadata.labels.clone();
            metadata.annotations = obj.metadata.annotations.clone();
            metadata.version = Version::new(obj.metadata.version.clone());
            metadata.create_time = obj.metadata.create_time;
            out.insert(full_name, Resource::new(metadata, obj.body.clone()));
        }
        Ok(out)
    }
}

impl Updater for EventUpdater {
    fn apply(&self, change: &Change) -> Result<(), UpdateError> {
        if change.incremental {
            return Err(UpdateError::new("incremental changes are not supported"));
        }
        let next = self.convert(change)?;

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = state.entry(change.collection.clone()).or_default();

        let mut events = Vec::new();
        for (name, resource) in &next {
            match entry.resources.get(name) {
                Some(prev) if prev.metadata.version == resource.metadata.version && prev.body == resource.body => {}
                Some(_) => events.push(Event::for_resource(Kind::Updated, resource.clone())),
                None => events.push(Event::for_resource(Kind::Added, resource.clone())),
            }
        }
        for (name, prev) in &entry.resources {
            if !next.contains_key(name) {
                events.push(Event::deleted(prev.clone()));
            }
        }
        entry.resources = next;

        for event in &events {
            self.handler.handle(event);
        }
        if !entry.synced {
            entry.synced = true;
            if let Some(schema) = self.schemas.get(&change.collection) {
                info!(collection = %change.collection, "Collection synced");
                self.handler.handle(&Event::full_sync_for(schema));
            }
        }
        SINK_METRICS.inc_changes_applied();
        Ok(())
    }
}
