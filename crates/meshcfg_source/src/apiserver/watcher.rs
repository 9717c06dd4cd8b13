//! Per-schema watcher: informer callbacks in, canonical events out.

use super::adapter::{Adapter, DeletedObject, Informer, InformerHandler, Recovery};
use crate::metrics::SOURCE_METRICS;
use crate::revision::RevisionFilter;
use meshcfg_event::{
    combine_handlers, sentinel_handler, CancellationToken, Event, FullName, Handler, Kind,
    Metadata, Resource, Schema, Version,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const SYNC_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Watches one schema through an injected [`Adapter`].
///
/// `start` must be called from within a tokio runtime. Starting a running
/// watcher panics; `stop` is idempotent and a stopped watcher may be restarted.
pub struct Watcher<A: Adapter> {
    inner: Arc<WatcherInner<A>>,
}

struct WatcherInner<A: Adapter> {
    schema: Schema,
    adapter: A,
    filter: Arc<RevisionFilter>,
    done: Mutex<Option<CancellationToken>>,
    handler: RwLock<Arc<dyn Handler>>,
}

impl<A: Adapter> Watcher<A> {
    pub fn new(schema: Schema, adapter: A, filter: Arc<RevisionFilter>) -> Self {
        Self {
            inner: Arc::new(WatcherInner {
                schema,
                adapter,
                filter,
                done: Mutex::new(None),
                handler: RwLock::new(sentinel_handler()),
            }),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.inner.schema
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock_done().is_some()
    }

    pub fn start(&self) {
        let inner = &self.inner;
        let mut done = inner.lock_done();
        if done.is_some() {
            panic!("watcher.start: already started: {}", inner.schema);
        }

        info!(schema = %inner.schema, "Starting watcher");

        let informer = match inner.adapter.new_informer() {
            Ok(informer) => informer,
            Err(e) => {
                // The kind is not served; report it as synced-and-empty so
                // downstream readiness does not wait on it forever.
                error!(
                    schema = %inner.schema,
                    gvk = %inner.schema.group_version_kind(),
                    "Unable to create informer: {}",
                    e
                );
                SOURCE_METRICS.inc_informer_failures();
                drop(done);
                inner.deliver(&Event::full_sync_for(&inner.schema));
                return;
            }
        };

        informer.add_event_handler(Arc::new(Callbacks {
            inner: Arc::clone(inner),
        }));
        let informer = Arc::new(informer);

        let token = CancellationToken::new();
        *done = Some(token.clone());
        drop(done);

        let run_informer = Arc::clone(&informer);
        let run_token = token.clone();
        tokio::spawn(async move {
            run_informer.run(run_token).await;
        });

        let sync_inner = Arc::clone(inner);
        tokio::spawn(async move {
            loop {
                if informer.has_synced() {
                    debug!(schema = %sync_inner.schema, "Informer synced");
                    sync_inner.deliver(&Event::full_sync_for(&sync_inner.schema));
                    return;
                }
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(SYNC_POLL_INTERVAL) => {}
                }
            }
        });
    }

    pub fn stop(&self) {
        let token = self.inner.lock_done().take();
        if let Some(token) = token {
            info!(schema = %self.inner.schema, "Stopping watcher");
            token.cancel();
        }
    }

    /// Events already delivered are not replayed to `handler`.
    pub fn dispatch(&self, handler: Arc<dyn Handler>) {
        let mut current = self
            .inner
            .handler
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *current = combine_handlers(Arc::clone(&current), handler);
    }
}

impl<A: Adapter> WatcherInner<A> {
    fn lock_done(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.done.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn deliver(&self, event: &Event) {
        let handler = Arc::clone(&self.handler.read().unwrap_or_else(PoisonError::into_inner));
        handler.handle(event);
    }

    fn handle_event(&self, kind: Kind, obj: &A::Object) {
        let meta = match self.adapter.extract_object(obj) {
            Ok(meta) => meta,
            Err(e) => {
                warn!(schema = %self.schema, kind = %kind, "Dropping object: {}", e);
                SOURCE_METRICS.inc_events_dropped();
                return;
            }
        };
        let body = match self.adapter.extract_resource(obj) {
            Ok(body) => body,
            Err(e) => {
                warn!(
                    schema = %self.schema,
                    kind = %kind,
                    name = %meta.name,
                    "Dropping object with unreadable body: {}",
                    e
                );
                SOURCE_METRICS.inc_events_dropped();
                return;
            }
        };

        let full_name = if self.schema.is_cluster_scoped() {
            FullName::cluster_scoped(meta.name)
        } else {
            FullName::new(meta.namespace, meta.name)
        };
        let mut metadata = Metadata::new(self.schema.clone(), full_name);
        metadata.labels = meta.labels;
        metadata.annotations = meta.annotations;
        metadata.version = Version::from(meta.resource_version);
        metadata.create_time = meta.creation_timestamp;
        let resource = Resource::new(metadata, body);

        if self.filter.skips(&resource) {
            SOURCE_METRICS.inc_events_revision_skipped();
        }
        let Some(kind) = self.filter.admit(kind, &resource) else {
            debug!(
                schema = %self.schema,
                name = %resource.full_name(),
                "Ignoring resource of another revision"
            );
            return;
        };

        self.deliver(&Event::for_resource(kind, resource));
        SOURCE_METRICS.inc_events_succeeded();
    }
}

struct Callbacks<A: Adapter> {
    inner: Arc<WatcherInner<A>>,
}

impl<A: Adapter> InformerHandler<A::Object> for Callbacks<A> {
    fn on_add(&self, obj: A::Object) {
        self.inner.handle_event(Kind::Added, &obj);
    }

    fn on_update(&self, old: A::Object, new: A::Object) {
        if self.inner.adapter.is_equal(&old, &new) {
            SOURCE_METRICS.inc_updates_suppressed();
            return;
        }
        self.inner.handle_event(Kind::Updated, &new);
    }

    fn on_delete(&self, obj: DeletedObject<A::Object>) {
        match obj.recover() {
            Recovery::Recovered(obj) => self.inner.handle_event(Kind::Deleted, &obj),
            Recovery::Unrecoverable { key } => {
                warn!(schema = %self.inner.schema, key = %key, "Couldn't get object from tombstone");
                SOURCE_METRICS.inc_events_dropped();
            }
        }
    }
}

impl<A: Adapter> Drop for Watcher<A> {
    fn drop(&mut self) {
        self.stop();
    }
}
