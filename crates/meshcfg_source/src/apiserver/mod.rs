//! Kubernetes API server source.
//!
//! One [`Watcher`] per schema bridges an informer into canonical events;
//! [`ApiServerSource`] groups them behind the [`Source`] trait.

mod adapter;
mod watcher;

pub use adapter::{Adapter, DeletedObject, Informer, InformerHandler, ObjectMeta, Recovery};
pub use watcher::Watcher;

use crate::revision::RevisionFilter;
use meshcfg_event::{Handler, Schema, Source};
use std::sync::{Arc, Mutex, PoisonError};

/// Object-safe view of a [`Watcher`], erasing its adapter type.
pub trait SchemaWatcher: Send + Sync {
    fn schema(&self) -> &Schema;

    fn start(&self);

    fn stop(&self);

    fn dispatch(&self, handler: Arc<dyn Handler>);

    fn is_running(&self) -> bool;
}

impl<A: Adapter> SchemaWatcher for Watcher<A> {
    fn schema(&self) -> &Schema {
        Watcher::schema(self)
    }

    fn start(&self) {
        Watcher::start(self)
    }

    fn stop(&self) {
        Watcher::stop(self)
    }

    fn dispatch(&self, handler: Arc<dyn Handler>) {
        Watcher::dispatch(self, handler)
    }

    fn is_running(&self) -> bool {
        Watcher::is_running(self)
    }
}

/// All watchers sharing one revision filter.
pub struct ApiServerSource {
    filter: Arc<RevisionFilter>,
    watchers: Vec<Box<dyn SchemaWatcher>>,
    started: Mutex<bool>,
}

impl ApiServerSource {
    pub fn new(filter: RevisionFilter) -> Self {
        Self {
            filter: Arc::new(filter),
            watchers: Vec::new(),
            started: Mutex::new(false),
        }
    }

    pub fn add_watcher<A: Adapter>(&mut self, schema: Schema, adapter: A) {
        self.watchers.push(Box::new(Watcher::new(
            schema,
            adapter,
            Arc::clone(&self.filter),
        )));
    }

    pub fn watchers(&self) -> &[Box<dyn SchemaWatcher>] {
        &self.watchers
    }

    pub fn filter(&self) -> &RevisionFilter {
        &self.filter
    }
}

impl Source for ApiServerSource {
    fn start(&self) {
        let mut started = self.started.lock().unwrap_or_else(PoisonError::into_inner);
        if *started {
            return;
        }
        *started = true;
        for w in &self.watchers {
            w.start();
        }
    }

    fn stop(&self) {
        let mut started = self.started.lock().unwrap_or_else(PoisonError::into_inner);
        if !*started {
            return;
        }
        *started = false;
        for w in &self.watchers {
            w.stop();
        }
    }

    fn dispatch(&self, handler: Arc<dyn Handler>) {
        for w in &self.watchers {
            w.dispatch(Arc::clone(&handler));
        }
    }
}
