//! Watcher behaviour against an in-process fake informer.

use async_trait::async_trait;
use meshcfg_event::schema::mock;
use meshcfg_event::{Accumulator, Body, CancellationToken, Event, Kind, Source};
use meshcfg_source::{
    Adapter, ApiServerSource, DeletedObject, Informer, InformerHandler, ObjectMeta,
    RevisionFilter, SourceError, Watcher, REVISION_LABEL,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
struct FakeObject {
    name: String,
    version: String,
    revision: Option<String>,
    key: String,
    broken: bool,
}

fn obj(name: &str, version: &str, key: &str) -> FakeObject {
    FakeObject {
        name: name.to_string(),
        version: version.to_string(),
        revision: None,
        key: key.to_string(),
        broken: false,
    }
}

#[derive(Default)]
struct FakeShared {
    handlers: Mutex<Vec<Arc<dyn InformerHandler<FakeObject>>>>,
    synced: AtomicBool,
    running: AtomicBool,
    runs: AtomicUsize,
}

impl FakeShared {
    fn handler(&self) -> Arc<dyn InformerHandler<FakeObject>> {
        self.handlers.lock().unwrap().last().cloned().expect("handler registered")
    }
}

struct FakeInformer {
    shared: Arc<FakeShared>,
}

#[async_trait]
impl Informer for FakeInformer {
    type Object = FakeObject;

    fn add_event_handler(&self, handler: Arc<dyn InformerHandler<FakeObject>>) {
        self.shared.handlers.lock().unwrap().push(handler);
    }

    async fn run(&self, stop: CancellationToken) {
        self.shared.runs.fetch_add(1, Ordering::SeqCst);
        self.shared.running.store(true, Ordering::SeqCst);
        stop.cancelled().await;
        self.shared.running.store(false, Ordering::SeqCst);
    }

    fn has_synced(&self) -> bool {
        self.shared.synced.load(Ordering::SeqCst)
    }
}

struct FakeAdapter {
    shared: Arc<FakeShared>,
    fail: bool,
}

impl Adapter for FakeAdapter {
    type Object = FakeObject;
    type Informer = FakeInformer;

    fn new_informer(&self) -> meshcfg_source::Result<FakeInformer> {
        if self.fail {
            return Err(SourceError::informer_unavailable(
                "test.istio.io/v1/MockConfig",
                "the server could not find the requested resource",
            ));
        }
        Ok(FakeInformer {
            shared: Arc::clone(&self.shared),
        })
    }

    fn extract_object(&self, obj: &FakeObject) -> meshcfg_source::Result<ObjectMeta> {
        if obj.broken {
            return Err(SourceError::extraction("broken object"));
        }
        let mut labels = BTreeMap::new();
        if let Some(rev) = &obj.revision {
            labels.insert(REVISION_LABEL.to_string(), rev.clone());
        }
        Ok(ObjectMeta {
            namespace: "ns".to_string(),
            name: obj.name.clone(),
            resource_version: obj.version.clone(),
            labels,
            ..ObjectMeta::default()
        })
    }

    fn extract_resource(&self, obj: &FakeObject) -> meshcfg_source::Result<Body> {
        Ok(json!({ "key": obj.key }))
    }

    fn is_equal(&self, old: &FakeObject, new: &FakeObject) -> bool {
        old.version == new.version
    }
}

fn watcher(fail: bool, filter: RevisionFilter) -> (Watcher<FakeAdapter>, Arc<FakeShared>, Arc<Accumulator>) {
    let shared = Arc::new(FakeShared::default());
    let w = Watcher::new(
        mock(),
        FakeAdapter {
            shared: Arc::clone(&shared),
            fail,
        },
        Arc::new(filter),
    );
    let acc = Accumulator::new();
    w.dispatch(acc.clone());
    (w, shared, acc)
}

fn summary(events: &[Event]) -> Vec<(Kind, Option<String>)> {
    events
        .iter()
        .map(|e| (e.kind, e.resource.as_ref().map(|r| r.full_name().to_string())))
        .collect()
}

#[tokio::test]
async fn test_informer_failure_emits_single_full_sync() {
    let (w, _shared, acc) = watcher(true, RevisionFilter::default());
    w.start();

    assert_eq!(acc.events(), vec![Event::full_sync_for(&mock())]);
    assert!(!w.is_running());
    w.stop();
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(acc.len(), 1);
}

#[tokio::test]
async fn test_events_then_full_sync_after_informer_syncs() {
    let (w, shared, acc) = watcher(false, RevisionFilter::default());
    w.start();
    assert!(w.is_running());

    let h = shared.handler();
    h.on_add(obj("a", "1", "x"));
    h.on_update(obj("a", "1", "x"), obj("a", "2", "y"));
    shared.synced.store(true, Ordering::SeqCst);

    assert!(acc.wait_for(3, Duration::from_secs(2)).await);
    let events = acc.events();
    assert_eq!(
        summary(&events),
        vec![
            (Kind::Added, Some("ns/a".to_string())),
            (Kind::Updated, Some("ns/a".to_string())),
            (Kind::FullSync, None),
        ]
    );
    let updated = events[1].resource.as_ref().unwrap();
    assert_eq!(updated.metadata.version.as_str(), "2");
    assert_eq!(updated.body["key"], "y");
    assert_eq!(shared.runs.load(Ordering::SeqCst), 1);
    w.stop();
}

#[tokio::test]
async fn test_equal_update_is_suppressed() {
    let (w, shared, acc) = watcher(false, RevisionFilter::default());
    w.start();

    shared.handler().on_update(obj("a", "1", "x"), obj("a", "1", "x"));
    assert!(acc.is_empty());
    w.stop();
}

#[tokio::test]
async fn test_tombstones_and_broken_objects() {
    let (w, shared, acc) = watcher(false, RevisionFilter::default());
    w.start();
    let h = shared.handler();

    h.on_delete(DeletedObject::Tombstone {
        key: "ns/gone".to_string(),
        last_known: None,
    });
    h.on_add(FakeObject {
        broken: true,
        ..obj("b", "1", "x")
    });
    assert!(acc.is_empty());

    h.on_delete(DeletedObject::Tombstone {
        key: "ns/a".to_string(),
        last_known: Some(obj("a", "3", "x")),
    });
    h.on_delete(DeletedObject::Object(obj("c", "4", "x")));
    assert_eq!(
        summary(&acc.events()),
        vec![
            (Kind::Deleted, Some("ns/a".to_string())),
            (Kind::Deleted, Some("ns/c".to_string())),
        ]
    );
    w.stop();
}

#[tokio::test]
async fn test_revision_filtering() {
    let (w, shared, acc) = watcher(false, RevisionFilter::new("canary", ["mockconfigs"]));
    w.start();
    let h = shared.handler();

    let foreign = FakeObject {
        revision: Some("stable".to_string()),
        ..obj("f", "1", "x")
    };
    h.on_add(foreign.clone());
    h.on_update(foreign.clone(), FakeObject { version: "2".to_string(), ..foreign.clone() });
    h.on_delete(DeletedObject::Object(foreign));
    h.on_add(FakeObject {
        revision: Some("canary".to_string()),
        ..obj("mine", "1", "x")
    });

    assert_eq!(
        summary(&acc.events()),
        vec![
            (Kind::Deleted, Some("ns/f".to_string())),
            (Kind::Deleted, Some("ns/f".to_string())),
            (Kind::Added, Some("ns/mine".to_string())),
        ]
    );
    w.stop();
}

#[tokio::test]
#[should_panic(expected = "already started")]
async fn test_double_start_panics() {
    let (w, _shared, _acc) = watcher(false, RevisionFilter::default());
    w.start();
    w.start();
}

#[tokio::test]
async fn test_stop_twice_then_restart() {
    let (w, shared, acc) = watcher(false, RevisionFilter::default());
    w.start();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(shared.running.load(Ordering::SeqCst));

    w.stop();
    w.stop();
    assert!(!w.is_running());
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!shared.running.load(Ordering::SeqCst));

    shared.synced.store(true, Ordering::SeqCst);
    w.start();
    assert!(acc.wait_for(1, Duration::from_secs(2)).await);
    assert_eq!(acc.events(), vec![Event::full_sync_for(&mock())]);
    w.stop();
}

#[tokio::test]
async fn test_dispatch_does_not_replay() {
    let (w, shared, early) = watcher(false, RevisionFilter::default());
    w.start();
    let h = shared.handler();
    h.on_add(obj("a", "1", "x"));

    let late = Accumulator::new();
    w.dispatch(late.clone());
    h.on_add(obj("b", "1", "x"));

    assert_eq!(early.len(), 2);
    assert_eq!(summary(&late.events()), vec![(Kind::Added, Some("ns/b".to_string()))]);
    w.stop();
}

#[tokio::test]
async fn test_api_server_source_fans_out() {
    let shared = Arc::new(FakeShared::default());
    let mut source = ApiServerSource::new(RevisionFilter::default());
    source.add_watcher(
        mock(),
        FakeAdapter {
            shared: Arc::clone(&shared),
            fail: true,
        },
    );
    let acc = Accumulator::new();
    source.dispatch(acc.clone());

    source.start();
    source.start();
    assert_eq!(acc.len(), 1);
    source.stop();
    source.stop();
    assert!(source.watchers().iter().all(|w| !w.is_running()));
}
