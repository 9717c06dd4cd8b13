//! Event handlers and handler composition.
//!
//! Handlers are pure sinks: `handle` has no return value and failures inside a
//! handler never propagate back to the emitting source. Composition is an
//! explicit ordered list, so broadcast order is the registration order.

use crate::event::Event;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;

pub trait Handler: Send + Sync {
    fn handle(&self, event: &Event);

    /// Identity element for [`combine_handlers`].
    fn is_sentinel(&self) -> bool {
        false
    }

    /// Exposes the constituents of a combined handler so combination stays flat.
    fn as_handlers(&self) -> Option<&Handlers> {
        None
    }
}

struct SentinelHandler;

impl Handler for SentinelHandler {
    fn handle(&self, _: &Event) {}

    fn is_sentinel(&self) -> bool {
        true
    }
}

/// No-op handler; lets components exist before their consumer is known.
pub fn sentinel_handler() -> Arc<dyn Handler> {
    Arc::new(SentinelHandler)
}

/// Ordered broadcast to every constituent handler.
#[derive(Clone, Default)]
pub struct Handlers {
    handlers: Vec<Arc<dyn Handler>>,
}

impl Handlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, handler: Arc<dyn Handler>) {
        if handler.is_sentinel() {
            return;
        }
        match handler.as_handlers() {
            Some(inner) => self.handlers.extend(inner.handlers.iter().cloned()),
            None => self.handlers.push(handler),
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Handler for Handlers {
    fn handle(&self, event: &Event) {
        for h in &self.handlers {
            h.handle(event);
        }
    }

    fn as_handlers(&self) -> Option<&Handlers> {
        Some(self)
    }
}

impl fmt::Debug for Handlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handlers")
            .field("len", &self.handlers.len())
            .finish()
    }
}

/// Handler that invokes `a` then `b`. Combining with the sentinel returns the other side.
pub fn combine_handlers(a: Arc<dyn Handler>, b: Arc<dyn Handler>) -> Arc<dyn Handler> {
    if a.is_sentinel() {
        return b;
    }
    if b.is_sentinel() {
        return a;
    }
    let mut combined = Handlers::new();
    combined.add(a);
    combined.add(b);
    Arc::new(combined)
}

/// Adapts a closure into a [`Handler`].
pub struct FnHandler<F> {
    f: F,
}

impl<F> Handler for FnHandler<F>
where
    F: Fn(&Event) + Send + Sync,
{
    fn handle(&self, event: &Event) {
        (self.f)(event)
    }
}

pub fn handler_fn<F>(f: F) -> Arc<dyn Handler>
where
    F: Fn(&Event) + Send + Sync + 'static,
{
    Arc::new(FnHandler { f })
}

/// Records every event it sees. Useful as a downstream stand-in in tests.
#[derive(Default)]
pub struct Accumulator {
    events: Mutex<Vec<Event>>,
    notify: Notify,
}

impl Accumulator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Wait until at least `count` events were recorded. Returns false on timeout.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let notified = self.notify.notified();
                if self.len() >= count {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }
}

impl Handler for Accumulator {
    fn handle(&self, event: &Event) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        self.notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::mock;

    fn recorder(log: Arc<Mutex<Vec<&'static str>>>, tag: &'static str) -> Arc<dyn Handler> {
        handler_fn(move |_| log.lock().unwrap().push(tag))
    }

    #[test]
    fn test_combine_invokes_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let h = combine_handlers(recorder(log.clone(), "a"), recorder(log.clone(), "b"));
        let h = combine_handlers(h, recorder(log.clone(), "c"));

        h.handle(&Event::full_sync_for(&mock()));
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
        assert_eq!(h.as_handlers().map(Handlers::len), Some(3));
    }

    #[test]
    fn test_sentinel_is_identity() {
        let acc = Accumulator::new();
        let h: Arc<dyn Handler> = acc.clone();

        let left = combine_handlers(sentinel_handler(), h.clone());
        let right = combine_handlers(h.clone(), sentinel_handler());
        assert!(Arc::ptr_eq(&left, &h));
        assert!(Arc::ptr_eq(&right, &h));

        let both = combine_handlers(sentinel_handler(), sentinel_handler());
        assert!(both.is_sentinel());
    }

    #[test]
    fn test_accumulator_records() {
        let acc = Accumulator::new();
        acc.handle(&Event::full_sync_for(&mock()));
        assert_eq!(acc.len(), 1);
        acc.clear();
        assert!(acc.is_empty());
    }

    #[tokio::test]
    async fn test_accumulator_wait_for() {
        let acc = Accumulator::new();
        let producer = acc.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            producer.handle(&Event::full_sync_for(&mock()));
        });
        assert!(acc.wait_for(1, Duration::from_secs(1)).await);
        assert!(!acc.wait_for(2, Duration::from_millis(20)).await);
    }
}
