use crate::handler::Handler;
use std::sync::Arc;

/// A producer of canonical events.
///
/// `start` and `stop` are idempotent unless an implementation documents otherwise.
/// Handlers registered with `dispatch` receive only events delivered after the call.
pub trait Source: Send + Sync {
    fn start(&self);

    fn stop(&self);

    fn dispatch(&self, handler: Arc<dyn Handler>);
}
