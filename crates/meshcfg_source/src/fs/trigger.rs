//! Reload triggers: file change notifications and SIGUSR1.

use crate::error::Result;
use notify::{Event as NotifyEvent, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

/// Why a reload was requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadTrigger {
    pub source: String,
}

impl ReloadTrigger {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

/// Watch `root` recursively and forward every change as a trigger.
///
/// The returned watcher stops forwarding when dropped.
pub(crate) fn watch_root(
    root: &Path,
    tx: UnboundedSender<ReloadTrigger>,
) -> Result<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<NotifyEvent>| {
        match res {
            Ok(event) => {
                if matches!(event.kind, EventKind::Access(_)) {
                    return;
                }
                debug!(kind = ?event.kind, paths = ?event.paths, "File change");
                // Receiver gone means the source stopped.
                let _ = tx.send(ReloadTrigger::new("file-watch"));
            }
            Err(e) => warn!("File watch error: {}", e),
        }
    })?;
    watcher.watch(root, RecursiveMode::Recursive)?;
    Ok(watcher)
}

/// Resolves on each SIGUSR1. Pends forever where the signal is unavailable.
#[cfg(unix)]
pub(crate) struct SignalTrigger {
    signal: Option<tokio::signal::unix::Signal>,
}

#[cfg(unix)]
impl SignalTrigger {
    pub(crate) fn new() -> Self {
        use tokio::signal::unix::{signal, SignalKind};
        let signal = match signal(SignalKind::user_defined1()) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!("Unable to listen for SIGUSR1: {}", e);
                None
            }
        };
        Self { signal }
    }

    pub(crate) async fn recv(&mut self) {
        match self.signal.as_mut() {
            Some(s) => {
                if s.recv().await.is_none() {
                    self.signal = None;
                    std::future::pending::<()>().await;
                }
            }
            None => std::future::pending::<()>().await,
        }
    }
}

#[cfg(not(unix))]
pub(crate) struct SignalTrigger;

#[cfg(not(unix))]
impl SignalTrigger {
    pub(crate) fn new() -> Self {
        Self
    }

    pub(crate) async fn recv(&mut self) {
        std::future::pending::<()>().await
    }
}
