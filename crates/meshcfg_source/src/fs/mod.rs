//! Filesystem source.
//!
//! Snapshots a directory tree of YAML files into a [`KubeSource`] and keeps
//! it current on reload triggers (file change notifications, SIGUSR1, or
//! explicit [`FsSource::trigger`] calls).

mod trigger;

pub use trigger::ReloadTrigger;

use crate::error::Result;
use crate::inmemory::KubeSource;
use crate::metrics::SOURCE_METRICS;
use flate2::read::GzDecoder;
use meshcfg_event::{CancellationToken, Handler, Schemas, Source};
use notify::RecommendedWatcher;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, warn};
use trigger::SignalTrigger;
use walkdir::WalkDir;

static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(0);

const CONFIG_SUFFIXES: [&str; 4] = [".yaml", ".yml", ".yaml.gz", ".yml.gz"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FsOptions {
    /// Reload whenever something under the root changes.
    pub watch_config_files: bool,
    /// Namespace for namespaced resources that do not declare one.
    pub default_namespace: String,
    /// Reload on SIGUSR1 (unix only).
    pub reload_on_signal: bool,
}

impl Default for FsOptions {
    fn default() -> Self {
        Self {
            watch_config_files: false,
            default_namespace: String::new(),
            reload_on_signal: true,
        }
    }
}

/// Per-file outcome of one reload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReloadReport {
    pub applied: usize,
    pub failed: usize,
    pub removed: usize,
}

pub struct FsSource {
    inner: Arc<FsInner>,
}

struct FsInner {
    name: String,
    root: PathBuf,
    options: FsOptions,
    store: KubeSource,
    state: Mutex<FsState>,
}

#[derive(Default)]
struct FsState {
    done: Option<CancellationToken>,
    watcher: Option<RecommendedWatcher>,
    trigger_tx: Option<UnboundedSender<ReloadTrigger>>,
}

impl FsSource {
    pub fn new(root: impl Into<PathBuf>, schemas: Schemas, options: FsOptions) -> Self {
        let id = NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed);
        let store = KubeSource::new(schemas);
        store.set_default_namespace(options.default_namespace.clone());
        Self {
            inner: Arc::new(FsInner {
                name: format!("fs-{}", id),
                root: root.into(),
                options,
                store,
                state: Mutex::new(FsState::default()),
            }),
        }
    }

    /// Unique name used in log lines.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    pub fn store(&self) -> &KubeSource {
        &self.inner.store
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().done.is_some()
    }

    /// Walk the root now and reconcile the store with what is found.
    pub fn reload(&self) -> Result<ReloadReport> {
        let _state = self.inner.lock();
        self.inner.reload_locked()
    }

    /// Ask the running trigger loop for a reload. False when the source is not running.
    pub fn trigger(&self, reason: impl Into<String>) -> bool {
        match self.trigger_handle() {
            Some(tx) => tx.send(ReloadTrigger::new(reason)).is_ok(),
            None => false,
        }
    }

    /// Sender feeding the trigger loop, for wiring external trigger sources.
    pub fn trigger_handle(&self) -> Option<UnboundedSender<ReloadTrigger>> {
        self.inner.lock().trigger_tx.clone()
    }
}

impl FsInner {
    fn lock(&self) -> MutexGuard<'_, FsState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reload_if_running(&self) {
        let state = self.lock();
        if state.done.is_none() {
            return;
        }
        if let Err(e) = self.reload_locked() {
            error!(source = %self.name, root = %self.root.display(), "Reload failed: {}", e);
        }
    }

    /// Caller must hold the state lock.
    fn reload_locked(&self) -> Result<ReloadReport> {
        match self.walk() {
            Ok(report) => {
                SOURCE_METRICS.inc_reloads_completed();
                SOURCE_METRICS.record_reload_files(
                    report.applied as u64,
                    report.failed as u64,
                    report.removed as u64,
                );
                info!(
                    source = %self.name,
                    applied = report.applied,
                    failed = report.failed,
                    removed = report.removed,
                    "Reloaded config files"
                );
                Ok(report)
            }
            Err(e) => {
                SOURCE_METRICS.inc_reloads_failed();
                Err(e)
            }
        }
    }

    fn walk(&self) -> Result<ReloadReport> {
        let mut remaining = self.store.content_names();
        let mut report = ReloadReport::default();

        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = entry?;
            let file_type = entry.file_type();
            if !(file_type.is_file() || file_type.is_symlink()) {
                continue;
            }
            let is_config = entry
                .file_name()
                .to_str()
                .map(has_config_suffix)
                .unwrap_or(false);
            if !is_config {
                continue;
            }

            let path = entry.path();
            let name = path.to_string_lossy().into_owned();
            let bytes = read_config(path)?;
            let text = match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(e) => {
                    warn!(source = %self.name, path = %name, "Config file is not UTF-8: {}", e);
                    report.failed += 1;
                    continue;
                }
            };

            match self.store.apply_content(&name, &text) {
                Ok(()) => {
                    debug!(source = %self.name, path = %name, "Applied config file");
                    remaining.remove(&name);
                    report.applied += 1;
                }
                Err(e) => {
                    warn!(source = %self.name, path = %name, "Unable to apply config file: {}", e);
                    report.failed += 1;
                }
            }
        }

        for name in remaining {
            debug!(source = %self.name, path = %name, "Removing config file");
            self.store.remove_content(&name);
            report.removed += 1;
        }
        Ok(report)
    }
}

fn has_config_suffix(file_name: &str) -> bool {
    CONFIG_SUFFIXES.iter().any(|s| file_name.ends_with(s))
}

fn read_config(path: &Path) -> Result<Vec<u8>> {
    let raw = std::fs::read(path)?;
    if !path.to_string_lossy().ends_with(".gz") {
        return Ok(raw);
    }
    let mut out = Vec::new();
    GzDecoder::new(raw.as_slice()).read_to_end(&mut out)?;
    Ok(out)
}

async fn run_triggers(
    inner: Arc<FsInner>,
    mut rx: UnboundedReceiver<ReloadTrigger>,
    token: CancellationToken,
    mut signal: Option<SignalTrigger>,
) {
    loop {
        let trigger = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            t = rx.recv() => match t {
                Some(t) => t,
                None => break,
            },
            _ = next_signal(&mut signal) => ReloadTrigger::new("SIGUSR1"),
        };

        debug!(source = %inner.name, trigger = %trigger.source, "Reload triggered");
        let reload = Arc::clone(&inner);
        if let Err(e) = tokio::task::spawn_blocking(move || reload.reload_if_running()).await {
            error!(source = %inner.name, "Reload task failed: {}", e);
        }
    }
    debug!(source = %inner.name, "Trigger loop exited");
}

async fn next_signal(signal: &mut Option<SignalTrigger>) {
    match signal {
        Some(s) => s.recv().await,
        None => std::future::pending().await,
    }
}

impl Source for FsSource {
    fn start(&self) {
        let inner = &self.inner;
        let mut state = inner.lock();
        if state.done.is_some() {
            return;
        }
        info!(source = %inner.name, root = %inner.root.display(), "Starting filesystem source");

        if let Err(e) = inner.reload_locked() {
            error!(source = %inner.name, root = %inner.root.display(), "Initial load failed: {}", e);
        }
        inner.store.start();

        let (tx, rx) = mpsc::unbounded_channel();
        if inner.options.watch_config_files {
            match trigger::watch_root(&inner.root, tx.clone()) {
                Ok(w) => state.watcher = Some(w),
                Err(e) => {
                    error!(source = %inner.name, root = %inner.root.display(), "Unable to watch config files: {}", e)
                }
            }
        }

        let token = CancellationToken::new();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let signal = if inner.options.reload_on_signal {
                    let _guard = handle.enter();
                    Some(SignalTrigger::new())
                } else {
                    None
                };
                handle.spawn(run_triggers(Arc::clone(inner), rx, token.clone(), signal));
            }
            Err(_) => {
                error!(source = %inner.name, "No tokio runtime; reload triggers disabled");
            }
        }

        state.trigger_tx = Some(tx);
        state.done = Some(token);
    }

    fn stop(&self) {
        let mut state = self.inner.lock();
        let Some(token) = state.done.take() else {
            return;
        };
        info!(source = %self.inner.name, "Stopping filesystem source");
        token.cancel();
        state.watcher = None;
        state.trigger_tx = None;
        self.inner.store.stop();
        self.inner.store.clear();
    }

    fn dispatch(&self, handler: Arc<dyn Handler>) {
        self.inner.store.dispatch(handler);
    }
}

impl Drop for FsSource {
    fn drop(&mut self) {
        self.stop();
    }
}
