//! Metrics Module for Observability
//!
//! In-memory counters for watcher and filesystem source health. Downstream
//! consumers only see the event stream; operators watch these.
//!
//! - Lock-free atomics, process-wide
//! - Snapshots for readers, Prometheus text rendering for scraping

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics instance - lock-free atomics for counters
pub static SOURCE_METRICS: SourceMetrics = SourceMetrics::new();

/// Source metrics - all fields are atomic for thread-safe access
pub struct SourceMetrics {
    // Watcher counters
    pub events_succeeded: AtomicU64,
    pub events_dropped: AtomicU64,
    pub events_revision_skipped: AtomicU64,
    pub updates_suppressed: AtomicU64,
    pub informer_failures: AtomicU64,

    // Filesystem counters
    pub reloads_completed: AtomicU64,
    pub reloads_failed: AtomicU64,
    pub files_applied: AtomicU64,
    pub files_failed: AtomicU64,
    pub files_removed: AtomicU64,
}

impl Default for SourceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceMetrics {
    pub const fn new() -> Self {
        Self {
            events_succeeded: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            events_revision_skipped: AtomicU64::new(0),
            updates_suppressed: AtomicU64::new(0),
            informer_failures: AtomicU64::new(0),
            reloads_completed: AtomicU64::new(0),
            reloads_failed: AtomicU64::new(0),
            files_applied: AtomicU64::new(0),
            files_failed: AtomicU64::new(0),
            files_removed: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn inc_events_succeeded(&self) {
        self.events_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_events_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_events_revision_skipped(&self) {
        self.events_revision_skipped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_updates_suppressed(&self) {
        self.updates_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_informer_failures(&self) {
        self.informer_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_reloads_completed(&self) {
        self.reloads_completed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_reloads_failed(&self) {
        self.reloads_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the per-file outcome of one reload.
    pub fn record_reload_files(&self, applied: u64, failed: u64, removed: u64) {
        self.files_applied.fetch_add(applied, Ordering::Relaxed);
        self.files_failed.fetch_add(failed, Ordering::Relaxed);
        self.files_removed.fetch_add(removed, Ordering::Relaxed);
    }

    /// Get a snapshot of all metrics
    pub fn snapshot(&self) -> SourceMetricsSnapshot {
        SourceMetricsSnapshot {
            events_succeeded: self.events_succeeded.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            events_revision_skipped: self.events_revision_skipped.load(Ordering::Relaxed),
            updates_suppressed: self.updates_suppressed.load(Ordering::Relaxed),
            informer_failures: self.informer_failures.load(Ordering::Relaxed),
            reloads_completed: self.reloads_completed.load(Ordering::Relaxed),
            reloads_failed: self.reloads_failed.load(Ordering::Relaxed),
            files_applied: self.files_applied.load(Ordering::Relaxed),
            files_failed: self.files_failed.load(Ordering::Relaxed),
            files_removed: self.files_removed.load(Ordering::Relaxed),
        }
    }

    /// Format as Prometheus exposition format
    pub fn prometheus_format(&self) -> String {
        let s = self.snapshot();
        let counters = [
            ("events_succeeded", "Events delivered to handlers by watchers", s.events_succeeded),
            ("events_dropped", "Events dropped because the object could not be extracted", s.events_dropped),
            ("events_revision_skipped", "Events affected by revision filtering", s.events_revision_skipped),
            ("updates_suppressed", "Update callbacks suppressed as resync duplicates", s.updates_suppressed),
            ("informer_failures", "Watchers whose informer could not be constructed", s.informer_failures),
            ("reloads_completed", "Filesystem reloads that walked the whole tree", s.reloads_completed),
            ("reloads_failed", "Filesystem reloads aborted by a walk or read error", s.reloads_failed),
            ("files_applied", "Files applied to the in-memory store", s.files_applied),
            ("files_failed", "Files whose content could not be applied", s.files_failed),
            ("files_removed", "Files retracted because they disappeared", s.files_removed),
        ];

        let mut out = String::new();
        for (name, help, value) in counters {
            out.push_str(&format!(
                "# HELP meshcfg_source_{name}_total {help}\n\
                 # TYPE meshcfg_source_{name}_total counter\n\
                 meshcfg_source_{name}_total {value}\n\n"
            ));
        }
        out
    }
}

/// Immutable snapshot of metrics for reading
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceMetricsSnapshot {
    pub events_succeeded: u64,
    pub events_dropped: u64,
    pub events_revision_skipped: u64,
    pub updates_suppressed: u64,
    pub informer_failures: u64,
    pub reloads_completed: u64,
    pub reloads_failed: u64,
    pub files_applied: u64,
    pub files_failed: u64,
    pub files_removed: u64,
}

impl SourceMetricsSnapshot {
    /// Format as human-readable summary
    pub fn summary(&self) -> String {
        format!(
            "Events: {} delivered, {} dropped, {} revision-skipped, {} suppressed | \
             Reloads: {} ok, {} failed | Files: {} applied, {} failed, {} removed",
            self.events_succeeded,
            self.events_dropped,
            self.events_revision_skipped,
            self.updates_suppressed,
            self.reloads_completed,
            self.reloads_failed,
            self.files_applied,
            self.files_failed,
            self.files_removed,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_increment() {
        let metrics = SourceMetrics::new();
        metrics.inc_events_succeeded();
        metrics.inc_events_succeeded();
        metrics.inc_events_dropped();
        metrics.record_reload_files(3, 1, 2);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.events_succeeded, 2);
        assert_eq!(snapshot.events_dropped, 1);
        assert_eq!(snapshot.files_applied, 3);
        assert_eq!(snapshot.files_removed, 2);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = SourceMetrics::new();
        metrics.inc_informer_failures();
        let output = metrics.prometheus_format();
        assert!(output.contains("meshcfg_source_informer_failures_total 1"));
        assert!(output.contains("# TYPE meshcfg_source_reloads_failed_total counter"));
    }
}
