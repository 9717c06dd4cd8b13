//! Sink server counters.
//!
//! Same shape as the source counters: process-wide atomics with a snapshot
//! and Prometheus text rendering.

use std::sync::atomic::{AtomicU64, Ordering};

pub static SINK_METRICS: SinkMetrics = SinkMetrics::new();

pub struct SinkMetrics {
    // Admission
    pub connections_accepted: AtomicU64,
    pub accept_errors: AtomicU64,
    pub streams_accepted: AtomicU64,
    pub streams_rate_limited: AtomicU64,
    pub streams_unauthenticated: AtomicU64,
    pub streams_failed: AtomicU64,

    // Stream traffic
    pub requests_acked: AtomicU64,
    pub requests_nacked: AtomicU64,
    pub changes_applied: AtomicU64,
}

impl Default for SinkMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SinkMetrics {
    pub const fn new() -> Self {
        Self {
            connections_accepted: AtomicU64::new(0),
            accept_errors: AtomicU64::new(0),
            streams_accepted: AtomicU64::new(0),
            streams_rate_limited: AtomicU64::new(0),
            streams_unauthenticated: AtomicU64::new(0),
            streams_failed: AtomicU64::new(0),
            requests_acked: AtomicU64::new(0),
            requests_nacked: AtomicU64::new(0),
            changes_applied: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn inc_connections_accepted(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_accept_errors(&self) {
        self.accept_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_streams_accepted(&self) {
        self.streams_accepted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_streams_rate_limited(&self) {
        self.streams_rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_streams_unauthenticated(&self) {
        self.streams_unauthenticated.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_streams_failed(&self) {
        self.streams_failed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_requests_acked(&self) {
        self.requests_acked.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_requests_nacked(&self) {
        self.requests_nacked.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_changes_applied(&self) {
        self.changes_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SinkMetricsSnapshot {
        SinkMetricsSnapshot {
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            accept_errors: self.accept_errors.load(Ordering::Relaxed),
            streams_accepted: self.streams_accepted.load(Ordering::Relaxed),
            streams_rate_limited: self.streams_rate_limited.load(Ordering::Relaxed),
            streams_unauthenticated: self.streams_unauthenticated.load(Ordering::Relaxed),
            streams_failed: self.streams_failed.load(Ordering::Relaxed),
            requests_acked: self.requests_acked.load(Ordering::Relaxed),
            requests_nacked: self.requests_nacked.load(Ordering::Relaxed),
            changes_applied: self.changes_applied.load(Ordering::Relaxed),
        }
    }

    /// Format as Prometheus exposition format
    pub fn prometheus_format(&self) -> String {
        let s = self.snapshot();
        let counters = [
            ("connections_accepted", "TCP connections accepted", s.connections_accepted),
            ("accept_errors", "Failed accept calls on the listener", s.accept_errors),
            ("streams_accepted", "Streams admitted to the sink", s.streams_accepted),
            ("streams_rate_limited", "Streams rejected while waiting for admission", s.streams_rate_limited),
            ("streams_unauthenticated", "Streams rejected by the auth checker", s.streams_unauthenticated),
            ("streams_failed", "Streams that ended with an error", s.streams_failed),
            ("requests_acked", "Pushes acknowledged", s.requests_acked),
            ("requests_nacked", "Pushes rejected", s.requests_nacked),
            ("changes_applied", "Changes applied by the event updater", s.changes_applied),
        ];

        let mut out = String::new();
        for (name, help, value) in counters {
            out.push_str(&format!(
                "# HELP meshcfg_sink_{name}_total {help}\n\
                 # TYPE meshcfg_sink_{name}_total counter\n\
                 meshcfg_sink_{name}_total {value}\n\n"
            ));
        }
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkMetricsSnapshot {
    pub connections_accepted: u64,
    pub accept_errors: u64,
    pub streams_accepted: u64,
    pub streams_rate_limited: u64,
    pub streams_unauthenticated: u64,
    pub streams_failed: u64,
    pub requests_acked: u64,
    pub requests_nacked: u64,
    pub changes_applied: u64,
}

impl SinkMetricsSnapshot {
    pub fn summary(&self) -> String {
        format!(
            "Streams: {} accepted, {} rate-limited, {} unauthenticated, {} failed | \
             Pushes: {} acked, {} nacked",
            self.streams_accepted,
            self.streams_rate_limited,
            self.streams_unauthenticated,
            self.streams_failed,
            self.requests_acked,
            self.requests_nacked,
        )
    }
}
