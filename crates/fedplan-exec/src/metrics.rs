//! Metrics/tracing hooks.
//!
//! Counters are plain atomics; wire them to a telemetry backend in the binary
//! layer if needed.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct ExecMetrics {
    pages_fetched: AtomicU64,
    truncated_leaves: AtomicU64,
    leaf_errors: AtomicU64,
    shared_nodes: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub pages_fetched: u64,
    pub truncated_leaves: u64,
    pub leaf_errors: u64,
    pub shared_nodes: u64,
}

impl ExecMetrics {
    pub fn page_fetched(&self) {
        self.pages_fetched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn leaf_truncated(&self) {
        self.truncated_leaves.fetch_add(1, Ordering::Relaxed);
    }

    pub fn leaf_failed(&self) {
        self.leaf_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn shared_node(&self) {
        self.shared_nodes.fetch_add(1, Ordering::Relaxed);
    }

    /// Fold the counters of a finished run into these.
    pub fn absorb(&self, run: MetricsSnapshot) {
        self.pages_fetched.fetch_add(run.pages_fetched, Ordering::Relaxed);
        self.truncated_leaves.fetch_add(run.truncated_leaves, Ordering::Relaxed);
        self.leaf_errors.fetch_add(run.leaf_errors, Ordering::Relaxed);
        self.shared_nodes.fetch_add(run.shared_nodes, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            pages_fetched: self.pages_fetched.load(Ordering::Relaxed),
            truncated_leaves: self.truncated_leaves.load(Ordering::Relaxed),
            leaf_errors: self.leaf_errors.load(Ordering::Relaxed),
            shared_nodes: self.shared_nodes.load(Ordering::Relaxed),
        }
    }
}

pub fn emit_span(event: &str, key_values: &[(&str, String)]) {
    let span = tracing::span!(tracing::Level::TRACE, "fedplan", event);
    let _guard = span.enter();
    for (k, v) in key_values {
        tracing::trace!(%event, %k, %v, "metric");
    }
}
