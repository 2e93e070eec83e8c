//! Counters for queue observability.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct QueueMetrics {
    /// Jobs accepted as new.
    pub enqueued: AtomicU64,
    /// Submissions absorbed by an outstanding job with the same id.
    pub duplicates: AtomicU64,
    /// Deliveries handed to consumers.
    pub delivered: AtomicU64,
    pub completed: AtomicU64,
    /// Failed attempts rescheduled with backoff.
    pub retried: AtomicU64,
    /// Jobs that exhausted their attempts.
    pub failed: AtomicU64,
}

impl QueueMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_enqueue(&self, duplicate: bool) {
        if duplicate {
            self.duplicates.fetch_add(1, Ordering::Relaxed);
        } else {
            self.enqueued.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_delivery(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_complete(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub enqueued: u64,
    pub duplicates: u64,
    pub delivered: u64,
    pub completed: u64,
    pub retried: u64,
    pub failed: u64,
}
