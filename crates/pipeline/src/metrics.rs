//! Branch metrics for observability

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Lock-free counters of one branch
#[derive(Debug, Default)]
pub struct BranchMetrics {
    /// Current queue length
    queue_len: AtomicUsize,
    /// Copies accepted into the queue
    enqueued: AtomicU64,
    /// Copies lost to a full or closed queue
    dropped: AtomicU64,
    /// Copies the worker pushed through the sub-pipeline
    delivered: AtomicU64,
    /// Copies the sub-pipeline rejected
    failed: AtomicU64,
}

impl BranchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    pub fn set_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
    }

    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    pub fn inc_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn inc_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn inc_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn inc_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> BranchMetricsSnapshot {
        BranchMetricsSnapshot {
            queue_len: self.queue_len(),
            enqueued: self.enqueued(),
            dropped: self.dropped(),
            delivered: self.delivered(),
            failed: self.failed(),
        }
    }
}

/// Snapshot of branch metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BranchMetricsSnapshot {
    pub queue_len: usize,
    pub enqueued: u64,
    pub dropped: u64,
    pub delivered: u64,
    pub failed: u64,
}
