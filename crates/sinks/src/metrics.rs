//! Sink metrics for observability

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters of a single sink
#[derive(Debug, Default)]
pub struct SinkMetrics {
    /// Sets accepted
    write_count: AtomicU64,
    /// Readings inside accepted sets
    reading_count: AtomicU64,
    /// Rejected writes
    failure_count: AtomicU64,
    flush_count: AtomicU64,
}

impl SinkMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_count(&self) -> u64 {
        self.write_count.load(Ordering::Relaxed)
    }

    /// Account an accepted set of `readings` readings
    pub fn inc_write_count(&self, readings: usize) {
        self.write_count.fetch_add(1, Ordering::Relaxed);
        self.reading_count
            .fetch_add(readings as u64, Ordering::Relaxed);
    }

    pub fn reading_count(&self) -> u64 {
        self.reading_count.load(Ordering::Relaxed)
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    pub fn inc_failure_count(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn flush_count(&self) -> u64 {
        self.flush_count.load(Ordering::Relaxed)
    }

    pub fn inc_flush_count(&self) {
        self.flush_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            write_count: self.write_count(),
            reading_count: self.reading_count(),
            failure_count: self.failure_count(),
            flush_count: self.flush_count(),
        }
    }
}

/// Snapshot of sink metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub write_count: u64,
    pub reading_count: u64,
    pub failure_count: u64,
    pub flush_count: u64,
}
