//! SinkHandle - a terminal sink with its counters
//!
//! The pipeline only sees `Arc<dyn ReadingSink>`; the handle keeps the
//! [`SinkMetrics`] reachable for the caller that created it.

use std::sync::Arc;

use contracts::{ContractError, ReadingSet, ReadingSink};
use tracing::warn;

use crate::metrics::{MetricsSnapshot, SinkMetrics};

pub struct SinkHandle {
    inner: Box<dyn ReadingSink>,
    metrics: Arc<SinkMetrics>,
}

impl SinkHandle {
    pub fn new(sink: impl ReadingSink + 'static) -> Self {
        Self {
            inner: Box::new(sink),
            metrics: Arc::new(SinkMetrics::new()),
        }
    }

    pub fn metrics(&self) -> Arc<SinkMetrics> {
        self.metrics.clone()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

impl ReadingSink for SinkHandle {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn write(&self, set: ReadingSet) -> Result<(), ContractError> {
        let readings = set.count();
        match self.inner.write(set) {
            Ok(()) => {
                self.metrics.inc_write_count(readings);
                Ok(())
            }
            Err(e) => {
                self.metrics.inc_failure_count();
                warn!(sink = %self.inner.name(), error = %e, "sink write failed");
                Err(e)
            }
        }
    }

    fn flush(&self) -> Result<(), ContractError> {
        self.metrics.inc_flush_count();
        self.inner.flush()
    }
}
