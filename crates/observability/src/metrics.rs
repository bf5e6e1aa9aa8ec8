//! Pipeline metrics
//!
//! Recorders for the `metrics` facade (exported through Prometheus when
//! enabled) plus an in-memory aggregator for end-of-run summaries.

use std::collections::BTreeMap;

use contracts::PipelineError;
use metrics::{counter, gauge, histogram};

/// Readings pushed into a service's pipeline
pub fn record_readings_ingested(service: &str, readings: usize) {
    counter!("edge_pipeline_sets_ingested_total", "service" => service.to_string()).increment(1);
    counter!("edge_pipeline_readings_ingested_total", "service" => service.to_string())
        .increment(readings as u64);
}

/// Time one set spent in the primary chain
pub fn record_ingest_latency_ms(service: &str, latency_ms: f64) {
    histogram!("edge_pipeline_ingest_latency_ms", "service" => service.to_string())
        .record(latency_ms);
}

/// A filter plugin failed on a set
pub fn record_filter_failure(filter: &str) {
    counter!("edge_pipeline_filter_failures_total", "filter" => filter.to_string()).increment(1);
}

/// Pipeline-level error by kind
pub fn record_pipeline_error(service: &str, error: &PipelineError) {
    counter!(
        "edge_pipeline_errors_total",
        "service" => service.to_string(),
        "kind" => error_kind(error)
    )
    .increment(1);
}

pub fn record_branch_enqueued(branch: &str) {
    counter!("edge_pipeline_branch_enqueued_total", "branch" => branch.to_string()).increment(1);
}

pub fn record_branch_dropped(branch: &str) {
    counter!("edge_pipeline_branch_dropped_total", "branch" => branch.to_string()).increment(1);
}

pub fn record_branch_queue_depth(branch: &str, depth: usize) {
    gauge!("edge_pipeline_branch_queue_depth", "branch" => branch.to_string()).set(depth as f64);
}

/// Debugger tap captured a set of `readings` readings
pub fn record_debugger_capture(readings: usize) {
    counter!("edge_pipeline_debugger_captures_total").increment(1);
    histogram!("edge_pipeline_debugger_capture_readings").record(readings as f64);
}

/// Set handed to a terminal sink
pub fn record_sink_write(sink: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "edge_pipeline_sink_writes_total",
        "sink" => sink.to_string(),
        "status" => status
    )
    .increment(1);
}

/// Stable label for a [`PipelineError`] variant
pub fn error_kind(error: &PipelineError) -> &'static str {
    match error {
        PipelineError::PluginLoadFailed { .. } => "plugin_load_failed",
        PipelineError::SetupFailed { .. } => "setup_failed",
        PipelineError::InitFailed { .. } => "init_failed",
        PipelineError::FilterLoadFailed { .. } => "filter_load_failed",
        PipelineError::PluginIngestFailed { .. } => "plugin_ingest_failed",
        PipelineError::SinkWriteFailed { .. } => "sink_write_failed",
        PipelineError::NotInitialized { .. } => "not_initialized",
        PipelineError::ReconfigureFailed { .. } => "reconfigure_failed",
    }
}

/// In-memory run statistics of one pipeline
#[derive(Debug, Clone, Default)]
pub struct PipelineStatsAggregator {
    pub total_sets: u64,
    pub total_readings: u64,
    pub failed_sets: u64,

    /// Readings per set
    pub batch_stats: RunningStats,

    /// Primary-chain latency per set (ms)
    pub latency_stats: RunningStats,

    /// Failures by error kind
    pub error_counts: BTreeMap<String, u64>,
}

impl PipelineStatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account one set that went through the chain
    pub fn record_success(&mut self, readings: usize, latency_ms: f64) {
        self.total_sets += 1;
        self.total_readings += readings as u64;
        self.batch_stats.push(readings as f64);
        self.latency_stats.push(latency_ms);
    }

    /// Account one set the chain rejected
    pub fn record_failure(&mut self, readings: usize, error: &PipelineError) {
        self.total_sets += 1;
        self.total_readings += readings as u64;
        self.failed_sets += 1;
        self.batch_stats.push(readings as f64);
        *self
            .error_counts
            .entry(error_kind(error).to_string())
            .or_insert(0) += 1;
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_sets: self.total_sets,
            total_readings: self.total_readings,
            failed_sets: self.failed_sets,
            failure_rate: if self.total_sets > 0 {
                self.failed_sets as f64 / self.total_sets as f64 * 100.0
            } else {
                0.0
            },
            readings_per_set: StatsSummary::from(&self.batch_stats),
            latency_ms: StatsSummary::from(&self.latency_stats),
            error_counts: self.error_counts.clone(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Summary of a run
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_sets: u64,
    pub total_readings: u64,
    pub failed_sets: u64,
    pub failure_rate: f64,
    pub readings_per_set: StatsSummary,
    pub latency_ms: StatsSummary,
    pub error_counts: BTreeMap<String, u64>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Pipeline Summary ===")?;
        writeln!(f, "Reading sets: {}", self.total_sets)?;
        writeln!(f, "Readings: {}", self.total_readings)?;
        writeln!(
            f,
            "Failed sets: {} ({:.2}%)",
            self.failed_sets, self.failure_rate
        )?;
        writeln!(f, "Readings per set: {}", self.readings_per_set)?;
        writeln!(f, "Latency (ms): {}", self.latency_ms)?;

        if !self.error_counts.is_empty() {
            writeln!(f, "Errors:")?;
            for (kind, count) in &self.error_counts {
                writeln!(f, "  {}: {}", kind, count)?;
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online statistics (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
