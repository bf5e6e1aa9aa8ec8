//! Pipeline statistics and metrics.

use std::time::Duration;

use observability::PipelineStatsAggregator;
use pipeline::BranchMetricsSnapshot;
use sinks::MetricsSnapshot;

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Batches handed to the pipeline
    pub batches: u64,

    /// Batches held by a suspended debugger
    pub held: u64,

    /// Total duration of the run
    pub duration: Duration,

    /// Top-level pipeline elements
    pub elements: usize,

    /// Per-set ingest accounting
    pub aggregator: PipelineStatsAggregator,

    /// Terminal sink counters at shutdown
    pub sink: MetricsSnapshot,

    /// Branch queue counters at shutdown, by branch name
    pub branches: Vec<(String, BranchMetricsSnapshot)>,

    /// Entries left in the debugger buffer
    pub debug_snapshots: usize,

    /// Plugin state keys persisted on shutdown
    pub persisted_keys: Vec<String>,
}

impl PipelineStats {
    /// Batches per second
    pub fn throughput(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.batches as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    pub fn print_summary(&self) {
        println!();
        print!("{}", self.aggregator.summary());

        println!("\nRun");
        println!("  Duration: {:.2}s", self.duration.as_secs_f64());
        println!("  Batches: {} ({:.2}/s)", self.batches, self.throughput());
        println!("  Held by debugger: {}", self.held);
        println!("  Pipeline elements: {}", self.elements);

        println!("\nSink");
        println!("  Writes: {}", self.sink.write_count);
        println!("  Readings: {}", self.sink.reading_count);
        println!("  Failures: {}", self.sink.failure_count);

        if !self.branches.is_empty() {
            println!("\nBranches");
            for (name, m) in &self.branches {
                println!(
                    "  {}: enqueued={} delivered={} dropped={} failed={}",
                    name, m.enqueued, m.delivered, m.dropped, m.failed
                );
            }
        }

        if self.debug_snapshots > 0 {
            println!("\nDebugger buffer: {} entries", self.debug_snapshots);
        }

        if !self.persisted_keys.is_empty() {
            println!("\nPersisted plugin state: {}", self.persisted_keys.join(", "));
        }

        println!();
    }
}
