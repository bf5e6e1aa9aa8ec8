//! Pipeline orchestrator - coordinates all components.
//!
//! Seeds the in-memory management platform from the blueprint, builds the
//! filter pipeline over the built-in plugin registry, then feeds it batches
//! from the synthetic source until a limit, the timeout or the shutdown
//! signal ends the run.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use contracts::{ContractError, ReadingSet, ReadingSink, ServiceBlueprint};
use observability::{record_ingest_latency_ms, record_pipeline_error};
use pipeline::{
    FetchMode, FilterPipeline, InMemoryManagementClient, InMemoryPluginStore, PipelineContext,
    PipelineDebugger, PluginRegistry,
};
use tracing::{debug, info, warn};

use super::{PipelineStats, SyntheticSource};
use crate::error::CliError;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// The service configuration
    pub blueprint: ServiceBlueprint,

    /// Maximum number of batches to ingest (None = unlimited)
    pub max_batches: Option<u64>,

    /// Run timeout (None = no timeout)
    pub timeout: Option<Duration>,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,

    /// Debugger buffer size overriding `[debugger]`
    pub debug_buffer: Option<usize>,
}

impl PipelineConfig {
    /// Debugger buffer to attach at startup, if any
    fn debugger_size(&self) -> Option<usize> {
        let configured = &self.blueprint.debugger;
        self.debug_buffer
            .or(configured.enabled.then_some(configured.buffer_size))
    }
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run until the batch limit, the timeout or `shutdown` resolves
    pub async fn run<F>(self, shutdown: F) -> Result<PipelineStats>
    where
        F: Future<Output = ()>,
    {
        let start_time = Instant::now();
        let blueprint = &self.config.blueprint;
        let service = blueprint.service.name.as_str();
        let period = blueprint.source.period().ok_or_else(|| {
            CliError::Config(ContractError::config_validation(
                "source.frequency_hz",
                format!("unusable frequency {}", blueprint.source.frequency_hz),
            ))
        })?;

        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)
                .map_err(|e| CliError::metrics(port, e.to_string()))?;
            info!("Metrics endpoint available on port {}", port);
        }

        let management = Arc::new(seed_management(blueprint));
        let storage = Arc::new(InMemoryPluginStore::new());
        let context = PipelineContext::new(service, management.clone(), storage.clone());

        let tap = Arc::new(PipelineDebugger::new());
        let mut registry = PluginRegistry::new();
        filters::register_builtin(&mut registry, tap.clone());
        debug!(plugins = ?registry.names(), "plugin registry ready");

        let sink = sinks::create_sink(&blueprint.sink)?;

        let mut filter_pipeline =
            FilterPipeline::new(context).with_branch_config(blueprint.branch.clone());
        filter_pipeline
            .build(service, &registry, sink.clone())
            .map_err(|e| CliError::pipeline_build(service, e))?;

        if let Some(size) = self.config.debugger_size() {
            filter_pipeline
                .debugger()
                .attach_with(size, blueprint.debugger.granularity);
        }

        info!(
            service,
            elements = filter_pipeline.elements().len(),
            categories = ?filter_pipeline.category_names(),
            sink = %blueprint.sink.name,
            "Pipeline built"
        );

        let mut stats = PipelineStats {
            elements: filter_pipeline.elements().len(),
            ..Default::default()
        };
        let mut source = SyntheticSource::new(blueprint.source.clone());
        let mut ticker = tokio::time::interval(period);

        let timeout = tokio::time::sleep(self.config.timeout.unwrap_or_default());
        tokio::pin!(timeout);
        tokio::pin!(shutdown);

        info!(
            max_batches = ?self.config.max_batches,
            frequency_hz = blueprint.source.frequency_hz,
            "Pipeline running"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                _ = &mut timeout, if self.config.timeout.is_some() => {
                    warn!(batches = stats.batches, "Run timed out");
                    break;
                }
                _ = ticker.tick() => {
                    ingest_batch(&filter_pipeline, source.next_batch(), &mut stats);

                    if self
                        .config
                        .max_batches
                        .is_some_and(|max| stats.batches >= max)
                    {
                        info!(batches = stats.batches, "Reached max batches limit");
                        break;
                    }
                }
            }
        }

        info!("Shutting down pipeline...");
        stats.branches = filter_pipeline.branch_metrics();
        stats.debug_snapshots = dump_debugger(&filter_pipeline.debugger());
        filter_pipeline.cleanup_filters(service);

        if let Err(e) = sink.flush() {
            warn!(sink = %blueprint.sink.name, error = %e, "Final sink flush failed");
        }
        stats.sink = sink.snapshot();
        stats.persisted_keys = storage.keys();
        stats.duration = start_time.elapsed();

        info!(
            duration_secs = stats.duration.as_secs_f64(),
            batches_per_sec = format!("{:.2}", stats.throughput()),
            produced = source.produced(),
            "Pipeline shutdown complete"
        );

        Ok(stats)
    }
}

/// Categories the loader reads: the service definition and one per filter
fn seed_management(blueprint: &ServiceBlueprint) -> InMemoryManagementClient {
    let management = InMemoryManagementClient::new();
    management.insert_category(blueprint.service_category());
    for filter in &blueprint.filters {
        management.insert_category(blueprint.filter_category(filter));
    }
    debug!(categories = ?management.category_names(), "management categories seeded");
    management
}

fn ingest_batch(filter_pipeline: &FilterPipeline, set: ReadingSet, stats: &mut PipelineStats) {
    let readings = set.count();
    let debugger = filter_pipeline.debugger();
    let held = debugger.is_suspended() && debugger.step_credits() == 0;

    let started = Instant::now();
    let result = filter_pipeline.ingest(set);
    let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

    stats.batches += 1;
    if held {
        stats.held += 1;
    }

    match result {
        Ok(()) => {
            record_ingest_latency_ms(filter_pipeline.service_name(), latency_ms);
            stats.aggregator.record_success(readings, latency_ms);
        }
        Err(e) => {
            warn!(readings, error = %e, "Batch rejected by pipeline");
            record_pipeline_error(filter_pipeline.service_name(), &e);
            stats.aggregator.record_failure(readings, &e);
        }
    }
}

/// Log what the debugger still holds; returns the entry count
fn dump_debugger(debugger: &PipelineDebugger) -> usize {
    if !debugger.is_attached() {
        return 0;
    }
    let snapshots = debugger.fetch(FetchMode::All);
    for (idx, snapshot) in snapshots.iter().enumerate() {
        let assets: Vec<&str> = snapshot
            .readings()
            .iter()
            .map(|r| r.asset_name())
            .collect();
        debug!(idx, readings = snapshot.reading_count(), ?assets, "debugger entry");
    }
    info!(
        entries = snapshots.len(),
        captured = debugger.captured(),
        "Debugger buffer"
    );
    snapshots.len()
}
