//! `run` command implementation.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::session::{Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .map_err(CliError::from)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    info!(
        service = %blueprint.service.name,
        filters = blueprint.filters.len(),
        stages = blueprint.pipeline.len(),
        sink = %blueprint.sink.name,
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    let pipeline_config = PipelineConfig {
        blueprint,
        max_batches: (args.max_batches > 0).then_some(args.max_batches),
        timeout: (args.timeout > 0).then(|| Duration::from_secs(args.timeout)),
        metrics_port: (args.metrics_port > 0).then_some(args.metrics_port),
        debug_buffer: args.debug_buffer.filter(|size| *size > 0),
    };

    info!("Starting pipeline...");
    let stats = Pipeline::new(pipeline_config)
        .run(shutdown_signal())
        .await
        .context("Pipeline execution failed")?;

    info!(
        batches = stats.batches,
        failed = stats.aggregator.failed_sets,
        duration_secs = stats.duration.as_secs_f64(),
        "Pipeline completed"
    );
    stats.print_summary();

    info!("Edge pipeline finished");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &contracts::ServiceBlueprint) {
    println!("\n=== Configuration Summary ===\n");
    println!("Service: {}", blueprint.service.name);
    println!("Pipeline: {}", blueprint.pipeline_json());

    println!("\nFilters ({}):", blueprint.filters.len());
    for filter in &blueprint.filters {
        println!(
            "  - {} ({}) - {} configured items",
            filter.name,
            filter.plugin,
            filter.config.len()
        );
    }

    println!(
        "\nBranch queue: {} ({:?})",
        blueprint.branch.queue_capacity, blueprint.branch.drop_policy
    );
    if blueprint.debugger.enabled {
        println!(
            "Debugger: {} entries ({:?})",
            blueprint.debugger.buffer_size, blueprint.debugger.granularity
        );
    }
    println!(
        "Sink: {} ({:?})",
        blueprint.sink.name, blueprint.sink.sink_type
    );
    println!(
        "Source: {} @ {} Hz, {} readings/batch",
        blueprint.source.asset, blueprint.source.frequency_hz, blueprint.source.readings_per_batch
    );

    println!();
}
