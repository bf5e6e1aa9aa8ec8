//! # Edge Pipeline CLI
//!
//! Command-line entry point.
//!
//! Provides:
//! - service configuration loading and validation
//! - pipeline build, run and teardown around a synthetic reading source
//! - graceful shutdown on Ctrl-C / SIGTERM

mod cli;
mod commands;
mod error;
mod session;

use anyhow::Result;
use clap::Parser;
use observability::ObservabilityConfig;
use tracing::info;

use cli::{Cli, Commands};
use commands::{run_info, run_pipeline, run_validate};

#[tokio::main]
async fn main() -> Result<()> {
    // EDGE_PIPELINE_* defaults may come from .env
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_logging(&cli)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        command = cli.command.name(),
        "edge-pipeline starting"
    );

    let result = match &cli.command {
        Commands::Run(args) => run_pipeline(args).await,
        Commands::Validate(args) => run_validate(args),
        Commands::Info(args) => run_info(args),
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, command = cli.command.name(), "command failed");
    }
    result
}

fn init_logging(cli: &Cli) -> Result<()> {
    let config = ObservabilityConfig::from_verbosity(cli.verbose, cli.quiet)
        .with_format(cli.log_format.into());
    observability::init_with_config(config)
}
