//! # Observability
//!
//! Tracing subscriber setup and the Prometheus metrics exporter.
//!
//! ## Features
//!
//! - Tracing initialisation (JSON/Pretty/Compact)
//! - Prometheus metrics export
//! - Pipeline metric recorders and run statistics
//!
//! ## Example
//!
//! ```ignore
//! use observability::{init_with_config, metrics, ObservabilityConfig};
//!
//! init_with_config(ObservabilityConfig::from_verbosity(1, false))?;
//!
//! metrics::record_readings_ingested("sensors", set.count());
//! ```

pub mod metrics;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

// Re-exports
pub use crate::metrics::{
    error_kind, record_branch_dropped, record_branch_enqueued, record_branch_queue_depth,
    record_debugger_capture, record_filter_failure, record_ingest_latency_ms,
    record_pipeline_error, record_readings_ingested, record_sink_write, MetricsSummary,
    PipelineStatsAggregator, RunningStats, StatsSummary,
};

/// Logging and exporter settings of one process
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub log_format: LogFormat,
    /// Filter directive used when `RUST_LOG` is absent or ignored
    pub log_level: String,
    /// Let `RUST_LOG` override `log_level`
    pub env_override: bool,
    /// Prometheus port (`None` leaves the exporter to the caller)
    pub metrics_port: Option<u16>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::default(),
            log_level: "info".to_string(),
            env_override: true,
            metrics_port: None,
        }
    }
}

impl ObservabilityConfig {
    /// Level from `-v` count; `quiet` pins `warn` and ignores `RUST_LOG`
    pub fn from_verbosity(verbose: u8, quiet: bool) -> Self {
        let (log_level, env_override) = match (quiet, verbose) {
            (true, _) => ("warn", false),
            (false, 0) => ("info", true),
            (false, 1) => ("debug", true),
            (false, _) => ("trace", true),
        };
        Self {
            log_level: log_level.to_string(),
            env_override,
            ..Self::default()
        }
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }

    fn env_filter(&self) -> EnvFilter {
        if self.env_override {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.log_level))
        } else {
            EnvFilter::new(&self.log_level)
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Structured JSON
    Json,
    /// Multi-line, human readable
    #[default]
    Pretty,
    /// Single line
    Compact,
}

impl LogFormat {
    fn layer(self) -> Box<dyn Layer<Registry> + Send + Sync> {
        match self {
            LogFormat::Json => fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_file(true)
                .with_line_number(true)
                .boxed(),
            LogFormat::Pretty => fmt::layer().pretty().boxed(),
            LogFormat::Compact => fmt::layer().compact().boxed(),
        }
    }
}

/// Install the global subscriber and, when a port is set, the exporter
pub fn init_with_config(config: ObservabilityConfig) -> Result<()> {
    tracing_subscriber::registry()
        .with(config.log_format.layer())
        .with(config.env_filter())
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    if let Some(port) = config.metrics_port {
        init_metrics_only(port)?;
    }

    tracing::debug!(
        log_format = ?config.log_format,
        log_level = %config.log_level,
        metrics_port = ?config.metrics_port,
        "Observability initialized"
    );
    Ok(())
}

/// Install only the Prometheus exporter, for callers that own the subscriber
pub fn init_metrics_only(port: u16) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus recorder")?;

    tracing::info!(port = port, "Prometheus metrics endpoint initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.metrics_port, None);
        assert_eq!(config.log_level, "info");
        assert!(config.env_override);
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(ObservabilityConfig::from_verbosity(0, false).log_level, "info");
        assert_eq!(ObservabilityConfig::from_verbosity(1, false).log_level, "debug");
        assert_eq!(ObservabilityConfig::from_verbosity(3, false).log_level, "trace");

        let quiet = ObservabilityConfig::from_verbosity(2, true);
        assert_eq!(quiet.log_level, "warn");
        assert!(!quiet.env_override);

        let json = quiet.with_format(LogFormat::Json);
        assert_eq!(json.log_format, LogFormat::Json);
    }
}
