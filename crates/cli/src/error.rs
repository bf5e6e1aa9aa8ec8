//! Error types for CLI operations.

use contracts::{ContractError, PipelineError};
use sinks::SinkError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration could not be loaded or failed validation
    #[error("Invalid configuration: {0}")]
    Config(#[from] ContractError),

    /// Terminal sink could not be created
    #[error(transparent)]
    Sink(#[from] SinkError),

    /// Pipeline could not be built
    #[error("Failed to build pipeline for service '{service}': {source}")]
    PipelineBuild {
        service: String,
        #[source]
        source: PipelineError,
    },

    /// Metrics exporter could not be started
    #[error("Failed to start metrics exporter on port {port}: {message}")]
    Metrics { port: u16, message: String },
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn pipeline_build(service: impl Into<String>, source: PipelineError) -> Self {
        Self::PipelineBuild {
            service: service.into(),
            source,
        }
    }

    pub fn metrics(port: u16, message: impl Into<String>) -> Self {
        Self::Metrics {
            port,
            message: message.into(),
        }
    }
}

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
