//! Layered error definitions
//!
//! - `ContractError`: collaborator failures (config / plugin loader / management / storage / sink)
//! - `PipelineError`: the pipeline engine taxonomy, split into build-time and run-time failures
//! - `PluginError`: what a filter plugin reports back to the stage wrapping it

use thiserror::Error;

/// Collaborator-level error
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Plugin Loader Errors =====
    /// No plugin registered under that name
    #[error("plugin '{name}' not found")]
    PluginNotFound { name: String },

    /// Plugin exists but is not of the requested type
    #[error("plugin '{name}' is a {found} plugin, expected {expected}")]
    PluginTypeMismatch {
        name: String,
        expected: String,
        found: String,
    },

    // ===== Management / Storage Errors =====
    /// Configuration category not found
    #[error("configuration category '{name}' not found")]
    CategoryNotFound { name: String },

    /// Management client error
    #[error("management error: {message}")]
    Management { message: String },

    /// Plugin data storage error
    #[error("storage error for key '{key}': {message}")]
    Storage { key: String, message: String },

    // ===== Sink Errors =====
    /// Sink write error
    #[error("sink '{sink_name}' write error: {message}")]
    SinkWrite { sink_name: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create plugin not found error
    pub fn plugin_not_found(name: impl Into<String>) -> Self {
        Self::PluginNotFound { name: name.into() }
    }

    /// Create management error
    pub fn management(message: impl Into<String>) -> Self {
        Self::Management {
            message: message.into(),
        }
    }

    /// Create storage error
    pub fn storage(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Storage {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create sink write error
    pub fn sink_write(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkWrite {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }
}

/// Pipeline engine error
#[derive(Debug, Error)]
pub enum PipelineError {
    // ===== Build-time =====
    /// Plugin module or entry points could not be resolved
    #[error("failed to load plugin '{plugin}': {source}")]
    PluginLoadFailed {
        plugin: String,
        #[source]
        source: ContractError,
    },

    /// Category creation / registration failed
    #[error("setup of '{element}' failed: {message}")]
    SetupFailed { element: String, message: String },

    /// Plugin initializer rejected the configuration
    #[error("init of '{element}' failed: {message}")]
    InitFailed { element: String, message: String },

    /// A configured stage could not be loaded; aborts the whole pipeline load
    #[error("failed to load filter '{filter}': {source}")]
    FilterLoadFailed {
        filter: String,
        #[source]
        source: Box<PipelineError>,
    },

    // ===== Run-time =====
    /// The wrapped plugin failed while ingesting
    #[error("filter '{filter}' failed to ingest: {message}")]
    PluginIngestFailed { filter: String, message: String },

    /// The terminal sink refused the reading set
    #[error("sink '{sink}' write failed: {message}")]
    SinkWriteFailed { sink: String, message: String },

    /// Ingest into an element that has not completed init
    #[error("element '{element}' is not initialized")]
    NotInitialized { element: String },

    /// Live configuration change rejected; element keeps its previous configuration
    #[error("reconfigure of '{element}' failed: {message}")]
    ReconfigureFailed { element: String, message: String },
}

impl PipelineError {
    pub fn setup_failed(element: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SetupFailed {
            element: element.into(),
            message: message.into(),
        }
    }

    pub fn init_failed(element: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InitFailed {
            element: element.into(),
            message: message.into(),
        }
    }

    pub fn reconfigure_failed(element: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ReconfigureFailed {
            element: element.into(),
            message: message.into(),
        }
    }

    pub fn filter_load_failed(filter: impl Into<String>, source: PipelineError) -> Self {
        Self::FilterLoadFailed {
            filter: filter.into(),
            source: Box::new(source),
        }
    }

    /// Failures that abort pipeline construction
    pub fn is_build_failure(&self) -> bool {
        matches!(
            self,
            Self::PluginLoadFailed { .. }
                | Self::SetupFailed { .. }
                | Self::InitFailed { .. }
                | Self::FilterLoadFailed { .. }
        )
    }

    /// Failures scoped to a single reading set; the caller decides on retry
    pub fn is_runtime_failure(&self) -> bool {
        matches!(
            self,
            Self::PluginIngestFailed { .. } | Self::SinkWriteFailed { .. } | Self::NotInitialized { .. }
        )
    }
}

/// Error reported by a filter plugin
#[derive(Debug, Error)]
pub enum PluginError {
    /// Configuration rejected by the plugin
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Plugin-internal failure
    #[error("{0}")]
    Failed(String),

    /// Failure raised further down the chain while the plugin was forwarding
    #[error(transparent)]
    Downstream(#[from] PipelineError),
}

impl PluginError {
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}
