//! Filter plugin capability interface
//!
//! The pipeline only ever talks to a plugin through [`FilterPlugin`]; how the
//! plugin got into the process (in-process registry, FFI shim, ...) is the
//! [`PluginLoader`]'s business.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{ConfigCategory, ContractError, PipelineError, PluginError, ReadingSet};

/// Forwarding entry point handed to a plugin at init.
///
/// Calling it pushes a reading set into the next stage (or the terminal
/// sink) synchronously and reports that stage's failure.
pub type OutputStream = Arc<dyn Fn(ReadingSet) -> Result<(), PipelineError> + Send + Sync>;

/// Plugin category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginType {
    Filter,
    South,
    North,
}

impl fmt::Display for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Filter => "filter",
            Self::South => "south",
            Self::North => "north",
        };
        f.write_str(s)
    }
}

/// Static description a plugin reports about itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
    pub plugin_type: PluginType,

    /// Plugin keeps state across restarts via `start` / `shutdown_save_data`
    #[serde(default)]
    pub persist_data: bool,

    /// Default configuration, item map JSON
    pub default_config: String,
}

impl PluginInfo {
    /// Default configuration as a category named `category_name`
    pub fn default_category(&self, category_name: &str) -> Result<ConfigCategory, ContractError> {
        let mut category = ConfigCategory::from_json(category_name, &self.default_config)?;
        category.description = format!("{} filter configuration", self.name);
        Ok(category)
    }
}

/// Transformation plugin wrapped by a filter stage
pub trait FilterPlugin: Send {
    fn info(&self) -> &PluginInfo;

    /// Bind configuration and the forwarding entry point
    fn init(&mut self, config: &ConfigCategory, output: OutputStream) -> Result<(), PluginError>;

    /// Hand previously persisted state to the plugin; only called when
    /// `info().persist_data` is set
    fn start(&mut self, _state: &str) -> Result<(), PluginError> {
        Ok(())
    }

    fn ingest(&mut self, set: ReadingSet) -> Result<(), PluginError>;

    /// Apply a changed configuration. On error the plugin must keep its
    /// previous configuration.
    fn reconfigure(&mut self, config: &ConfigCategory) -> Result<(), PluginError>;

    fn shutdown(&mut self);

    /// Shut down and return the state to persist
    fn shutdown_save_data(&mut self) -> String {
        self.shutdown();
        String::new()
    }
}

/// Resolves plugin names to plugin instances
pub trait PluginLoader: Send + Sync {
    /// # Errors
    /// `PluginNotFound` or `PluginTypeMismatch`
    fn load_plugin(
        &self,
        name: &str,
        plugin_type: PluginType,
    ) -> Result<Box<dyn FilterPlugin>, ContractError>;
}
