//! In-process plugin registry

use std::collections::BTreeMap;
use std::fmt;

use contracts::{ContractError, FilterPlugin, PluginInfo, PluginLoader, PluginType};
use tracing::debug;

type PluginFactory = Box<dyn Fn() -> Box<dyn FilterPlugin> + Send + Sync>;

/// Name -> factory table; each load creates a fresh plugin instance
#[derive(Default)]
pub struct PluginRegistry {
    factories: BTreeMap<String, (PluginType, PluginFactory)>,
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.names())
            .finish()
    }
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a plugin factory
    pub fn register<F>(&mut self, name: impl Into<String>, plugin_type: PluginType, factory: F)
    where
        F: Fn() -> Box<dyn FilterPlugin> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(plugin = %name, %plugin_type, "plugin registered");
        self.factories
            .insert(name, (plugin_type, Box::new(factory)));
    }

    pub fn register_filter<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn FilterPlugin> + Send + Sync + 'static,
    {
        self.register(name, PluginType::Filter, factory);
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Info of every registered plugin, by name
    pub fn describe(&self) -> Vec<PluginInfo> {
        self.factories
            .values()
            .map(|(_, factory)| factory().info().clone())
            .collect()
    }
}

impl PluginLoader for PluginRegistry {
    fn load_plugin(
        &self,
        name: &str,
        plugin_type: PluginType,
    ) -> Result<Box<dyn FilterPlugin>, ContractError> {
        let (registered, factory) = self
            .factories
            .get(name)
            .ok_or_else(|| ContractError::plugin_not_found(name))?;
        if *registered != plugin_type {
            return Err(ContractError::PluginTypeMismatch {
                name: name.to_string(),
                expected: plugin_type.to_string(),
                found: registered.to_string(),
            });
        }
        Ok(factory())
    }
}
