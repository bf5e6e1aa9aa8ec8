//! Management and storage collaborators consumed by the pipeline

use crate::{ConfigCategory, ContractError};

/// Configuration category service
pub trait ManagementClient: Send + Sync {
    /// Create `category`, or update it if it already exists.
    ///
    /// With `keep_original` the stored values survive and only new items and
    /// item metadata are taken from `category`. Returns the stored result.
    fn create_category(
        &self,
        category: &ConfigCategory,
        keep_original: bool,
    ) -> Result<ConfigCategory, ContractError>;

    /// # Errors
    /// `CategoryNotFound` when no category of that name exists
    fn get_category(&self, name: &str) -> Result<ConfigCategory, ContractError>;

    fn add_child_categories(&self, parent: &str, children: &[String]) -> Result<(), ContractError>;

    /// Ask for change notifications on `category`
    fn register_interest(&self, category: &str) -> Result<(), ContractError>;

    fn unregister_interest(&self, category: &str) -> Result<(), ContractError>;
}

/// Keyed store for plugin state strings
pub trait PluginDataStore: Send + Sync {
    /// `Ok(None)` when nothing was stored under `key`
    fn load_data(&self, key: &str) -> Result<Option<String>, ContractError>;

    fn persist_data(&self, key: &str, data: &str) -> Result<(), ContractError>;
}
