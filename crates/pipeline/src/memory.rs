//! In-process management client and plugin data store
//!
//! Back the engine when it runs standalone (the CLI) and in tests. Change
//! notifications are not pushed; [`InMemoryManagementClient::update_item`]
//! returns the item map a registered listener would receive so the caller
//! can route it to `FilterPipeline::config_changed`.

use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use contracts::{ConfigCategory, ContractError, ManagementClient, PluginDataStore};
use tracing::{debug, trace};

#[derive(Debug, Default)]
struct ManagementState {
    categories: HashMap<String, ConfigCategory>,
    children: HashMap<String, BTreeSet<String>>,
    interest: HashMap<String, usize>,
}

#[derive(Debug, Default)]
pub struct InMemoryManagementClient {
    state: Mutex<ManagementState>,
}

impl InMemoryManagementClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ManagementState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `category` as is, replacing any previous version
    pub fn insert_category(&self, category: ConfigCategory) {
        self.state()
            .categories
            .insert(category.name.clone(), category);
    }

    pub fn category_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.state().categories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Child categories registered under `parent`, sorted
    pub fn children(&self, parent: &str) -> Vec<String> {
        self.state()
            .children
            .get(parent)
            .map(|c| c.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Outstanding interest registrations on `category`
    pub fn interest_count(&self, category: &str) -> usize {
        self.state().interest.get(category).copied().unwrap_or(0)
    }

    /// Set one item value.
    ///
    /// Returns the updated item map when someone registered interest in the
    /// category, `None` otherwise.
    pub fn update_item(
        &self,
        category: &str,
        item: &str,
        value: &str,
    ) -> Result<Option<String>, ContractError> {
        let mut state = self.state();
        let stored = state
            .categories
            .get_mut(category)
            .ok_or_else(|| ContractError::CategoryNotFound {
                name: category.to_string(),
            })?;
        stored.set_value(item, value);
        let json = stored.to_json()?;
        debug!(category, item, value, "category item updated");

        let interested = state.interest.get(category).copied().unwrap_or(0) > 0;
        Ok(interested.then_some(json))
    }
}

impl ManagementClient for InMemoryManagementClient {
    fn create_category(
        &self,
        category: &ConfigCategory,
        keep_original: bool,
    ) -> Result<ConfigCategory, ContractError> {
        let mut state = self.state();
        let stored = match state.categories.entry(category.name.clone()) {
            Entry::Occupied(mut entry) => {
                if keep_original {
                    entry.get_mut().merge_defaults(category);
                } else {
                    *entry.get_mut() = category.clone();
                }
                entry.get().clone()
            }
            Entry::Vacant(entry) => entry.insert(category.clone()).clone(),
        };
        trace!(category = %stored.name, keep_original, "category created");
        Ok(stored)
    }

    fn get_category(&self, name: &str) -> Result<ConfigCategory, ContractError> {
        self.state()
            .categories
            .get(name)
            .cloned()
            .ok_or_else(|| ContractError::CategoryNotFound {
                name: name.to_string(),
            })
    }

    fn add_child_categories(&self, parent: &str, children: &[String]) -> Result<(), ContractError> {
        self.state()
            .children
            .entry(parent.to_string())
            .or_default()
            .extend(children.iter().cloned());
        Ok(())
    }

    fn register_interest(&self, category: &str) -> Result<(), ContractError> {
        *self
            .state()
            .interest
            .entry(category.to_string())
            .or_insert(0) += 1;
        Ok(())
    }

    fn unregister_interest(&self, category: &str) -> Result<(), ContractError> {
        let mut state = self.state();
        match state.interest.get_mut(category) {
            Some(count) if *count > 0 => {
                *count -= 1;
                Ok(())
            }
            _ => Err(ContractError::management(format!(
                "no interest registered in '{category}'"
            ))),
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemoryPluginStore {
    data: Mutex<HashMap<String, String>>,
}

impl InMemoryPluginStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with `key` -> `data`
    pub fn with_data(self, key: impl Into<String>, data: impl Into<String>) -> Self {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), data.into());
        self
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self
            .data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

impl PluginDataStore for InMemoryPluginStore {
    fn load_data(&self, key: &str) -> Result<Option<String>, ContractError> {
        Ok(self
            .data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn persist_data(&self, key: &str, data: &str) -> Result<(), ContractError> {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), data.to_string());
        Ok(())
    }
}
