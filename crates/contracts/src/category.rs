//! Configuration categories
//!
//! A category is a named set of typed items. Item values travel as strings,
//! the same way the management platform exchanges them; typed access is the
//! consumer's job.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ContractError;

/// One configuration item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigItem {
    #[serde(default)]
    pub description: String,

    /// Declared type ("string", "integer", "float", "boolean", "JSON", ...)
    #[serde(rename = "type", default = "default_item_type")]
    pub item_type: String,

    #[serde(default)]
    pub default: String,

    /// Current value; falls back to `default` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

fn default_item_type() -> String {
    "string".to_string()
}

impl ConfigItem {
    pub fn new(
        description: impl Into<String>,
        item_type: impl Into<String>,
        default: impl Into<String>,
    ) -> Self {
        Self {
            description: description.into(),
            item_type: item_type.into(),
            default: default.into(),
            value: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Effective value
    pub fn current(&self) -> &str {
        self.value.as_deref().unwrap_or(&self.default)
    }
}

/// Named configuration category
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigCategory {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub items: BTreeMap<String, ConfigItem>,
}

impl ConfigCategory {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            items: BTreeMap::new(),
        }
    }

    /// Parse the item map (`{"item": {"type": ..., "default": ..., "value": ...}}`)
    pub fn from_json(name: impl Into<String>, json: &str) -> Result<Self, ContractError> {
        let name = name.into();
        let items: BTreeMap<String, ConfigItem> =
            serde_json::from_str(json).map_err(|e| ContractError::ConfigParse {
                message: format!("category '{name}': {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Self {
            name,
            description: String::new(),
            items,
        })
    }

    /// Serialize the item map back to the management platform format
    pub fn to_json(&self) -> Result<String, ContractError> {
        serde_json::to_string(&self.items)
            .map_err(|e| ContractError::config_parse(format!("category '{}': {e}", self.name)))
    }

    pub fn with_item(mut self, key: impl Into<String>, item: ConfigItem) -> Self {
        self.items.insert(key.into(), item);
        self
    }

    pub fn item(&self, key: &str) -> Option<&ConfigItem> {
        self.items.get(key)
    }

    /// Effective value of `key`
    pub fn value(&self, key: &str) -> Option<&str> {
        self.items.get(key).map(ConfigItem::current)
    }

    /// Set the value of an existing item, or add a plain string item
    pub fn set_value(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.items.get_mut(key) {
            Some(item) => item.value = Some(value),
            None => {
                self.items.insert(
                    key.to_string(),
                    ConfigItem::new("", default_item_type(), value.clone()).with_value(value),
                );
            }
        }
    }

    /// Fold a freshly declared default schema into this (already stored) category.
    ///
    /// Item metadata comes from `defaults`; values already set here win.
    /// Items unknown to `defaults` are kept.
    pub fn merge_defaults(&mut self, defaults: &ConfigCategory) {
        if self.description.is_empty() {
            self.description = defaults.description.clone();
        }
        for (key, declared) in &defaults.items {
            match self.items.get_mut(key) {
                Some(existing) => {
                    let value = existing.value.take().or_else(|| declared.value.clone());
                    *existing = ConfigItem {
                        value,
                        ..declared.clone()
                    };
                }
                None => {
                    self.items.insert(key.clone(), declared.clone());
                }
            }
        }
    }
}
