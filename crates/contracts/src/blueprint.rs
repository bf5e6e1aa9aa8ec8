//! ServiceBlueprint - Config Loader output
//!
//! Describes one pipeline service: its filter instances, the stage order,
//! branch queueing, the debugger tap, the terminal sink and the synthetic
//! reading source used by the CLI.

use std::collections::{BTreeMap, HashMap};
use std::ops::RangeInclusive;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{ConfigCategory, ConfigItem};

/// Service category item that holds the `{"pipeline": [...]}` definition
pub const PIPELINE_ITEM: &str = "filter";

/// Category name of filter instance `filter` in service `service`
pub fn filter_category_name(service: &str, filter: &str) -> String {
    format!("{service}_{filter}")
}

/// Configuration version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete service configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServiceBlueprint {
    #[serde(default)]
    pub version: ConfigVersion,

    #[validate(nested)]
    pub service: ServiceConfig,

    /// Declared filter instances
    #[serde(default)]
    #[validate(nested)]
    pub filters: Vec<FilterConfig>,

    /// Ordered stage list; a nested list is a branch
    #[serde(default)]
    pub pipeline: Vec<StageDefinition>,

    #[serde(default)]
    #[validate(nested)]
    pub branch: BranchConfig,

    #[serde(default)]
    #[validate(nested)]
    pub debugger: DebuggerConfig,

    #[validate(nested)]
    pub sink: SinkConfig,

    #[serde(default)]
    #[validate(nested)]
    pub source: SourceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServiceConfig {
    /// Service name, also the name of the service configuration category
    #[validate(length(min = 1))]
    pub name: String,

    #[serde(default)]
    pub description: String,
}

/// One filter instance
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct FilterConfig {
    /// Instance name, referenced from `pipeline`
    #[validate(length(min = 1))]
    pub name: String,

    /// Plugin implementing the instance
    #[validate(length(min = 1))]
    pub plugin: String,

    /// Item values overriding the plugin defaults
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

/// Pipeline stage: a filter name, or a branch holding its own sub-pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StageDefinition {
    Filter(String),
    Branch(Vec<StageDefinition>),
}

impl StageDefinition {
    /// Filter names in definition order, branches flattened
    pub fn filter_names(stages: &[StageDefinition]) -> Vec<&str> {
        let mut names = Vec::new();
        for stage in stages {
            match stage {
                Self::Filter(name) => names.push(name.as_str()),
                Self::Branch(children) => names.extend(Self::filter_names(children)),
            }
        }
        names
    }
}

/// Branch queueing configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BranchConfig {
    /// Pending copies per branch
    #[serde(default = "default_branch_queue_capacity")]
    #[validate(range(min = 1))]
    pub queue_capacity: usize,

    #[serde(default)]
    pub drop_policy: DropPolicy,
}

fn default_branch_queue_capacity() -> usize {
    64
}

impl Default for BranchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_branch_queue_capacity(),
            drop_policy: DropPolicy::default(),
        }
    }
}

/// Drop policy (when backpressure is full)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropPolicy {
    /// Drop oldest queued entry
    #[default]
    DropOldest,
    /// Drop the incoming entry
    DropNewest,
}

/// Debugger tap configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DebuggerConfig {
    /// Attach the tap at startup
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_debug_buffer_size")]
    #[validate(range(min = 1))]
    pub buffer_size: usize,

    #[serde(default)]
    pub granularity: DebugGranularity,
}

fn default_debug_buffer_size() -> usize {
    20
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            buffer_size: default_debug_buffer_size(),
            granularity: DebugGranularity::default(),
        }
    }
}

/// What one debugger buffer entry holds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebugGranularity {
    /// One entry per reading set
    #[default]
    ReadingSet,
    /// One entry per reading
    Reading,
}

/// Sink output configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SinkConfig {
    /// Sink name
    #[validate(length(min = 1))]
    pub name: String,

    /// Sink type
    pub sink_type: SinkType,

    /// Type-specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

/// Sink type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// Log output
    Log,
    /// File output
    File,
}

/// Synthetic reading source driven by the CLI
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SourceConfig {
    #[serde(default = "default_asset")]
    #[validate(length(min = 1))]
    pub asset: String,

    /// Batches per second
    #[serde(default = "default_frequency_hz")]
    #[validate(range(min = 0.001, max = 10_000.0))]
    pub frequency_hz: f64,

    #[serde(default = "default_readings_per_batch")]
    #[validate(range(min = 1))]
    pub readings_per_batch: usize,

    /// Datapoint names generated on every reading
    #[serde(default = "default_datapoints")]
    #[validate(length(min = 1))]
    pub datapoints: Vec<String>,
}

fn default_asset() -> String {
    "sensor".to_string()
}

fn default_frequency_hz() -> f64 {
    10.0
}

fn default_readings_per_batch() -> usize {
    5
}

fn default_datapoints() -> Vec<String> {
    vec!["value".to_string()]
}

/// Bounds of `SourceConfig::frequency_hz`
pub const SOURCE_FREQUENCY_RANGE_HZ: RangeInclusive<f64> = 0.001..=10_000.0;

impl SourceConfig {
    /// Time between batches; `None` when the frequency is outside
    /// [`SOURCE_FREQUENCY_RANGE_HZ`] or not a number
    pub fn period(&self) -> Option<Duration> {
        if !SOURCE_FREQUENCY_RANGE_HZ.contains(&self.frequency_hz) {
            return None;
        }
        Duration::try_from_secs_f64(self.frequency_hz.recip()).ok()
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            asset: default_asset(),
            frequency_hz: default_frequency_hz(),
            readings_per_batch: default_readings_per_batch(),
            datapoints: default_datapoints(),
        }
    }
}

impl ServiceBlueprint {
    /// `{"pipeline": [...]}` as stored in the service category
    pub fn pipeline_json(&self) -> String {
        serde_json::json!({ "pipeline": self.pipeline }).to_string()
    }

    /// Service category carrying the pipeline definition
    pub fn service_category(&self) -> ConfigCategory {
        let pipeline = self.pipeline_json();
        ConfigCategory::new(&self.service.name, &self.service.description).with_item(
            PIPELINE_ITEM,
            ConfigItem::new("Filter pipeline", "JSON", r#"{"pipeline": []}"#).with_value(pipeline),
        )
    }

    /// Category seeded with the configured values of one filter instance.
    ///
    /// Carries a `plugin` item so the loader can resolve the instance to its
    /// plugin; plugin defaults are merged on top at setup.
    pub fn filter_category(&self, filter: &FilterConfig) -> ConfigCategory {
        let mut category = ConfigCategory::new(
            filter_category_name(&self.service.name, &filter.name),
            format!("{} filter", filter.name),
        )
        .with_item(
            "plugin",
            ConfigItem::new("Plugin name", "string", &filter.plugin).with_value(&filter.plugin),
        );
        for (key, value) in &filter.config {
            category.set_value(key, value.as_str());
        }
        category
    }

    pub fn filter(&self, name: &str) -> Option<&FilterConfig> {
        self.filters.iter().find(|f| f.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_blueprint() -> ServiceBlueprint {
        ServiceBlueprint {
            version: ConfigVersion::V1,
            service: ServiceConfig {
                name: "sensors".into(),
                description: String::new(),
            },
            filters: vec![FilterConfig {
                name: "scale1".into(),
                plugin: "scale".into(),
                config: BTreeMap::from([("factor".to_string(), "2.0".to_string())]),
            }],
            pipeline: vec![
                StageDefinition::Filter("scale1".into()),
                StageDefinition::Branch(vec![StageDefinition::Filter("tap".into())]),
            ],
            branch: BranchConfig::default(),
            debugger: DebuggerConfig::default(),
            sink: SinkConfig {
                name: "out".into(),
                sink_type: SinkType::Log,
                params: HashMap::new(),
            },
            source: SourceConfig::default(),
        }
    }

    #[test]
    fn pipeline_json_nests_branches() {
        let bp = sample_blueprint();
        assert_eq!(bp.pipeline_json(), r#"{"pipeline":["scale1",["tap"]]}"#);
        assert_eq!(StageDefinition::filter_names(&bp.pipeline), vec!["scale1", "tap"]);
    }

    #[test]
    fn filter_category_carries_plugin_and_values() {
        let bp = sample_blueprint();
        let cat = bp.filter_category(&bp.filters[0]);
        assert_eq!(cat.name, "sensors_scale1");
        assert_eq!(cat.value("plugin"), Some("scale"));
        assert_eq!(cat.value("factor"), Some("2.0"));
    }

    #[test]
    fn declarative_rules() {
        let mut bp = sample_blueprint();
        assert!(bp.validate().is_ok());

        bp.branch.queue_capacity = 0;
        assert!(bp.validate().is_err());

        let mut bp = sample_blueprint();
        bp.service.name.clear();
        assert!(bp.validate().is_err());
    }

    #[test]
    fn source_period_rejects_out_of_range_frequency() {
        let mut source = SourceConfig::default();
        assert_eq!(source.period(), Some(Duration::from_millis(100)));

        for hz in [f64::INFINITY, f64::NAN, 1e-300, f64::MIN_POSITIVE, 0.0, -1.0, 20_000.0] {
            source.frequency_hz = hz;
            assert_eq!(source.period(), None, "frequency {hz}");
        }

        let mut bp = sample_blueprint();
        bp.source.frequency_hz = f64::INFINITY;
        assert!(bp.validate().is_err());
        bp.source.frequency_hz = 1e-300;
        assert!(bp.validate().is_err());
    }
}
