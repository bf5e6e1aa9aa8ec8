//! `metadata` - appends fixed datapoints to every reading

use contracts::{
    ConfigCategory, Datapoint, DatapointValue, FilterPlugin, OutputStream, PluginError,
    PluginInfo, ReadingSet,
};
use serde_json::Value;
use tracing::{debug, trace};

use crate::common::{filter_info, Forwarder};

pub const NAME: &str = "metadata";

const DEFAULT_CONFIG: &str = r#"{
    "metadata": {"description": "Datapoints added to each reading (JSON object)", "type": "JSON", "default": "{}"}
}"#;

pub struct MetadataFilter {
    info: PluginInfo,
    datapoints: Vec<Datapoint>,
    out: Forwarder,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self {
            info: filter_info(NAME, DEFAULT_CONFIG, false),
            datapoints: Vec::new(),
            out: Forwarder::default(),
        }
    }
}

impl Default for MetadataFilter {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse the `metadata` item: string, integer and float members only
fn parse_metadata(config: &ConfigCategory) -> Result<Vec<Datapoint>, PluginError> {
    let raw = config.value("metadata").unwrap_or("{}");
    let parsed: Value = serde_json::from_str(raw)
        .map_err(|e| PluginError::invalid_config(format!("metadata: {e}")))?;
    let Value::Object(members) = parsed else {
        return Err(PluginError::invalid_config("metadata must be a JSON object"));
    };

    members
        .into_iter()
        .map(|(name, value)| {
            let value = match value {
                Value::String(s) => DatapointValue::String(s),
                Value::Number(n) => match n.as_i64() {
                    Some(i) => DatapointValue::Integer(i),
                    None => n.as_f64().map(DatapointValue::Float).ok_or_else(|| {
                        PluginError::invalid_config(format!("metadata.{name}: unsupported number"))
                    })?,
                },
                other => {
                    return Err(PluginError::invalid_config(format!(
                        "metadata.{name}: unsupported value {other}"
                    )))
                }
            };
            Ok(Datapoint { name, value })
        })
        .collect()
}

impl FilterPlugin for MetadataFilter {
    fn info(&self) -> &PluginInfo {
        &self.info
    }

    fn init(&mut self, config: &ConfigCategory, output: OutputStream) -> Result<(), PluginError> {
        self.datapoints = parse_metadata(config)?;
        self.out.bind(output);
        debug!(datapoints = self.datapoints.len(), "metadata initialised");
        Ok(())
    }

    fn ingest(&mut self, mut set: ReadingSet) -> Result<(), PluginError> {
        if !self.datapoints.is_empty() {
            for reading in set.readings_mut() {
                for datapoint in &self.datapoints {
                    reading.add_datapoint(datapoint.clone());
                }
            }
        }
        trace!(readings = set.count(), "metadata added");
        self.out.send(set)
    }

    fn reconfigure(&mut self, config: &ConfigCategory) -> Result<(), PluginError> {
        self.datapoints = parse_metadata(config)?;
        Ok(())
    }

    fn shutdown(&mut self) {
        self.out.release();
    }
}
