//! `scale` - linear transform of numeric datapoints
//!
//! Every integer or float datapoint (also inside arrays, dicts and lists)
//! becomes the float `value * factor + offset`. Non-numeric datapoints pass
//! untouched.

use contracts::{
    ConfigCategory, Datapoint, DatapointValue, FilterPlugin, OutputStream, PluginError,
    PluginInfo, ReadingSet,
};
use tracing::{debug, trace};

use crate::common::{filter_info, parse_bool, parse_f64, Forwarder};

pub const NAME: &str = "scale";

const DEFAULT_CONFIG: &str = r#"{
    "factor": {"description": "Multiplier applied to numeric datapoints", "type": "float", "default": "1.0"},
    "offset": {"description": "Added after scaling", "type": "float", "default": "0.0"},
    "enable": {"description": "Apply the transform", "type": "boolean", "default": "true"}
}"#;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Transform {
    factor: f64,
    offset: f64,
    enable: bool,
}

impl Transform {
    fn from_config(config: &ConfigCategory) -> Result<Self, PluginError> {
        Ok(Self {
            factor: parse_f64(config, "factor", 1.0)?,
            offset: parse_f64(config, "offset", 0.0)?,
            enable: parse_bool(config, "enable", true)?,
        })
    }

    fn apply(&self, value: &mut DatapointValue) {
        match value {
            DatapointValue::Integer(v) => {
                let scaled = *v as f64 * self.factor + self.offset;
                *value = DatapointValue::Float(scaled);
            }
            DatapointValue::Float(v) => *v = *v * self.factor + self.offset,
            DatapointValue::FloatArray(values) => {
                for v in values {
                    *v = *v * self.factor + self.offset;
                }
            }
            DatapointValue::Dict(children) | DatapointValue::List(children) => {
                for child in children {
                    self.apply(&mut child.value);
                }
            }
            _ => {}
        }
    }
}

pub struct ScaleFilter {
    info: PluginInfo,
    transform: Transform,
    out: Forwarder,
}

impl ScaleFilter {
    pub fn new() -> Self {
        Self {
            info: filter_info(NAME, DEFAULT_CONFIG, false),
            transform: Transform {
                factor: 1.0,
                offset: 0.0,
                enable: true,
            },
            out: Forwarder::default(),
        }
    }
}

impl Default for ScaleFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterPlugin for ScaleFilter {
    fn info(&self) -> &PluginInfo {
        &self.info
    }

    fn init(&mut self, config: &ConfigCategory, output: OutputStream) -> Result<(), PluginError> {
        self.transform = Transform::from_config(config)?;
        self.out.bind(output);
        debug!(transform = ?self.transform, "scale initialised");
        Ok(())
    }

    fn ingest(&mut self, mut set: ReadingSet) -> Result<(), PluginError> {
        if self.transform.enable {
            for reading in set.readings_mut() {
                for Datapoint { value, .. } in reading.datapoints_mut() {
                    self.transform.apply(value);
                }
            }
        }
        trace!(readings = set.count(), "scaled");
        self.out.send(set)
    }

    fn reconfigure(&mut self, config: &ConfigCategory) -> Result<(), PluginError> {
        self.transform = Transform::from_config(config)?;
        debug!(transform = ?self.transform, "scale reconfigured");
        Ok(())
    }

    fn shutdown(&mut self) {
        self.out.release();
    }
}
