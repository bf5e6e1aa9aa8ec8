//! Helpers shared by the built-in filters

use contracts::{ConfigCategory, OutputStream, PluginError, PluginInfo, PluginType, ReadingSet};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn filter_info(name: &str, default_config: &str, persist_data: bool) -> PluginInfo {
    PluginInfo {
        name: name.to_string(),
        version: VERSION.to_string(),
        plugin_type: PluginType::Filter,
        persist_data,
        default_config: default_config.to_string(),
    }
}

/// Output bound at init
#[derive(Default)]
pub struct Forwarder {
    output: Option<OutputStream>,
}

impl Forwarder {
    pub fn bind(&mut self, output: OutputStream) {
        self.output = Some(output);
    }

    pub fn release(&mut self) {
        self.output = None;
    }

    /// Hand `set` to the next stage; its failure comes back as `Downstream`
    #[inline]
    pub fn send(&self, set: ReadingSet) -> Result<(), PluginError> {
        let output = self
            .output
            .as_ref()
            .ok_or_else(|| PluginError::failed("filter not initialised"))?;
        output(set)?;
        Ok(())
    }
}

pub fn parse_f64(config: &ConfigCategory, key: &str, default: f64) -> Result<f64, PluginError> {
    match config.value(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| PluginError::invalid_config(format!("{key}: '{raw}' is not a number"))),
    }
}

pub fn parse_bool(config: &ConfigCategory, key: &str, default: bool) -> Result<bool, PluginError> {
    match config.value(key).map(str::trim) {
        None => Ok(default),
        Some("true") => Ok(true),
        Some("false") => Ok(false),
        Some(raw) => Err(PluginError::invalid_config(format!(
            "{key}: '{raw}' is not true/false"
        ))),
    }
}

pub fn parse_usize(config: &ConfigCategory, key: &str, default: usize) -> Result<usize, PluginError> {
    match config.value(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<usize>().map_err(|_| {
            PluginError::invalid_config(format!("{key}: '{raw}' is not a positive integer"))
        }),
    }
}
