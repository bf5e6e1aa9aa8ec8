//! `delta` - forwards a reading only when its asset's values changed
//!
//! Last-seen datapoints are kept per asset and persisted across restarts
//! as JSON (`{"asset": [datapoint, ...]}`).

use std::collections::HashMap;

use contracts::{
    ConfigCategory, Datapoint, FilterPlugin, OutputStream, PluginError, PluginInfo, Reading,
    ReadingSet,
};
use tracing::{debug, trace, warn};

use crate::common::{filter_info, parse_f64, Forwarder};

pub const NAME: &str = "delta";

const DEFAULT_CONFIG: &str = r#"{
    "tolerance": {"description": "Numeric change below or at this is not a change", "type": "float", "default": "0.0"}
}"#;

pub struct DeltaFilter {
    info: PluginInfo,
    tolerance: f64,
    last_seen: HashMap<String, Vec<Datapoint>>,
    out: Forwarder,
}

impl DeltaFilter {
    pub fn new() -> Self {
        Self {
            info: filter_info(NAME, DEFAULT_CONFIG, true),
            tolerance: 0.0,
            last_seen: HashMap::new(),
            out: Forwarder::default(),
        }
    }

    fn parse_tolerance(config: &ConfigCategory) -> Result<f64, PluginError> {
        let tolerance = parse_f64(config, "tolerance", 0.0)?;
        if tolerance < 0.0 {
            return Err(PluginError::invalid_config("tolerance must not be negative"));
        }
        Ok(tolerance)
    }

    fn changed(&self, previous: &[Datapoint], current: &[Datapoint]) -> bool {
        if previous.len() != current.len() {
            return true;
        }
        previous.iter().zip(current).any(|(p, c)| {
            if p.name != c.name {
                return true;
            }
            match (p.value.as_f64(), c.value.as_f64()) {
                (Some(a), Some(b)) => (a - b).abs() > self.tolerance,
                _ => p.value != c.value,
            }
        })
    }

    /// Remember `reading` and report whether it differs from the last one
    fn observe(&mut self, reading: &Reading) -> bool {
        let changed = match self.last_seen.get(reading.asset_name()) {
            Some(previous) => self.changed(previous, reading.datapoints()),
            None => true,
        };
        if changed {
            self.last_seen
                .insert(reading.asset_name().to_string(), reading.datapoints().to_vec());
        }
        changed
    }
}

impl Default for DeltaFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterPlugin for DeltaFilter {
    fn info(&self) -> &PluginInfo {
        &self.info
    }

    fn init(&mut self, config: &ConfigCategory, output: OutputStream) -> Result<(), PluginError> {
        self.tolerance = Self::parse_tolerance(config)?;
        self.out.bind(output);
        Ok(())
    }

    fn start(&mut self, state: &str) -> Result<(), PluginError> {
        if state.trim().is_empty() {
            return Ok(());
        }
        self.last_seen = serde_json::from_str(state)
            .map_err(|e| PluginError::failed(format!("persisted state: {e}")))?;
        debug!(assets = self.last_seen.len(), "delta state restored");
        Ok(())
    }

    fn ingest(&mut self, mut set: ReadingSet) -> Result<(), PluginError> {
        let before = set.count();
        let readings: Vec<Reading> = set
            .remove_all()
            .into_iter()
            .filter(|reading| self.observe(reading))
            .collect();
        trace!(before, after = readings.len(), "delta applied");
        if readings.is_empty() {
            return Ok(());
        }
        self.out.send(ReadingSet::new(readings))
    }

    fn reconfigure(&mut self, config: &ConfigCategory) -> Result<(), PluginError> {
        self.tolerance = Self::parse_tolerance(config)?;
        Ok(())
    }

    fn shutdown(&mut self) {
        self.out.release();
    }

    fn shutdown_save_data(&mut self) -> String {
        self.out.release();
        match serde_json::to_string(&self.last_seen) {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, "delta state not serialisable, nothing persisted");
                String::new()
            }
        }
    }
}
