//! `debug_tap` - captures every set into a shared debugger
//!
//! Placed inside a branch it gives an operator a view of the data without
//! touching the primary path. A suspended tap holds the set back, the same
//! way the tap at the pipeline entry does.

use std::sync::Arc;

use contracts::{ConfigCategory, FilterPlugin, OutputStream, PluginError, PluginInfo, ReadingSet};
use pipeline::{DebuggerAction, PipelineDebugger};
use tracing::{debug, trace};

use crate::common::{filter_info, parse_usize, Forwarder};

pub const NAME: &str = "debug_tap";

const DEFAULT_CONFIG: &str = r#"{
    "buffer_size": {"description": "Snapshots kept when the tap attaches its debugger", "type": "integer", "default": "10"}
}"#;

pub struct DebugTapFilter {
    info: PluginInfo,
    debugger: Arc<PipelineDebugger>,
    out: Forwarder,
}

impl DebugTapFilter {
    pub fn new(debugger: Arc<PipelineDebugger>) -> Self {
        Self {
            info: filter_info(NAME, DEFAULT_CONFIG, false),
            debugger,
            out: Forwarder::default(),
        }
    }

    pub fn debugger(&self) -> Arc<PipelineDebugger> {
        self.debugger.clone()
    }
}

impl FilterPlugin for DebugTapFilter {
    fn info(&self) -> &PluginInfo {
        &self.info
    }

    /// Attaches the debugger unless someone already did
    fn init(&mut self, config: &ConfigCategory, output: OutputStream) -> Result<(), PluginError> {
        let size = parse_usize(config, "buffer_size", 10)?;
        if size == 0 {
            return Err(PluginError::invalid_config("buffer_size must be at least 1"));
        }
        if !self.debugger.is_attached() {
            self.debugger.attach(size);
            debug!(size, "debug tap attached");
        }
        self.out.bind(output);
        Ok(())
    }

    fn ingest(&mut self, set: ReadingSet) -> Result<(), PluginError> {
        if self.debugger.process(&set) == DebuggerAction::Suspend {
            trace!(readings = set.count(), "debug tap suspended, set held");
            return Ok(());
        }
        self.out.send(set)
    }

    fn reconfigure(&mut self, config: &ConfigCategory) -> Result<(), PluginError> {
        parse_usize(config, "buffer_size", 10).map(|_| ())
    }

    fn shutdown(&mut self) {
        self.out.release();
    }
}
