//! `passthrough` - forwards every set unchanged

use contracts::{ConfigCategory, FilterPlugin, OutputStream, PluginError, PluginInfo, ReadingSet};
use tracing::trace;

use crate::common::{filter_info, Forwarder};

pub const NAME: &str = "passthrough";

pub struct PassthroughFilter {
    info: PluginInfo,
    out: Forwarder,
}

impl PassthroughFilter {
    pub fn new() -> Self {
        Self {
            info: filter_info(NAME, "{}", false),
            out: Forwarder::default(),
        }
    }
}

impl Default for PassthroughFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterPlugin for PassthroughFilter {
    fn info(&self) -> &PluginInfo {
        &self.info
    }

    fn init(&mut self, _config: &ConfigCategory, output: OutputStream) -> Result<(), PluginError> {
        self.out.bind(output);
        Ok(())
    }

    fn ingest(&mut self, set: ReadingSet) -> Result<(), PluginError> {
        trace!(readings = set.count(), "passthrough");
        self.out.send(set)
    }

    fn reconfigure(&mut self, _config: &ConfigCategory) -> Result<(), PluginError> {
        Ok(())
    }

    fn shutdown(&mut self) {
        self.out.release();
    }
}
