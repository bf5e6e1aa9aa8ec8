//! LogSink - logs a summary of every reading set via tracing

use std::collections::BTreeSet;

use contracts::{ContractError, ReadingSet, ReadingSink};
use tracing::{debug, info, instrument};

pub struct LogSink {
    name: String,
}

impl LogSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn log_set_summary(&self, set: &ReadingSet) {
        let assets: BTreeSet<&str> = set.readings().iter().map(|r| r.asset_name()).collect();
        let datapoints: usize = set.readings().iter().map(|r| r.datapoints().len()).sum();

        info!(
            sink = %self.name,
            readings = set.count(),
            datapoints,
            assets = ?assets,
            "ReadingSet received"
        );
    }
}

impl ReadingSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_sink_write",
        skip(self, set),
        fields(sink = %self.name, readings = set.count())
    )]
    fn write(&self, set: ReadingSet) -> Result<(), ContractError> {
        self.log_set_summary(&set);
        Ok(())
    }

    fn flush(&self) -> Result<(), ContractError> {
        debug!(sink = %self.name, "LogSink flushed");
        Ok(())
    }
}
