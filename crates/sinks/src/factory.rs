//! Sink construction from configuration

use std::sync::Arc;

use contracts::{SinkConfig, SinkType};
use tracing::info;

use crate::error::SinkError;
use crate::handle::SinkHandle;
use crate::sinks::{FileSink, LogSink};

/// Build the sink described by `config`
pub fn create_sink(config: &SinkConfig) -> Result<Arc<SinkHandle>, SinkError> {
    let handle = match config.sink_type {
        SinkType::Log => SinkHandle::new(LogSink::new(&config.name)),
        SinkType::File => {
            let sink = FileSink::from_params(&config.name, &config.params)
                .map_err(|e| SinkError::sink_creation(&config.name, e.to_string()))?;
            SinkHandle::new(sink)
        }
    };
    info!(sink = %config.name, sink_type = ?config.sink_type, "sink created");
    Ok(Arc::new(handle))
}
