//! # Sinks
//!
//! Terminal sinks for the reading pipeline.
//!
//! - `LogSink`: summary of every set via tracing
//! - `FileSink`: JSON-lines readings file plus PNG image export

pub mod error;
pub mod factory;
pub mod handle;
pub mod metrics;
pub mod sinks;

pub use contracts::ReadingSink;
pub use error::SinkError;
pub use factory::create_sink;
pub use handle::SinkHandle;
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use sinks::{FileSink, FileSinkConfig, LogSink};
