//! One run of a configured service.

mod orchestrator;
mod source;
mod stats;

pub use orchestrator::{Pipeline, PipelineConfig};
pub use source::SyntheticSource;
pub use stats::PipelineStats;
