//! # Pipeline
//!
//! Reading pipeline engine: a chain of filter, branch and writer elements
//! built from a service's configured stage list.
//!
//! ## Usage
//!
//! ```ignore
//! use pipeline::{FilterPipeline, PipelineContext, PluginRegistry};
//!
//! let context = PipelineContext::new("sensors", management, storage);
//! let mut pipeline = FilterPipeline::new(context);
//! pipeline.build("sensors", &registry, sink)?;
//!
//! pipeline.ingest(reading_set)?;
//! pipeline.cleanup_filters("sensors");
//! ```

pub mod branch;
pub mod buffer;
pub mod builder;
pub mod debugger;
pub mod element;
pub mod filter;
pub mod memory;
pub mod metrics;
pub mod mock;
pub mod registry;
pub mod writer;

// Re-exports
pub use branch::PipelineBranch;
pub use buffer::{CircularBuffer, ReadingCircularBuffer, ReadingSetCircularBuffer};
pub use builder::FilterPipeline;
pub use debugger::{DebugSnapshot, DebuggerAction, FetchMode, PipelineDebugger};
pub use element::{
    element_ref, forward_to, lock_element, ElementRef, PipelineContext, PipelineElement, Terminal,
};
pub use filter::{FilterState, PipelineFilter};
pub use memory::{InMemoryManagementClient, InMemoryPluginStore};
pub use metrics::{BranchMetrics, BranchMetricsSnapshot};
pub use registry::PluginRegistry;
pub use writer::PipelineWriter;
