//! # Filters
//!
//! Built-in in-process filter plugins.
//!
//! | plugin | effect |
//! |---|---|
//! | `passthrough` | forwards unchanged |
//! | `scale` | `value * factor + offset` on numeric datapoints |
//! | `metadata` | appends configured datapoints |
//! | `delta` | drops readings whose values did not change |
//! | `debug_tap` | snapshots sets into a debugger |
//!
//! ```ignore
//! let mut registry = PluginRegistry::new();
//! filters::register_builtin(&mut registry, tap_debugger.clone());
//! ```

mod common;
pub mod debug_tap;
pub mod delta;
pub mod metadata;
pub mod passthrough;
pub mod scale;

use std::sync::Arc;

use pipeline::{PipelineDebugger, PluginRegistry};

pub use debug_tap::DebugTapFilter;
pub use delta::DeltaFilter;
pub use metadata::MetadataFilter;
pub use passthrough::PassthroughFilter;
pub use scale::ScaleFilter;

/// Register every built-in filter. `debug_tap` instances share `tap`.
pub fn register_builtin(registry: &mut PluginRegistry, tap: Arc<PipelineDebugger>) {
    registry.register_filter(passthrough::NAME, || Box::new(PassthroughFilter::new()));
    registry.register_filter(scale::NAME, || Box::new(ScaleFilter::new()));
    registry.register_filter(metadata::NAME, || Box::new(MetadataFilter::new()));
    registry.register_filter(delta::NAME, || Box::new(DeltaFilter::new()));
    registry.register_filter(debug_tap::NAME, move || Box::new(DebugTapFilter::new(tap.clone())));
}
