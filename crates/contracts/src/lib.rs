//! # Contracts
//!
//! Frozen interface contracts, defining inter-module data structures and traits.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Ownership model
//! - A `ReadingSet` is moved from stage to stage, never aliased
//! - Copies are explicit (`deep_copy`) and only made for branch fan-out and debugger capture

mod blueprint;
mod category;
mod error;
mod management;
mod plugin;
mod reading;
mod sink;

pub use blueprint::*;
pub use category::{ConfigCategory, ConfigItem};
pub use error::*;
pub use management::{ManagementClient, PluginDataStore};
pub use plugin::{FilterPlugin, OutputStream, PluginInfo, PluginLoader, PluginType};
pub use reading::*;
pub use sink::ReadingSink;
