//! ReadingSink trait - terminal output of a pipeline
//!
//! Storage writers and egress connectors implement this; the pipeline never
//! looks at their wire format.

use crate::{ContractError, ReadingSet};

/// Data output trait
///
/// Shared by every writer in a pipeline (branch writers included), so
/// implementations synchronize internally.
pub trait ReadingSink: Send + Sync {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Accept a reading set
    ///
    /// # Errors
    /// Returns write error (should include context)
    fn write(&self, set: ReadingSet) -> Result<(), ContractError>;

    /// Flush buffer (if any)
    fn flush(&self) -> Result<(), ContractError> {
        Ok(())
    }
}
