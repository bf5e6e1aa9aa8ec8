//! Sink error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to create sink '{name}': {message}")]
    SinkCreation { name: String, message: String },

    #[error("sink error: {0}")]
    Contract(#[from] contracts::ContractError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SinkError {
    pub fn sink_creation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkCreation {
            name: name.into(),
            message: message.into(),
        }
    }
}
