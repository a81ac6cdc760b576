//! Dispatcher error types

use thiserror::Error;

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Relay creation error
    #[error("failed to create relay to '{endpoint}': {message}")]
    RelayCreation { endpoint: String, message: String },

    /// Relay already closed
    #[error("relay closed")]
    RelayClosed,

    /// Relay write error (from contract)
    #[error("relay error: {0}")]
    Contract(#[from] contracts::ContractError),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DispatcherError {
    /// Create a relay creation error
    pub fn relay_creation(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RelayCreation {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }
}
