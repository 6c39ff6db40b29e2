//! Dispatcher error types

use thiserror::Error;

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Rejected at construction
    #[error("invalid {component} configuration: {message}")]
    InvalidConfig { component: String, message: String },

    /// Sink creation error
    #[error("failed to create sink '{name}': {message}")]
    SinkCreation { name: String, message: String },

    /// Sink could not open its destination
    #[error("sink '{name}' failed to start: {message}")]
    SinkStart { name: String, message: String },

    /// Sink write error (from contract)
    #[error("sink error: {0}")]
    Contract(#[from] contracts::ContractError),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DispatcherError {
    /// Create an invalid configuration error
    pub fn invalid_config(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create a sink creation error
    pub fn sink_creation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkCreation {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Failure of a single remote delivery attempt
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Server answered with a non-2xx status
    #[error("server returned status {0}")]
    Status(u16),

    /// Attempt exceeded its timeout
    #[error("request timed out")]
    Timeout,

    /// Connection or protocol failure
    #[error("network error: {0}")]
    Network(String),
}
