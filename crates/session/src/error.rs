//! Session error types

use thiserror::Error;

use contracts::ContractError;
use dispatcher::DispatcherError;

#[derive(Debug, Error)]
pub enum SessionError {
    /// Blueprint enables nothing to write to
    #[error("no sink enabled")]
    NoSinks,

    /// Every enabled sink failed to open
    #[error("all sinks failed to start: {}", .failures.join("; "))]
    AllSinksFailed { failures: Vec<String> },

    /// Operation not allowed in the current state
    #[error("{operation} not allowed while {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("participant id '{0}' is invalid")]
    InvalidParticipant(String),

    #[error("no participant set")]
    NoParticipant,

    #[error(transparent)]
    Dispatcher(#[from] DispatcherError),

    #[error(transparent)]
    Contract(#[from] ContractError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
