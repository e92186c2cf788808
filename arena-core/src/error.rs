//! Error kinds shared across the tournament engine

use crate::identity::MAX_INDEX;

/// Errors raised by identity packing, configuration, worker protocol and gameplay
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ArenaError {
    #[error("{field} index {value} is outside [0, {}]", MAX_INDEX)]
    IdOutOfRange { field: &'static str, value: u64 },

    #[error("invalid configuration: {0}")]
    Validation(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("worker {worker} faulted: {reason}")]
    WorkerFault { worker: usize, reason: String },

    #[error("gameplay error: {0}")]
    Gameplay(String),
}

impl ArenaError {
    /// Shorthand for a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        ArenaError::Validation(msg.into())
    }

    /// Shorthand for a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        ArenaError::Protocol(msg.into())
    }

    /// Shorthand for a gameplay error
    pub fn gameplay(msg: impl Into<String>) -> Self {
        ArenaError::Gameplay(msg.into())
    }

    /// True for faults that leave the worker unusable
    pub fn is_worker_fault(&self) -> bool {
        matches!(self, ArenaError::WorkerFault { .. })
    }
}

pub type Result<T> = std::result::Result<T, ArenaError>;
