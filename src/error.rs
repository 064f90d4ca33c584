//! Error types for the call gate.

use std::time::Duration;
use thiserror::Error;

/// Main error type for gate operations.
#[derive(Error, Debug)]
pub enum GateError {
    /// Invalid limit, window, or configuration source
    #[error("Configuration error: {0}")]
    Config(String),

    /// The quota for the current window is exhausted
    #[error("Rate limited: {limit} admissions already granted in this window")]
    RateLimited { limit: u64 },

    /// Exclusive access to the counter was not obtained in time
    #[error("Lock timeout: counter not available within {waited:?}")]
    LockTimeout { waited: Duration },

    /// The gate has been shut down
    #[error("Gate is closed")]
    Closed,

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GateError {
    /// Whether retrying against the same gate can succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, GateError::RateLimited { .. } | GateError::LockTimeout { .. })
    }
}

impl From<::config::ConfigError> for GateError {
    fn from(err: ::config::ConfigError) -> Self {
        GateError::Config(err.to_string())
    }
}

/// Error returned by [`RateGate::execute`](crate::gate::RateGate::execute).
///
/// Errors produced by the action itself are carried in `Action` untouched.
#[derive(Error, Debug)]
pub enum ExecuteError<E> {
    /// Admission was refused or the gate is closed; the action did not run
    #[error(transparent)]
    Gate(#[from] GateError),

    /// The action ran and failed
    #[error("Action failed: {0}")]
    Action(E),
}

impl<E> ExecuteError<E> {
    /// The gate refusal, if the action never ran.
    pub fn gate_error(&self) -> Option<&GateError> {
        match self {
            ExecuteError::Gate(err) => Some(err),
            ExecuteError::Action(_) => None,
        }
    }

    /// Unwrap the action's own error, if the action ran.
    pub fn into_action_error(self) -> Option<E> {
        match self {
            ExecuteError::Action(err) => Some(err),
            ExecuteError::Gate(_) => None,
        }
    }
}

/// Result type alias for gate operations.
pub type Result<T> = std::result::Result<T, GateError>;
