//! Engine error types.
//!
//! `StoreError` is raised by storage backends; `GateError` is what every
//! gating operation returns. Both live in `coursegate-core` so the service and
//! the API layer can classify failures without string matching.

use thiserror::Error;

/// Errors raised by a progress store or user directory backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing storage could not be reached or read.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A filesystem operation failed.
    #[error("storage I/O error: {0}")]
    Io(String),

    /// Stored state could not be encoded or decoded.
    #[error("storage serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Errors returned by gating operations.
#[derive(Debug, Error)]
pub enum GateError {
    /// Missing or structurally invalid input. No state was touched.
    #[error("invalid request: {0}")]
    Validation(String),

    /// A referenced course or user does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The evaluation scope is inside a lockout window.
    #[error("evaluation locked for {remaining_minutes} more minute(s)")]
    Locked { remaining_minutes: i64 },

    /// Storage failed; the operation was not applied.
    #[error(transparent)]
    Persistence(#[from] StoreError),
}

impl GateError {
    /// HTTP-style status code for the API envelope.
    pub fn status_code(&self) -> u16 {
        match self {
            GateError::Validation(_) => 400,
            GateError::NotFound(_) => 404,
            GateError::Locked { .. } => 423,
            GateError::Persistence(_) => 500,
        }
    }

    /// Returns `true` for errors caused by the caller rather than the server.
    pub fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }
}
