use thiserror::Error;

use crate::registry::BackendRole;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Unknown client type: {0}")]
    UnknownBackend(String),
    #[error("Method '{operation}' not found on {backend} client")]
    UnknownOperation {
        backend: BackendRole,
        operation: String,
    },
    #[error("Invalid arguments for '{operation}': {reason}")]
    InvalidArguments { operation: String, reason: String },
    #[error("Method '{operation}' belongs to the {expected} client")]
    WrongBackend {
        operation: String,
        expected: BackendRole,
    },
    #[error("Invalid retry delay: {0} seconds")]
    InvalidRetryDelay(f64),
    /// Every attempt failed; `message` is the last failure.
    #[error("{message}")]
    Exhausted { attempts: u32, message: String },
}

impl RelayError {
    /// Rejected before any call was made.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, RelayError::Exhausted { .. })
    }
}
