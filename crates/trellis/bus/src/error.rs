//! Error types for the signal bus

use thiserror::Error;

/// Errors surfaced to the emitter.
///
/// Handler failures are not in here: they are isolated, logged and counted,
/// and never reach the caller of `emit`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// A validation rule rejected the signal; no handler ran
    #[error("Signal '{signal_type}' failed validation: {reason}")]
    Validation { signal_type: String, reason: String },

    /// A middleware returned an error; dispatch was aborted
    #[error("Middleware '{middleware}' failed on '{signal_type}': {message}")]
    Middleware {
        middleware: String,
        signal_type: String,
        message: String,
    },
}

impl BusError {
    pub fn is_validation(&self) -> bool {
        matches!(self, BusError::Validation { .. })
    }

    pub fn is_middleware(&self) -> bool {
        matches!(self, BusError::Middleware { .. })
    }
}

/// Result type for bus operations
pub type Result<T> = std::result::Result<T, BusError>;
