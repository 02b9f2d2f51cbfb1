//! Error types for navigation

use thiserror::Error;
use trellis_bus::BusError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NavigationError {
    /// The cursor is already on the oldest entry
    #[error("Nothing to go back to")]
    NothingToGoBack,

    /// The cursor is already on the newest entry
    #[error("Nothing to go forward to")]
    NothingToGoForward,

    /// The navigation signal was rejected
    #[error(transparent)]
    Bus(#[from] BusError),
}

/// Result type for navigation operations
pub type Result<T> = std::result::Result<T, NavigationError>;
