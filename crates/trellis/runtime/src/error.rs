//! Error types for the composition root

use thiserror::Error;
use trellis_bus::BusError;
use trellis_cleanup::CleanupError;
use trellis_lifecycle::LifecycleError;
use trellis_navigation::NavigationError;

#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The configuration file could not be parsed
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A global tracing subscriber is already installed
    #[error("Telemetry error: {0}")]
    Telemetry(String),

    /// The runtime could not be assembled
    #[error("Build error: {0}")]
    Build(String),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Cleanup(#[from] CleanupError),

    #[error(transparent)]
    Navigation(#[from] NavigationError),
}

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;
