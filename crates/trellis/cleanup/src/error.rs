//! Error types for cleanup coordination

use thiserror::Error;
use trellis_bus::BusError;
use trellis_types::{CycleError, ResourceId};

use crate::report::CleanupReport;

/// Errors surfaced by the coordinator and the cleanup manager.
///
/// `Clone` so that every caller awaiting one in-flight cleanup observes the
/// same outcome.
#[derive(Debug, Clone, Error)]
pub enum CleanupError {
    /// A strategy with this name is already registered
    #[error("Cleanup strategy already registered: {0}")]
    DuplicateStrategy(String),

    #[error("Cleanup strategy not found: {0}")]
    StrategyNotFound(String),

    /// Every selected strategy failed; the report lists each failure
    #[error(
        "All {} cleanup strategies failed for {}",
        report.strategies.len(),
        report.resource_id
    )]
    StrategiesFailed { report: Box<CleanupReport> },

    #[error(transparent)]
    Cycle(#[from] CycleError),

    #[error(transparent)]
    Bus(#[from] BusError),

    /// A strategy or outcome handler asked to clean a resource whose
    /// cleanup is what invoked it
    #[error("Cleanup of {0} requested from within its own cleanup")]
    Reentrant(ResourceId),

    /// The task running the cleanup was cancelled before it finished,
    /// typically because the runtime is shutting down
    #[error("Cleanup task interrupted: {0}")]
    Interrupted(String),

    /// The cleanup manager's worker has shut down
    #[error("Cleanup queue closed")]
    QueueClosed,
}

impl CleanupError {
    /// Report of a fully failed cleanup.
    pub fn report(&self) -> Option<&CleanupReport> {
        match self {
            CleanupError::StrategiesFailed { report } => Some(report),
            _ => None,
        }
    }
}

/// Result type for cleanup operations
pub type Result<T> = std::result::Result<T, CleanupError>;
