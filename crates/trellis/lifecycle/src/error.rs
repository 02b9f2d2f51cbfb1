//! Error types for the lifecycle manager

use thiserror::Error;
use trellis_types::{CycleError, LifecyclePhase, PanelId, ResourceId};

/// Errors surfaced by [`LifecycleManager`](crate::LifecycleManager) operations
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The resource id was never registered
    #[error("Resource not found: {0}")]
    NotFound(ResourceId),

    /// A live instance with this id is already registered
    #[error("Resource already registered: {0}")]
    AlreadyRegistered(ResourceId),

    /// The operation is not allowed from the resource's current phase
    #[error("Cannot {operation} resource {resource_id} while {phase}")]
    InvalidState {
        resource_id: ResourceId,
        phase: LifecyclePhase,
        operation: &'static str,
    },

    /// A declared dependency is not registered at mount time
    #[error("Resource {resource_id} depends on unregistered resource {dependency}")]
    DependencyMissing {
        resource_id: ResourceId,
        dependency: ResourceId,
    },

    #[error(transparent)]
    Cycle(#[from] CycleError),

    /// The resource's own mount or unmount hook failed
    #[error("{operation} hook failed for {resource_id}: {message}")]
    Hook {
        resource_id: ResourceId,
        operation: &'static str,
        message: String,
    },

    /// The hosting panel refused to add or remove the resource
    #[error("Panel {panel_id} error: {message}")]
    Panel { panel_id: PanelId, message: String },
}

impl LifecycleError {
    pub fn is_cycle(&self) -> bool {
        matches!(self, LifecycleError::Cycle(_))
    }

    pub fn is_invalid_state(&self) -> bool {
        matches!(self, LifecycleError::InvalidState { .. })
    }
}

/// Result type for lifecycle operations
pub type Result<T> = std::result::Result<T, LifecycleError>;
