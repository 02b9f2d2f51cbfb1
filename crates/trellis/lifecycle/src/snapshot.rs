//! Immutable per-resource state
//!
//! Every transition builds a new [`ResourceSnapshot`] and swaps it in.
//! Readers hold an `Arc` to the version they looked at, which never changes
//! under them.

use chrono::{DateTime, Utc};
use serde::Serialize;
use trellis_types::{LifecyclePhase, PanelId, ResourceId};

use crate::resource::ResourceConfig;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSnapshot {
    pub resource_id: ResourceId,
    pub resource_type: String,
    pub panel_id: PanelId,
    pub phase: LifecyclePhase,
    /// Declared dependencies, sorted.
    pub dependencies: Vec<ResourceId>,
    /// The mount hook completed at least once for this instance.
    pub was_mounted: bool,
    /// Incremented each time the id is registered again after an unmount.
    pub generation: u64,
    pub last_error: Option<String>,
    pub registered_at: DateTime<Utc>,
    pub transitioned_at: DateTime<Utc>,
}

impl ResourceSnapshot {
    pub(crate) fn registered(
        config: &ResourceConfig,
        dependencies: Vec<ResourceId>,
        generation: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            resource_id: config.id.clone(),
            resource_type: config.resource_type.clone(),
            panel_id: config.panel_id.clone(),
            phase: LifecyclePhase::Created,
            dependencies,
            was_mounted: false,
            generation,
            last_error: None,
            registered_at: now,
            transitioned_at: now,
        }
    }

    pub(crate) fn with_phase(&self, phase: LifecyclePhase) -> Self {
        Self {
            phase,
            was_mounted: self.was_mounted || phase == LifecyclePhase::Mounted,
            transitioned_at: Utc::now(),
            ..self.clone()
        }
    }

    pub(crate) fn with_error(&self, message: String) -> Self {
        Self {
            last_error: Some(message),
            ..self.with_phase(LifecyclePhase::Error)
        }
    }

    pub fn is_live(&self) -> bool {
        self.phase.is_live()
    }
}
