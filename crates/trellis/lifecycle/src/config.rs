//! Lifecycle manager configuration

use serde::{Deserialize, Serialize};

/// Configuration for a [`LifecycleManager`](crate::LifecycleManager)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Announce transitions on the bus. Turning this off silences
    /// `resource-mounted`, `resource-cleanup` and friends, which also keeps a
    /// subscribed cleanup coordinator from running.
    pub emit_signals: bool,
    /// Unmounted resources whose final snapshot stays queryable. Older ones
    /// are forgotten entirely.
    pub retired_capacity: usize,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            emit_signals: true,
            retired_capacity: 64,
        }
    }
}
