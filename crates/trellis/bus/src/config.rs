//! Signal bus configuration

use serde::{Deserialize, Serialize};

/// Configuration for a [`SignalBus`](crate::SignalBus)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Number of dispatches kept in the diagnostic history ring.
    pub history_capacity: usize,

    /// Pre-register rules checking that catalogue signal types carry their
    /// matching payload.
    pub validate_catalogue: bool,

    /// Install the tracing middleware at the head of the chain.
    pub trace_signals: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            history_capacity: 100,
            validate_catalogue: true,
            trace_signals: false,
        }
    }
}
