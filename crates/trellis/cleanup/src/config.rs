//! Cleanup configuration

use serde::{Deserialize, Serialize};

/// Configuration shared by the coordinator and the cleanup manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    /// Reports kept in each bounded history ring.
    pub history_capacity: usize,

    /// Resources whose last cleanup outcome is remembered for
    /// `validate_cleanup`; the oldest is forgotten first.
    pub outcome_capacity: usize,

    /// Queue `hidden` cleanups for every live resource of a panel that
    /// becomes invisible.
    pub cleanup_on_hide: bool,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            history_capacity: 200,
            outcome_capacity: 1024,
            cleanup_on_hide: true,
        }
    }
}
