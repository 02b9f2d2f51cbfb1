//! Navigation configuration

use serde::{Deserialize, Serialize};

/// Configuration for a [`NavigationController`](crate::NavigationController)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    /// Entries kept before the oldest is dropped. At least one is always
    /// kept.
    pub max_entries: usize,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self { max_entries: 100 }
    }
}
