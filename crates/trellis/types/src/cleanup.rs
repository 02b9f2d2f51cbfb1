//! Cleanup event vocabulary shared by the lifecycle and cleanup subsystems

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ResourceId;

/// Why a teardown was triggered.
///
/// Informative only: it decides which strategies opt in, never whether the
/// cleanup is correct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CleanupReason {
    Unmounted,
    Hidden,
    PanelSwitched,
    Error,
    Manual,
}

impl CleanupReason {
    pub fn as_str(self) -> &'static str {
        match self {
            CleanupReason::Unmounted => "unmounted",
            CleanupReason::Hidden => "hidden",
            CleanupReason::PanelSwitched => "panel-switched",
            CleanupReason::Error => "error",
            CleanupReason::Manual => "manual",
        }
    }
}

impl fmt::Display for CleanupReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CleanupReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unmounted" => Ok(CleanupReason::Unmounted),
            "hidden" => Ok(CleanupReason::Hidden),
            "panel-switched" => Ok(CleanupReason::PanelSwitched),
            "error" => Ok(CleanupReason::Error),
            "manual" => Ok(CleanupReason::Manual),
            other => Err(format!("unknown cleanup reason '{}'", other)),
        }
    }
}

/// A request to tear down the derived state of one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupEvent {
    pub resource_id: ResourceId,
    pub resource_type: String,
    pub reason: CleanupReason,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl CleanupEvent {
    pub fn new(
        resource_id: impl Into<ResourceId>,
        resource_type: impl Into<String>,
        reason: CleanupReason,
    ) -> Self {
        Self {
            resource_id: resource_id.into(),
            resource_type: resource_type.into(),
            reason,
            timestamp: Utc::now(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}
