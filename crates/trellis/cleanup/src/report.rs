//! Cleanup outcomes

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use trellis_types::{CleanupReason, ResourceId};
use uuid::Uuid;

use crate::error::CleanupError;

/// Overall result of one cleanup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CleanupStatus {
    /// Every selected strategy succeeded.
    Succeeded,
    /// At least one strategy failed and at least one succeeded.
    PartiallyFailed,
    /// Every selected strategy failed.
    Failed,
    /// No registered strategy accepted the event.
    NoStrategies,
}

impl CleanupStatus {
    pub(crate) fn from_counts(succeeded: usize, failed: usize) -> Self {
        match (succeeded, failed) {
            (0, 0) => CleanupStatus::NoStrategies,
            (_, 0) => CleanupStatus::Succeeded,
            (0, _) => CleanupStatus::Failed,
            _ => CleanupStatus::PartiallyFailed,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CleanupStatus::Succeeded => "succeeded",
            CleanupStatus::PartiallyFailed => "partially-failed",
            CleanupStatus::Failed => "failed",
            CleanupStatus::NoStrategies => "no-strategies",
        }
    }

    /// Nothing left to clean for the resource.
    pub fn is_settled(self) -> bool {
        self != CleanupStatus::Failed
    }
}

impl std::fmt::Display for CleanupStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What one strategy did
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyOutcome {
    pub strategy: String,
    pub priority: i32,
    pub success: bool,
    pub error: Option<String>,
    pub duration: Duration,
}

/// Result of executing the selected strategies for one resource
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanupReport {
    pub request_id: Uuid,
    pub resource_id: ResourceId,
    pub resource_type: String,
    pub reason: CleanupReason,
    pub status: CleanupStatus,
    /// In execution order, highest priority first.
    pub strategies: Vec<StrategyOutcome>,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
}

impl CleanupReport {
    pub fn succeeded_strategies(&self) -> Vec<String> {
        self.strategies
            .iter()
            .filter(|s| s.success)
            .map(|s| s.strategy.clone())
            .collect()
    }

    pub fn failed_strategies(&self) -> Vec<String> {
        self.strategies
            .iter()
            .filter(|s| !s.success)
            .map(|s| s.strategy.clone())
            .collect()
    }

    pub fn outcome_of(&self, strategy: &str) -> Option<&StrategyOutcome> {
        self.strategies.iter().find(|s| s.strategy == strategy)
    }
}

/// Result of [`cleanup_with_dependencies`](crate::CleanupCoordinator::cleanup_with_dependencies)
#[derive(Debug, Clone)]
pub struct BatchCleanupReport {
    /// Every resource cleaned, in execution order.
    pub order: Vec<ResourceId>,
    pub outcomes: Vec<(ResourceId, Result<CleanupReport, CleanupError>)>,
}

impl BatchCleanupReport {
    pub fn all_settled(&self) -> bool {
        self.outcomes.iter().all(|(_, r)| r.is_ok())
    }

    /// Resources whose cleanup failed outright.
    pub fn failed(&self) -> Vec<ResourceId> {
        self.outcomes
            .iter()
            .filter(|(_, r)| r.is_err())
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn outcome_for(&self, id: &ResourceId) -> Option<&Result<CleanupReport, CleanupError>> {
        self.outcomes.iter().find(|(r, _)| r == id).map(|(_, o)| o)
    }
}

/// Answer of [`validate_cleanup`](crate::CleanupCoordinator::validate_cleanup)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupValidation {
    pub complete: bool,
    /// Never cleaned, or still in flight.
    pub pending: Vec<ResourceId>,
    pub failed: Vec<ResourceId>,
    /// Cleaned, possibly with some strategies failing.
    pub succeeded: Vec<ResourceId>,
}
