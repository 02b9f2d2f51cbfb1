//! Trellis Cleanup - Priority-ordered teardown of resource-derived state
//!
//! When a resource is dismissed, state that other resources derived from it
//! (highlights, alignments, cached lookups) has to go too. The
//! [`CleanupCoordinator`] runs every registered [`CleanupStrategy`] that
//! accepts the event, highest priority first, and never runs two cleanups for
//! the same resource at once. The [`CleanupManager`] puts a serialising work
//! queue, history and metrics in front of it.
//!
//! ## Outcomes
//!
//! | Strategies | Status | Returned as |
//! |---|---|---|
//! | none selected | `NoStrategies` | `Ok` |
//! | all succeeded | `Succeeded` | `Ok` |
//! | some failed | `PartiallyFailed` | `Ok` |
//! | all failed | `Failed` | `Err(StrategiesFailed)` |

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod config;
pub mod coordinator;
pub mod error;
pub mod graph;
pub mod manager;
pub mod report;
pub mod strategy;

pub use config::CleanupConfig;
pub use coordinator::CleanupCoordinator;
pub use error::{CleanupError, Result};
pub use graph::{CleanupDependency, CleanupGraph};
pub use manager::{CleanupManager, CleanupMetrics, CleanupRecord, CleanupTicket};
pub use report::{
    BatchCleanupReport, CleanupReport, CleanupStatus, CleanupValidation, StrategyOutcome,
};
pub use strategy::{
    strategy_fn, CleanupStrategy, FnStrategy, HighlightingCleanupStrategy, ResourceHookStrategy,
};
