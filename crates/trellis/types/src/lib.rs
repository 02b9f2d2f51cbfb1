//! Trellis Types - Core vocabulary for panel-hosted UI resources
//!
//! Trellis coordinates loosely-coupled UI resources hosted inside panels. It
//! routes typed signals between them, tracks their mount dependencies and
//! tears down their derived state in a deterministic order when they are
//! dismissed.
//!
//! ## Key Concepts
//!
//! - **Signal**: an immutable, typed, timestamped message routed by the bus
//! - **Resource**: an addressable unit of UI-owned state with a lifecycle
//! - **Panel**: a container hosting resources; the scoping unit for routing
//! - **LifecyclePhase**: the resource state machine
//! - **CleanupEvent**: a request to tear down one resource's derived state

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod cleanup;
pub mod graph;
pub mod ids;
pub mod payload;
pub mod phase;
pub mod signal;

pub use cleanup::{CleanupEvent, CleanupReason};
pub use graph::{find_cycle, topological_order, CycleError};
pub use ids::{PanelId, ResourceId, SignalId};
pub use payload::{
    metadata_keys, signal_types, ClearHighlighting, CleanupSummary, LifecycleFailure, NavigateToContent,
    NavigateToExternal, NavigateToPanel, NavigateToResource, PanelVisibility, ResourceDismissed,
    ResourceMounted, ResourceUnmounted, SignalPayload,
};
pub use phase::LifecyclePhase;
pub use signal::{Signal, SignalDraft, SignalSource, SignalTarget, SYSTEM_PANEL};
