//! Trellis Lifecycle - Dependency-ordered mount and unmount of resources
//!
//! The [`LifecycleManager`] owns the phase table of every registered
//! resource and the mount dependency graph. It sequences resource hooks so a
//! resource is never mounted before its dependencies nor left standing after
//! a dependency it relies on is gone, and announces every transition on the
//! signal bus.
//!
//! ## Transitions and their signals
//!
//! | Operation | Phases | Signals |
//! |---|---|---|
//! | `mount` | created → mounting → mounted | `resource-mounted` |
//! | `begin_update` / `complete_update` | mounted → updating → mounted | `resource-updated` |
//! | `unmount` | any live → unmounting → unmounted | `resource-cleanup`, `resource-unmounted`, `resource-dismissed` |
//! | hook failure | → error | `resource-lifecycle-error` |

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod config;
pub mod error;
pub mod graph;
pub mod manager;
pub mod panel;
pub mod resource;
pub mod snapshot;

pub use config::LifecycleConfig;
pub use error::{LifecycleError, Result};
pub use graph::DependencyGraph;
pub use manager::{LifecycleManager, UnmountCheck};
pub use panel::{InMemoryPanel, Panel};
pub use resource::{Resource, ResourceConfig};
pub use snapshot::ResourceSnapshot;
