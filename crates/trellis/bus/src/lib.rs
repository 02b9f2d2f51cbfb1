//! Trellis Bus - Scoped publish/subscribe routing for panel-hosted resources
//!
//! The bus is the leaf component of Trellis: the lifecycle manager, the
//! cleanup coordinator and the navigation controller all talk to each other
//! through it, never directly.
//!
//! ## Pipeline
//!
//! 1. **Stamp**: the draft gets a monotonically increasing id and a timestamp
//! 2. **Validate**: every rule registered for the signal type must pass
//! 3. **Middleware**: each stage may rewrite, halt or abort the dispatch
//! 4. **Route**: global, panel-scoped and resource-scoped handlers run
//!    concurrently; their failures are isolated, logged and counted
//!
//! ## Example
//!
//! ```rust,no_run
//! use trellis_bus::{handler_fn, SignalBus};
//! use trellis_types::{SignalDraft, SignalPayload, SignalSource};
//!
//! # async fn example() -> trellis_bus::Result<()> {
//! let bus = SignalBus::default();
//! bus.subscribe_global("note-saved", handler_fn(|signal| async move {
//!     tracing::info!(id = %signal.id, "saved");
//!     anyhow::Ok(())
//! }));
//!
//! bus.emit(SignalDraft::new(
//!     "note-saved",
//!     SignalSource::new("panel-1", "notes"),
//!     SignalPayload::Empty,
//! ))
//! .await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod bus;
pub mod config;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod middleware;
pub mod subscription;
pub mod validation;

pub use bus::SignalBus;
pub use config::BusConfig;
pub use error::{BusError, Result};
pub use handler::{handler_fn, FnHandler, SignalHandler};
pub use metrics::{BusMetrics, DispatchOutcome, DispatchRecord};
pub use middleware::{Middleware, Next, TracingMiddleware};
pub use subscription::{Subscription, SubscriptionId, SubscriptionScope};
pub use validation::{rule_fn, CatalogueRule, FnRule, ValidationRule};
