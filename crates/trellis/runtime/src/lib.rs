//! Trellis Runtime - Composition root
//!
//! Builds one [`SignalBus`](trellis_bus::SignalBus) and hands it to the
//! lifecycle manager, the cleanup coordinator and manager, and the navigation
//! controller. The runtime is the only place that knows about all of them.
//!
//! ## Example
//!
//! ```rust,no_run
//! use trellis_runtime::{telemetry, TrellisConfig, TrellisRuntime};
//!
//! # async fn example() -> trellis_runtime::Result<()> {
//! let config = TrellisConfig::load("trellis.toml")?;
//! telemetry::init_tracing(&config.logging)?;
//!
//! let runtime = TrellisRuntime::builder().with_config(config).build()?;
//! // register resources with runtime.lifecycle(), subscribe on runtime.bus()
//! runtime.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod builder;
pub mod config;
pub mod error;
pub mod global;
pub mod runtime;
pub mod telemetry;

pub use builder::TrellisRuntimeBuilder;
pub use config::{LoggingConfig, TrellisConfig};
pub use error::{Result, RuntimeError};
pub use global::{global, init_global};
pub use runtime::TrellisRuntime;
