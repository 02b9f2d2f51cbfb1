//! Trellis Navigation - Undo/redo history of navigation actions
//!
//! The [`NavigationController`] records "go to resource / panel / content /
//! external link" actions in a linear, truncatable history and emits each one
//! as a `navigate-to-*` signal. It only consumes the bus; nothing else in
//! Trellis depends on it.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod config;
pub mod controller;
pub mod entry;
pub mod error;

pub use config::NavigationConfig;
pub use controller::NavigationController;
pub use entry::{NavigationEntry, NavigationTarget};
pub use error::{NavigationError, Result};
