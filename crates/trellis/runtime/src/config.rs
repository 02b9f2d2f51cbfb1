//! Runtime configuration
//!
//! One TOML document with a table per subsystem; every table and every key
//! is optional.
//!
//! ```toml
//! [bus]
//! history_capacity = 50
//!
//! [cleanup]
//! cleanup_on_hide = false
//!
//! [logging]
//! level = "debug"
//! json = true
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use trellis_bus::BusConfig;
use trellis_cleanup::CleanupConfig;
use trellis_lifecycle::LifecycleConfig;
use trellis_navigation::NavigationConfig;

use crate::error::{Result, RuntimeError};

/// Logging setup used by [`init_tracing`](crate::telemetry::init_tracing)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set.
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrellisConfig {
    pub bus: BusConfig,
    pub lifecycle: LifecycleConfig,
    pub cleanup: CleanupConfig,
    pub navigation: NavigationConfig,
    pub logging: LoggingConfig,
}

impl TrellisConfig {
    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| RuntimeError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| RuntimeError::Config(e.to_string()))
    }
}
