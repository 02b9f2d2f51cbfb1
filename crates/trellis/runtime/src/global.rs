//! Optional process-wide runtime
//!
//! Components never reach for this themselves; they are always handed the
//! bus explicitly. It exists for application entry points that want one
//! default instance.

use std::sync::OnceLock;

use crate::error::{Result, RuntimeError};
use crate::runtime::TrellisRuntime;

static GLOBAL: OnceLock<TrellisRuntime> = OnceLock::new();

/// Install `runtime` as the process-wide instance. Only the first call wins.
pub fn init_global(runtime: TrellisRuntime) -> Result<&'static TrellisRuntime> {
    GLOBAL
        .set(runtime)
        .map_err(|_| RuntimeError::Build("global runtime already initialised".to_string()))?;
    GLOBAL
        .get()
        .ok_or_else(|| RuntimeError::Build("global runtime missing after init".to_string()))
}

pub fn global() -> Option<&'static TrellisRuntime> {
    GLOBAL.get()
}
