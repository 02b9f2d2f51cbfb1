//! Resource lifecycle phases
//!
//! ```text
//! created → mounting → mounted ⇄ updating
//!                         ↓
//!                    unmounting → unmounted
//! ```
//!
//! `error` is reachable from every non-terminal phase. It is not terminal: an
//! errored resource may still be torn down, and a fresh registration recovers
//! it. `unmounted` is terminal for that resource instance.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle phase of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LifecyclePhase {
    Created,
    Mounting,
    Mounted,
    Updating,
    Unmounting,
    Unmounted,
    Error,
}

impl LifecyclePhase {
    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: LifecyclePhase) -> bool {
        use LifecyclePhase::*;

        if next == Error {
            return self != Unmounted;
        }

        matches!(
            (self, next),
            (Created, Mounting)
                | (Created, Unmounting)
                | (Mounting, Mounted)
                // a dependency failure aborts a mount before the hook ran
                | (Mounting, Created)
                | (Mounted, Updating)
                | (Mounted, Unmounting)
                | (Updating, Mounted)
                | (Updating, Unmounting)
                | (Error, Unmounting)
                | (Unmounting, Unmounted)
        )
    }

    /// A live resource takes part in the dependency relation.
    pub fn is_live(self) -> bool {
        self != LifecyclePhase::Unmounted
    }

    pub fn is_terminal(self) -> bool {
        self == LifecyclePhase::Unmounted
    }

    /// Phases in which a dependent blocks the unmount of its dependency.
    pub fn blocks_unmount(self) -> bool {
        matches!(self, LifecyclePhase::Mounted | LifecyclePhase::Mounting)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecyclePhase::Created => "created",
            LifecyclePhase::Mounting => "mounting",
            LifecyclePhase::Mounted => "mounted",
            LifecyclePhase::Updating => "updating",
            LifecyclePhase::Unmounting => "unmounting",
            LifecyclePhase::Unmounted => "unmounted",
            LifecyclePhase::Error => "error",
        }
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
