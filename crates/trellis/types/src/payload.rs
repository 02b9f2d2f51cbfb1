//! Canonical signal catalogue
//!
//! Payloads are a tagged union. The type string of a signal is still carried
//! separately because new signal types are registered at runtime; the bus
//! enforces the type → payload mapping through its validation rules, using
//! [`SignalPayload::canonical_type`] for the built-in catalogue.

use serde::{Deserialize, Serialize};

use crate::{CleanupReason, LifecyclePhase, PanelId, ResourceId};

/// Type strings of the canonical signal catalogue
pub mod signal_types {
    pub const RESOURCE_MOUNTED: &str = "resource-mounted";
    pub const RESOURCE_UPDATED: &str = "resource-updated";
    pub const RESOURCE_UNMOUNTED: &str = "resource-unmounted";
    pub const RESOURCE_DISMISSED: &str = "resource-dismissed";
    /// Emitted while a resource is still queryable, right before teardown.
    pub const RESOURCE_CLEANUP: &str = "resource-cleanup";
    pub const RESOURCE_LIFECYCLE_ERROR: &str = "resource-lifecycle-error";
    pub const PANEL_VISIBILITY_CHANGED: &str = "panel-visibility-changed";
    pub const CLEAR_HIGHLIGHTING: &str = "clear-highlighting";
    pub const NAVIGATE_TO_RESOURCE: &str = "navigate-to-resource";
    pub const NAVIGATE_TO_PANEL: &str = "navigate-to-panel";
    pub const NAVIGATE_TO_CONTENT: &str = "navigate-to-content";
    pub const NAVIGATE_TO_EXTERNAL: &str = "navigate-to-external";
    pub const CLEANUP_COMPLETED: &str = "cleanup-completed";
    pub const CLEANUP_FAILED: &str = "cleanup-failed";

    /// Every type string with a fixed payload shape.
    pub const ALL: &[&str] = &[
        RESOURCE_MOUNTED,
        RESOURCE_UPDATED,
        RESOURCE_UNMOUNTED,
        RESOURCE_DISMISSED,
        RESOURCE_CLEANUP,
        RESOURCE_LIFECYCLE_ERROR,
        PANEL_VISIBILITY_CHANGED,
        CLEAR_HIGHLIGHTING,
        NAVIGATE_TO_RESOURCE,
        NAVIGATE_TO_PANEL,
        NAVIGATE_TO_CONTENT,
        NAVIGATE_TO_EXTERNAL,
        CLEANUP_COMPLETED,
        CLEANUP_FAILED,
    ];
}

/// Well-known signal metadata keys
pub mod metadata_keys {
    /// Set on a `resource-dismissed` signal whose cleanup was already
    /// dispatched through `resource-cleanup`.
    pub const CLEANUP: &str = "cleanup";
    pub const CLEANUP_DISPATCHED: &str = "dispatched";
}

/// Signal payloads keyed to their type string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "kebab-case")]
pub enum SignalPayload {
    ResourceMounted(ResourceMounted),
    ResourceUpdated(ResourceMounted),
    ResourceUnmounted(ResourceUnmounted),
    ResourceDismissed(ResourceDismissed),
    ResourceCleanup(ResourceUnmounted),
    LifecycleError(LifecycleFailure),
    PanelVisibilityChanged(PanelVisibility),
    ClearHighlighting(ClearHighlighting),
    NavigateToResource(NavigateToResource),
    NavigateToPanel(NavigateToPanel),
    NavigateToContent(NavigateToContent),
    NavigateToExternal(NavigateToExternal),
    CleanupCompleted(CleanupSummary),
    CleanupFailed(CleanupSummary),
    /// Payload of a runtime-registered signal type.
    Custom(serde_json::Value),
    Empty,
}

impl SignalPayload {
    /// The catalogue type string this payload belongs to, if it is a
    /// catalogue payload.
    pub fn canonical_type(&self) -> Option<&'static str> {
        use signal_types::*;

        let ty = match self {
            SignalPayload::ResourceMounted(_) => RESOURCE_MOUNTED,
            SignalPayload::ResourceUpdated(_) => RESOURCE_UPDATED,
            SignalPayload::ResourceUnmounted(_) => RESOURCE_UNMOUNTED,
            SignalPayload::ResourceDismissed(_) => RESOURCE_DISMISSED,
            SignalPayload::ResourceCleanup(_) => RESOURCE_CLEANUP,
            SignalPayload::LifecycleError(_) => RESOURCE_LIFECYCLE_ERROR,
            SignalPayload::PanelVisibilityChanged(_) => PANEL_VISIBILITY_CHANGED,
            SignalPayload::ClearHighlighting(_) => CLEAR_HIGHLIGHTING,
            SignalPayload::NavigateToResource(_) => NAVIGATE_TO_RESOURCE,
            SignalPayload::NavigateToPanel(_) => NAVIGATE_TO_PANEL,
            SignalPayload::NavigateToContent(_) => NAVIGATE_TO_CONTENT,
            SignalPayload::NavigateToExternal(_) => NAVIGATE_TO_EXTERNAL,
            SignalPayload::CleanupCompleted(_) => CLEANUP_COMPLETED,
            SignalPayload::CleanupFailed(_) => CLEANUP_FAILED,
            SignalPayload::Custom(_) | SignalPayload::Empty => return None,
        };
        Some(ty)
    }

    /// Resource the payload talks about, when it names one.
    pub fn resource_id(&self) -> Option<&ResourceId> {
        match self {
            SignalPayload::ResourceMounted(p) | SignalPayload::ResourceUpdated(p) => {
                Some(&p.resource_id)
            }
            SignalPayload::ResourceUnmounted(p) | SignalPayload::ResourceCleanup(p) => {
                Some(&p.resource_id)
            }
            SignalPayload::ResourceDismissed(p) => Some(&p.resource_id),
            SignalPayload::LifecycleError(p) => Some(&p.resource_id),
            SignalPayload::NavigateToResource(p) => Some(&p.resource_id),
            SignalPayload::CleanupCompleted(p) | SignalPayload::CleanupFailed(p) => {
                Some(&p.resource_id)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMounted {
    pub resource_id: ResourceId,
    pub resource_type: String,
    pub panel_id: PanelId,
}

/// Payload of `resource-unmounted` and of the `resource-cleanup` trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceUnmounted {
    pub resource_id: ResourceId,
    pub resource_type: String,
    pub panel_id: PanelId,
    pub reason: CleanupReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDismissed {
    pub resource_id: ResourceId,
    pub resource_type: String,
    pub reason: CleanupReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleFailure {
    pub resource_id: ResourceId,
    pub operation: String,
    pub phase: LifecyclePhase,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelVisibility {
    pub panel_id: PanelId,
    pub visibility: String,
    pub is_visible: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearHighlighting {
    pub key: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigateToResource {
    pub resource_id: ResourceId,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigateToPanel {
    pub panel_id: PanelId,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigateToContent {
    pub content_id: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigateToExternal {
    pub url: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Outcome announcement for one executed cleanup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupSummary {
    pub resource_id: ResourceId,
    pub reason: CleanupReason,
    pub status: String,
    pub succeeded_strategies: Vec<String>,
    pub failed_strategies: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_types_cover_catalogue() {
        let mounted = SignalPayload::ResourceMounted(ResourceMounted {
            resource_id: ResourceId::new("video"),
            resource_type: "media".into(),
            panel_id: PanelId::new("panel-1"),
        });
        assert_eq!(mounted.canonical_type(), Some(signal_types::RESOURCE_MOUNTED));
        assert_eq!(mounted.resource_id().map(|id| id.as_str()), Some("video"));

        assert_eq!(SignalPayload::Custom(serde_json::json!({})).canonical_type(), None);
        assert_eq!(SignalPayload::Empty.canonical_type(), None);
    }

    #[test]
    fn test_payload_wire_shape_is_camel_case() {
        let payload = SignalPayload::PanelVisibilityChanged(PanelVisibility {
            panel_id: PanelId::new("panel-2"),
            visibility: "hidden".into(),
            is_visible: false,
        });
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["kind"], "panel-visibility-changed");
        assert_eq!(json["data"]["panelId"], "panel-2");
        assert_eq!(json["data"]["isVisible"], false);
    }
}
