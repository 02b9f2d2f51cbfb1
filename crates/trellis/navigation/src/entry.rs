//! Navigation targets and history entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use trellis_types::{
    NavigateToContent, NavigateToExternal, NavigateToPanel, NavigateToResource, PanelId,
    ResourceId, SignalPayload, SignalTarget,
};
use uuid::Uuid;

/// Where a navigation goes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum NavigationTarget {
    Resource {
        id: ResourceId,
        #[serde(default)]
        data: serde_json::Value,
    },
    Panel {
        id: PanelId,
        #[serde(default)]
        data: serde_json::Value,
    },
    Content {
        id: String,
        #[serde(default)]
        data: serde_json::Value,
    },
    External {
        url: String,
        #[serde(default)]
        data: serde_json::Value,
    },
}

impl NavigationTarget {
    pub fn resource(id: impl Into<ResourceId>) -> Self {
        NavigationTarget::Resource {
            id: id.into(),
            data: serde_json::Value::Null,
        }
    }

    pub fn panel(id: impl Into<PanelId>) -> Self {
        NavigationTarget::Panel {
            id: id.into(),
            data: serde_json::Value::Null,
        }
    }

    pub fn content(id: impl Into<String>) -> Self {
        NavigationTarget::Content {
            id: id.into(),
            data: serde_json::Value::Null,
        }
    }

    pub fn external(url: impl Into<String>) -> Self {
        NavigationTarget::External {
            url: url.into(),
            data: serde_json::Value::Null,
        }
    }

    /// Attach extra data carried in the emitted payload.
    pub fn with_data(mut self, value: serde_json::Value) -> Self {
        match &mut self {
            NavigationTarget::Resource { data, .. }
            | NavigationTarget::Panel { data, .. }
            | NavigationTarget::Content { data, .. }
            | NavigationTarget::External { data, .. } => *data = value,
        }
        self
    }

    pub fn kind(&self) -> &'static str {
        match self {
            NavigationTarget::Resource { .. } => "resource",
            NavigationTarget::Panel { .. } => "panel",
            NavigationTarget::Content { .. } => "content",
            NavigationTarget::External { .. } => "external",
        }
    }

    /// Matching `navigate-to-*` payload.
    pub fn to_payload(&self) -> SignalPayload {
        match self.clone() {
            NavigationTarget::Resource { id, data } => {
                SignalPayload::NavigateToResource(NavigateToResource {
                    resource_id: id,
                    data,
                })
            }
            NavigationTarget::Panel { id, data } => {
                SignalPayload::NavigateToPanel(NavigateToPanel { panel_id: id, data })
            }
            NavigationTarget::Content { id, data } => {
                SignalPayload::NavigateToContent(NavigateToContent {
                    content_id: id,
                    data,
                })
            }
            NavigationTarget::External { url, data } => {
                SignalPayload::NavigateToExternal(NavigateToExternal { url, data })
            }
        }
    }

    /// Routing scope for the emitted signal; content and external targets
    /// only reach global subscribers.
    pub fn signal_target(&self) -> Option<SignalTarget> {
        match self {
            NavigationTarget::Resource { id, .. } => Some(SignalTarget::resource(id.clone())),
            NavigationTarget::Panel { id, .. } => Some(SignalTarget::panel(id.clone())),
            _ => None,
        }
    }
}

impl std::fmt::Display for NavigationTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NavigationTarget::Resource { id, .. } => write!(f, "resource:{}", id),
            NavigationTarget::Panel { id, .. } => write!(f, "panel:{}", id),
            NavigationTarget::Content { id, .. } => write!(f, "content:{}", id),
            NavigationTarget::External { url, .. } => write!(f, "external:{}", url),
        }
    }
}

/// One step in the navigation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationEntry {
    pub id: Uuid,
    pub target: NavigationTarget,
    pub timestamp: DateTime<Utc>,
    /// Where the user navigated from, when known.
    pub source: Option<NavigationTarget>,
}

impl NavigationEntry {
    pub fn new(target: NavigationTarget, source: Option<NavigationTarget>) -> Self {
        Self {
            id: Uuid::new_v4(),
            target,
            timestamp: Utc::now(),
            source,
        }
    }
}
