//! Signals routed through the bus
//!
//! Emitters build a [`SignalDraft`]; the bus stamps it with an id and a
//! timestamp, turning it into a [`Signal`]. Handlers only ever see a shared
//! reference, so a dispatched signal cannot change under them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{PanelId, ResourceId, SignalId, SignalPayload};

/// Panel used as the source for signals emitted by Trellis components rather
/// than by a resource.
pub const SYSTEM_PANEL: &str = "trellis";

/// Who emitted a signal
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalSource {
    pub panel_id: PanelId,
    pub resource_id: ResourceId,
}

impl SignalSource {
    pub fn new(panel_id: impl Into<PanelId>, resource_id: impl Into<ResourceId>) -> Self {
        Self {
            panel_id: panel_id.into(),
            resource_id: resource_id.into(),
        }
    }

    /// Source for an internal component such as the lifecycle manager.
    pub fn component(name: impl Into<String>) -> Self {
        Self::new(SYSTEM_PANEL, name.into())
    }
}

/// Optional routing scope of a signal
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalTarget {
    pub panel_id: Option<PanelId>,
    pub resource_id: Option<ResourceId>,
}

impl SignalTarget {
    pub fn panel(panel_id: impl Into<PanelId>) -> Self {
        Self {
            panel_id: Some(panel_id.into()),
            resource_id: None,
        }
    }

    pub fn resource(resource_id: impl Into<ResourceId>) -> Self {
        Self {
            panel_id: None,
            resource_id: Some(resource_id.into()),
        }
    }

    pub fn panel_resource(panel_id: impl Into<PanelId>, resource_id: impl Into<ResourceId>) -> Self {
        Self {
            panel_id: Some(panel_id.into()),
            resource_id: Some(resource_id.into()),
        }
    }
}

/// A signal before the bus has stamped it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalDraft {
    #[serde(rename = "type")]
    pub signal_type: String,
    pub source: SignalSource,
    pub target: Option<SignalTarget>,
    pub payload: SignalPayload,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl SignalDraft {
    pub fn new(signal_type: impl Into<String>, source: SignalSource, payload: SignalPayload) -> Self {
        Self {
            signal_type: signal_type.into(),
            source,
            target: None,
            payload,
            metadata: BTreeMap::new(),
        }
    }

    /// Draft whose type string is taken from a catalogue payload.
    ///
    /// Non-catalogue payloads fall back to the `custom` type.
    pub fn from_payload(source: SignalSource, payload: SignalPayload) -> Self {
        let signal_type = payload.canonical_type().unwrap_or("custom");
        Self::new(signal_type, source, payload)
    }

    pub fn with_target(mut self, target: SignalTarget) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Turn the draft into an emitted signal.
    pub fn stamp(self, id: SignalId, timestamp: DateTime<Utc>) -> Signal {
        Signal {
            id,
            signal_type: self.signal_type,
            source: self.source,
            target: self.target,
            payload: self.payload,
            metadata: self.metadata,
            timestamp,
        }
    }
}

/// An emitted signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    pub id: SignalId,
    #[serde(rename = "type")]
    pub signal_type: String,
    pub source: SignalSource,
    pub target: Option<SignalTarget>,
    pub payload: SignalPayload,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl Signal {
    pub fn target_panel(&self) -> Option<&PanelId> {
        self.target.as_ref().and_then(|t| t.panel_id.as_ref())
    }

    pub fn target_resource(&self) -> Option<&ResourceId> {
        self.target.as_ref().and_then(|t| t.resource_id.as_ref())
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }
}
