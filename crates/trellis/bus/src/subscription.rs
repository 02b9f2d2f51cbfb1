//! Scoped handler registries and subscription handles

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use trellis_types::{PanelId, ResourceId, Signal};

use crate::handler::SignalHandler;

/// Identifier of one subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub:{}", self.0)
    }
}

/// Where a handler set is attached
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubscriptionScope {
    Global,
    Panel(PanelId),
    Resource(ResourceId),
}

#[derive(Clone)]
struct HandlerEntry {
    id: SubscriptionId,
    handler: Arc<dyn SignalHandler>,
}

type TypedHandlers = HashMap<String, Vec<HandlerEntry>>;

#[derive(Default)]
pub(crate) struct HandlerRegistry {
    next_id: AtomicU64,
    global: DashMap<String, Vec<HandlerEntry>>,
    panel: DashMap<PanelId, TypedHandlers>,
    resource: DashMap<ResourceId, TypedHandlers>,
}

impl HandlerRegistry {
    pub(crate) fn insert(
        &self,
        scope: &SubscriptionScope,
        signal_type: &str,
        handler: Arc<dyn SignalHandler>,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let entry = HandlerEntry { id, handler };

        match scope {
            SubscriptionScope::Global => self
                .global
                .entry(signal_type.to_string())
                .or_default()
                .push(entry),
            SubscriptionScope::Panel(panel_id) => self
                .panel
                .entry(panel_id.clone())
                .or_default()
                .entry(signal_type.to_string())
                .or_default()
                .push(entry),
            SubscriptionScope::Resource(resource_id) => self
                .resource
                .entry(resource_id.clone())
                .or_default()
                .entry(signal_type.to_string())
                .or_default()
                .push(entry),
        }

        id
    }

    pub(crate) fn remove(
        &self,
        scope: &SubscriptionScope,
        signal_type: &str,
        id: SubscriptionId,
    ) -> bool {
        match scope {
            SubscriptionScope::Global => {
                let removed = match self.global.get_mut(signal_type) {
                    Some(mut entries) => remove_entry(&mut entries, id),
                    None => false,
                };
                self.global.remove_if(signal_type, |_, entries| entries.is_empty());
                removed
            }
            SubscriptionScope::Panel(panel_id) => remove_scoped(&self.panel, panel_id, signal_type, id),
            SubscriptionScope::Resource(resource_id) => {
                remove_scoped(&self.resource, resource_id, signal_type, id)
            }
        }
    }

    pub(crate) fn remove_panel(&self, panel_id: &PanelId) -> usize {
        self.panel
            .remove(panel_id)
            .map(|(_, handlers)| count(&handlers))
            .unwrap_or(0)
    }

    pub(crate) fn remove_resource(&self, resource_id: &ResourceId) -> usize {
        self.resource
            .remove(resource_id)
            .map(|(_, handlers)| count(&handlers))
            .unwrap_or(0)
    }

    /// Handlers matching a signal: global first, then panel-scoped, then
    /// resource-scoped, each in registration order.
    pub(crate) fn matching(&self, signal: &Signal) -> Vec<Arc<dyn SignalHandler>> {
        let ty = signal.signal_type.as_str();
        let mut handlers: Vec<Arc<dyn SignalHandler>> = Vec::new();

        if let Some(entries) = self.global.get(ty) {
            handlers.extend(entries.iter().map(|e| e.handler.clone()));
        }

        if let Some(panel_id) = signal.target_panel() {
            if let Some(typed) = self.panel.get(panel_id) {
                if let Some(entries) = typed.get(ty) {
                    handlers.extend(entries.iter().map(|e| e.handler.clone()));
                }
            }
        }

        if let Some(resource_id) = signal.target_resource() {
            if let Some(typed) = self.resource.get(resource_id) {
                if let Some(entries) = typed.get(ty) {
                    handlers.extend(entries.iter().map(|e| e.handler.clone()));
                }
            }
        }

        handlers
    }

    pub(crate) fn count(&self, scope: &SubscriptionScope) -> usize {
        match scope {
            SubscriptionScope::Global => self.global.iter().map(|e| e.value().len()).sum(),
            SubscriptionScope::Panel(panel_id) => {
                self.panel.get(panel_id).map(|h| count(&h)).unwrap_or(0)
            }
            SubscriptionScope::Resource(resource_id) => {
                self.resource.get(resource_id).map(|h| count(&h)).unwrap_or(0)
            }
        }
    }
}

fn remove_entry(entries: &mut Vec<HandlerEntry>, id: SubscriptionId) -> bool {
    let before = entries.len();
    entries.retain(|e| e.id != id);
    entries.len() != before
}

fn remove_scoped<K: Eq + Hash>(
    map: &DashMap<K, TypedHandlers>,
    key: &K,
    signal_type: &str,
    id: SubscriptionId,
) -> bool {
    let removed = match map.get_mut(key) {
        Some(mut typed) => {
            let removed = match typed.get_mut(signal_type) {
                Some(entries) => remove_entry(entries, id),
                None => false,
            };
            typed.retain(|_, entries| !entries.is_empty());
            removed
        }
        None => false,
    };
    map.remove_if(key, |_, typed| typed.is_empty());
    removed
}

fn count(handlers: &TypedHandlers) -> usize {
    handlers.values().map(Vec::len).sum()
}

/// Handle returned by every subscribe call.
///
/// Dropping the handle does not unsubscribe; call [`Subscription::unsubscribe`].
#[derive(Clone)]
pub struct Subscription {
    id: SubscriptionId,
    scope: SubscriptionScope,
    signal_type: String,
    registry: Weak<HandlerRegistry>,
}

impl Subscription {
    pub(crate) fn new(
        id: SubscriptionId,
        scope: SubscriptionScope,
        signal_type: String,
        registry: &Arc<HandlerRegistry>,
    ) -> Self {
        Self {
            id,
            scope,
            signal_type,
            registry: Arc::downgrade(registry),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn scope(&self) -> &SubscriptionScope {
        &self.scope
    }

    pub fn signal_type(&self) -> &str {
        &self.signal_type
    }

    /// Remove the handler. Returns `false` if it was already gone (removed
    /// before, swept by a scope-wide unsubscribe, or the bus was dropped).
    pub fn unsubscribe(&self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => registry.remove(&self.scope, &self.signal_type, self.id),
            None => false,
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("scope", &self.scope)
            .field("signal_type", &self.signal_type)
            .finish()
    }
}
