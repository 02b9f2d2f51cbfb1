//! Lifecycle Manager - phase table, dependency graph and hook sequencing
//!
//! Mounting walks dependencies depth-first before running a resource's own
//! hook. Unmounting announces the cleanup trigger first, tears down live
//! dependents, then runs the resource's own hook.
//!
//! A failed mount does not roll back dependencies that already mounted; they
//! stay mounted and inspectable.
//!
//! An unmounted resource leaves the table. Its final snapshot is kept in a
//! bounded ring of retired snapshots so `phase` still answers `unmounted`
//! for recently torn down ids.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use trellis_bus::SignalBus;
use trellis_types::{
    metadata_keys, CleanupReason, LifecycleFailure, LifecyclePhase, PanelId, ResourceDismissed,
    ResourceId, ResourceMounted, ResourceUnmounted, SignalDraft, SignalPayload, SignalSource,
    SignalTarget,
};

use crate::config::LifecycleConfig;
use crate::error::{LifecycleError, Result};
use crate::graph::DependencyGraph;
use crate::panel::Panel;
use crate::resource::Resource;
use crate::snapshot::ResourceSnapshot;

/// Answer of [`LifecycleManager::can_unmount`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnmountCheck {
    pub allowed: bool,
    /// Live dependents still mounted or mounting, sorted.
    pub blocked_by: Vec<ResourceId>,
}

#[derive(Clone)]
struct ResourceEntry {
    resource: Arc<dyn Resource>,
    snapshot: Arc<ResourceSnapshot>,
}

/// Tracks every registered resource and sequences its hooks.
pub struct LifecycleManager {
    config: LifecycleConfig,
    bus: SignalBus,
    entries: DashMap<ResourceId, ResourceEntry>,
    graph: RwLock<DependencyGraph>,
    panels: DashMap<PanelId, Arc<dyn Panel>>,
    /// Oldest first, one snapshot per id.
    retired: Mutex<VecDeque<Arc<ResourceSnapshot>>>,
}

impl LifecycleManager {
    pub fn new(bus: SignalBus) -> Self {
        Self::with_config(bus, LifecycleConfig::default())
    }

    pub fn with_config(bus: SignalBus, config: LifecycleConfig) -> Self {
        Self {
            config,
            bus,
            entries: DashMap::new(),
            graph: RwLock::new(DependencyGraph::new()),
            panels: DashMap::new(),
            retired: Mutex::new(VecDeque::new()),
        }
    }

    pub fn bus(&self) -> &SignalBus {
        &self.bus
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Keep `panel` in sync with registrations of resources it hosts.
    pub fn attach_panel(&self, panel: Arc<dyn Panel>) {
        let id = panel.id().clone();
        debug!(panel_id = %id, "Panel attached");
        self.panels.insert(id, panel);
    }

    pub fn panel(&self, id: &PanelId) -> Option<Arc<dyn Panel>> {
        self.panels.get(id).map(|p| p.value().clone())
    }

    /// Register a resource in phase `created`.
    ///
    /// Dependencies are the union of the resource's own config and
    /// `depends_on`; they may name resources registered later. A live id is
    /// rejected, an unmounted or errored one is replaced by a fresh instance.
    #[instrument(skip(self, resource, depends_on))]
    pub async fn register(
        &self,
        resource: Arc<dyn Resource>,
        depends_on: Vec<ResourceId>,
    ) -> Result<Arc<ResourceSnapshot>> {
        let config = resource.config();
        let id = config.id.clone();

        let generation = match self.entries.get(&id) {
            Some(existing) => match existing.snapshot.phase {
                LifecyclePhase::Unmounted | LifecyclePhase::Error => {
                    existing.snapshot.generation + 1
                }
                _ => return Err(LifecycleError::AlreadyRegistered(id)),
            },
            None => self.retired(&id).map_or(1, |last| last.generation + 1),
        };

        let mut dependencies: Vec<ResourceId> = config
            .dependencies
            .iter()
            .cloned()
            .chain(depends_on)
            .collect();
        dependencies.sort();
        dependencies.dedup();

        self.graph
            .write()
            .try_insert(&id, dependencies.iter().cloned())?;

        if let Some(panel) = self.panel(&config.panel_id) {
            if let Err(e) = panel.add_resource(resource.clone()).await {
                self.graph.write().remove(&id);
                return Err(LifecycleError::Panel {
                    panel_id: config.panel_id.clone(),
                    message: format!("{e:#}"),
                });
            }
        }

        let snapshot = Arc::new(ResourceSnapshot::registered(
            &config,
            dependencies,
            generation,
        ));
        self.entries.insert(
            id.clone(),
            ResourceEntry {
                resource,
                snapshot: snapshot.clone(),
            },
        );
        self.forget_retired(&id);

        info!(
            resource_id = %id,
            panel_id = %config.panel_id,
            generation,
            dependencies = snapshot.dependencies.len(),
            "Resource registered"
        );
        Ok(snapshot)
    }

    /// Forget a resource that is not active.
    ///
    /// Resources that are mounting, mounted, updating or unmounting must be
    /// unmounted first.
    #[instrument(skip(self, id), fields(resource_id = %id))]
    pub async fn unregister(&self, id: &ResourceId) -> Result<()> {
        let snapshot = self
            .snapshot(id)
            .ok_or_else(|| LifecycleError::NotFound(id.clone()))?;

        match snapshot.phase {
            LifecyclePhase::Created | LifecyclePhase::Error | LifecyclePhase::Unmounted => {}
            phase => {
                return Err(LifecycleError::InvalidState {
                    resource_id: id.clone(),
                    phase,
                    operation: "unregister",
                })
            }
        }

        self.entries.remove(id);
        self.forget_retired(id);
        self.graph.write().remove(id);

        if snapshot.phase != LifecyclePhase::Unmounted {
            self.detach_from_panel(&snapshot).await;
        }

        info!(resource_id = %id, "Resource unregistered");
        Ok(())
    }

    /// Mount a resource after its dependencies.
    ///
    /// Mounting a mounted resource is a no-op. On failure only the resource
    /// whose hook failed moves to `error`; resources still waiting on it go
    /// back to `created` since their own hook never ran.
    #[instrument(skip(self, id), fields(resource_id = %id))]
    pub async fn mount(&self, id: &ResourceId) -> Result<()> {
        let mut visited = HashSet::new();
        self.mount_inner(id, &mut visited).await
    }

    fn mount_inner<'a>(
        &'a self,
        id: &'a ResourceId,
        visited: &'a mut HashSet<ResourceId>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if !visited.insert(id.clone()) {
                return Ok(());
            }

            let entry = self.entry(id)?;
            if matches!(
                entry.snapshot.phase,
                LifecyclePhase::Mounted | LifecyclePhase::Updating
            ) {
                debug!(resource_id = %id, "Already mounted");
                return Ok(());
            }

            let mounting = self.transition(id, LifecyclePhase::Mounting, "mount")?;

            for dependency in &mounting.dependencies {
                let result = if self.entries.contains_key(dependency) {
                    self.mount_inner(dependency, &mut *visited).await
                } else {
                    Err(LifecycleError::DependencyMissing {
                        resource_id: id.clone(),
                        dependency: dependency.clone(),
                    })
                };

                if let Err(e) = result {
                    if let Err(revert) = self.transition(id, LifecyclePhase::Created, "mount") {
                        warn!(resource_id = %id, error = %revert, "Could not revert aborted mount");
                    }
                    return Err(e);
                }
            }

            if let Err(e) = entry.resource.mount().await {
                let message = format!("{e:#}");
                self.record_failure(id, "mount", &message).await;
                return Err(LifecycleError::Hook {
                    resource_id: id.clone(),
                    operation: "mount",
                    message,
                });
            }

            let mounted = self.transition(id, LifecyclePhase::Mounted, "mount")?;
            info!(resource_id = %id, panel_id = %mounted.panel_id, "Resource mounted");

            self.announce(
                SignalDraft::from_payload(
                    source_of(&mounted),
                    SignalPayload::ResourceMounted(ResourceMounted {
                        resource_id: id.clone(),
                        resource_type: mounted.resource_type.clone(),
                        panel_id: mounted.panel_id.clone(),
                    }),
                )
                .with_target(target_of(&mounted)),
            )
            .await;

            Ok(())
        })
    }

    /// Tear a resource down, live dependents first.
    ///
    /// Unmounting an unmounted resource is a no-op. The `resource-cleanup`
    /// trigger goes out before any hook runs, while the resource can still
    /// be queried.
    #[instrument(skip(self, id, reason), fields(resource_id = %id, reason = %reason))]
    pub async fn unmount(&self, id: &ResourceId, reason: CleanupReason) -> Result<()> {
        let mut visited = HashSet::new();
        self.unmount_inner(id, reason, &mut visited).await
    }

    fn unmount_inner<'a>(
        &'a self,
        id: &'a ResourceId,
        reason: CleanupReason,
        visited: &'a mut HashSet<ResourceId>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if !visited.insert(id.clone()) {
                return Ok(());
            }

            let entry = match self.entries.get(id) {
                Some(entry) => entry.value().clone(),
                None if self.retired(id).is_some() => {
                    debug!(resource_id = %id, "Already unmounted");
                    return Ok(());
                }
                None => return Err(LifecycleError::NotFound(id.clone())),
            };

            let unmounting = self.transition(id, LifecyclePhase::Unmounting, "unmount")?;

            self.announce(
                SignalDraft::from_payload(
                    source_of(&unmounting),
                    SignalPayload::ResourceCleanup(unmounted_payload(&unmounting, reason)),
                )
                .with_target(target_of(&unmounting)),
            )
            .await;

            for dependent in self.live_dependents(id) {
                if let Err(e) = self.unmount_inner(&dependent, reason, &mut *visited).await {
                    warn!(
                        resource_id = %id,
                        dependent = %dependent,
                        error = %e,
                        "Dependent failed to unmount"
                    );
                }
            }

            if unmounting.was_mounted {
                if let Err(e) = entry.resource.unmount().await {
                    let message = format!("{e:#}");
                    self.record_failure(id, "unmount", &message).await;
                    return Err(LifecycleError::Hook {
                        resource_id: id.clone(),
                        operation: "unmount",
                        message,
                    });
                }
            }

            let unmounted = self.transition(id, LifecyclePhase::Unmounted, "unmount")?;
            self.graph.write().remove(id);
            self.retire(id);
            self.detach_from_panel(&unmounted).await;
            info!(resource_id = %id, reason = %reason, "Resource unmounted");

            self.announce(
                SignalDraft::from_payload(
                    source_of(&unmounted),
                    SignalPayload::ResourceUnmounted(unmounted_payload(&unmounted, reason)),
                )
                .with_target(target_of(&unmounted)),
            )
            .await;
            self.announce(
                SignalDraft::from_payload(
                    source_of(&unmounted),
                    SignalPayload::ResourceDismissed(ResourceDismissed {
                        resource_id: id.clone(),
                        resource_type: unmounted.resource_type.clone(),
                        reason,
                    }),
                )
                .with_target(target_of(&unmounted))
                .with_metadata(
                    metadata_keys::CLEANUP,
                    serde_json::Value::from(metadata_keys::CLEANUP_DISPATCHED),
                ),
            )
            .await;

            self.bus.unsubscribe_all_for_resource(id);
            Ok(())
        })
    }

    /// Move a mounted resource to `updating`.
    pub fn begin_update(&self, id: &ResourceId) -> Result<Arc<ResourceSnapshot>> {
        self.transition(id, LifecyclePhase::Updating, "update")
    }

    /// Finish an update and announce `resource-updated`.
    pub async fn complete_update(&self, id: &ResourceId) -> Result<Arc<ResourceSnapshot>> {
        let current = self
            .snapshot(id)
            .ok_or_else(|| LifecycleError::NotFound(id.clone()))?;
        if current.phase != LifecyclePhase::Updating {
            return Err(LifecycleError::InvalidState {
                resource_id: id.clone(),
                phase: current.phase,
                operation: "complete update",
            });
        }

        let mounted = self.transition(id, LifecyclePhase::Mounted, "complete update")?;
        self.announce(
            SignalDraft::from_payload(
                source_of(&mounted),
                SignalPayload::ResourceUpdated(ResourceMounted {
                    resource_id: id.clone(),
                    resource_type: mounted.resource_type.clone(),
                    panel_id: mounted.panel_id.clone(),
                }),
            )
            .with_target(target_of(&mounted)),
        )
        .await;
        Ok(mounted)
    }

    /// Whether `id` can go away without forcing a dependent down with it.
    pub fn can_unmount(&self, id: &ResourceId) -> Result<UnmountCheck> {
        if self.snapshot(id).is_none() {
            return Err(LifecycleError::NotFound(id.clone()));
        }

        let blocked_by: Vec<ResourceId> = self
            .live_dependents(id)
            .into_iter()
            .filter(|d| self.phase(d).is_some_and(LifecyclePhase::blocks_unmount))
            .collect();

        Ok(UnmountCheck {
            allowed: blocked_by.is_empty(),
            blocked_by,
        })
    }

    /// Dependencies before dependents, pulling in everything `ids` depend on.
    pub fn get_mount_order(&self, ids: &[ResourceId]) -> Result<Vec<ResourceId>> {
        Ok(self.graph.read().mount_order(ids)?)
    }

    /// Dependents before dependencies, pulling in every registered dependent.
    pub fn get_unmount_order(&self, ids: &[ResourceId]) -> Result<Vec<ResourceId>> {
        Ok(self.graph.read().unmount_order(ids)?)
    }

    /// Registered, not unmounted, direct dependents of `id`, sorted.
    pub fn live_dependents(&self, id: &ResourceId) -> Vec<ResourceId> {
        let dependents = self.graph.read().dependents_of(id);
        dependents
            .into_iter()
            .filter(|d| self.phase(d).is_some_and(LifecyclePhase::is_live))
            .collect()
    }

    /// Current snapshot, or the final one of a recently unmounted resource.
    pub fn snapshot(&self, id: &ResourceId) -> Option<Arc<ResourceSnapshot>> {
        self.entries
            .get(id)
            .map(|e| e.snapshot.clone())
            .or_else(|| self.retired(id))
    }

    pub fn phase(&self, id: &ResourceId) -> Option<LifecyclePhase> {
        self.snapshot(id).map(|s| s.phase)
    }

    /// Registered resources; retired snapshots are not counted.
    pub fn resource_count(&self) -> usize {
        self.entries.len()
    }

    /// Final snapshots of unmounted resources still remembered, oldest first.
    pub fn retired_snapshots(&self) -> Vec<Arc<ResourceSnapshot>> {
        self.retired.lock().iter().cloned().collect()
    }

    pub fn resource(&self, id: &ResourceId) -> Option<Arc<dyn Resource>> {
        self.entries.get(id).map(|e| e.resource.clone())
    }

    /// Live resources hosted by `panel_id`, sorted.
    pub fn resources_in_panel(&self, panel_id: &PanelId) -> Vec<ResourceId> {
        let mut ids: Vec<ResourceId> = self
            .entries
            .iter()
            .filter(|e| &e.snapshot.panel_id == panel_id && e.snapshot.is_live())
            .map(|e| e.key().clone())
            .collect();
        ids.sort();
        ids
    }

    /// Snapshots of every registration, sorted by id. Retired snapshots are
    /// listed by [`retired_snapshots`](Self::retired_snapshots).
    pub fn snapshots(&self) -> Vec<Arc<ResourceSnapshot>> {
        let mut all: Vec<_> = self.entries.iter().map(|e| e.snapshot.clone()).collect();
        all.sort_by(|a, b| a.resource_id.cmp(&b.resource_id));
        all
    }

    fn retired(&self, id: &ResourceId) -> Option<Arc<ResourceSnapshot>> {
        self.retired
            .lock()
            .iter()
            .find(|s| &s.resource_id == id)
            .cloned()
    }

    /// Move an unmounted entry out of the table into the retired ring.
    fn retire(&self, id: &ResourceId) {
        let Some((_, entry)) = self.entries.remove(id) else {
            return;
        };
        let mut retired = self.retired.lock();
        retired.retain(|s| &s.resource_id != id);
        if self.config.retired_capacity == 0 {
            return;
        }
        while retired.len() >= self.config.retired_capacity {
            retired.pop_front();
        }
        retired.push_back(entry.snapshot);
    }

    fn forget_retired(&self, id: &ResourceId) {
        self.retired.lock().retain(|s| &s.resource_id != id);
    }

    fn entry(&self, id: &ResourceId) -> Result<ResourceEntry> {
        self.entries
            .get(id)
            .map(|e| e.value().clone())
            .ok_or_else(|| LifecycleError::NotFound(id.clone()))
    }

    fn transition(
        &self,
        id: &ResourceId,
        next: LifecyclePhase,
        operation: &'static str,
    ) -> Result<Arc<ResourceSnapshot>> {
        let mut entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| LifecycleError::NotFound(id.clone()))?;

        let current = entry.snapshot.phase;
        if !current.can_transition_to(next) {
            return Err(LifecycleError::InvalidState {
                resource_id: id.clone(),
                phase: current,
                operation,
            });
        }

        let snapshot = Arc::new(entry.snapshot.with_phase(next));
        entry.snapshot = snapshot.clone();
        debug!(resource_id = %id, from = %current, to = %next, "Phase transition");
        Ok(snapshot)
    }

    async fn record_failure(&self, id: &ResourceId, operation: &'static str, message: &str) {
        let failed = {
            let mut entry = match self.entries.get_mut(id) {
                Some(entry) => entry,
                None => return,
            };
            let previous = entry.snapshot.phase;
            if !previous.can_transition_to(LifecyclePhase::Error) {
                return;
            }
            let failed = Arc::new(entry.snapshot.with_error(message.to_string()));
            entry.snapshot = failed.clone();
            (failed, previous)
        };
        let (snapshot, previous) = failed;

        warn!(
            resource_id = %id,
            operation,
            phase = %previous,
            error = %message,
            "Lifecycle hook failed"
        );

        self.announce(
            SignalDraft::from_payload(
                source_of(&snapshot),
                SignalPayload::LifecycleError(LifecycleFailure {
                    resource_id: id.clone(),
                    operation: operation.to_string(),
                    phase: previous,
                    message: message.to_string(),
                }),
            )
            .with_target(target_of(&snapshot)),
        )
        .await;
    }

    async fn detach_from_panel(&self, snapshot: &ResourceSnapshot) {
        if let Some(panel) = self.panel(&snapshot.panel_id) {
            if let Err(e) = panel.remove_resource(&snapshot.resource_id).await {
                warn!(
                    resource_id = %snapshot.resource_id,
                    panel_id = %snapshot.panel_id,
                    error = %format!("{e:#}"),
                    "Panel failed to remove resource"
                );
            }
        }
    }

    /// Lifecycle announcements never fail a transition; a rejected signal is
    /// only logged.
    async fn announce(&self, draft: SignalDraft) {
        if !self.config.emit_signals {
            return;
        }
        let signal_type = draft.signal_type.clone();
        if let Err(e) = self.bus.emit(draft).await {
            warn!(signal_type = %signal_type, error = %e, "Lifecycle signal rejected");
        }
    }
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("config", &self.config)
            .field("resources", &self.entries.len())
            .field("retired", &self.retired.lock().len())
            .field("panels", &self.panels.len())
            .finish()
    }
}

fn source_of(snapshot: &ResourceSnapshot) -> SignalSource {
    SignalSource::new(snapshot.panel_id.clone(), snapshot.resource_id.clone())
}

fn target_of(snapshot: &ResourceSnapshot) -> SignalTarget {
    SignalTarget::panel_resource(snapshot.panel_id.clone(), snapshot.resource_id.clone())
}

fn unmounted_payload(snapshot: &ResourceSnapshot, reason: CleanupReason) -> ResourceUnmounted {
    ResourceUnmounted {
        resource_id: snapshot.resource_id.clone(),
        resource_type: snapshot.resource_type.clone(),
        panel_id: snapshot.panel_id.clone(),
        reason,
    }
}
