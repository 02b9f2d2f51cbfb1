//! Cleanup Coordinator - strategy registry and per-resource execution
//!
//! At most one cleanup runs per resource at a time: a second request for a
//! resource already being cleaned awaits the running one and receives the
//! same outcome. Strategies run sequentially in descending priority and a
//! failing strategy never stops the ones after it.
//!
//! Each cleanup runs on its own task. Once started it always finishes:
//! callers that time out or are cancelled stop waiting, the cleanup does not
//! stop running.

use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn, Instrument};
use trellis_bus::{handler_fn, SignalBus, Subscription};
use trellis_types::{
    metadata_keys, signal_types, CleanupEvent, CleanupReason, CleanupSummary, ResourceId, Signal,
    SignalDraft, SignalPayload, SignalSource, SignalTarget,
};
use uuid::Uuid;

use crate::config::CleanupConfig;
use crate::error::{CleanupError, Result};
use crate::graph::{CleanupDependency, CleanupGraph};
use crate::report::{
    BatchCleanupReport, CleanupReport, CleanupStatus, CleanupValidation, StrategyOutcome,
};
use crate::strategy::CleanupStrategy;

const UNKNOWN_TYPE: &str = "unknown";

type InFlight = Shared<BoxFuture<'static, Result<CleanupReport>>>;

tokio::task_local! {
    /// Resources whose cleanup the current task is running on behalf of,
    /// outermost first.
    static CLEANUP_CHAIN: Vec<ResourceId>;
}

/// Last status per resource, forgetting the least recently cleaned first
#[derive(Debug, Default)]
struct OutcomeTable {
    status: HashMap<ResourceId, CleanupStatus>,
    order: VecDeque<ResourceId>,
}

impl OutcomeTable {
    fn insert(&mut self, id: ResourceId, status: CleanupStatus, capacity: usize) {
        if capacity == 0 {
            return;
        }
        if self.status.insert(id.clone(), status).is_some() {
            self.order.retain(|known| known != &id);
        }
        self.order.push_back(id);
        while self.order.len() > capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.status.remove(&oldest);
            }
        }
    }

    fn get(&self, id: &ResourceId) -> Option<CleanupStatus> {
        self.status.get(id).copied()
    }

    fn len(&self) -> usize {
        self.status.len()
    }
}

struct CoordinatorInner {
    bus: SignalBus,
    config: CleanupConfig,
    strategies: RwLock<Vec<Arc<dyn CleanupStrategy>>>,
    graph: RwLock<CleanupGraph>,
    in_flight: DashMap<ResourceId, (Uuid, InFlight)>,
    outcomes: Mutex<OutcomeTable>,
    resource_types: DashMap<ResourceId, String>,
    history: Mutex<VecDeque<CleanupReport>>,
    subscriptions: Mutex<Vec<Subscription>>,
}

/// Runs cleanup strategies for dismissed resources.
///
/// Cloning is cheap; clones share the registry, graph and history.
#[derive(Clone)]
pub struct CleanupCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl CleanupCoordinator {
    pub fn new(bus: SignalBus) -> Self {
        Self::with_config(bus, CleanupConfig::default())
    }

    pub fn with_config(bus: SignalBus, config: CleanupConfig) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                bus,
                config,
                strategies: RwLock::new(Vec::new()),
                graph: RwLock::new(CleanupGraph::new()),
                in_flight: DashMap::new(),
                outcomes: Mutex::new(OutcomeTable::default()),
                resource_types: DashMap::new(),
                history: Mutex::new(VecDeque::new()),
                subscriptions: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &CleanupConfig {
        &self.inner.config
    }

    pub fn bus(&self) -> &SignalBus {
        &self.inner.bus
    }

    pub fn register_strategy<S>(&self, strategy: S) -> Result<()>
    where
        S: CleanupStrategy + 'static,
    {
        self.register_shared_strategy(Arc::new(strategy))
    }

    /// Register a strategy; names are unique.
    pub fn register_shared_strategy(&self, strategy: Arc<dyn CleanupStrategy>) -> Result<()> {
        let mut strategies = self.inner.strategies.write();
        if strategies.iter().any(|s| s.name() == strategy.name()) {
            return Err(CleanupError::DuplicateStrategy(strategy.name().to_string()));
        }
        debug!(
            strategy = %strategy.name(),
            priority = strategy.priority(),
            "Cleanup strategy registered"
        );
        strategies.push(strategy);
        Ok(())
    }

    pub fn unregister_strategy(&self, name: &str) -> Result<()> {
        let mut strategies = self.inner.strategies.write();
        let before = strategies.len();
        strategies.retain(|s| s.name() != name);
        if strategies.len() == before {
            return Err(CleanupError::StrategyNotFound(name.to_string()));
        }
        Ok(())
    }

    /// Registered strategy names, highest priority first.
    pub fn strategy_names(&self) -> Vec<String> {
        let mut strategies = self.inner.strategies.read().clone();
        strategies.sort_by_key(|s| std::cmp::Reverse(s.priority()));
        strategies.iter().map(|s| s.name().to_string()).collect()
    }

    /// Clean one resource.
    ///
    /// A fully failed cleanup is returned as
    /// [`CleanupError::StrategiesFailed`]; a partial one is `Ok` with status
    /// [`CleanupStatus::PartiallyFailed`].
    ///
    /// The strategies run on a spawned task, so this must be called inside a
    /// tokio runtime. Dropping the returned future only stops waiting.
    /// Requesting a resource's cleanup from a strategy or outcome handler of
    /// that same cleanup fails with [`CleanupError::Reentrant`] instead of
    /// waiting on itself.
    #[instrument(skip(self, event), fields(resource_id = %event.resource_id, reason = %event.reason))]
    pub async fn execute_cleanup(&self, event: CleanupEvent) -> Result<CleanupReport> {
        let mut chain = CLEANUP_CHAIN.try_with(|chain| chain.clone()).unwrap_or_default();
        if chain.contains(&event.resource_id) {
            warn!(resource_id = %event.resource_id, chain = ?chain, "Re-entrant cleanup rejected");
            return Err(CleanupError::Reentrant(event.resource_id));
        }

        let in_flight = match self.inner.in_flight.entry(event.resource_id.clone()) {
            Entry::Occupied(running) => {
                debug!(resource_id = %event.resource_id, "Joining in-flight cleanup");
                running.get().1.clone()
            }
            Entry::Vacant(slot) => {
                let request_id = Uuid::new_v4();
                let inner = self.inner.clone();
                chain.push(event.resource_id.clone());

                let task = tokio::spawn(
                    CLEANUP_CHAIN
                        .scope(chain, inner.run(event, request_id))
                        .in_current_span(),
                );
                let joined: BoxFuture<'static, Result<CleanupReport>> = Box::pin(async move {
                    task.await
                        .unwrap_or_else(|e| Err(CleanupError::Interrupted(e.to_string())))
                });
                let shared = joined.shared();
                slot.insert((request_id, shared.clone()));
                shared
            }
        };
        in_flight.await
    }

    pub fn is_in_flight(&self, id: &ResourceId) -> bool {
        self.inner.in_flight.contains_key(id)
    }

    pub fn add_cleanup_dependency(&self, edge: CleanupDependency) {
        debug!(source = %edge.source, target = %edge.target, "Cleanup dependency added");
        self.inner.graph.write().add(edge);
    }

    pub fn remove_cleanup_dependencies(&self, id: &ResourceId) -> usize {
        self.inner.graph.write().remove_resource(id)
    }

    pub fn has_cycles(&self) -> bool {
        self.inner.graph.read().has_cycles()
    }

    /// Order in which `ids` and their cleanup dependencies would be cleaned.
    pub fn cleanup_order(&self, ids: &[ResourceId]) -> Result<Vec<ResourceId>> {
        Ok(self.inner.graph.read().cleanup_order(ids)?)
    }

    /// Clean `ids` and everything reachable from them through cleanup
    /// dependencies.
    ///
    /// A cycle fails the request before anything runs. Past that, a failure
    /// on one resource is logged and the rest are still cleaned.
    #[instrument(skip(self, ids, reason), fields(requested = ids.len(), reason = %reason))]
    pub async fn cleanup_with_dependencies(
        &self,
        ids: &[ResourceId],
        reason: CleanupReason,
    ) -> Result<BatchCleanupReport> {
        let order = self.cleanup_order(ids)?;
        let requested: Vec<&ResourceId> = ids.iter().collect();

        let mut outcomes = Vec::with_capacity(order.len());
        for id in &order {
            let mut event = CleanupEvent::new(id.clone(), self.resource_type(id), reason)
                .with_metadata("batch", serde_json::Value::Bool(true));
            if !requested.contains(&id) {
                event = event.with_metadata("dependency", serde_json::Value::Bool(true));
            }

            let result = self.execute_cleanup(event).await;
            if let Err(e) = &result {
                warn!(resource_id = %id, error = %e, "Cleanup failed, continuing with batch");
            }
            outcomes.push((id.clone(), result));
        }

        Ok(BatchCleanupReport { order, outcomes })
    }

    /// Where each of `ids` stands: pending (never cleaned or in flight),
    /// failed, or succeeded.
    pub fn validate_cleanup(&self, ids: &[ResourceId]) -> CleanupValidation {
        let mut validation = CleanupValidation::default();
        for id in ids {
            if self.inner.in_flight.contains_key(id) {
                validation.pending.push(id.clone());
                continue;
            }
            match self.inner.outcomes.lock().get(id) {
                Some(status) if status.is_settled() => validation.succeeded.push(id.clone()),
                Some(_) => validation.failed.push(id.clone()),
                None => validation.pending.push(id.clone()),
            }
        }
        validation.complete = validation.pending.is_empty() && validation.failed.is_empty();
        validation
    }

    pub fn last_status(&self, id: &ResourceId) -> Option<CleanupStatus> {
        self.inner.outcomes.lock().get(id)
    }

    /// Oldest first.
    pub fn history(&self) -> Vec<CleanupReport> {
        self.inner.history.lock().iter().cloned().collect()
    }

    /// Remember the type of a resource for cleanups started by id only.
    pub fn record_resource_type(&self, id: impl Into<ResourceId>, resource_type: impl Into<String>) {
        self.inner
            .resource_types
            .insert(id.into(), resource_type.into());
    }

    /// Resources with a remembered cleanup outcome.
    pub fn tracked_outcomes(&self) -> usize {
        self.inner.outcomes.lock().len()
    }

    /// Resources with a remembered type.
    pub fn known_resource_types(&self) -> usize {
        self.inner.resource_types.len()
    }

    pub(crate) fn resource_type(&self, id: &ResourceId) -> String {
        self.inner
            .resource_types
            .get(id)
            .map(|t| t.value().clone())
            .unwrap_or_else(|| UNKNOWN_TYPE.to_string())
    }

    /// Subscribe to the lifecycle signals that trigger cleanups.
    ///
    /// `resource-cleanup` and `resource-dismissed` signals start a cleanup,
    /// except dismissals marked as already dispatched. `resource-mounted`
    /// teaches the coordinator resource types; a dismissal forgets them.
    pub fn attach(&self) {
        let bus = self.inner.bus.clone();
        let weak = Arc::downgrade(&self.inner);
        let mut subscriptions = Vec::new();

        for ty in [signal_types::RESOURCE_CLEANUP, signal_types::RESOURCE_DISMISSED] {
            let weak = weak.clone();
            subscriptions.push(bus.subscribe_global(
                ty,
                handler_fn(move |signal| {
                    let weak = weak.clone();
                    async move { on_trigger(weak, signal).await }
                }),
            ));
        }

        let types = weak.clone();
        subscriptions.push(bus.subscribe_global(
            signal_types::RESOURCE_MOUNTED,
            handler_fn(move |signal| {
                let types = types.clone();
                async move {
                    if let (Some(inner), SignalPayload::ResourceMounted(p)) =
                        (types.upgrade(), &signal.payload)
                    {
                        inner
                            .resource_types
                            .insert(p.resource_id.clone(), p.resource_type.clone());
                    }
                    anyhow::Ok(())
                }
            }),
        ));

        self.inner.subscriptions.lock().extend(subscriptions);
        info!("Cleanup coordinator attached to bus");
    }

    /// Drop the bus subscriptions made by [`attach`](Self::attach).
    pub fn detach(&self) -> usize {
        let subscriptions: Vec<Subscription> = self.inner.subscriptions.lock().drain(..).collect();
        subscriptions.iter().filter(|s| s.unsubscribe()).count()
    }
}

impl std::fmt::Debug for CleanupCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupCoordinator")
            .field("config", &self.inner.config)
            .field("strategies", &self.strategy_names())
            .field("in_flight", &self.inner.in_flight.len())
            .finish()
    }
}

async fn on_trigger(weak: Weak<CoordinatorInner>, signal: Signal) -> anyhow::Result<()> {
    let Some(inner) = weak.upgrade() else {
        return Ok(());
    };

    let (event, dismissed) = match &signal.payload {
        SignalPayload::ResourceCleanup(p) => (
            CleanupEvent::new(p.resource_id.clone(), p.resource_type.clone(), p.reason)
                .with_metadata("panelId", serde_json::Value::from(p.panel_id.as_str())),
            None,
        ),
        SignalPayload::ResourceDismissed(p) => {
            if signal.metadata_str(metadata_keys::CLEANUP) == Some(metadata_keys::CLEANUP_DISPATCHED)
            {
                inner.resource_types.remove(&p.resource_id);
                return Ok(());
            }
            (
                CleanupEvent::new(p.resource_id.clone(), p.resource_type.clone(), p.reason),
                Some(p.resource_id.clone()),
            )
        }
        _ => return Ok(()),
    };
    let event = event.with_metadata("signalId", serde_json::Value::from(signal.id.as_u64()));

    let coordinator = CleanupCoordinator { inner };
    let result = coordinator.execute_cleanup(event).await;
    if let Some(id) = dismissed {
        coordinator.inner.resource_types.remove(&id);
    }
    result?;
    Ok(())
}

impl CoordinatorInner {
    async fn run(self: Arc<Self>, event: CleanupEvent, request_id: Uuid) -> Result<CleanupReport> {
        let started = Instant::now();
        let started_at = Utc::now();

        let mut selected: Vec<Arc<dyn CleanupStrategy>> = self
            .strategies
            .read()
            .iter()
            .filter(|s| s.can_handle(&event))
            .cloned()
            .collect();
        selected.sort_by_key(|s| std::cmp::Reverse(s.priority()));

        let mut outcomes = Vec::with_capacity(selected.len());
        for strategy in &selected {
            let strategy_started = Instant::now();
            let result = AssertUnwindSafe(strategy.execute(&event))
                .catch_unwind()
                .await;
            let error = match result {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(format!("{e:#}")),
                Err(_) => Some("strategy panicked".to_string()),
            };
            if let Some(message) = &error {
                warn!(
                    resource_id = %event.resource_id,
                    strategy = %strategy.name(),
                    error = %message,
                    "Cleanup strategy failed"
                );
            }
            outcomes.push(StrategyOutcome {
                strategy: strategy.name().to_string(),
                priority: strategy.priority(),
                success: error.is_none(),
                error,
                duration: strategy_started.elapsed(),
            });
        }

        let succeeded = outcomes.iter().filter(|o| o.success).count();
        let status = CleanupStatus::from_counts(succeeded, outcomes.len() - succeeded);
        let report = CleanupReport {
            request_id,
            resource_id: event.resource_id.clone(),
            resource_type: event.resource_type.clone(),
            reason: event.reason,
            status,
            strategies: outcomes,
            started_at,
            duration: started.elapsed(),
        };

        if report.resource_type != UNKNOWN_TYPE {
            self.resource_types
                .insert(report.resource_id.clone(), report.resource_type.clone());
        }
        self.record(&report);
        self.announce(&report).await;
        log_outcome(&report, started.elapsed());

        self.in_flight
            .remove_if(&report.resource_id, |_, (id, _)| *id == request_id);

        match status {
            CleanupStatus::Failed => Err(CleanupError::StrategiesFailed {
                report: Box::new(report),
            }),
            _ => Ok(report),
        }
    }

    fn record(&self, report: &CleanupReport) {
        self.outcomes.lock().insert(
            report.resource_id.clone(),
            report.status,
            self.config.outcome_capacity,
        );

        let mut history = self.history.lock();
        if self.config.history_capacity == 0 {
            return;
        }
        while history.len() >= self.config.history_capacity {
            history.pop_front();
        }
        history.push_back(report.clone());
    }

    async fn announce(&self, report: &CleanupReport) {
        let summary = CleanupSummary {
            resource_id: report.resource_id.clone(),
            reason: report.reason,
            status: report.status.as_str().to_string(),
            succeeded_strategies: report.succeeded_strategies(),
            failed_strategies: report.failed_strategies(),
        };
        let payload = match report.status {
            CleanupStatus::Failed => SignalPayload::CleanupFailed(summary),
            _ => SignalPayload::CleanupCompleted(summary),
        };

        let draft = SignalDraft::from_payload(SignalSource::component("cleanup-coordinator"), payload)
            .with_target(SignalTarget::resource(report.resource_id.clone()));
        if let Err(e) = self.bus.emit(draft).await {
            warn!(resource_id = %report.resource_id, error = %e, "Cleanup outcome signal rejected");
        }
    }
}

fn log_outcome(report: &CleanupReport, elapsed: Duration) {
    let elapsed_ms = elapsed.as_millis() as u64;
    match report.status {
        CleanupStatus::Succeeded | CleanupStatus::NoStrategies => info!(
            resource_id = %report.resource_id,
            status = %report.status,
            strategies = report.strategies.len(),
            elapsed_ms,
            "Cleanup completed"
        ),
        CleanupStatus::PartiallyFailed => warn!(
            resource_id = %report.resource_id,
            failed = ?report.failed_strategies(),
            elapsed_ms,
            "Cleanup partially failed"
        ),
        CleanupStatus::Failed => error!(
            resource_id = %report.resource_id,
            failed = ?report.failed_strategies(),
            elapsed_ms,
            "Cleanup failed"
        ),
    }
}
