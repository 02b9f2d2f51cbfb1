//! Signal bus
//!
//! Emission pipeline: stamp → validate → middleware → route. Routing fans a
//! signal out to global subscribers of its type, then to panel-scoped and
//! resource-scoped subscribers when the signal targets them. Matched handlers
//! run concurrently and `emit` returns once all of them finished.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use futures::future::join_all;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, instrument, warn};
use trellis_types::{signal_types, PanelId, ResourceId, Signal, SignalDraft, SignalId};

use crate::config::BusConfig;
use crate::error::{BusError, Result};
use crate::handler::SignalHandler;
use crate::metrics::{BusMetrics, DispatchHistory, DispatchOutcome, DispatchRecord};
use crate::middleware::{Middleware, Next, TracingMiddleware};
use crate::subscription::{HandlerRegistry, Subscription, SubscriptionScope};
use crate::validation::{CatalogueRule, ValidationRule};

/// What routing did for one signal
#[derive(Debug, Clone, Default)]
pub(crate) struct RouteReport {
    pub(crate) handlers_invoked: usize,
    pub(crate) errors: Vec<String>,
}

/// Per-emission scratch space shared with the middleware chain
#[derive(Default)]
pub(crate) struct DispatchState {
    routed: Mutex<Option<(Signal, RouteReport)>>,
    failed_middleware: Mutex<Option<String>>,
}

impl DispatchState {
    pub(crate) fn record_route(&self, signal: Signal, report: RouteReport) {
        *self.routed.lock() = Some((signal, report));
    }

    pub(crate) fn record_failed_middleware(&self, name: &str) {
        let mut failed = self.failed_middleware.lock();
        if failed.is_none() {
            *failed = Some(name.to_string());
        }
    }

    fn take_route(&self) -> Option<(Signal, RouteReport)> {
        self.routed.lock().take()
    }

    fn failed_middleware(&self) -> Option<String> {
        self.failed_middleware.lock().clone()
    }
}

pub(crate) struct BusInner {
    config: BusConfig,
    registry: Arc<HandlerRegistry>,
    next_signal: AtomicU64,
    rules: DashMap<String, Vec<Arc<dyn ValidationRule>>>,
    middleware: RwLock<Vec<Arc<dyn Middleware>>>,
    metrics: Mutex<BusMetrics>,
    history: Mutex<DispatchHistory>,
}

impl BusInner {
    fn validate(&self, signal: &Signal) -> std::result::Result<(), String> {
        let rules = match self.rules.get(&signal.signal_type) {
            Some(rules) => rules.clone(),
            None => return Ok(()),
        };
        for rule in &rules {
            rule.validate(signal)?;
        }
        Ok(())
    }

    pub(crate) async fn route(&self, signal: &Signal) -> RouteReport {
        let handlers = self.registry.matching(signal);
        if handlers.is_empty() {
            debug!(signal_type = %signal.signal_type, "No subscribers");
            return RouteReport::default();
        }

        let invocations = handlers
            .iter()
            .map(|handler| AssertUnwindSafe(handler.handle(signal)).catch_unwind());
        let results = join_all(invocations).await;

        let mut errors = Vec::new();
        for result in results {
            let message = match result {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => format!("{e:#}"),
                Err(panic) => format!("handler panicked: {}", panic_message(panic.as_ref())),
            };
            warn!(
                signal_id = %signal.id,
                signal_type = %signal.signal_type,
                error = %message,
                "Signal handler failed"
            );
            errors.push(message);
        }

        RouteReport {
            handlers_invoked: handlers.len(),
            errors,
        }
    }

    fn finish(
        &self,
        signal: Signal,
        outcome: DispatchOutcome,
        duration: Duration,
        handlers_invoked: usize,
        errors: Vec<String>,
    ) {
        let handler_errors = match outcome {
            DispatchOutcome::HandlerErrors => errors.len() as u64,
            _ => 0,
        };
        let error_total = match outcome {
            DispatchOutcome::Rejected | DispatchOutcome::MiddlewareFailed => 1,
            _ => handler_errors,
        };

        {
            let mut metrics = self.metrics.lock();
            metrics.record(&signal.signal_type, duration, error_total);
            metrics.handler_error_count += handler_errors;
            if outcome == DispatchOutcome::Halted {
                metrics.halted_count += 1;
            }
        }

        let success = matches!(outcome, DispatchOutcome::Delivered | DispatchOutcome::Halted);
        let error = if errors.is_empty() {
            None
        } else {
            Some(errors.join("; "))
        };
        self.history.lock().push(DispatchRecord {
            signal,
            success,
            outcome,
            duration,
            handlers_invoked,
            error,
        });
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// In-process publish/subscribe bus.
///
/// Cloning is cheap; clones share handlers, rules, middleware and metrics.
#[derive(Clone)]
pub struct SignalBus {
    inner: Arc<BusInner>,
}

impl SignalBus {
    pub fn new(config: BusConfig) -> Self {
        let inner = BusInner {
            registry: Arc::new(HandlerRegistry::default()),
            next_signal: AtomicU64::new(0),
            rules: DashMap::new(),
            middleware: RwLock::new(Vec::new()),
            metrics: Mutex::new(BusMetrics::default()),
            history: Mutex::new(DispatchHistory::new(config.history_capacity)),
            config,
        };
        let bus = Self {
            inner: Arc::new(inner),
        };

        if bus.inner.config.validate_catalogue {
            for ty in signal_types::ALL {
                bus.register_validation_rule(*ty, CatalogueRule::new(*ty));
            }
        }
        if bus.inner.config.trace_signals {
            bus.use_middleware(TracingMiddleware);
        }

        bus
    }

    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    /// Stamp, validate, run middleware and route a signal.
    ///
    /// Resolves once every matched handler has finished. Handler failures are
    /// isolated and never surface here; validation and middleware failures
    /// do.
    #[instrument(skip(self, draft), fields(signal_type = %draft.signal_type))]
    pub async fn emit(&self, draft: SignalDraft) -> Result<SignalId> {
        let started = Instant::now();
        let id = SignalId::from_raw(self.inner.next_signal.fetch_add(1, Ordering::Relaxed) + 1);
        let signal = draft.stamp(id, Utc::now());

        if let Err(reason) = self.inner.validate(&signal) {
            warn!(signal_id = %id, reason = %reason, "Signal rejected by validation");
            let signal_type = signal.signal_type.clone();
            self.inner.finish(
                signal,
                DispatchOutcome::Rejected,
                started.elapsed(),
                0,
                vec![reason.clone()],
            );
            return Err(BusError::Validation {
                signal_type,
                reason,
            });
        }

        let chain: Vec<Arc<dyn Middleware>> = self.inner.middleware.read().clone();
        let state = DispatchState::default();
        let result = Next::new(&chain, &self.inner, &state)
            .run(signal.clone())
            .await;
        let elapsed = started.elapsed();

        if let Err(e) = result {
            let middleware = state
                .failed_middleware()
                .unwrap_or_else(|| "unknown".to_string());
            let message = format!("{e:#}");
            warn!(signal_id = %id, middleware = %middleware, error = %message, "Middleware aborted dispatch");
            let signal_type = signal.signal_type.clone();
            self.inner.finish(
                signal,
                DispatchOutcome::MiddlewareFailed,
                elapsed,
                0,
                vec![message.clone()],
            );
            return Err(BusError::Middleware {
                middleware,
                signal_type,
                message,
            });
        }

        match state.take_route() {
            Some((routed, report)) => {
                let outcome = if report.errors.is_empty() {
                    DispatchOutcome::Delivered
                } else {
                    DispatchOutcome::HandlerErrors
                };
                self.inner
                    .finish(routed, outcome, elapsed, report.handlers_invoked, report.errors);
            }
            None => {
                debug!(signal_id = %id, "Dispatch halted by middleware");
                self.inner
                    .finish(signal, DispatchOutcome::Halted, elapsed, 0, Vec::new());
            }
        }

        Ok(id)
    }

    pub fn subscribe_global<H>(&self, signal_type: impl Into<String>, handler: H) -> Subscription
    where
        H: SignalHandler + 'static,
    {
        self.subscribe(SubscriptionScope::Global, signal_type, Arc::new(handler))
    }

    /// Receive signals of `signal_type` targeted at `panel_id`.
    pub fn subscribe_panel<H>(
        &self,
        panel_id: impl Into<PanelId>,
        signal_type: impl Into<String>,
        handler: H,
    ) -> Subscription
    where
        H: SignalHandler + 'static,
    {
        self.subscribe(
            SubscriptionScope::Panel(panel_id.into()),
            signal_type,
            Arc::new(handler),
        )
    }

    /// Receive signals of `signal_type` targeted at `resource_id`.
    pub fn subscribe_resource<H>(
        &self,
        resource_id: impl Into<ResourceId>,
        signal_type: impl Into<String>,
        handler: H,
    ) -> Subscription
    where
        H: SignalHandler + 'static,
    {
        self.subscribe(
            SubscriptionScope::Resource(resource_id.into()),
            signal_type,
            Arc::new(handler),
        )
    }

    /// Attach an already shared handler to any scope.
    pub fn subscribe(
        &self,
        scope: SubscriptionScope,
        signal_type: impl Into<String>,
        handler: Arc<dyn SignalHandler>,
    ) -> Subscription {
        let signal_type = signal_type.into();
        let id = self.inner.registry.insert(&scope, &signal_type, handler);
        debug!(subscription = %id, signal_type = %signal_type, scope = ?scope, "Subscribed");
        Subscription::new(id, scope, signal_type, &self.inner.registry)
    }

    /// Drop every panel-scoped handler of `panel_id`. Returns how many went.
    pub fn unsubscribe_all_for_panel(&self, panel_id: &PanelId) -> usize {
        let removed = self.inner.registry.remove_panel(panel_id);
        debug!(panel_id = %panel_id, removed, "Removed panel subscriptions");
        removed
    }

    /// Drop every resource-scoped handler of `resource_id`.
    pub fn unsubscribe_all_for_resource(&self, resource_id: &ResourceId) -> usize {
        let removed = self.inner.registry.remove_resource(resource_id);
        debug!(resource_id = %resource_id, removed, "Removed resource subscriptions");
        removed
    }

    pub fn subscriber_count(&self, scope: &SubscriptionScope) -> usize {
        self.inner.registry.count(scope)
    }

    /// Add a rule for `signal_type`. Rules for one type compose: every one of
    /// them must pass.
    pub fn register_validation_rule<R>(&self, signal_type: impl Into<String>, rule: R)
    where
        R: ValidationRule + 'static,
    {
        self.inner
            .rules
            .entry(signal_type.into())
            .or_default()
            .push(Arc::new(rule));
    }

    /// Remove every rule for `signal_type`, catalogue rules included.
    pub fn remove_validation_rule(&self, signal_type: &str) -> usize {
        self.inner
            .rules
            .remove(signal_type)
            .map(|(_, rules)| rules.len())
            .unwrap_or(0)
    }

    /// Append a middleware to the end of the chain.
    pub fn use_middleware<M>(&self, middleware: M)
    where
        M: Middleware + 'static,
    {
        self.inner.middleware.write().push(Arc::new(middleware));
    }

    pub fn middleware_names(&self) -> Vec<String> {
        self.inner
            .middleware
            .read()
            .iter()
            .map(|m| m.name().to_string())
            .collect()
    }

    pub fn metrics(&self) -> BusMetrics {
        self.inner.metrics.lock().clone()
    }

    pub fn reset_metrics(&self) {
        *self.inner.metrics.lock() = BusMetrics::default();
    }

    /// Oldest first.
    pub fn history(&self) -> Vec<DispatchRecord> {
        self.inner.history.lock().snapshot()
    }

    pub fn clear_history(&self) {
        self.inner.history.lock().clear();
    }
}

impl Default for SignalBus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}

impl std::fmt::Debug for SignalBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalBus")
            .field("config", &self.inner.config)
            .field("middleware", &self.middleware_names())
            .finish()
    }
}
