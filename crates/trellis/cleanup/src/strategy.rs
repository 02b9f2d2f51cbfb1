//! Cleanup strategies
//!
//! A strategy is a named, prioritized predicate plus an action. The
//! coordinator owns the registry; strategies keep no registry state.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use trellis_bus::SignalBus;
use trellis_lifecycle::LifecycleManager;
use trellis_types::{ClearHighlighting, CleanupEvent, SignalDraft, SignalPayload, SignalSource};

/// One pluggable piece of teardown
#[async_trait]
pub trait CleanupStrategy: Send + Sync {
    /// Unique within a coordinator.
    fn name(&self) -> &str;

    /// Higher runs first.
    fn priority(&self) -> i32;

    fn can_handle(&self, event: &CleanupEvent) -> bool;

    async fn execute(&self, event: &CleanupEvent) -> anyhow::Result<()>;
}

type Predicate = Box<dyn Fn(&CleanupEvent) -> bool + Send + Sync>;

/// Strategy backed by an async closure
pub struct FnStrategy<F> {
    name: String,
    priority: i32,
    predicate: Option<Predicate>,
    f: F,
}

impl<F> FnStrategy<F> {
    /// Only handle events matching `predicate`. Without one, every event is
    /// handled.
    pub fn when<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&CleanupEvent) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Box::new(predicate));
        self
    }
}

#[async_trait]
impl<F, Fut> CleanupStrategy for FnStrategy<F>
where
    F: Fn(CleanupEvent) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn can_handle(&self, event: &CleanupEvent) -> bool {
        self.predicate.as_ref().map_or(true, |p| p(event))
    }

    async fn execute(&self, event: &CleanupEvent) -> anyhow::Result<()> {
        (self.f)(event.clone()).await
    }
}

/// Wrap an async closure as a [`CleanupStrategy`].
pub fn strategy_fn<F, Fut>(name: impl Into<String>, priority: i32, f: F) -> FnStrategy<F>
where
    F: Fn(CleanupEvent) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    FnStrategy {
        name: name.into(),
        priority,
        predicate: None,
        f,
    }
}

/// Asks every highlighting owner to drop marks keyed to the resource by
/// emitting `clear-highlighting`.
#[derive(Debug, Clone)]
pub struct HighlightingCleanupStrategy {
    bus: SignalBus,
    priority: i32,
}

impl HighlightingCleanupStrategy {
    pub const NAME: &'static str = "highlighting";

    pub fn new(bus: SignalBus) -> Self {
        Self { bus, priority: 100 }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

#[async_trait]
impl CleanupStrategy for HighlightingCleanupStrategy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn can_handle(&self, _event: &CleanupEvent) -> bool {
        true
    }

    async fn execute(&self, event: &CleanupEvent) -> anyhow::Result<()> {
        self.bus
            .emit(SignalDraft::from_payload(
                SignalSource::component("cleanup-coordinator"),
                SignalPayload::ClearHighlighting(ClearHighlighting {
                    key: event.resource_id.to_string(),
                    reason: event.reason.to_string(),
                }),
            ))
            .await?;
        Ok(())
    }
}

/// Runs the resource's own `on_cleanup` hook.
pub struct ResourceHookStrategy {
    lifecycle: Arc<LifecycleManager>,
    priority: i32,
}

impl ResourceHookStrategy {
    pub const NAME: &'static str = "resource-hook";

    pub fn new(lifecycle: Arc<LifecycleManager>) -> Self {
        Self {
            lifecycle,
            priority: 50,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

#[async_trait]
impl CleanupStrategy for ResourceHookStrategy {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn can_handle(&self, event: &CleanupEvent) -> bool {
        self.lifecycle.resource(&event.resource_id).is_some()
    }

    async fn execute(&self, event: &CleanupEvent) -> anyhow::Result<()> {
        match self.lifecycle.resource(&event.resource_id) {
            Some(resource) => resource.on_cleanup(event).await,
            None => anyhow::bail!("resource {} is no longer registered", event.resource_id),
        }
    }
}

impl std::fmt::Debug for ResourceHookStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceHookStrategy")
            .field("priority", &self.priority)
            .finish()
    }
}
