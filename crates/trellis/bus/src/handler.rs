//! Signal handlers

use std::future::Future;

use async_trait::async_trait;
use trellis_types::Signal;

/// A subscriber reacting to dispatched signals.
///
/// An error returned here is isolated: it is logged and counted by the bus
/// and never stops sibling handlers or reaches the emitter.
#[async_trait]
pub trait SignalHandler: Send + Sync {
    async fn handle(&self, signal: &Signal) -> anyhow::Result<()>;
}

/// Handler backed by an async closure
pub struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> SignalHandler for FnHandler<F>
where
    F: Fn(Signal) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn handle(&self, signal: &Signal) -> anyhow::Result<()> {
        (self.f)(signal.clone()).await
    }
}

/// Wrap an async closure as a [`SignalHandler`].
///
/// ```rust,no_run
/// # use trellis_bus::{handler_fn, SignalBus};
/// # fn example(bus: &SignalBus) {
/// bus.subscribe_global("resource-mounted", handler_fn(|signal| async move {
///     tracing::info!(id = %signal.id, "mounted");
///     anyhow::Ok(())
/// }));
/// # }
/// ```
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Signal) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    FnHandler { f }
}
