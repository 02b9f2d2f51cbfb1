//! Middleware chain
//!
//! Each middleware receives the signal and a [`Next`] continuation. Calling
//! `next.run(signal)` hands the (possibly rewritten) signal to the rest of the
//! chain and finally to routing. A middleware that returns without calling
//! `next` silently halts propagation; one that returns an error aborts the
//! dispatch and the error reaches the emitter.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::debug;
use trellis_types::Signal;

use crate::bus::{BusInner, DispatchState};

/// A stage of the pre-dispatch pipeline
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Name used in logs and in [`BusError::Middleware`](crate::BusError).
    fn name(&self) -> &str;

    async fn process(&self, signal: Signal, next: Next<'_>) -> anyhow::Result<()>;
}

/// Continuation to the remainder of the middleware chain
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
    inner: &'a BusInner,
    state: &'a DispatchState,
}

impl<'a> Next<'a> {
    pub(crate) fn new(
        chain: &'a [Arc<dyn Middleware>],
        inner: &'a BusInner,
        state: &'a DispatchState,
    ) -> Self {
        Self {
            chain,
            inner,
            state,
        }
    }

    /// Number of middleware stages still ahead of routing.
    pub fn remaining(&self) -> usize {
        self.chain.len()
    }

    /// Pass the signal on.
    pub fn run(self, signal: Signal) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            match self.chain.split_first() {
                Some((middleware, rest)) => {
                    let next = Next::new(rest, self.inner, self.state);
                    let result = middleware.process(signal, next).await;
                    if result.is_err() {
                        // innermost failure wins: it is recorded first on the way out
                        self.state.record_failed_middleware(middleware.name());
                    }
                    result
                }
                None => {
                    let report = self.inner.route(&signal).await;
                    self.state.record_route(signal, report);
                    Ok(())
                }
            }
        })
    }
}

/// Logs every signal passing through the chain at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMiddleware;

#[async_trait]
impl Middleware for TracingMiddleware {
    fn name(&self) -> &str {
        "tracing"
    }

    async fn process(&self, signal: Signal, next: Next<'_>) -> anyhow::Result<()> {
        debug!(
            signal_id = %signal.id,
            signal_type = %signal.signal_type,
            source_panel = %signal.source.panel_id,
            source_resource = %signal.source.resource_id,
            "Dispatching signal"
        );
        next.run(signal).await
    }
}
