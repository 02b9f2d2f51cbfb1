//! Cleanup Manager - queued, serialised cleanup execution
//!
//! Requests are pushed onto a FIFO channel and drained by a single worker
//! task, so queued cleanups never overlap. Each request returns a
//! [`CleanupTicket`] that resolves with the coordinator's report.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use trellis_bus::{handler_fn, Subscription};
use trellis_lifecycle::LifecycleManager;
use trellis_types::{
    signal_types, CleanupEvent, CleanupReason, ResourceId, Signal, SignalPayload,
};
use uuid::Uuid;

use crate::coordinator::CleanupCoordinator;
use crate::error::{CleanupError, Result};
use crate::report::{CleanupReport, CleanupStatus};

enum Job {
    Cleanup {
        event: CleanupEvent,
        reply: oneshot::Sender<Result<CleanupReport>>,
    },
    Flush(oneshot::Sender<()>),
}

/// Handle on a queued cleanup
#[derive(Debug)]
pub struct CleanupTicket {
    ticket_id: Uuid,
    resource_id: ResourceId,
    reply: oneshot::Receiver<Result<CleanupReport>>,
}

impl CleanupTicket {
    pub fn ticket_id(&self) -> Uuid {
        self.ticket_id
    }

    pub fn resource_id(&self) -> &ResourceId {
        &self.resource_id
    }

    /// Wait for the queued cleanup to finish.
    pub async fn wait(self) -> Result<CleanupReport> {
        self.reply.await.unwrap_or(Err(CleanupError::QueueClosed))
    }
}

/// One finished cleanup as seen by the manager
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanupRecord {
    pub resource_id: ResourceId,
    pub reason: CleanupReason,
    pub status: CleanupStatus,
    pub error: Option<String>,
    pub duration: Duration,
    /// `false` for [`CleanupManager::cleanup_now`].
    pub queued: bool,
    pub completed_at: DateTime<Utc>,
}

/// Cleanup counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleanupMetrics {
    /// Accepted requests, queued or immediate.
    pub requests: u64,
    pub succeeded: u64,
    pub partial: u64,
    pub failed: u64,
    pub no_strategies: u64,
    pub average_duration: Duration,
    /// Requests waiting for the worker.
    pub queue_depth: usize,
}

#[derive(Default)]
struct Counters {
    requests: u64,
    succeeded: u64,
    partial: u64,
    failed: u64,
    no_strategies: u64,
    completed: u32,
    total_duration: Duration,
}

struct ManagerShared {
    coordinator: CleanupCoordinator,
    lifecycle: Option<Arc<LifecycleManager>>,
    sender: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    history: Mutex<VecDeque<CleanupRecord>>,
    counters: Mutex<Counters>,
    queue_depth: AtomicUsize,
}

/// Queue and history facade over a [`CleanupCoordinator`]
pub struct CleanupManager {
    shared: Arc<ManagerShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl CleanupManager {
    /// Spawn the worker task. Must be called inside a tokio runtime.
    ///
    /// With a lifecycle manager, queued cleanups pick up resource types from
    /// its snapshots and hidden panels can be cleaned (see
    /// [`attach`](Self::attach)).
    pub fn start(coordinator: CleanupCoordinator, lifecycle: Option<Arc<LifecycleManager>>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let shared = Arc::new(ManagerShared {
            coordinator,
            lifecycle,
            sender: Mutex::new(Some(sender)),
            history: Mutex::new(VecDeque::new()),
            counters: Mutex::new(Counters::default()),
            queue_depth: AtomicUsize::new(0),
        });
        let worker = tokio::spawn(run_worker(shared.clone(), receiver));
        debug!("Cleanup worker started");

        Self {
            shared,
            worker: Mutex::new(Some(worker)),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    pub fn coordinator(&self) -> &CleanupCoordinator {
        &self.shared.coordinator
    }

    /// Queue a cleanup behind everything already queued.
    pub fn enqueue(&self, event: CleanupEvent) -> Result<CleanupTicket> {
        self.shared.enqueue(event)
    }

    /// Queue cleanups for `ids` and their cleanup dependencies, in cleanup
    /// order.
    #[instrument(skip(self, ids, reason), fields(requested = ids.len(), reason = %reason))]
    pub fn enqueue_batch(&self, ids: &[ResourceId], reason: CleanupReason) -> Result<Vec<CleanupTicket>> {
        let order = self.shared.coordinator.cleanup_order(ids)?;
        order
            .into_iter()
            .map(|id| {
                let resource_type = self.shared.resource_type(&id);
                self.shared.enqueue(CleanupEvent::new(id, resource_type, reason))
            })
            .collect()
    }

    /// Run a cleanup right away, without waiting behind the queue.
    pub async fn cleanup_now(&self, event: CleanupEvent) -> Result<CleanupReport> {
        self.shared.counters.lock().requests += 1;
        self.shared.run(event, false).await
    }

    /// Wait until everything queued before this call has finished.
    pub async fn flush(&self) -> Result<()> {
        let (done, wait) = oneshot::channel();
        self.shared.send(Job::Flush(done))?;
        wait.await.map_err(|_| CleanupError::QueueClosed)
    }

    pub fn metrics(&self) -> CleanupMetrics {
        let counters = self.shared.counters.lock();
        let average_duration = if counters.completed == 0 {
            Duration::ZERO
        } else {
            counters.total_duration / counters.completed
        };
        CleanupMetrics {
            requests: counters.requests,
            succeeded: counters.succeeded,
            partial: counters.partial,
            failed: counters.failed,
            no_strategies: counters.no_strategies,
            average_duration,
            queue_depth: self.shared.queue_depth.load(Ordering::SeqCst),
        }
    }

    /// Oldest first.
    pub fn history(&self) -> Vec<CleanupRecord> {
        self.shared.history.lock().iter().cloned().collect()
    }

    pub fn clear_history(&self) {
        self.shared.history.lock().clear();
    }

    /// Queue `hidden` cleanups for the live resources of any panel reported
    /// invisible on the bus. Does nothing unless `cleanup_on_hide` is set and
    /// a lifecycle manager was given.
    pub fn attach(&self) {
        if !self.shared.coordinator.config().cleanup_on_hide || self.shared.lifecycle.is_none() {
            return;
        }
        let weak = Arc::downgrade(&self.shared);
        let subscription = self.shared.coordinator.bus().subscribe_global(
            signal_types::PANEL_VISIBILITY_CHANGED,
            handler_fn(move |signal| {
                let weak = weak.clone();
                async move { on_visibility_changed(weak, signal) }
            }),
        );
        self.subscriptions.lock().push(subscription);
    }

    /// Stop accepting work, let the worker drain the queue and wait for it.
    pub async fn shutdown(&self) {
        for subscription in self.subscriptions.lock().drain(..) {
            subscription.unsubscribe();
        }
        self.shared.sender.lock().take();

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!(error = %e, "Cleanup worker ended abnormally");
            }
            info!("Cleanup manager shut down");
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.sender.lock().is_some()
    }
}

impl Drop for CleanupManager {
    fn drop(&mut self) {
        // Closing the channel lets the worker finish the queue and exit.
        self.shared.sender.lock().take();
    }
}

impl std::fmt::Debug for CleanupManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupManager")
            .field("running", &self.is_running())
            .field("metrics", &self.metrics())
            .finish()
    }
}

impl ManagerShared {
    fn send(&self, job: Job) -> Result<()> {
        let sender = self.sender.lock().clone().ok_or(CleanupError::QueueClosed)?;
        sender.send(job).map_err(|_| CleanupError::QueueClosed)
    }

    fn enqueue(&self, event: CleanupEvent) -> Result<CleanupTicket> {
        let ticket_id = Uuid::new_v4();
        let resource_id = event.resource_id.clone();
        let (reply, receiver) = oneshot::channel();

        self.queue_depth.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = self.send(Job::Cleanup { event, reply }) {
            self.queue_depth.fetch_sub(1, Ordering::SeqCst);
            return Err(e);
        }
        self.counters.lock().requests += 1;
        debug!(resource_id = %resource_id, ticket_id = %ticket_id, "Cleanup queued");

        Ok(CleanupTicket {
            ticket_id,
            resource_id,
            reply: receiver,
        })
    }

    fn resource_type(&self, id: &ResourceId) -> String {
        self.lifecycle
            .as_ref()
            .and_then(|lifecycle| lifecycle.snapshot(id))
            .map(|snapshot| snapshot.resource_type.clone())
            .unwrap_or_else(|| self.coordinator.resource_type(id))
    }

    async fn run(&self, event: CleanupEvent, queued: bool) -> Result<CleanupReport> {
        let resource_id = event.resource_id.clone();
        let reason = event.reason;
        let result = self.coordinator.execute_cleanup(event).await;

        let report = match &result {
            Ok(report) => Some(report),
            Err(e) => e.report(),
        };
        let record = CleanupRecord {
            resource_id,
            reason,
            status: report.map_or(CleanupStatus::Failed, |r| r.status),
            error: result.as_ref().err().map(ToString::to_string),
            duration: report.map_or(Duration::ZERO, |r| r.duration),
            queued,
            completed_at: Utc::now(),
        };
        self.record(record);
        result
    }

    fn record(&self, record: CleanupRecord) {
        {
            let mut counters = self.counters.lock();
            match record.status {
                CleanupStatus::Succeeded => counters.succeeded += 1,
                CleanupStatus::PartiallyFailed => counters.partial += 1,
                CleanupStatus::Failed => counters.failed += 1,
                CleanupStatus::NoStrategies => counters.no_strategies += 1,
            }
            counters.completed = counters.completed.saturating_add(1);
            counters.total_duration += record.duration;
        }

        let capacity = self.coordinator.config().history_capacity;
        if capacity == 0 {
            return;
        }
        let mut history = self.history.lock();
        while history.len() >= capacity {
            history.pop_front();
        }
        history.push_back(record);
    }
}

async fn run_worker(shared: Arc<ManagerShared>, mut receiver: mpsc::UnboundedReceiver<Job>) {
    while let Some(job) = receiver.recv().await {
        match job {
            Job::Cleanup { event, reply } => {
                shared.queue_depth.fetch_sub(1, Ordering::SeqCst);
                let result = shared.run(event, true).await;
                // The caller may have dropped its ticket.
                let _ = reply.send(result);
            }
            Job::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Cleanup worker stopped");
}

fn on_visibility_changed(weak: Weak<ManagerShared>, signal: Signal) -> anyhow::Result<()> {
    let Some(shared) = weak.upgrade() else {
        return Ok(());
    };
    let SignalPayload::PanelVisibilityChanged(visibility) = &signal.payload else {
        return Ok(());
    };
    if visibility.is_visible {
        return Ok(());
    }
    let Some(lifecycle) = shared.lifecycle.as_ref() else {
        return Ok(());
    };

    let ids = lifecycle.resources_in_panel(&visibility.panel_id);
    for id in &ids {
        let event = CleanupEvent::new(id.clone(), shared.resource_type(id), CleanupReason::Hidden)
            .with_metadata(
                "panelId",
                serde_json::Value::from(visibility.panel_id.as_str()),
            );
        shared.enqueue(event)?;
    }
    info!(
        panel_id = %visibility.panel_id,
        queued = ids.len(),
        "Panel hidden, cleanups queued"
    );
    Ok(())
}
