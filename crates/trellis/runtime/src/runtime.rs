//! The assembled runtime

use std::sync::Arc;

use tracing::info;
use trellis_bus::SignalBus;
use trellis_cleanup::{CleanupCoordinator, CleanupManager};
use trellis_lifecycle::LifecycleManager;
use trellis_navigation::NavigationController;

use crate::builder::TrellisRuntimeBuilder;
use crate::config::TrellisConfig;

/// Every Trellis component, sharing one bus
pub struct TrellisRuntime {
    config: TrellisConfig,
    bus: SignalBus,
    lifecycle: Arc<LifecycleManager>,
    coordinator: CleanupCoordinator,
    cleanup: CleanupManager,
    navigation: NavigationController,
}

impl TrellisRuntime {
    pub(crate) fn new(
        config: TrellisConfig,
        bus: SignalBus,
        lifecycle: Arc<LifecycleManager>,
        coordinator: CleanupCoordinator,
        cleanup: CleanupManager,
        navigation: NavigationController,
    ) -> Self {
        Self {
            config,
            bus,
            lifecycle,
            coordinator,
            cleanup,
            navigation,
        }
    }

    pub fn builder() -> TrellisRuntimeBuilder {
        TrellisRuntimeBuilder::new()
    }

    pub fn config(&self) -> &TrellisConfig {
        &self.config
    }

    pub fn bus(&self) -> &SignalBus {
        &self.bus
    }

    pub fn lifecycle(&self) -> &Arc<LifecycleManager> {
        &self.lifecycle
    }

    pub fn coordinator(&self) -> &CleanupCoordinator {
        &self.coordinator
    }

    pub fn cleanup(&self) -> &CleanupManager {
        &self.cleanup
    }

    pub fn navigation(&self) -> &NavigationController {
        &self.navigation
    }

    /// Drop the runtime's own bus listeners and stop the cleanup worker once
    /// its queue is drained. Subscriptions made by callers stay in place.
    pub async fn shutdown(&self) {
        let detached = self.coordinator.detach();
        self.cleanup.shutdown().await;
        info!(detached, "Trellis runtime shut down");
    }
}

impl std::fmt::Debug for TrellisRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrellisRuntime")
            .field("config", &self.config)
            .field("bus", &self.bus)
            .field("coordinator", &self.coordinator)
            .field("cleanup", &self.cleanup)
            .field("navigation", &self.navigation)
            .finish()
    }
}
