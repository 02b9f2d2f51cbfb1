//! Runtime builder

use std::sync::Arc;

use tracing::info;
use trellis_bus::{Middleware, SignalBus, ValidationRule};
use trellis_cleanup::{
    CleanupCoordinator, CleanupManager, CleanupStrategy, HighlightingCleanupStrategy,
    ResourceHookStrategy,
};
use trellis_lifecycle::{LifecycleManager, Panel};
use trellis_navigation::NavigationController;

use crate::config::TrellisConfig;
use crate::error::{Result, RuntimeError};
use crate::runtime::TrellisRuntime;

type BusSetup = Box<dyn FnOnce(&SignalBus) + Send>;

/// Assembles a [`TrellisRuntime`] around a single bus.
pub struct TrellisRuntimeBuilder {
    config: TrellisConfig,
    bus_setup: Vec<BusSetup>,
    strategies: Vec<Arc<dyn CleanupStrategy>>,
    panels: Vec<Arc<dyn Panel>>,
    builtin_strategies: bool,
}

impl TrellisRuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config: TrellisConfig::default(),
            bus_setup: Vec::new(),
            strategies: Vec::new(),
            panels: Vec::new(),
            builtin_strategies: true,
        }
    }

    pub fn with_config(mut self, config: TrellisConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_strategy<S>(mut self, strategy: S) -> Self
    where
        S: CleanupStrategy + 'static,
    {
        self.strategies.push(Arc::new(strategy));
        self
    }

    /// Appended to the bus middleware chain in call order.
    pub fn with_middleware<M>(mut self, middleware: M) -> Self
    where
        M: Middleware + 'static,
    {
        self.bus_setup
            .push(Box::new(move |bus: &SignalBus| bus.use_middleware(middleware)));
        self
    }

    pub fn with_validation_rule<R>(mut self, signal_type: impl Into<String>, rule: R) -> Self
    where
        R: ValidationRule + 'static,
    {
        let signal_type = signal_type.into();
        self.bus_setup.push(Box::new(move |bus: &SignalBus| {
            bus.register_validation_rule(signal_type, rule)
        }));
        self
    }

    pub fn with_panel(mut self, panel: Arc<dyn Panel>) -> Self {
        self.panels.push(panel);
        self
    }

    /// Skip registering the highlighting and resource-hook strategies.
    pub fn without_builtin_strategies(mut self) -> Self {
        self.builtin_strategies = false;
        self
    }

    /// Wire everything together. Spawns the cleanup worker, so this must run
    /// inside a tokio runtime.
    pub fn build(self) -> Result<TrellisRuntime> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(RuntimeError::Build(
                "a tokio runtime is required to start the cleanup worker".to_string(),
            ));
        }
        let config = self.config;

        let bus = SignalBus::new(config.bus.clone());
        for setup in self.bus_setup {
            setup(&bus);
        }

        let lifecycle = Arc::new(LifecycleManager::with_config(
            bus.clone(),
            config.lifecycle.clone(),
        ));
        for panel in self.panels {
            lifecycle.attach_panel(panel);
        }

        let coordinator = CleanupCoordinator::with_config(bus.clone(), config.cleanup.clone());
        if self.builtin_strategies {
            coordinator.register_strategy(HighlightingCleanupStrategy::new(bus.clone()))?;
            coordinator.register_strategy(ResourceHookStrategy::new(lifecycle.clone()))?;
        }
        for strategy in self.strategies {
            coordinator.register_shared_strategy(strategy)?;
        }
        coordinator.attach();

        let cleanup = CleanupManager::start(coordinator.clone(), Some(lifecycle.clone()));
        cleanup.attach();

        let navigation = NavigationController::with_config(bus.clone(), config.navigation.clone());

        info!(
            strategies = ?coordinator.strategy_names(),
            middleware = ?bus.middleware_names(),
            "Trellis runtime built"
        );

        Ok(TrellisRuntime::new(
            config,
            bus,
            lifecycle,
            coordinator,
            cleanup,
            navigation,
        ))
    }
}

impl Default for TrellisRuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
