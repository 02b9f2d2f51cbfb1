//! The coordinator driven by lifecycle signals: unmounting a resource cleans
//! it exactly once, before its own unmount hook runs.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use trellis_bus::{handler_fn, SignalBus};
use trellis_cleanup::{
    CleanupCoordinator, CleanupStatus, HighlightingCleanupStrategy, ResourceHookStrategy,
};
use trellis_lifecycle::{LifecycleManager, Resource, ResourceConfig};
use trellis_types::{
    signal_types, CleanupEvent, CleanupReason, LifecyclePhase, ResourceId, SignalPayload,
};

type Log = Arc<Mutex<Vec<String>>>;

struct Tracked {
    config: ResourceConfig,
    log: Log,
}

#[async_trait]
impl Resource for Tracked {
    fn config(&self) -> ResourceConfig {
        self.config.clone()
    }

    async fn mount(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn unmount(&self) -> anyhow::Result<()> {
        self.log.lock().push(format!("unmount:{}", self.config.id));
        Ok(())
    }

    async fn on_cleanup(&self, event: &CleanupEvent) -> anyhow::Result<()> {
        self.log
            .lock()
            .push(format!("cleanup:{}:{}", event.resource_id, event.reason));
        Ok(())
    }
}

struct Fixture {
    bus: SignalBus,
    lifecycle: Arc<LifecycleManager>,
    coordinator: CleanupCoordinator,
    log: Log,
}

async fn fixture() -> Fixture {
    let bus = SignalBus::default();
    let lifecycle = Arc::new(LifecycleManager::new(bus.clone()));
    let coordinator = CleanupCoordinator::new(bus.clone());
    coordinator
        .register_strategy(HighlightingCleanupStrategy::new(bus.clone()))
        .unwrap();
    coordinator
        .register_strategy(ResourceHookStrategy::new(lifecycle.clone()))
        .unwrap();
    coordinator.attach();

    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let video = ResourceConfig::new("video", "media", "panel-1");
    let captions = ResourceConfig::new("captions", "captions", "panel-1").with_dependency("video");
    for config in [video, captions] {
        let resource = Tracked {
            config,
            log: log.clone(),
        };
        lifecycle.register(Arc::new(resource), vec![]).await.unwrap();
    }

    Fixture {
        bus,
        lifecycle,
        coordinator,
        log,
    }
}

#[tokio::test]
async fn unmount_cleans_each_resource_once_before_its_hook() {
    let f = fixture().await;
    f.lifecycle.mount(&ResourceId::new("captions")).await.unwrap();
    f.lifecycle
        .unmount(&ResourceId::new("video"), CleanupReason::Unmounted)
        .await
        .unwrap();

    assert_eq!(
        *f.log.lock(),
        vec![
            "cleanup:video:unmounted",
            "cleanup:captions:unmounted",
            "unmount:captions",
            "unmount:video",
        ]
    );

    let history = f.coordinator.history();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|r| r.status == CleanupStatus::Succeeded));
    assert_eq!(history[0].strategies[0].strategy, HighlightingCleanupStrategy::NAME);
    assert_eq!(history[0].resource_type, "media");

    let validation = f
        .coordinator
        .validate_cleanup(&[ResourceId::new("video"), ResourceId::new("captions")]);
    assert!(validation.complete);
    assert_eq!(
        f.lifecycle.phase(&ResourceId::new("video")),
        Some(LifecyclePhase::Unmounted)
    );
}

#[tokio::test]
async fn cleanup_announces_highlight_removal_and_completion() {
    let f = fixture().await;
    let seen: Log = Arc::new(Mutex::new(Vec::new()));

    for ty in [signal_types::CLEAR_HIGHLIGHTING, signal_types::CLEANUP_COMPLETED] {
        let seen = seen.clone();
        f.bus.subscribe_global(
            ty,
            handler_fn(move |signal| {
                let seen = seen.clone();
                async move {
                    let entry = match &signal.payload {
                        SignalPayload::ClearHighlighting(p) => format!("clear:{}", p.key),
                        SignalPayload::CleanupCompleted(p) => {
                            format!("completed:{}:{}", p.resource_id, p.status)
                        }
                        _ => String::from("other"),
                    };
                    seen.lock().push(entry);
                    anyhow::Ok(())
                }
            }),
        );
    }

    f.lifecycle.mount(&ResourceId::new("video")).await.unwrap();
    f.lifecycle
        .unmount(&ResourceId::new("video"), CleanupReason::Manual)
        .await
        .unwrap();

    // captions was never mounted but is live, so it is cascaded too
    assert_eq!(
        *seen.lock(),
        vec![
            "clear:video",
            "completed:video:succeeded",
            "clear:captions",
            "completed:captions:succeeded",
        ]
    );
}
