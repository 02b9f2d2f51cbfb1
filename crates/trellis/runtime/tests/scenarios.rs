//! End-to-end scenarios against a fully wired runtime.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use trellis_bus::handler_fn;
use trellis_cleanup::{strategy_fn, CleanupDependency, CleanupError, CleanupStatus};
use trellis_lifecycle::{InMemoryPanel, LifecycleError, Resource, ResourceConfig};
use trellis_navigation::NavigationTarget;
use trellis_runtime::{TrellisConfig, TrellisRuntime};
use trellis_types::{
    signal_types, CleanupEvent, CleanupReason, LifecyclePhase, PanelVisibility, ResourceId,
    SignalDraft, SignalPayload, SignalSource,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

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
        self.log.lock().push(format!("mount:{}", self.config.id));
        Ok(())
    }

    async fn unmount(&self) -> anyhow::Result<()> {
        self.log.lock().push(format!("unmount:{}", self.config.id));
        Ok(())
    }

    async fn on_cleanup(&self, event: &CleanupEvent) -> anyhow::Result<()> {
        self.log
            .lock()
            .push(format!("cleanup:{}:{}", self.config.id, event.reason));
        Ok(())
    }
}

fn id(s: &str) -> ResourceId {
    ResourceId::new(s)
}

/// `panel-1/video` and `panel-1/captions`, captions depending on video.
async fn video_and_captions(runtime: &TrellisRuntime) -> Log {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let video = ResourceConfig::new("video", "media", "panel-1");
    let captions = ResourceConfig::new("captions", "captions", "panel-1").with_dependency("video");
    for config in [video, captions] {
        let resource = Tracked {
            config,
            log: log.clone(),
        };
        runtime
            .lifecycle()
            .register(Arc::new(resource), vec![])
            .await
            .unwrap();
    }
    log
}

fn record_signals(runtime: &TrellisRuntime, signal_type: &'static str) -> Log {
    let seen: Log = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    runtime.bus().subscribe_global(
        signal_type,
        handler_fn(move |signal| {
            let sink = sink.clone();
            async move {
                let resource = signal
                    .payload
                    .resource_id()
                    .map(|r| r.to_string())
                    .unwrap_or_default();
                sink.lock().push(resource);
                anyhow::Ok(())
            }
        }),
    );
    seen
}

fn runtime() -> TrellisRuntime {
    TrellisRuntime::builder()
        .with_panel(Arc::new(InMemoryPanel::new("panel-1")))
        .build()
        .unwrap()
}

// ---------------------------------------------------------------------------
// Lifecycle scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn mounting_captions_mounts_video_first() {
    let runtime = runtime();
    let log = video_and_captions(&runtime).await;

    let lifecycle = runtime.lifecycle().clone();
    let captions_phase_when_video_mounted = Arc::new(Mutex::new(None));
    let observed = captions_phase_when_video_mounted.clone();
    let mounted = record_signals(&runtime, signal_types::RESOURCE_MOUNTED);
    runtime.bus().subscribe_resource(
        id("video"),
        signal_types::RESOURCE_MOUNTED,
        handler_fn(move |_signal| {
            let lifecycle = lifecycle.clone();
            let observed = observed.clone();
            async move {
                *observed.lock() = lifecycle.phase(&ResourceId::new("captions"));
                anyhow::Ok(())
            }
        }),
    );

    assert_eq!(
        runtime.lifecycle().get_mount_order(&[id("captions")]).unwrap(),
        vec![id("video"), id("captions")]
    );
    runtime.lifecycle().mount(&id("captions")).await.unwrap();

    assert_eq!(*log.lock(), vec!["mount:video", "mount:captions"]);
    assert_eq!(*mounted.lock(), vec!["video", "captions"]);
    assert_eq!(
        *captions_phase_when_video_mounted.lock(),
        Some(LifecyclePhase::Mounting)
    );
    assert_eq!(runtime.lifecycle().phase(&id("video")), Some(LifecyclePhase::Mounted));
    assert_eq!(runtime.lifecycle().phase(&id("captions")), Some(LifecyclePhase::Mounted));

    let panel = runtime.lifecycle().panel(&"panel-1".into()).unwrap();
    assert!(panel.get_resource(&id("captions")).await.is_some());
}

#[tokio::test]
async fn video_cannot_unmount_quietly_while_captions_depend_on_it() {
    let runtime = runtime();
    let log = video_and_captions(&runtime).await;
    runtime.lifecycle().mount(&id("captions")).await.unwrap();

    let check = runtime.lifecycle().can_unmount(&id("video")).unwrap();
    assert!(!check.allowed);
    assert_eq!(check.blocked_by, vec![id("captions")]);

    let unmounted = record_signals(&runtime, signal_types::RESOURCE_UNMOUNTED);
    runtime
        .lifecycle()
        .unmount(&id("video"), CleanupReason::Manual)
        .await
        .unwrap();

    assert_eq!(*unmounted.lock(), vec!["captions", "video"]);
    assert_eq!(
        *log.lock(),
        vec![
            "mount:video",
            "mount:captions",
            "cleanup:video:manual",
            "cleanup:captions:manual",
            "unmount:captions",
            "unmount:video",
        ]
    );
    assert!(runtime.lifecycle().can_unmount(&id("video")).unwrap().allowed);
    assert!(runtime.coordinator().validate_cleanup(&[id("video"), id("captions")]).complete);

    let panel = runtime.lifecycle().panel(&"panel-1".into()).unwrap();
    assert!(panel.get_resource(&id("video")).await.is_none());
}

#[tokio::test]
async fn repeated_mount_and_unmount_emit_nothing_more() {
    let runtime = runtime();
    let log = video_and_captions(&runtime).await;

    runtime.lifecycle().mount(&id("video")).await.unwrap();
    let after_mount = runtime.bus().metrics().total_signals;
    runtime.lifecycle().mount(&id("video")).await.unwrap();
    assert_eq!(runtime.bus().metrics().total_signals, after_mount);

    runtime
        .lifecycle()
        .unmount(&id("video"), CleanupReason::Manual)
        .await
        .unwrap();
    let after_unmount = runtime.bus().metrics().total_signals;
    let cleanups = runtime.coordinator().history().len();
    runtime
        .lifecycle()
        .unmount(&id("video"), CleanupReason::Manual)
        .await
        .unwrap();

    assert_eq!(runtime.bus().metrics().total_signals, after_unmount);
    assert_eq!(runtime.coordinator().history().len(), cleanups);
    assert_eq!(
        log.lock().iter().filter(|l| l.starts_with("mount:video")).count(),
        1
    );
}

#[tokio::test]
async fn dependency_cycles_are_rejected() {
    let runtime = runtime();
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let edges = [("a", "b"), ("b", "c"), ("c", "a")];

    let mut results = Vec::new();
    for (from, to) in edges {
        let resource = Tracked {
            config: ResourceConfig::new(from, "node", "panel-1").with_dependency(to),
            log: log.clone(),
        };
        results.push(runtime.lifecycle().register(Arc::new(resource), vec![]).await);
    }

    assert!(results[0].is_ok());
    assert!(results[1].is_ok());
    match &results[2] {
        Err(LifecycleError::Cycle(cycle)) => {
            assert_eq!(cycle.distinct_members(), vec![id("a"), id("b"), id("c")]);
        }
        other => panic!("expected a cycle error, got {:?}", other),
    }
    assert!(runtime.lifecycle().get_mount_order(&[id("a")]).is_ok());

    let coordinator = runtime.coordinator();
    for (from, to) in edges {
        coordinator.add_cleanup_dependency(CleanupDependency::new(from, to, "alignment", 1));
    }
    assert!(coordinator.has_cycles());
    assert!(matches!(
        coordinator.cleanup_order(&[id("a")]),
        Err(CleanupError::Cycle(_))
    ));
}

// ---------------------------------------------------------------------------
// Bus and cleanup scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failing_handler_does_not_starve_its_sibling() {
    let runtime = runtime();
    let reached = Arc::new(AtomicUsize::new(0));

    runtime.bus().subscribe_global(
        "x",
        handler_fn(|_signal| async { Err::<(), _>(anyhow::anyhow!("first handler broke")) }),
    );
    let counter = reached.clone();
    runtime.bus().subscribe_global(
        "x",
        handler_fn(move |_signal| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                anyhow::Ok(())
            }
        }),
    );

    let emitted = runtime
        .bus()
        .emit(SignalDraft::new(
            "x",
            SignalSource::new("panel-1", "video"),
            SignalPayload::Empty,
        ))
        .await;

    assert!(emitted.is_ok());
    assert_eq!(reached.load(Ordering::SeqCst), 1);
    assert_eq!(runtime.bus().metrics().handler_error_count, 1);
}

#[tokio::test]
async fn overlapping_cleanups_run_strategies_once() {
    let runtime = TrellisRuntime::builder()
        .without_builtin_strategies()
        .build()
        .unwrap();
    let runs = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(tokio::sync::Notify::new());

    let (counter, wait) = (runs.clone(), gate.clone());
    runtime
        .coordinator()
        .register_strategy(strategy_fn("slow", 10, move |_event| {
            let counter = counter.clone();
            let wait = wait.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                wait.notified().await;
                anyhow::Ok(())
            }
        }))
        .unwrap();

    let event = || CleanupEvent::new("video", "media", CleanupReason::Manual);
    let release = async {
        while runs.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        gate.notify_one();
    };
    let (first, second, ()) = tokio::join!(
        runtime.coordinator().execute_cleanup(event()),
        runtime.coordinator().execute_cleanup(event()),
        release,
    );

    let (first, second) = (first.unwrap(), second.unwrap());
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(first, second);
}

#[tokio::test]
async fn partial_strategy_failure_is_reported_as_partial() {
    let runtime = TrellisRuntime::builder()
        .without_builtin_strategies()
        .with_strategy(strategy_fn("high", 100, |_event| async {
            Err::<(), _>(anyhow::anyhow!("high priority strategy broke"))
        }))
        .with_strategy(strategy_fn("low", 50, |_event| async { anyhow::Ok(()) }))
        .build()
        .unwrap();

    let report = runtime
        .cleanup()
        .cleanup_now(CleanupEvent::new("video", "media", CleanupReason::Manual))
        .await
        .unwrap();

    assert_eq!(report.status, CleanupStatus::PartiallyFailed);
    assert!(!report.outcome_of("high").unwrap().success);
    assert!(report.outcome_of("low").unwrap().success);
    assert_eq!(report.strategies[0].strategy, "high");
    assert_eq!(runtime.cleanup().metrics().partial, 1);
}

#[tokio::test]
async fn hiding_a_panel_cleans_its_resources() {
    let runtime = runtime();
    let log = video_and_captions(&runtime).await;
    runtime.lifecycle().mount(&id("captions")).await.unwrap();

    runtime
        .bus()
        .emit(SignalDraft::from_payload(
            SignalSource::component("layout"),
            SignalPayload::PanelVisibilityChanged(PanelVisibility {
                panel_id: "panel-1".into(),
                visibility: "hidden".into(),
                is_visible: false,
            }),
        ))
        .await
        .unwrap();
    runtime.cleanup().flush().await.unwrap();

    let cleaned: Vec<String> = log
        .lock()
        .iter()
        .filter(|l| l.starts_with("cleanup:"))
        .cloned()
        .collect();
    assert_eq!(cleaned, vec!["cleanup:captions:hidden", "cleanup:video:hidden"]);
    assert_eq!(runtime.lifecycle().phase(&id("video")), Some(LifecyclePhase::Mounted));
    assert_eq!(runtime.cleanup().metrics().succeeded, 2);
}

// ---------------------------------------------------------------------------
// Composition root
// ---------------------------------------------------------------------------

#[tokio::test]
async fn config_and_extensions_reach_the_components() {
    let config = TrellisConfig::from_toml_str(
        "[navigation]\nmax_entries = 2\n\n[cleanup]\ncleanup_on_hide = false\n",
    )
    .unwrap();
    let runtime = TrellisRuntime::builder()
        .with_config(config)
        .with_middleware(trellis_bus::TracingMiddleware)
        .with_validation_rule(
            signal_types::NAVIGATE_TO_EXTERNAL,
            trellis_bus::rule_fn(|_signal| Err("external links disabled".to_string())),
        )
        .build()
        .unwrap();

    assert_eq!(runtime.bus().middleware_names(), vec!["tracing"]);
    assert_eq!(
        runtime.coordinator().strategy_names(),
        vec!["highlighting", "resource-hook"]
    );

    let navigation = runtime.navigation();
    for target in ["a", "b", "c"] {
        navigation
            .navigate(NavigationTarget::content(target), None)
            .await
            .unwrap();
    }
    assert_eq!(navigation.len(), 2);
    assert!(navigation
        .navigate(NavigationTarget::external("https://example.org"), None)
        .await
        .is_err());

    // cleanup_on_hide is off, so nothing listens for visibility changes
    assert_eq!(
        runtime
            .bus()
            .subscriber_count(&trellis_bus::SubscriptionScope::Global),
        3
    );

    runtime.shutdown().await;
    assert!(!runtime.cleanup().is_running());
    assert_eq!(
        runtime
            .bus()
            .subscriber_count(&trellis_bus::SubscriptionScope::Global),
        0
    );
}

#[tokio::test]
async fn global_runtime_is_installed_once() {
    assert!(trellis_runtime::global().is_none());

    let installed = trellis_runtime::init_global(runtime()).unwrap();
    assert!(std::ptr::eq(installed, trellis_runtime::global().unwrap()));
    assert!(trellis_runtime::init_global(runtime()).is_err());
}
