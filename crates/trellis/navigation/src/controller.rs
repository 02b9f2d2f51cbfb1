//! Navigation Controller
//!
//! A linear history with a cursor. Navigating drops everything after the
//! cursor; going back or forward moves the cursor and emits the entry it
//! lands on again, so listeners react the same way as to the original
//! navigation.

use parking_lot::Mutex;
use tracing::{debug, instrument};
use trellis_bus::SignalBus;
use trellis_types::{SignalDraft, SignalSource};

use crate::config::NavigationConfig;
use crate::entry::{NavigationEntry, NavigationTarget};
use crate::error::{NavigationError, Result};

const COMPONENT: &str = "navigation";

#[derive(Debug, Default)]
struct History {
    entries: Vec<NavigationEntry>,
    /// Index of the current entry; `None` only while empty.
    cursor: Option<usize>,
}

impl History {
    fn push(&mut self, entry: NavigationEntry, max_entries: usize) {
        if let Some(cursor) = self.cursor {
            self.entries.truncate(cursor + 1);
        }
        self.entries.push(entry);

        let overflow = self.entries.len().saturating_sub(max_entries.max(1));
        if overflow > 0 {
            self.entries.drain(..overflow);
        }
        self.cursor = Some(self.entries.len() - 1);
    }

    fn current(&self) -> Option<&NavigationEntry> {
        self.cursor.and_then(|i| self.entries.get(i))
    }

    fn can_go_back(&self) -> bool {
        matches!(self.cursor, Some(i) if i > 0)
    }

    fn can_go_forward(&self) -> bool {
        matches!(self.cursor, Some(i) if i + 1 < self.entries.len())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    New,
    Back,
    Forward,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Direction::New => "new",
            Direction::Back => "back",
            Direction::Forward => "forward",
        }
    }
}

/// Undo/redo history of navigation actions
pub struct NavigationController {
    bus: SignalBus,
    config: NavigationConfig,
    history: Mutex<History>,
}

impl NavigationController {
    pub fn new(bus: SignalBus) -> Self {
        Self::with_config(bus, NavigationConfig::default())
    }

    pub fn with_config(bus: SignalBus, config: NavigationConfig) -> Self {
        Self {
            bus,
            config,
            history: Mutex::new(History::default()),
        }
    }

    pub fn config(&self) -> &NavigationConfig {
        &self.config
    }

    /// Record a navigation and emit its `navigate-to-*` signal.
    ///
    /// The entry is recorded before the signal goes out, so handlers already
    /// see it as [`current`](Self::current). It stays recorded even if the
    /// bus rejects the signal.
    #[instrument(skip(self, target, source), fields(target = %target))]
    pub async fn navigate(
        &self,
        target: NavigationTarget,
        source: Option<NavigationTarget>,
    ) -> Result<NavigationEntry> {
        let entry = NavigationEntry::new(target, source);
        self.history
            .lock()
            .push(entry.clone(), self.config.max_entries);

        self.emit(&entry, Direction::New).await?;
        Ok(entry)
    }

    /// Step back one entry and emit it again.
    pub async fn back(&self) -> Result<NavigationEntry> {
        let entry = {
            let mut history = self.history.lock();
            let cursor = match history.cursor {
                Some(i) if i > 0 => i - 1,
                _ => return Err(NavigationError::NothingToGoBack),
            };
            history.cursor = Some(cursor);
            history.entries[cursor].clone()
        };

        self.emit(&entry, Direction::Back).await?;
        Ok(entry)
    }

    /// Step forward one entry and emit it again.
    pub async fn forward(&self) -> Result<NavigationEntry> {
        let entry = {
            let mut history = self.history.lock();
            let cursor = match history.cursor {
                Some(i) if i + 1 < history.entries.len() => i + 1,
                _ => return Err(NavigationError::NothingToGoForward),
            };
            history.cursor = Some(cursor);
            history.entries[cursor].clone()
        };

        self.emit(&entry, Direction::Forward).await?;
        Ok(entry)
    }

    pub fn can_go_back(&self) -> bool {
        self.history.lock().can_go_back()
    }

    pub fn can_go_forward(&self) -> bool {
        self.history.lock().can_go_forward()
    }

    pub fn current(&self) -> Option<NavigationEntry> {
        self.history.lock().current().cloned()
    }

    /// Oldest first.
    pub fn entries(&self) -> Vec<NavigationEntry> {
        self.history.lock().entries.clone()
    }

    pub fn position(&self) -> Option<usize> {
        self.history.lock().cursor
    }

    pub fn len(&self) -> usize {
        self.history.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.lock().entries.is_empty()
    }

    pub fn clear(&self) {
        *self.history.lock() = History::default();
        debug!("Navigation history cleared");
    }

    async fn emit(&self, entry: &NavigationEntry, direction: Direction) -> Result<()> {
        let mut draft =
            SignalDraft::from_payload(SignalSource::component(COMPONENT), entry.target.to_payload())
                .with_metadata("navigationEntryId", serde_json::Value::from(entry.id.to_string()))
                .with_metadata("direction", serde_json::Value::from(direction.as_str()));
        if let Some(target) = entry.target.signal_target() {
            draft = draft.with_target(target);
        }
        if let Some(source) = &entry.source {
            draft = draft.with_metadata("sourceTarget", serde_json::Value::from(source.to_string()));
        }

        let signal_id = self.bus.emit(draft).await?;
        debug!(
            target = %entry.target,
            direction = direction.as_str(),
            signal_id = %signal_id,
            "Navigation emitted"
        );
        Ok(())
    }
}

impl std::fmt::Debug for NavigationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NavigationController")
            .field("config", &self.config)
            .field("len", &self.len())
            .field("position", &self.position())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use trellis_bus::{handler_fn, rule_fn};
    use trellis_types::{signal_types, SignalPayload};

    fn recording_bus() -> (SignalBus, Arc<Mutex<Vec<String>>>) {
        let bus = SignalBus::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for ty in [
            signal_types::NAVIGATE_TO_RESOURCE,
            signal_types::NAVIGATE_TO_PANEL,
            signal_types::NAVIGATE_TO_CONTENT,
        ] {
            let seen = seen.clone();
            bus.subscribe_global(
                ty,
                handler_fn(move |signal| {
                    let seen = seen.clone();
                    async move {
                        let what = match &signal.payload {
                            SignalPayload::NavigateToResource(p) => format!("resource:{}", p.resource_id),
                            SignalPayload::NavigateToPanel(p) => format!("panel:{}", p.panel_id),
                            SignalPayload::NavigateToContent(p) => format!("content:{}", p.content_id),
                            _ => "other".to_string(),
                        };
                        let direction = signal.metadata_str("direction").unwrap_or("?").to_string();
                        seen.lock().push(format!("{direction} {what}"));
                        anyhow::Ok(())
                    }
                }),
            );
        }
        (bus, seen)
    }

    #[tokio::test]
    async fn test_back_and_forward_reemit() {
        let (bus, seen) = recording_bus();
        let nav = NavigationController::new(bus);

        nav.navigate(NavigationTarget::resource("video"), None).await.unwrap();
        nav.navigate(NavigationTarget::panel("panel-2"), Some(NavigationTarget::resource("video")))
            .await
            .unwrap();
        assert!(nav.can_go_back());
        assert!(!nav.can_go_forward());

        let back = nav.back().await.unwrap();
        assert_eq!(back.target, NavigationTarget::resource("video"));
        assert!(nav.can_go_forward());
        assert_eq!(nav.back().await.unwrap_err(), NavigationError::NothingToGoBack);

        let forward = nav.forward().await.unwrap();
        assert_eq!(forward.target, NavigationTarget::panel("panel-2"));
        assert_eq!(forward.source, Some(NavigationTarget::resource("video")));
        assert_eq!(nav.forward().await.unwrap_err(), NavigationError::NothingToGoForward);

        assert_eq!(
            *seen.lock(),
            vec![
                "new resource:video",
                "new panel:panel-2",
                "back resource:video",
                "forward panel:panel-2",
            ]
        );
    }

    #[tokio::test]
    async fn test_navigate_truncates_redo_tail() {
        let (bus, _) = recording_bus();
        let nav = NavigationController::new(bus);
        for id in ["a", "b", "c"] {
            nav.navigate(NavigationTarget::content(id), None).await.unwrap();
        }
        nav.back().await.unwrap();
        nav.back().await.unwrap();

        nav.navigate(NavigationTarget::content("d"), None).await.unwrap();
        let targets: Vec<String> = nav.entries().iter().map(|e| e.target.to_string()).collect();
        assert_eq!(targets, vec!["content:a", "content:d"]);
        assert_eq!(nav.position(), Some(1));
        assert!(!nav.can_go_forward());
    }

    #[tokio::test]
    async fn test_history_is_capped() {
        let nav = NavigationController::with_config(
            SignalBus::default(),
            NavigationConfig { max_entries: 2 },
        );
        for id in ["a", "b", "c"] {
            nav.navigate(NavigationTarget::content(id), None).await.unwrap();
        }
        assert_eq!(nav.len(), 2);
        assert_eq!(nav.entries()[0].target, NavigationTarget::content("b"));
        assert_eq!(nav.current().map(|e| e.target), Some(NavigationTarget::content("c")));

        nav.clear();
        assert!(nav.is_empty());
        assert!(nav.current().is_none());
        assert!(!nav.can_go_back());
    }

    #[tokio::test]
    async fn test_rejected_signal_keeps_entry() {
        let bus = SignalBus::default();
        bus.register_validation_rule(
            signal_types::NAVIGATE_TO_EXTERNAL,
            rule_fn(|_signal| Err("external links disabled".to_string())),
        );
        let nav = NavigationController::new(bus);

        let err = nav
            .navigate(NavigationTarget::external("https://example.org"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, NavigationError::Bus(ref e) if e.is_validation()));
        assert_eq!(nav.len(), 1);
    }
}
