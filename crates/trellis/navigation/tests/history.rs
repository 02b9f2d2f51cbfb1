//! Property tests: the navigation history behaves like a browser history.

use proptest::prelude::*;
use trellis_bus::SignalBus;
use trellis_navigation::{NavigationConfig, NavigationController, NavigationError, NavigationTarget};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Op {
    Navigate(u8),
    Back,
    Forward,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => any::<u8>().prop_map(Op::Navigate),
        2 => Just(Op::Back),
        1 => Just(Op::Forward),
    ]
}

/// Reference model: plain ids and a cursor.
#[derive(Default)]
struct Model {
    entries: Vec<String>,
    cursor: usize,
}

impl Model {
    fn navigate(&mut self, id: String, max: usize) {
        if !self.entries.is_empty() {
            self.entries.truncate(self.cursor + 1);
        }
        self.entries.push(id);
        while self.entries.len() > max {
            self.entries.remove(0);
        }
        self.cursor = self.entries.len() - 1;
    }
}

// ---------------------------------------------------------------------------
// Property Tests
// ---------------------------------------------------------------------------

proptest! {
    /// Any sequence of operations matches the reference model and keeps the
    /// history within its cap.
    #[test]
    fn history_matches_model(
        ops in proptest::collection::vec(arb_op(), 1..40),
        max_entries in 1usize..8,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let nav = NavigationController::with_config(
                SignalBus::default(),
                NavigationConfig { max_entries },
            );
            let mut model = Model::default();

            for op in ops {
                match op {
                    Op::Navigate(n) => {
                        let id = format!("c{}", n);
                        nav.navigate(NavigationTarget::content(id.clone()), None).await.unwrap();
                        model.navigate(id, max_entries);
                    }
                    Op::Back => {
                        let result = nav.back().await;
                        if model.cursor > 0 {
                            model.cursor -= 1;
                            prop_assert!(result.is_ok());
                        } else {
                            prop_assert_eq!(result.unwrap_err(), NavigationError::NothingToGoBack);
                        }
                    }
                    Op::Forward => {
                        let result = nav.forward().await;
                        if model.cursor + 1 < model.entries.len() {
                            model.cursor += 1;
                            prop_assert!(result.is_ok());
                        } else {
                            prop_assert_eq!(result.unwrap_err(), NavigationError::NothingToGoForward);
                        }
                    }
                }

                prop_assert!(nav.len() <= max_entries);
                let ids: Vec<String> = nav
                    .entries()
                    .iter()
                    .map(|e| match &e.target {
                        NavigationTarget::Content { id, .. } => id.clone(),
                        other => other.to_string(),
                    })
                    .collect();
                prop_assert_eq!(&ids, &model.entries);
                if !model.entries.is_empty() {
                    prop_assert_eq!(nav.position(), Some(model.cursor));
                }
            }
            Ok(())
        })?;
    }
}
