//! Property tests: mount and unmount orders respect every dependency edge.
//!
//! Graphs are generated acyclic by only letting node `i` depend on nodes with
//! a lower index; cycles are then injected by reversing one existing edge.

use std::sync::Arc;

use async_trait::async_trait;
use proptest::prelude::*;
use trellis_bus::SignalBus;
use trellis_lifecycle::{DependencyGraph, LifecycleManager, Resource, ResourceConfig};
use trellis_types::{LifecyclePhase, ResourceId};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn node(i: usize) -> ResourceId {
    ResourceId::new(format!("r{:02}", i))
}

/// Node count plus, for every node, the lower-indexed nodes it depends on.
fn arb_dag() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (2usize..12).prop_flat_map(|n| {
        let edges = proptest::collection::vec((1..n, 0..n), 0..(n * 2)).prop_map(|pairs| {
            pairs
                .into_iter()
                .filter_map(|(from, to)| (to < from).then_some((from, to)))
                .collect::<Vec<_>>()
        });
        (Just(n), edges)
    })
}

fn build(n: usize, edges: &[(usize, usize)]) -> DependencyGraph {
    let mut graph = DependencyGraph::new();
    for i in 0..n {
        let deps: Vec<ResourceId> = edges
            .iter()
            .filter(|(from, _)| *from == i)
            .map(|(_, to)| node(*to))
            .collect();
        graph.insert(node(i), deps);
    }
    graph
}

fn position(order: &[ResourceId], id: &ResourceId) -> usize {
    order.iter().position(|x| x == id).unwrap_or(usize::MAX)
}

struct Noop(ResourceConfig);

#[async_trait]
impl Resource for Noop {
    fn config(&self) -> ResourceConfig {
        self.0.clone()
    }

    async fn mount(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn unmount(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Property Tests
// ---------------------------------------------------------------------------

proptest! {
    /// Every dependency comes before its dependent in the mount order.
    #[test]
    fn mount_order_places_dependencies_first((n, edges) in arb_dag()) {
        let graph = build(n, &edges);
        let all: Vec<ResourceId> = (0..n).map(node).collect();

        let order = graph.mount_order(&all).unwrap();
        prop_assert_eq!(order.len(), n);
        for (from, to) in &edges {
            prop_assert!(position(&order, &node(*to)) < position(&order, &node(*from)));
        }
    }

    /// Every dependent comes before its dependency in the unmount order.
    #[test]
    fn unmount_order_places_dependents_first((n, edges) in arb_dag()) {
        let graph = build(n, &edges);
        let all: Vec<ResourceId> = (0..n).map(node).collect();

        let order = graph.unmount_order(&all).unwrap();
        prop_assert_eq!(order.len(), n);
        for (from, to) in &edges {
            prop_assert!(position(&order, &node(*from)) < position(&order, &node(*to)));
        }
    }

    /// Ordering a subset pulls in its whole dependency closure, and the
    /// closure still respects every edge.
    #[test]
    fn subset_mount_order_covers_dependency_closure(
        (n, edges) in arb_dag(),
        mask in any::<u16>(),
    ) {
        let graph = build(n, &edges);
        let requested: Vec<ResourceId> = (0..n)
            .filter(|i| mask & (1 << i) != 0)
            .map(node)
            .collect();

        let order = graph.mount_order(&requested).unwrap();
        let closure = graph.dependency_closure(&requested);
        prop_assert_eq!(order.len(), closure.len());
        for id in &closure {
            prop_assert!(order.contains(id));
        }
        for (from, to) in &edges {
            if closure.contains(&node(*from)) {
                prop_assert!(position(&order, &node(*to)) < position(&order, &node(*from)));
            }
        }
    }

    /// Unmounting a subset pulls in every transitive dependent first.
    #[test]
    fn subset_unmount_order_covers_dependents(
        (n, edges) in arb_dag(),
        mask in any::<u16>(),
    ) {
        let graph = build(n, &edges);
        let requested: Vec<ResourceId> = (0..n)
            .filter(|i| mask & (1 << i) != 0)
            .map(node)
            .collect();

        let order = graph.unmount_order(&requested).unwrap();
        for id in &requested {
            prop_assert!(order.contains(id));
        }
        for (from, to) in &edges {
            if order.contains(&node(*to)) {
                prop_assert!(order.contains(&node(*from)));
                prop_assert!(position(&order, &node(*from)) < position(&order, &node(*to)));
            }
        }
    }

    /// Reversing any edge of a DAG closes a cycle, and ordering reports it.
    #[test]
    fn injected_cycles_are_always_reported(
        (n, edges) in arb_dag().prop_filter("needs an edge", |(_, e)| !e.is_empty()),
        pick in any::<prop::sample::Index>(),
    ) {
        let (from, to) = edges[pick.index(edges.len())];
        let mut graph = build(n, &edges);
        graph.insert(node(to), [node(from)]);
        let all: Vec<ResourceId> = (0..n).map(node).collect();

        prop_assert!(graph.has_cycles());
        let err = graph.mount_order(&all).unwrap_err();
        let members = err.distinct_members();
        prop_assert!(members.contains(&node(from)));
        prop_assert!(members.contains(&node(to)));
        prop_assert!(graph.unmount_order(&all).is_err());
    }

    /// Mounting every resource through the manager leaves all of them
    /// mounted, whatever the registration order.
    #[test]
    fn manager_mounts_whole_graph((n, edges) in arb_dag(), reverse in any::<bool>()) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let manager = LifecycleManager::new(SignalBus::default());
            let mut indices: Vec<usize> = (0..n).collect();
            if reverse {
                indices.reverse();
            }

            for i in indices {
                let mut config = ResourceConfig::new(node(i), "test", "panel-1");
                for (_, to) in edges.iter().filter(|(from, _)| *from == i) {
                    config = config.with_dependency(node(*to));
                }
                manager.register(Arc::new(Noop(config)), vec![]).await.unwrap();
            }

            manager.mount(&node(n - 1)).await.unwrap();
            for (from, to) in &edges {
                if manager.phase(&node(*from)) == Some(LifecyclePhase::Mounted) {
                    prop_assert_eq!(manager.phase(&node(*to)), Some(LifecyclePhase::Mounted));
                }
            }

            let all: Vec<ResourceId> = (0..n).map(node).collect();
            for id in manager.get_mount_order(&all).unwrap() {
                manager.mount(&id).await.unwrap();
            }
            for id in &all {
                prop_assert_eq!(manager.phase(id), Some(LifecyclePhase::Mounted));
            }
            Ok(())
        })?;
    }
}
