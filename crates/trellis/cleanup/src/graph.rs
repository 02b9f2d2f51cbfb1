//! Cleanup dependency graph
//!
//! Separate from the mount graph: an edge `source -> target` says that
//! cleaning `source` pulls `target` into the same teardown. Sources run
//! before their targets, so the resources other strategies reference are
//! cleaned last.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use trellis_types::{find_cycle, CycleError, ResourceId};

/// One cleanup dependency edge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupDependency {
    pub source: ResourceId,
    pub target: ResourceId,
    pub cleanup_type: String,
    pub priority: i32,
}

impl CleanupDependency {
    pub fn new(
        source: impl Into<ResourceId>,
        target: impl Into<ResourceId>,
        cleanup_type: impl Into<String>,
        priority: i32,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            cleanup_type: cleanup_type.into(),
            priority,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CleanupGraph {
    /// Outgoing edges keyed by source, at most one per target.
    edges: BTreeMap<ResourceId, Vec<CleanupDependency>>,
}

impl CleanupGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an edge, replacing an existing one between the same pair.
    pub fn add(&mut self, edge: CleanupDependency) {
        let outgoing = self.edges.entry(edge.source.clone()).or_default();
        match outgoing.iter_mut().find(|e| e.target == edge.target) {
            Some(existing) => *existing = edge,
            None => outgoing.push(edge),
        }
    }

    /// Drop every edge touching `id`. Returns how many went.
    pub fn remove_resource(&mut self, id: &ResourceId) -> usize {
        let mut removed = self.edges.remove(id).map(|e| e.len()).unwrap_or(0);
        for outgoing in self.edges.values_mut() {
            let before = outgoing.len();
            outgoing.retain(|e| &e.target != id);
            removed += before - outgoing.len();
        }
        self.edges.retain(|_, outgoing| !outgoing.is_empty());
        removed
    }

    pub fn edges(&self) -> Vec<CleanupDependency> {
        self.edges.values().flatten().cloned().collect()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }

    /// Direct targets of `id`, sorted.
    pub fn targets_of(&self, id: &ResourceId) -> Vec<ResourceId> {
        let mut targets: Vec<ResourceId> = self
            .edges
            .get(id)
            .map(|outgoing| outgoing.iter().map(|e| e.target.clone()).collect())
            .unwrap_or_default();
        targets.sort();
        targets
    }

    /// `ids` plus everything reachable from them.
    pub fn reachable_from(&self, ids: &[ResourceId]) -> BTreeSet<ResourceId> {
        let mut seen: BTreeSet<ResourceId> = BTreeSet::new();
        let mut stack: Vec<ResourceId> = ids.to_vec();
        while let Some(id) = stack.pop() {
            if seen.insert(id.clone()) {
                stack.extend(self.targets_of(&id));
            }
        }
        seen
    }

    pub fn has_cycles(&self) -> bool {
        let roots: Vec<ResourceId> = self.edges.keys().cloned().collect();
        find_cycle(&roots, |n: &ResourceId| self.targets_of(n)).is_some()
    }

    /// Cleanup order for `ids` and everything reachable from them.
    ///
    /// Sources come before their targets. Among resources that are ready at
    /// the same time, the one with the most outgoing edges goes first, then
    /// the one with the highest-priority incoming edge, then the lowest id.
    /// A cycle fails the whole request.
    pub fn cleanup_order(&self, ids: &[ResourceId]) -> Result<Vec<ResourceId>, CycleError> {
        let scope = self.reachable_from(ids);
        let roots: Vec<ResourceId> = scope.iter().cloned().collect();
        if let Some(cycle) = find_cycle(&roots, |n: &ResourceId| self.targets_of(n)) {
            return Err(CycleError::new(cycle));
        }

        let mut indegree: BTreeMap<ResourceId, usize> =
            scope.iter().map(|id| (id.clone(), 0)).collect();
        let mut incoming_priority: BTreeMap<ResourceId, i32> = BTreeMap::new();
        for edge in self.edges.values().flatten() {
            if scope.contains(&edge.source) && scope.contains(&edge.target) {
                *indegree.entry(edge.target.clone()).or_default() += 1;
                let best = incoming_priority
                    .entry(edge.target.clone())
                    .or_insert(edge.priority);
                *best = (*best).max(edge.priority);
            }
        }

        let mut ready: BTreeSet<ResourceId> = indegree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| id.clone())
            .collect();
        let mut order = Vec::with_capacity(scope.len());

        while !ready.is_empty() {
            let next = ready
                .iter()
                .max_by(|a, b| {
                    let key = |id: &ResourceId| {
                        (
                            self.targets_of(id).len(),
                            incoming_priority.get(id).copied().unwrap_or(i32::MIN),
                        )
                    };
                    // BTreeSet iterates ascending, so on a full tie the
                    // lowest id must compare greatest
                    key(a).cmp(&key(b)).then_with(|| b.cmp(a))
                })
                .cloned();
            let Some(next) = next else { break };

            ready.remove(&next);
            for target in self.targets_of(&next) {
                if let Some(d) = indegree.get_mut(&target) {
                    *d -= 1;
                    if *d == 0 {
                        ready.insert(target);
                    }
                }
            }
            order.push(next);
        }

        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ResourceId {
        ResourceId::new(s)
    }

    fn ids(names: &[&str]) -> Vec<ResourceId> {
        names.iter().map(|n| id(n)).collect()
    }

    #[test]
    fn test_sources_before_targets() {
        let mut graph = CleanupGraph::new();
        graph.add(CleanupDependency::new("captions", "video", "alignment", 10));
        graph.add(CleanupDependency::new("overlay", "captions", "highlight", 5));

        let order = graph.cleanup_order(&ids(&["overlay"])).unwrap();
        assert_eq!(order, ids(&["overlay", "captions", "video"]));
    }

    #[test]
    fn test_ties_prefer_more_dependencies_then_priority() {
        let mut graph = CleanupGraph::new();
        graph.add(CleanupDependency::new("a", "x", "t", 1));
        graph.add(CleanupDependency::new("a", "y", "t", 1));
        graph.add(CleanupDependency::new("b", "x", "t", 1));
        graph.add(CleanupDependency::new("a", "z", "t", 1));
        graph.add(CleanupDependency::new("b", "z", "t", 9));

        let order = graph.cleanup_order(&ids(&["a", "b"])).unwrap();
        assert_eq!(order[0], id("a"));
        assert_eq!(order[1], id("b"));
        assert_eq!(&order[2..], &ids(&["z", "x", "y"])[..]);
    }

    #[test]
    fn test_cycle_fails_closed() {
        let mut graph = CleanupGraph::new();
        graph.add(CleanupDependency::new("a", "b", "t", 1));
        graph.add(CleanupDependency::new("b", "c", "t", 1));
        graph.add(CleanupDependency::new("c", "a", "t", 1));

        assert!(graph.has_cycles());
        let err = graph.cleanup_order(&ids(&["a"])).unwrap_err();
        assert_eq!(err.distinct_members(), ids(&["a", "b", "c"]));
    }

    #[test]
    fn test_add_replaces_and_remove_drops_both_directions() {
        let mut graph = CleanupGraph::new();
        graph.add(CleanupDependency::new("a", "b", "t", 1));
        graph.add(CleanupDependency::new("a", "b", "t", 7));
        graph.add(CleanupDependency::new("c", "a", "t", 1));
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.edges()[0].priority, 7);

        assert_eq!(graph.remove_resource(&id("a")), 2);
        assert_eq!(graph.edge_count(), 0);
        assert!(!graph.has_cycles());
    }

    #[test]
    fn test_unknown_ids_are_cleaned_alone() {
        let graph = CleanupGraph::new();
        assert_eq!(graph.cleanup_order(&ids(&["b", "a"])).unwrap(), ids(&["a", "b"]));
    }
}
