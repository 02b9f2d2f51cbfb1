//! Mount dependency graph
//!
//! An edge `a -> b` means `a` depends on `b`: `b` has to be mounted before
//! `a` and unmounted after it. Only registered resources own edges; an edge
//! may point at a resource that is not registered yet.

use std::collections::{BTreeMap, BTreeSet};

use trellis_types::{find_cycle, topological_order, CycleError, ResourceId};

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    depends_on: BTreeMap<ResourceId, BTreeSet<ResourceId>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `id` with its dependencies, rejecting edges that close a cycle.
    ///
    /// On error the graph is left untouched.
    pub fn try_insert(
        &mut self,
        id: &ResourceId,
        dependencies: impl IntoIterator<Item = ResourceId>,
    ) -> Result<(), CycleError> {
        let dependencies: BTreeSet<ResourceId> = dependencies.into_iter().collect();

        let cycle = find_cycle(std::slice::from_ref(id), |node: &ResourceId| {
            if node == id {
                dependencies.iter().cloned().collect::<Vec<_>>()
            } else {
                self.dependencies_of(node)
            }
        });
        if let Some(members) = cycle {
            return Err(CycleError::new(members));
        }

        self.depends_on.insert(id.clone(), dependencies);
        Ok(())
    }

    /// Add `id` without checking for cycles.
    pub fn insert(&mut self, id: ResourceId, dependencies: impl IntoIterator<Item = ResourceId>) {
        self.depends_on
            .entry(id)
            .or_default()
            .extend(dependencies);
    }

    /// Drop the edges owned by `id`. Edges other resources hold towards it
    /// stay: they still declare the dependency.
    pub fn remove(&mut self, id: &ResourceId) -> bool {
        self.depends_on.remove(id).is_some()
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.depends_on.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.depends_on.len()
    }

    pub fn is_empty(&self) -> bool {
        self.depends_on.is_empty()
    }

    /// Direct dependencies, sorted.
    pub fn dependencies_of(&self, id: &ResourceId) -> Vec<ResourceId> {
        self.depends_on
            .get(id)
            .map(|deps| deps.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Registered resources depending directly on `id`, sorted.
    pub fn dependents_of(&self, id: &ResourceId) -> Vec<ResourceId> {
        self.depends_on
            .iter()
            .filter(|(_, deps)| deps.contains(id))
            .map(|(node, _)| node.clone())
            .collect()
    }

    pub fn has_cycles(&self) -> bool {
        let roots: Vec<ResourceId> = self.depends_on.keys().cloned().collect();
        find_cycle(&roots, |node: &ResourceId| self.dependencies_of(node)).is_some()
    }

    /// Dependencies before dependents.
    ///
    /// Covers `ids` and everything they depend on transitively, so a
    /// dependency is never left out because it was not asked for.
    pub fn mount_order(&self, ids: &[ResourceId]) -> Result<Vec<ResourceId>, CycleError> {
        topological_order(&sorted_roots(ids), |node: &ResourceId| {
            self.dependencies_of(node)
        })
        .map_err(CycleError::new)
    }

    /// Dependents before dependencies.
    ///
    /// Covers `ids` and every registered resource depending on them
    /// transitively.
    pub fn unmount_order(&self, ids: &[ResourceId]) -> Result<Vec<ResourceId>, CycleError> {
        topological_order(&sorted_roots(ids), |node: &ResourceId| {
            self.dependents_of(node)
        })
        .map_err(CycleError::new)
    }

    /// `ids` plus everything they depend on, directly or not.
    pub fn dependency_closure(&self, ids: &[ResourceId]) -> BTreeSet<ResourceId> {
        let mut closure = BTreeSet::new();
        let mut stack: Vec<ResourceId> = ids.to_vec();
        while let Some(node) = stack.pop() {
            if closure.insert(node.clone()) {
                stack.extend(self.dependencies_of(&node));
            }
        }
        closure
    }
}

fn sorted_roots(ids: &[ResourceId]) -> Vec<ResourceId> {
    let set: BTreeSet<ResourceId> = ids.iter().cloned().collect();
    set.into_iter().collect()
}
