//! Depth-first ordering shared by the mount and cleanup dependency graphs
//!
//! The walk is iterative, so deep dependency chains cannot overflow the
//! stack. A successor that is still being visited is a back-edge: the walk
//! stops and reports the cycle instead of returning a partial order.

use std::collections::HashMap;
use std::hash::Hash;

use thiserror::Error;

use crate::ResourceId;

/// A dependency walk found a back-edge.
///
/// `members` lists the cycle in walk order, closing node repeated at the end
/// (`a -> b -> c -> a`).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("dependency cycle detected: {}", join_cycle(.members))]
pub struct CycleError {
    pub members: Vec<ResourceId>,
}

impl CycleError {
    pub fn new(members: Vec<ResourceId>) -> Self {
        Self { members }
    }

    /// Distinct resources taking part in the cycle.
    pub fn distinct_members(&self) -> Vec<ResourceId> {
        let mut members = self.members.clone();
        members.sort();
        members.dedup();
        members
    }
}

fn join_cycle(members: &[ResourceId]) -> String {
    members
        .iter()
        .map(|m| m.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

struct Frame<N> {
    node: N,
    successors: Vec<N>,
    next: usize,
}

/// Post-order depth-first walk from `roots`.
///
/// Every node appears after all of its successors. Roots and successors are
/// visited in the order given, so sorted inputs give a deterministic result.
/// On a back-edge the cycle path is returned as the error.
pub fn topological_order<N, F, I>(roots: &[N], mut successors: F) -> Result<Vec<N>, Vec<N>>
where
    N: Clone + Eq + Hash,
    F: FnMut(&N) -> I,
    I: IntoIterator<Item = N>,
{
    let mut marks: HashMap<N, Mark> = HashMap::new();
    let mut order = Vec::new();

    for root in roots {
        if marks.contains_key(root) {
            continue;
        }

        marks.insert(root.clone(), Mark::Visiting);
        let mut stack = vec![Frame {
            node: root.clone(),
            successors: successors(root).into_iter().collect(),
            next: 0,
        }];

        loop {
            let step = match stack.last_mut() {
                None => break,
                Some(frame) if frame.next < frame.successors.len() => {
                    let candidate = frame.successors[frame.next].clone();
                    frame.next += 1;
                    Some(candidate)
                }
                Some(_) => None,
            };

            match step {
                Some(candidate) => match marks.get(&candidate).copied() {
                    Some(Mark::Done) => {}
                    Some(Mark::Visiting) => {
                        let start = stack
                            .iter()
                            .position(|f| f.node == candidate)
                            .unwrap_or(0);
                        let mut cycle: Vec<N> =
                            stack[start..].iter().map(|f| f.node.clone()).collect();
                        cycle.push(candidate);
                        return Err(cycle);
                    }
                    None => {
                        marks.insert(candidate.clone(), Mark::Visiting);
                        let next_successors = successors(&candidate).into_iter().collect();
                        stack.push(Frame {
                            node: candidate,
                            successors: next_successors,
                            next: 0,
                        });
                    }
                },
                None => {
                    if let Some(frame) = stack.pop() {
                        marks.insert(frame.node.clone(), Mark::Done);
                        order.push(frame.node);
                    }
                }
            }
        }
    }

    Ok(order)
}

/// First cycle reachable from `roots`, if any.
pub fn find_cycle<N, F, I>(roots: &[N], successors: F) -> Option<Vec<N>>
where
    N: Clone + Eq + Hash,
    F: FnMut(&N) -> I,
    I: IntoIterator<Item = N>,
{
    topological_order(roots, successors).err()
}
