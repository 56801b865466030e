//! Graph utilities over workflow definitions.
//!
//! - [`execution_order`]: deterministic topological order
//! - [`parallel_layers`]: independent node sets for concurrent execution
//! - [`predecessor_ids`] / [`successor_ids`]: direct neighbours
//! - [`cascade_skip`]: reachability-based skipping of dependents

mod order;

use std::collections::{HashSet, VecDeque};

pub use order::{Layer, execution_order, parallel_layers};

use crate::definition::{EdgeDefinition, NodeId};

/// Returns the ids of nodes with an edge into `node_id`, in edge order.
pub fn predecessor_ids(node_id: &NodeId, edges: &[EdgeDefinition]) -> Vec<NodeId> {
    let mut seen = HashSet::new();
    edges
        .iter()
        .filter(|edge| &edge.target == node_id)
        .filter(|edge| seen.insert(&edge.source))
        .map(|edge| edge.source.clone())
        .collect()
}

/// Returns the ids of nodes with an edge out of `node_id`, in edge order.
pub fn successor_ids(node_id: &NodeId, edges: &[EdgeDefinition]) -> Vec<NodeId> {
    let mut seen = HashSet::new();
    edges
        .iter()
        .filter(|edge| &edge.source == node_id)
        .filter(|edge| seen.insert(&edge.target))
        .map(|edge| edge.target.clone())
        .collect()
}

/// Computes the dependents of `blocked_roots` that can no longer run.
///
/// Walks successors breadth-first. A node is skipped once *every* one of its
/// predecessors is blocked: a root, a node for which `is_blocked` holds, or a
/// node already skipped by this walk. Nodes for which `is_settled` holds
/// (already completed or failed) stop the walk. A node reachable through a
/// predecessor that is still live is never skipped.
///
/// Returns newly skipped ids in discovery order.
pub fn cascade_skip<B, S>(
    blocked_roots: &[NodeId],
    edges: &[EdgeDefinition],
    is_blocked: B,
    is_settled: S,
) -> Vec<NodeId>
where
    B: Fn(&NodeId) -> bool,
    S: Fn(&NodeId) -> bool,
{
    let roots: HashSet<&NodeId> = blocked_roots.iter().collect();
    let mut skipped: Vec<NodeId> = Vec::new();
    let mut skipped_set: HashSet<NodeId> = HashSet::new();
    let mut queue: VecDeque<NodeId> = blocked_roots
        .iter()
        .flat_map(|root| successor_ids(root, edges))
        .collect();

    while let Some(candidate) = queue.pop_front() {
        if skipped_set.contains(&candidate)
            || roots.contains(&candidate)
            || is_settled(&candidate)
            || is_blocked(&candidate)
        {
            continue;
        }

        let predecessors = predecessor_ids(&candidate, edges);
        let all_blocked = !predecessors.is_empty()
            && predecessors.iter().all(|pred| {
                roots.contains(pred) || skipped_set.contains(pred) || is_blocked(pred)
            });

        if all_blocked {
            queue.extend(successor_ids(&candidate, edges));
            skipped_set.insert(candidate.clone());
            skipped.push(candidate);
        }
    }

    skipped
}
