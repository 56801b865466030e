//! Topological ordering and layering.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use petgraph::Direction;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::definition::{EdgeDefinition, NodeDefinition, NodeId};
use crate::error::GraphError;

/// A set of nodes whose predecessors all live in earlier layers.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer<'a> {
    /// Zero-based layer index.
    pub index: usize,
    /// Nodes in declaration order.
    pub nodes: Vec<&'a NodeDefinition>,
}

impl Layer<'_> {
    /// Returns the ids of the nodes in this layer.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|node| node.id.clone()).collect()
    }
}

/// Dependency graph keyed by position in the node array.
struct IndexedGraph {
    graph: DiGraph<usize, ()>,
}

impl IndexedGraph {
    /// Builds the graph. Edges with unknown endpoints are ignored here and
    /// reported by [`WorkflowDefinition::validate`].
    ///
    /// [`WorkflowDefinition::validate`]: crate::definition::WorkflowDefinition::validate
    fn build(nodes: &[NodeDefinition], edges: &[EdgeDefinition]) -> Self {
        let mut graph = DiGraph::with_capacity(nodes.len(), edges.len());
        let mut indices: HashMap<&NodeId, NodeIndex> = HashMap::with_capacity(nodes.len());

        for (position, node) in nodes.iter().enumerate() {
            let index = graph.add_node(position);
            indices.entry(&node.id).or_insert(index);
        }

        for edge in edges {
            if let (Some(&from), Some(&to)) = (indices.get(&edge.source), indices.get(&edge.target))
            {
                // Parallel edges (different handles) count once for ordering.
                if graph.find_edge(from, to).is_none() {
                    graph.add_edge(from, to, ());
                }
            }
        }

        Self { graph }
    }

    /// Kahn's algorithm with a min-heap on array position.
    fn sorted(&self) -> Option<Vec<usize>> {
        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|index| {
                self.graph
                    .neighbors_directed(index, Direction::Incoming)
                    .count()
            })
            .collect();

        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(position, _)| Reverse(position))
            .collect();

        let mut order = Vec::with_capacity(in_degree.len());
        while let Some(Reverse(position)) = ready.pop() {
            order.push(position);
            for next in self
                .graph
                .neighbors_directed(NodeIndex::new(position), Direction::Outgoing)
            {
                let degree = &mut in_degree[next.index()];
                *degree -= 1;
                if *degree == 0 {
                    ready.push(Reverse(next.index()));
                }
            }
        }

        (order.len() == in_degree.len()).then_some(order)
    }

    /// Ids of nodes that sit on a cycle, in declaration order.
    fn cycle_members(&self, nodes: &[NodeDefinition]) -> Vec<String> {
        let mut members: Vec<usize> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|component| {
                component.len() > 1
                    || component
                        .first()
                        .is_some_and(|index| self.graph.contains_edge(*index, *index))
            })
            .flatten()
            .map(|index| index.index())
            .collect();
        members.sort_unstable();
        members
            .into_iter()
            .map(|position| nodes[position].id.to_string())
            .collect()
    }

    fn cycle_error(&self, nodes: &[NodeDefinition]) -> GraphError {
        GraphError::Cycle {
            nodes: self.cycle_members(nodes),
        }
    }
}

/// Returns the nodes in a deterministic topological order.
///
/// Among nodes that are ready at the same time the one declared first wins,
/// so the order is stable for a given definition.
pub fn execution_order<'a>(
    nodes: &'a [NodeDefinition],
    edges: &[EdgeDefinition],
) -> Result<Vec<&'a NodeDefinition>, GraphError> {
    let graph = IndexedGraph::build(nodes, edges);
    let order = graph.sorted().ok_or_else(|| graph.cycle_error(nodes))?;
    Ok(order.into_iter().map(|position| &nodes[position]).collect())
}

/// Groups nodes into layers that can execute concurrently.
///
/// A node's layer is one past the deepest of its predecessors; sources sit in
/// layer zero. No two nodes of a layer depend on each other.
pub fn parallel_layers<'a>(
    nodes: &'a [NodeDefinition],
    edges: &[EdgeDefinition],
) -> Result<Vec<Layer<'a>>, GraphError> {
    let graph = IndexedGraph::build(nodes, edges);
    let order = graph.sorted().ok_or_else(|| graph.cycle_error(nodes))?;

    let mut depth = vec![0usize; nodes.len()];
    for &position in &order {
        depth[position] = graph
            .graph
            .neighbors_directed(NodeIndex::new(position), Direction::Incoming)
            .map(|pred| depth[pred.index()] + 1)
            .max()
            .unwrap_or(0);
    }

    let layer_count = depth.iter().max().map_or(0, |max| max + 1);
    let mut layers: Vec<Layer<'a>> = (0..layer_count)
        .map(|index| Layer {
            index,
            nodes: Vec::new(),
        })
        .collect();

    for (position, node) in nodes.iter().enumerate() {
        layers[depth[position]].nodes.push(node);
    }

    Ok(layers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::NodeType;

    fn node(id: &str) -> NodeDefinition {
        NodeDefinition::new(id, id.to_uppercase(), NodeType::Process)
    }

    fn ids(nodes: &[&NodeDefinition]) -> Vec<String> {
        nodes.iter().map(|node| node.id.to_string()).collect()
    }

    #[test]
    fn test_order_respects_edges_and_declaration_ties() {
        let nodes = vec![node("c"), node("input"), node("a"), node("b")];
        let edges = vec![
            EdgeDefinition::new("input", "a"),
            EdgeDefinition::new("a", "b"),
            EdgeDefinition::new("input", "c"),
        ];

        let order = execution_order(&nodes, &edges).expect("acyclic");
        assert_eq!(ids(&order), vec!["input", "c", "a", "b"]);
    }

    #[test]
    fn test_order_places_every_edge_forward() {
        let nodes = vec![node("d"), node("b"), node("a"), node("c")];
        let edges = vec![
            EdgeDefinition::new("a", "b"),
            EdgeDefinition::new("b", "d"),
            EdgeDefinition::new("a", "c"),
            EdgeDefinition::new("c", "d"),
        ];

        let order = ids(&execution_order(&nodes, &edges).expect("acyclic"));
        let position = |id: &str| order.iter().position(|x| x == id).expect("present");
        for edge in &edges {
            assert!(position(edge.source.as_str()) < position(edge.target.as_str()));
        }
    }

    #[test]
    fn test_cycle_is_reported_with_members() {
        let nodes = vec![node("input"), node("a"), node("b")];
        let edges = vec![
            EdgeDefinition::new("input", "a"),
            EdgeDefinition::new("a", "b"),
            EdgeDefinition::new("b", "a"),
        ];

        let error = execution_order(&nodes, &edges).expect_err("cyclic");
        assert_eq!(
            error,
            GraphError::Cycle {
                nodes: vec!["a".into(), "b".into()]
            }
        );
        assert!(parallel_layers(&nodes, &edges).is_err());
    }

    #[test]
    fn test_self_loop_is_a_cycle() {
        let nodes = vec![node("a")];
        let edges = vec![EdgeDefinition::new("a", "a")];
        assert!(matches!(
            execution_order(&nodes, &edges),
            Err(GraphError::Cycle { .. })
        ));
    }

    #[test]
    fn test_layers_group_independent_nodes() {
        let nodes = vec![node("input"), node("a"), node("b"), node("c")];
        let edges = vec![
            EdgeDefinition::new("input", "a"),
            EdgeDefinition::new("a", "b"),
            EdgeDefinition::new("input", "c"),
        ];

        let layers = parallel_layers(&nodes, &edges).expect("acyclic");
        let layer_ids: Vec<Vec<String>> = layers.iter().map(|layer| ids(&layer.nodes)).collect();
        assert_eq!(
            layer_ids,
            vec![vec!["input".to_owned()], vec!["a".into(), "c".into()], vec!["b".into()]]
        );

        for layer in &layers {
            let members = layer.node_ids();
            for edge in &edges {
                assert!(!(members.contains(&edge.source) && members.contains(&edge.target)));
            }
        }
    }

    #[test]
    fn test_empty_graph_has_no_layers() {
        assert!(parallel_layers(&[], &[]).expect("empty").is_empty());
        assert!(execution_order(&[], &[]).expect("empty").is_empty());
    }
}
