//! Content hash of a workflow graph.

use serde_json::{Value, json};
use sha2::{Digest, Sha256};

use crate::definition::{EdgeDefinition, NodeDefinition};

/// Hashes the executable content of a graph.
///
/// Covers node id, name, type and config and edge id, endpoints and handles,
/// in declaration order. Editor positions are excluded, so moving a node on
/// the canvas keeps existing checkpoints usable.
pub fn create_workflow_hash(nodes: &[NodeDefinition], edges: &[EdgeDefinition]) -> String {
    let nodes: Vec<Value> = nodes
        .iter()
        .map(|node| {
            json!({
                "id": node.id,
                "name": node.name,
                "type": node.node_type.as_str(),
                "config": node.config,
            })
        })
        .collect();
    let edges: Vec<Value> = edges
        .iter()
        .map(|edge| {
            json!({
                "id": edge.id,
                "source": edge.source,
                "target": edge.target,
                "sourceHandle": edge.source_handle,
                "targetHandle": edge.target_handle,
            })
        })
        .collect();

    let canonical = json!({ "nodes": nodes, "edges": edges }).to_string();
    hex::encode(Sha256::digest(canonical.as_bytes()))
}
