//! Checkpoint snapshot format.

use std::collections::BTreeMap;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::{ExecutionContext, NodeOutput, NodeStatus};
use crate::definition::NodeId;

/// Schema version written into new snapshots.
pub const CHECKPOINT_VERSION: &str = "1.0.0";

/// A node restored on resume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedNode {
    /// Recorded output.
    pub output: NodeOutput,
    /// Recorded status.
    pub status: NodeStatus,
    /// Completion time.
    pub completed_at: Timestamp,
}

/// Variables captured with a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotContext {
    /// Global variables at capture time.
    #[serde(default)]
    pub variables: Map<String, Value>,
}

/// Durable state from which a run can resume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointSnapshot {
    /// Successfully completed nodes.
    pub completed_nodes: BTreeMap<NodeId, CompletedNode>,
    /// Captured variables.
    #[serde(default)]
    pub context: SnapshotContext,
    /// Node whose failure triggered the snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_node_id: Option<NodeId>,
    /// Schema version.
    pub version: String,
    /// Hash of the graph the snapshot belongs to.
    pub workflow_hash: String,
    /// Capture time.
    pub created_at: Timestamp,
}

impl CheckpointSnapshot {
    /// Captures the successful outputs and variables of a run.
    ///
    /// Failed, skipped and paused nodes are left out so they run again on
    /// resume.
    pub fn capture(
        context: &ExecutionContext,
        failed_node_id: Option<NodeId>,
        workflow_hash: impl Into<String>,
    ) -> Self {
        let completed_nodes = context
            .outputs()
            .iter()
            .filter(|(_, output)| output.status.is_success())
            .map(|(id, output)| {
                let completed = CompletedNode {
                    output: output.clone(),
                    status: output.status,
                    completed_at: output.completed_at,
                };
                (id.clone(), completed)
            })
            .collect();

        Self {
            completed_nodes,
            context: SnapshotContext {
                variables: context.globals().clone(),
            },
            failed_node_id,
            version: CHECKPOINT_VERSION.to_owned(),
            workflow_hash: workflow_hash.into(),
            created_at: Timestamp::now(),
        }
    }

    /// Returns the ids of the captured nodes.
    pub fn completed_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.completed_nodes.keys()
    }
}
