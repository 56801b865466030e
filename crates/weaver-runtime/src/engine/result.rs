//! Run results.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::ExecutionId;
use crate::definition::NodeId;
use crate::store::ExecutionStatus;

/// Reserved output key holding the errors collected under the `collect`
/// strategy.
pub const ERRORS_KEY: &str = "_errors";

/// A node failure recorded during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeFailure {
    /// Failed node id.
    pub node_id: NodeId,
    /// Failed node name.
    pub node_name: String,
    /// Error reported for the node.
    pub error: String,
    /// Run-level message naming the node.
    #[serde(skip)]
    pub message: String,
    /// Whether the failure may succeed on retry.
    #[serde(skip)]
    pub retryable: bool,
}

/// Outcome of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    /// Execution id.
    pub execution_id: ExecutionId,
    /// Terminal status.
    pub status: ExecutionStatus,
    /// Data of every successful sink node keyed by node name.
    pub output: Map<String, Value>,
    /// Total tokens of nodes executed in this run.
    pub total_tokens: u64,
    /// Prompt tokens.
    pub prompt_tokens: u64,
    /// Completion tokens.
    pub completion_tokens: u64,
    /// Estimated cost.
    pub cost: f64,
    /// Wall time in milliseconds.
    pub duration_ms: u64,
    /// Failure message naming the node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// First failed node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_node_id: Option<NodeId>,
    /// Node that paused the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_node_id: Option<NodeId>,
    /// Approval reference of the paused node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_ref: Option<String>,
    /// Execution this run resumed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resumed_from: Option<ExecutionId>,
    /// Whether the failure may succeed on retry.
    #[serde(default)]
    pub retryable: bool,
    /// Whether a checkpoint was kept for resume.
    #[serde(default)]
    pub can_resume: bool,
    /// Nodes executed in this run.
    pub executed_nodes: usize,
    /// Nodes restored from a checkpoint.
    pub restored_nodes: usize,
}

impl ExecutionResult {
    /// Returns whether the run completed.
    pub fn is_completed(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }

    /// Returns whether the run failed.
    pub fn is_failed(&self) -> bool {
        self.status == ExecutionStatus::Failed
    }

    /// Returns whether the run paused for approval.
    pub fn is_paused(&self) -> bool {
        self.status == ExecutionStatus::Paused
    }
}
