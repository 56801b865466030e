//! Persisted execution records and node logs.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{AsRefStr, Display, EnumString};

use crate::context::{ExecutionId, NodeOutput, NodeStatus, TokenUsage};
use crate::definition::{NodeId, NodeType};
use crate::validation::OutputValidation;

/// Lifecycle state of an execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(AsRefStr, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    /// Created, not yet started.
    #[default]
    Pending,
    /// Nodes are executing.
    Running,
    /// Every reachable node finished.
    Completed,
    /// A node or the graph failed.
    Failed,
    /// Waiting for external approval.
    Paused,
}

impl ExecutionStatus {
    /// Returns whether the status is final for this record.
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Paused)
    }
}

/// One execution of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    /// Execution id.
    pub id: ExecutionId,
    /// Workflow the execution runs.
    pub workflow_id: String,
    /// Owning organization.
    pub organization_id: String,
    /// Triggering user.
    pub user_id: String,
    /// Lifecycle state.
    pub status: ExecutionStatus,
    /// Run-time input.
    #[serde(default)]
    pub input: Map<String, Value>,
    /// Final output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Failure message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Total tokens.
    #[serde(default)]
    pub total_tokens: u64,
    /// Prompt tokens.
    #[serde(default)]
    pub prompt_tokens: u64,
    /// Completion tokens.
    #[serde(default)]
    pub completion_tokens: u64,
    /// Estimated cost.
    #[serde(default)]
    pub cost: f64,
    /// Wall time in milliseconds.
    #[serde(default)]
    pub duration_ms: u64,
    /// Execution this one resumes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resumed_from: Option<ExecutionId>,
    /// Whether a checkpoint exists to resume from.
    #[serde(default)]
    pub can_resume: bool,
    /// Node that paused the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_node_id: Option<NodeId>,
    /// Approval reference of the paused node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_ref: Option<String>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Start of the RUNNING phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<Timestamp>,
    /// Time the record became terminal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Timestamp>,
}

impl ExecutionRecord {
    /// Creates a pending record.
    pub fn pending(
        id: ExecutionId,
        workflow_id: impl Into<String>,
        organization_id: impl Into<String>,
        user_id: impl Into<String>,
        input: Map<String, Value>,
    ) -> Self {
        Self {
            id,
            workflow_id: workflow_id.into(),
            organization_id: organization_id.into(),
            user_id: user_id.into(),
            status: ExecutionStatus::Pending,
            input,
            output: None,
            error: None,
            total_tokens: 0,
            prompt_tokens: 0,
            completion_tokens: 0,
            cost: 0.0,
            duration_ms: 0,
            resumed_from: None,
            can_resume: false,
            paused_node_id: None,
            approval_ref: None,
            created_at: Timestamp::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Links the record to the execution it resumes.
    pub fn with_resumed_from(mut self, resumed_from: Option<ExecutionId>) -> Self {
        self.resumed_from = resumed_from;
        self
    }
}

/// Persisted log of one node execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeLog {
    /// Execution the node ran in.
    pub execution_id: ExecutionId,
    /// Node id.
    pub node_id: NodeId,
    /// Node name.
    pub node_name: String,
    /// Node type tag.
    pub node_type: NodeType,
    /// Outcome.
    pub status: NodeStatus,
    /// Produced data.
    #[serde(default)]
    pub data: Map<String, Value>,
    /// Failure message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Token usage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
    /// Output classification, for successful nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<OutputValidation>,
    /// Start time.
    pub started_at: Timestamp,
    /// End time.
    pub completed_at: Timestamp,
    /// Wall time in milliseconds.
    pub duration_ms: u64,
}

impl NodeLog {
    /// Builds a log entry from a node output.
    pub fn from_output(execution_id: ExecutionId, output: &NodeOutput) -> Self {
        Self {
            execution_id,
            node_id: output.node_id.clone(),
            node_name: output.node_name.clone(),
            node_type: output.node_type.clone(),
            status: output.status,
            data: output.data.clone(),
            error: output.error.clone(),
            token_usage: output.token_usage.clone(),
            validation: None,
            started_at: output.started_at,
            completed_at: output.completed_at,
            duration_ms: output.duration_ms,
        }
    }

    /// Attaches the output classification.
    pub fn with_validation(mut self, validation: Option<OutputValidation>) -> Self {
        self.validation = validation;
        self
    }
}
