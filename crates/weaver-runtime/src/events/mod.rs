//! Progress events emitted during a run.
//!
//! Every event carries the execution id, optional node identity, a status, a
//! progress percentage and the running token total. Each event is delivered
//! at most once to the configured [`ProgressSink`].

mod sink;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

pub use sink::{BroadcastSink, FanoutSink, NoopSink, ProgressSink, SharedSink, TracingSink};

use crate::context::ExecutionId;
use crate::definition::{NodeDefinition, NodeId, NodeType};
use crate::validation::OutputStatus;

/// Tracing target for event delivery.
pub const TRACING_TARGET: &str = "weaver_runtime::events";

/// Kind of progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(AsRefStr, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProgressEventKind {
    /// The run was created.
    InitExecution,
    /// A node started.
    NodeStart,
    /// A node finished successfully.
    NodeComplete,
    /// A node failed.
    NodeError,
    /// The run paused for approval.
    ExecutionPaused,
    /// The run completed.
    ExecutionComplete,
    /// The run failed.
    ExecutionError,
}

/// One progress notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    /// Event kind.
    #[serde(rename = "type")]
    pub kind: ProgressEventKind,
    /// Execution the event belongs to.
    pub execution_id: ExecutionId,
    /// Node id for node events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    /// Node name for node events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    /// Node type for node events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<NodeType>,
    /// Node or execution status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Output classification for completed nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_status: Option<OutputStatus>,
    /// Completion percentage, 0 to 100.
    pub progress: u8,
    /// Settled nodes so far.
    pub completed_nodes: usize,
    /// Nodes in the workflow.
    pub total_nodes: usize,
    /// Running token total.
    pub total_tokens: u64,
    /// Failure message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Emission time.
    pub timestamp: Timestamp,
}

impl ProgressEvent {
    /// Creates an event without node information.
    pub fn new(kind: ProgressEventKind, execution_id: ExecutionId) -> Self {
        Self {
            kind,
            execution_id,
            node_id: None,
            node_name: None,
            node_type: None,
            status: None,
            output_status: None,
            progress: 0,
            completed_nodes: 0,
            total_nodes: 0,
            total_tokens: 0,
            error: None,
            timestamp: Timestamp::now(),
        }
    }

    /// Attaches the identity of a node.
    pub fn with_node(mut self, node: &NodeDefinition) -> Self {
        self.node_id = Some(node.id.clone());
        self.node_name = Some(node.name.clone());
        self.node_type = Some(node.node_type.clone());
        self
    }

    /// Sets the status.
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Sets the output classification.
    pub fn with_output_status(mut self, status: Option<OutputStatus>) -> Self {
        self.output_status = status;
        self
    }

    /// Sets progress from settled and total node counts.
    pub fn with_progress(mut self, completed: usize, total: usize) -> Self {
        self.completed_nodes = completed;
        self.total_nodes = total;
        self.progress = progress_percent(completed, total);
        self
    }

    /// Sets the running token total.
    pub fn with_tokens(mut self, total_tokens: u64) -> Self {
        self.total_tokens = total_tokens;
        self
    }

    /// Sets the failure message.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Percentage of settled nodes, rounded down and capped at 100.
///
/// An empty workflow counts as complete.
pub fn progress_percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let percent = completed.min(total) * 100 / total;
    u8::try_from(percent).unwrap_or(100)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_progress_percent() {
        assert_eq!(progress_percent(0, 4), 0);
        assert_eq!(progress_percent(1, 3), 33);
        assert_eq!(progress_percent(5, 4), 100);
        assert_eq!(progress_percent(0, 0), 100);
    }

    #[test]
    fn test_event_wire_format() {
        let id = ExecutionId::new();
        let node = NodeDefinition::new("n1", "Writer", NodeType::Process);
        let event = ProgressEvent::new(ProgressEventKind::NodeError, id)
            .with_node(&node)
            .with_status("error")
            .with_progress(1, 2)
            .with_tokens(42)
            .with_error("boom");

        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(value["type"], json!("node_error"));
        assert_eq!(value["nodeId"], json!("n1"));
        assert_eq!(value["nodeType"], json!("PROCESS"));
        assert_eq!(value["progress"], json!(50));
        assert_eq!(value["totalTokens"], json!(42));
        assert!(value.get("outputStatus").is_none());
    }
}
