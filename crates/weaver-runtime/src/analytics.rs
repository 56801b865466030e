//! Optional analytics hooks.
//!
//! The engine reports every successful node and the end of every run to an
//! [`AnalyticsCollector`] when one is configured. Collectors handle their own
//! failures; nothing they do changes the outcome of a run.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::context::{ExecutionId, NodeOutput};
use crate::store::ExecutionStatus;
use crate::validation::OutputValidation;

/// Shared handle to a collector.
pub type SharedAnalytics = Arc<dyn AnalyticsCollector>;

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionMeta {
    /// Execution id.
    pub execution_id: ExecutionId,
    /// Workflow id.
    pub workflow_id: String,
    /// Owning organization.
    pub organization_id: String,
    /// Terminal status.
    pub status: ExecutionStatus,
    /// Nodes in the workflow.
    pub node_count: usize,
    /// Nodes executed in this run.
    pub executed_nodes: usize,
    /// Nodes restored from a checkpoint.
    pub restored_nodes: usize,
    /// Total tokens.
    pub total_tokens: u64,
    /// Estimated cost.
    pub cost: f64,
    /// Wall time in milliseconds.
    pub duration_ms: u64,
    /// Execution this run resumed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resumed_from: Option<ExecutionId>,
}

/// Receives node outputs and run summaries.
#[async_trait::async_trait]
pub trait AnalyticsCollector: Send + Sync {
    /// Called after each successful node.
    async fn collect_node_output(
        &self,
        execution_id: ExecutionId,
        output: &NodeOutput,
        validation: Option<&OutputValidation>,
    );

    /// Called once when a run reaches a terminal state.
    async fn collect_execution_meta(&self, meta: &ExecutionMeta);
}
