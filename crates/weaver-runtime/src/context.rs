//! Per-run execution context and node outputs.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use derive_more::{Debug, Display, From, Into};
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{AsRefStr, Display as StrumDisplay, EnumString};
use uuid::Uuid;

use crate::definition::{NodeDefinition, NodeId, NodeType};
use crate::variable;

/// Unique identifier of one execution.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[derive(Debug, Display, From, Into)]
#[debug("{_0}")]
#[display("{_0}")]
#[serde(transparent)]
pub struct ExecutionId(Uuid);

impl ExecutionId {
    /// Creates a new time-ordered execution id.
    #[inline]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Returns the underlying UUID.
    #[inline]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for ExecutionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Outcome of a single node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(AsRefStr, StrumDisplay, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NodeStatus {
    /// The node produced output.
    Success,
    /// The node failed.
    Error,
    /// The node was not executed because of routing or a failed dependency.
    Skipped,
    /// The node is waiting for external approval.
    Paused,
}

impl NodeStatus {
    /// Returns whether dependents may consume this output.
    #[inline]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Token accounting reported by a processor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    /// Prompt tokens.
    pub prompt_tokens: u64,
    /// Completion tokens.
    pub completion_tokens: u64,
    /// Total tokens.
    pub total_tokens: u64,
    /// Model that consumed the tokens, used for pricing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl TokenUsage {
    /// Creates usage from prompt and completion counts.
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            model: None,
        }
    }

    /// Tags the usage with a model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Output of one node in one run.
///
/// Written once per node per run and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeOutput {
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
    /// Error message when `status` is `error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Token usage, when the processor consumed tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
    /// Approval reference when `status` is `paused`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_ref: Option<String>,
    /// Whether a processor error may succeed on retry.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub retryable: bool,
    /// When the node started.
    pub started_at: Timestamp,
    /// When the node finished.
    pub completed_at: Timestamp,
    /// Wall time in milliseconds.
    pub duration_ms: u64,
}

impl NodeOutput {
    fn with_status(node: &NodeDefinition, status: NodeStatus) -> Self {
        let now = Timestamp::now();
        Self {
            node_id: node.id.clone(),
            node_name: node.name.clone(),
            node_type: node.node_type.clone(),
            status,
            data: Map::new(),
            error: None,
            token_usage: None,
            approval_ref: None,
            retryable: false,
            started_at: now,
            completed_at: now,
            duration_ms: 0,
        }
    }

    /// Creates a successful output.
    pub fn success(node: &NodeDefinition, data: Map<String, Value>) -> Self {
        Self {
            data,
            ..Self::with_status(node, NodeStatus::Success)
        }
    }

    /// Creates a failed output.
    pub fn error(node: &NodeDefinition, message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::with_status(node, NodeStatus::Error)
        }
    }

    /// Creates a skipped output.
    pub fn skipped(node: &NodeDefinition) -> Self {
        Self::with_status(node, NodeStatus::Skipped)
    }

    /// Creates an output that pauses the run until approval.
    pub fn paused(node: &NodeDefinition, approval_ref: impl Into<String>) -> Self {
        Self {
            approval_ref: Some(approval_ref.into()),
            ..Self::with_status(node, NodeStatus::Paused)
        }
    }

    /// Attaches token usage.
    pub fn with_token_usage(mut self, usage: TokenUsage) -> Self {
        self.token_usage = Some(usage);
        self
    }

    /// Marks an error output as retryable.
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Stamps start time and wall duration, completing now.
    pub fn with_timing(mut self, started_at: Timestamp, elapsed: Duration) -> Self {
        self.started_at = started_at;
        self.completed_at = Timestamp::now();
        self.duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Returns the primary text of the output.
    pub fn primary_text(&self) -> Option<String> {
        variable::primary_content(&self.data)
    }
}

/// A log line emitted by a processor through the context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextLog {
    /// Execution the line belongs to.
    pub execution_id: ExecutionId,
    /// Node that emitted it.
    pub node_id: NodeId,
    /// Message.
    pub message: String,
    /// Emission time.
    pub at: Timestamp,
}

/// Callback receiving processor log lines.
pub type LogSink = Arc<dyn Fn(&ContextLog) + Send + Sync>;

/// State of one run, owned exclusively by that run.
///
/// `node_outputs` is append-only: the first write for a node wins.
#[derive(Clone, Debug)]
pub struct ExecutionContext {
    execution_id: ExecutionId,
    organization_id: String,
    user_id: String,
    node_outputs: BTreeMap<NodeId, NodeOutput>,
    global_variables: Map<String, Value>,
    #[debug(skip)]
    log_sink: Option<LogSink>,
}

impl ExecutionContext {
    /// Creates an empty context.
    pub fn new(
        execution_id: ExecutionId,
        organization_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            execution_id,
            organization_id: organization_id.into(),
            user_id: user_id.into(),
            node_outputs: BTreeMap::new(),
            global_variables: Map::new(),
            log_sink: None,
        }
    }

    /// Seeds global variables, later keys overriding earlier ones.
    pub fn with_globals(mut self, globals: Map<String, Value>) -> Self {
        self.global_variables.extend(globals);
        self
    }

    /// Sets the processor log callback.
    pub fn with_log_sink(mut self, sink: LogSink) -> Self {
        self.log_sink = Some(sink);
        self
    }

    /// Returns the execution id.
    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    /// Returns the organization id.
    pub fn organization_id(&self) -> &str {
        &self.organization_id
    }

    /// Returns the user id.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Records a node output.
    ///
    /// Returns `false` and leaves the existing entry untouched if the node
    /// already has an output.
    pub fn record_output(&mut self, output: NodeOutput) -> bool {
        match self.node_outputs.entry(output.node_id.clone()) {
            std::collections::btree_map::Entry::Occupied(_) => false,
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(output);
                true
            }
        }
    }

    /// Returns the output of a node, if it has run.
    pub fn output(&self, node_id: &NodeId) -> Option<&NodeOutput> {
        self.node_outputs.get(node_id)
    }

    /// Returns the status of a node, if it has run.
    pub fn status(&self, node_id: &NodeId) -> Option<NodeStatus> {
        self.node_outputs.get(node_id).map(|output| output.status)
    }

    /// Returns every recorded output.
    pub fn outputs(&self) -> &BTreeMap<NodeId, NodeOutput> {
        &self.node_outputs
    }

    /// Returns a global variable.
    pub fn global(&self, name: &str) -> Option<&Value> {
        self.global_variables.get(name)
    }

    /// Returns all global variables.
    pub fn globals(&self) -> &Map<String, Value> {
        &self.global_variables
    }

    /// Sets a global variable.
    pub fn set_global(&mut self, name: impl Into<String>, value: Value) {
        self.global_variables.insert(name.into(), value);
    }

    /// Forwards a processor log line to the sink, if any.
    pub fn log(&self, node_id: &NodeId, message: impl Into<String>) {
        if let Some(sink) = &self.log_sink {
            sink(&ContextLog {
                execution_id: self.execution_id,
                node_id: node_id.clone(),
                message: message.into(),
                at: Timestamp::now(),
            });
        }
    }
}
