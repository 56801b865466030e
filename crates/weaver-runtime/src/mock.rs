//! Scripted processors and recording sinks for tests.
//!
//! [`ScriptedProcessor`] answers for PROCESS nodes by node name, so tests
//! can drive any routing, failure or pause scenario without a model
//! backend. [`RecordingSink`] and [`RecordingAnalytics`] capture what the
//! engine reports.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::{Map, Value, json};

use crate::analytics::{AnalyticsCollector, ExecutionMeta};
use crate::context::{ExecutionId, NodeOutput, TokenUsage};
use crate::definition::{NodeDefinition, NodeId, NodeType};
use crate::engine::Engine;
use crate::error::ProcessorError;
use crate::events::{ProgressEvent, ProgressEventKind, ProgressSink};
use crate::processor::{NodeProcessor, ProcessRequest, ProcessorRegistry};
use crate::store::{MemoryStore, SharedStore};
use crate::validation::OutputValidation;

/// One scripted answer.
#[derive(Debug, Clone, PartialEq)]
pub enum Script {
    /// Succeeds with data and optional token usage.
    Succeed {
        data: Map<String, Value>,
        usage: Option<TokenUsage>,
    },
    /// Fails with a processor error.
    Fail { message: String, retryable: bool },
    /// Pauses for approval.
    Pause { approval_ref: String },
    /// Reports the node as skipped.
    Skip,
}

#[derive(Debug, Default)]
struct ScriptState {
    scripts: HashMap<String, Vec<Script>>,
    delays: HashMap<String, Duration>,
    calls: HashMap<String, usize>,
}

/// Processor answering from per-node scripts.
///
/// Scripts queued for a node are consumed in order and the last one
/// repeats. Nodes without a script succeed with `{"result": "<name> done"}`.
/// Clones share their scripts and call counts.
#[derive(Debug, Clone, Default)]
pub struct ScriptedProcessor {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedProcessor {
    /// Creates a processor without scripts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a script for a node.
    pub fn with_script(self, node_name: impl Into<String>, script: Script) -> Self {
        self.lock()
            .scripts
            .entry(node_name.into())
            .or_default()
            .push(script);
        self
    }

    /// Queues a success with the given data.
    pub fn succeed(self, node_name: impl Into<String>, data: Value) -> Self {
        self.with_script(
            node_name,
            Script::Succeed {
                data: object(data),
                usage: None,
            },
        )
    }

    /// Queues a success reporting token usage.
    pub fn succeed_with_tokens(
        self,
        node_name: impl Into<String>,
        data: Value,
        usage: TokenUsage,
    ) -> Self {
        self.with_script(
            node_name,
            Script::Succeed {
                data: object(data),
                usage: Some(usage),
            },
        )
    }

    /// Queues a permanent failure.
    pub fn fail(self, node_name: impl Into<String>, message: impl Into<String>) -> Self {
        self.with_script(
            node_name,
            Script::Fail {
                message: message.into(),
                retryable: false,
            },
        )
    }

    /// Queues a retryable failure.
    pub fn fail_retryable(self, node_name: impl Into<String>, message: impl Into<String>) -> Self {
        self.with_script(
            node_name,
            Script::Fail {
                message: message.into(),
                retryable: true,
            },
        )
    }

    /// Queues a pause for approval.
    pub fn pause(self, node_name: impl Into<String>, approval_ref: impl Into<String>) -> Self {
        self.with_script(
            node_name,
            Script::Pause {
                approval_ref: approval_ref.into(),
            },
        )
    }

    /// Delays every answer for a node.
    pub fn delay(self, node_name: impl Into<String>, delay: Duration) -> Self {
        self.lock().delays.insert(node_name.into(), delay);
        self
    }

    /// Returns how often a node was processed.
    pub fn calls(&self, node_name: &str) -> usize {
        self.lock().calls.get(node_name).copied().unwrap_or(0)
    }

    /// Returns how often any node was processed.
    pub fn total_calls(&self) -> usize {
        self.lock().calls.values().sum()
    }

    fn next_script(&self, node_name: &str) -> (Option<Script>, Option<Duration>) {
        let mut state = self.lock();
        let call = {
            let count = state.calls.entry(node_name.to_owned()).or_default();
            *count += 1;
            *count
        };
        let script = state
            .scripts
            .get(node_name)
            .and_then(|scripts| scripts.get(call - 1).or(scripts.last()))
            .cloned();
        (script, state.delays.get(node_name).copied())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait::async_trait]
impl NodeProcessor for ScriptedProcessor {
    async fn process(&self, request: ProcessRequest<'_>) -> Result<NodeOutput, ProcessorError> {
        let node = request.node;
        let (script, delay) = self.next_script(&node.name);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match script {
            None => Ok(NodeOutput::success(
                node,
                object(json!({ "result": format!("{} done", node.name) })),
            )),
            Some(Script::Succeed { data, usage }) => {
                let output = NodeOutput::success(node, data);
                Ok(match usage {
                    Some(usage) => output.with_token_usage(usage),
                    None => output,
                })
            }
            Some(Script::Fail { message, retryable }) => Err(ProcessorError { message, retryable }),
            Some(Script::Pause { approval_ref }) => Ok(NodeOutput::paused(node, approval_ref)),
            Some(Script::Skip) => Ok(NodeOutput::skipped(node)),
        }
    }
}

/// Sink keeping every event.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<ProgressEvent>>>,
}

impl RecordingSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the events seen so far.
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the kinds of the events seen so far.
    pub fn kinds(&self) -> Vec<ProgressEventKind> {
        self.events().into_iter().map(|event| event.kind).collect()
    }
}

impl ProgressSink for RecordingSink {
    fn emit(&self, event: &ProgressEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

#[derive(Debug, Default)]
struct AnalyticsLog {
    nodes: Vec<(ExecutionId, NodeId)>,
    runs: Vec<ExecutionMeta>,
}

/// Analytics collector keeping every report.
#[derive(Debug, Clone, Default)]
pub struct RecordingAnalytics {
    log: Arc<Mutex<AnalyticsLog>>,
}

impl RecordingAnalytics {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the nodes reported so far.
    pub fn nodes(&self) -> Vec<NodeId> {
        self.lock().nodes.iter().map(|(_, id)| id.clone()).collect()
    }

    /// Returns the run summaries reported so far.
    pub fn runs(&self) -> Vec<ExecutionMeta> {
        self.lock().runs.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AnalyticsLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait::async_trait]
impl AnalyticsCollector for RecordingAnalytics {
    async fn collect_node_output(
        &self,
        execution_id: ExecutionId,
        output: &NodeOutput,
        _validation: Option<&OutputValidation>,
    ) {
        self.lock().nodes.push((execution_id, output.node_id.clone()));
    }

    async fn collect_execution_meta(&self, meta: &ExecutionMeta) {
        self.lock().runs.push(meta.clone());
    }
}

/// Creates an engine over a memory store with `processor` handling PROCESS
/// nodes.
pub fn scripted_engine(processor: ScriptedProcessor) -> (Engine, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let shared: SharedStore = store.clone();
    let registry = ProcessorRegistry::with_builtins().with_processor(NodeType::Process, processor);
    (Engine::new(registry, shared), store)
}

/// Creates an INPUT node without fields.
pub fn input_node(id: &str) -> NodeDefinition {
    NodeDefinition::new(id, id.to_ascii_uppercase(), NodeType::Input)
}

/// Creates a PROCESS node.
pub fn process_node(id: &str, name: &str) -> NodeDefinition {
    NodeDefinition::new(id, name, NodeType::Process)
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("result".into(), other);
            map
        }
    }
}
