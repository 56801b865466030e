//! Workflow execution engine.

use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use futures::future::join_all;
use futures::stream::FuturesUnordered;
use jiff::Timestamp;
use serde_json::{Map, Value, json};

use super::config::EngineConfig;
use super::request::RunRequest;
use super::result::{ERRORS_KEY, ExecutionResult, NodeFailure};
use super::state::{Progress, RunState};
use super::TRACING_TARGET;
use crate::analytics::{AnalyticsCollector, ExecutionMeta, SharedAnalytics};
use crate::checkpoint::{CheckpointManager, CheckpointSnapshot, create_workflow_hash};
use crate::context::{ExecutionContext, ExecutionId, NodeOutput, NodeStatus};
use crate::definition::{NodeDefinition, NodeId, ParallelErrorStrategy, WorkflowDefinition};
use crate::error::{ProcessorError, WorkflowError, WorkflowResult};
use crate::events::{NoopSink, ProgressEvent, ProgressEventKind, ProgressSink, SharedSink};
use crate::graph::{Layer, cascade_skip, execution_order, parallel_layers, successor_ids};
use crate::pricing::{PricingModel, PricingTable};
use crate::processor::{ProcessRequest, ProcessorRegistry};
use crate::routing::{LogicDecision, predecessor_gate, route_skips, should_execute_node};
use crate::store::{ExecutionRecord, ExecutionStatus, NodeLog, SharedStore};
use crate::validation::{OutputValidator, validate_node_input_with_gate};

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
enum RunOutcome {
    Completed,
    Failed,
    Paused {
        node_id: NodeId,
        approval_ref: Option<String>,
    },
}

/// What the scheduler does after a node output is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Disposition {
    Continue,
    Failed,
    Paused(Option<String>),
}

/// The workflow execution engine.
///
/// Schedules the nodes of a workflow sequentially or layer by layer,
/// validates their inputs and outputs, routes LOGIC branches, persists
/// records, node logs and checkpoints, and reports progress. One engine
/// serves any number of concurrent runs; each run owns its own state.
#[derive(Clone)]
pub struct Engine {
    config: EngineConfig,
    registry: Arc<ProcessorRegistry>,
    store: SharedStore,
    checkpoints: CheckpointManager,
    sink: SharedSink,
    analytics: Option<SharedAnalytics>,
    pricing: Arc<dyn PricingModel>,
    validator: Arc<OutputValidator>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("analytics", &self.analytics.is_some())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Creates an engine over a processor registry and a store.
    pub fn new(registry: ProcessorRegistry, store: SharedStore) -> Self {
        Self {
            config: EngineConfig::default(),
            registry: Arc::new(registry),
            checkpoints: CheckpointManager::new(store.clone()),
            store,
            sink: Arc::new(NoopSink),
            analytics: None,
            pricing: Arc::new(PricingTable::default()),
            validator: Arc::new(OutputValidator::new()),
        }
    }

    /// Sets the configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the progress event sink.
    pub fn with_sink(mut self, sink: impl ProgressSink + 'static) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    /// Sets a shared progress event sink.
    pub fn with_shared_sink(mut self, sink: SharedSink) -> Self {
        self.sink = sink;
        self
    }

    /// Sets the analytics collector.
    pub fn with_analytics(mut self, collector: impl AnalyticsCollector + 'static) -> Self {
        self.analytics = Some(Arc::new(collector));
        self
    }

    /// Sets the pricing model used for cost estimates.
    pub fn with_pricing(mut self, pricing: impl PricingModel + 'static) -> Self {
        self.pricing = Arc::new(pricing);
        self
    }

    /// Replaces the output validator.
    pub fn with_output_validator(mut self, validator: OutputValidator) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the store.
    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Returns the checkpoint manager.
    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    /// Executes a workflow.
    ///
    /// Graph errors and unusable checkpoints are returned as `Err` before any
    /// record is created. Every other failure ends the run with a `FAILED`
    /// result naming the node.
    pub async fn execute(
        &self,
        workflow: &WorkflowDefinition,
        request: RunRequest,
    ) -> WorkflowResult<ExecutionResult> {
        workflow.validate()?;
        let order = execution_order(&workflow.nodes, &workflow.edges)?;
        let parallel = self.config.is_parallel(&workflow.settings);
        let strategy = self.config.error_strategy(&workflow.settings);
        let layers = if parallel {
            parallel_layers(&workflow.nodes, &workflow.edges)?
        } else {
            Vec::new()
        };

        let workflow_hash = create_workflow_hash(&workflow.nodes, &workflow.edges);
        let snapshot = match request.resume_from {
            Some(source) => Some(self.checkpoints.load_for_resume(source, &workflow_hash).await?),
            None => None,
        };

        let clock = Instant::now();
        let execution_id = request.execution_id.unwrap_or_default();
        let mut record = ExecutionRecord::pending(
            execution_id,
            &request.workflow_id,
            &request.organization_id,
            &request.user_id,
            request.input.clone(),
        )
        .with_resumed_from(request.resume_from);
        if let Err(error) = self.store.create_execution(&record).await {
            tracing::warn!(
                target: TRACING_TARGET,
                execution_id = %execution_id,
                error = %error,
                "Failed to create execution record"
            );
        }

        let mut globals = workflow.global_variables.clone();
        if let Some(snapshot) = &snapshot {
            globals.extend(snapshot.context.variables.clone());
        }
        globals.extend(request.input.clone());
        let context = ExecutionContext::new(
            execution_id,
            &request.organization_id,
            &request.user_id,
        )
        .with_globals(globals);

        let mut state = RunState::new(context, workflow_hash, workflow.nodes.len());
        if let Some(snapshot) = snapshot {
            restore_snapshot(workflow, &order, &mut state, snapshot);
        }

        self.emit(
            ProgressEvent::new(ProgressEventKind::InitExecution, execution_id)
                .with_status(ExecutionStatus::Running.to_string()),
            state.progress(),
        );

        record.status = ExecutionStatus::Running;
        record.started_at = Some(Timestamp::now());
        self.update_record(&record).await;

        tracing::info!(
            target: TRACING_TARGET,
            execution_id = %execution_id,
            workflow_id = %request.workflow_id,
            node_count = workflow.nodes.len(),
            restored = state.restored_count(),
            parallel,
            strategy = %strategy,
            "Starting execution"
        );

        let outcome = if parallel {
            self.run_parallel(workflow, &layers, strategy.tolerates_errors(), &mut state)
                .await
        } else {
            self.run_sequential(workflow, &order, &mut state).await
        };

        let collect_errors = parallel && strategy == ParallelErrorStrategy::Collect;
        Ok(self
            .finish(workflow, &request, record, state, outcome, collect_errors, clock)
            .await)
    }

    async fn run_sequential(
        &self,
        workflow: &WorkflowDefinition,
        order: &[&NodeDefinition],
        state: &mut RunState,
    ) -> RunOutcome {
        for node in order {
            if state.is_restored(&node.id) {
                continue;
            }
            if !should_execute_node(node, state.skipped(), &workflow.edges, &state.context) {
                state.skip_node(node);
                continue;
            }

            let output = self
                .run_node(workflow, &state.context, node, state.progress())
                .await;
            match self.apply_output(workflow, node, output, state).await {
                Disposition::Continue => {}
                Disposition::Failed => return RunOutcome::Failed,
                Disposition::Paused(approval_ref) => {
                    return RunOutcome::Paused {
                        node_id: node.id.clone(),
                        approval_ref,
                    };
                }
            }
        }
        RunOutcome::Completed
    }

    async fn run_parallel(
        &self,
        workflow: &WorkflowDefinition,
        layers: &[Layer<'_>],
        tolerate_errors: bool,
        state: &mut RunState,
    ) -> RunOutcome {
        for layer in layers {
            let mut eligible: Vec<&NodeDefinition> = Vec::with_capacity(layer.nodes.len());
            for &node in &layer.nodes {
                if state.is_restored(&node.id) {
                    continue;
                }
                if !should_execute_node(node, state.skipped(), &workflow.edges, &state.context) {
                    state.skip_node(node);
                    continue;
                }
                eligible.push(node);
            }
            if eligible.is_empty() {
                continue;
            }

            tracing::debug!(
                target: TRACING_TARGET,
                execution_id = %state.context.execution_id(),
                layer = layer.index,
                nodes = eligible.len(),
                "Running layer"
            );

            let progress = state.progress();
            let finished: Vec<(&NodeDefinition, NodeOutput)> = if tolerate_errors {
                let context = &state.context;
                let outputs = join_all(
                    eligible
                        .iter()
                        .map(|&node| self.run_node(workflow, context, node, progress)),
                )
                .await;
                eligible.into_iter().zip(outputs).collect()
            } else {
                self.run_layer_until_error(workflow, &state.context, &eligible, progress)
                    .await
            };

            let mut aborted = false;
            let mut paused = None;
            for (node, output) in finished {
                match self.apply_output(workflow, node, output, state).await {
                    Disposition::Continue => {}
                    Disposition::Failed if tolerate_errors => {
                        let blocked = cascade_skip(
                            std::slice::from_ref(&node.id),
                            &workflow.edges,
                            |id| state.is_blocked(id),
                            |id| state.is_settled(id),
                        );
                        if !blocked.is_empty() {
                            tracing::debug!(
                                target: TRACING_TARGET,
                                node_id = %node.id,
                                skipped = ?blocked,
                                "Skipping dependents of failed node"
                            );
                        }
                        state.mark_skipped(blocked);
                    }
                    Disposition::Failed => aborted = true,
                    Disposition::Paused(approval_ref) => {
                        paused.get_or_insert(RunOutcome::Paused {
                            node_id: node.id.clone(),
                            approval_ref,
                        });
                    }
                }
            }

            if aborted {
                return RunOutcome::Failed;
            }
            if let Some(paused) = paused {
                return paused;
            }
        }

        if state.failures.is_empty() {
            RunOutcome::Completed
        } else {
            RunOutcome::Failed
        }
    }

    /// Runs the nodes of a layer until one of them fails.
    ///
    /// Nodes still in flight when the first error arrives are dropped and
    /// left without an output. Returns the outputs in completion order.
    async fn run_layer_until_error<'n>(
        &self,
        workflow: &WorkflowDefinition,
        context: &ExecutionContext,
        nodes: &[&'n NodeDefinition],
        progress: Progress,
    ) -> Vec<(&'n NodeDefinition, NodeOutput)> {
        let mut pending: FuturesUnordered<_> = nodes
            .iter()
            .map(|&node| async move {
                (node, self.run_node(workflow, context, node, progress).await)
            })
            .collect();

        let mut finished = Vec::with_capacity(nodes.len());
        while let Some((node, output)) = pending.next().await {
            let failed = output.status == NodeStatus::Error;
            finished.push((node, output));
            if failed {
                if !pending.is_empty() {
                    tracing::debug!(
                        target: TRACING_TARGET,
                        execution_id = %context.execution_id(),
                        node_id = %node.id,
                        interrupted = pending.len(),
                        "Aborting layer after node failure"
                    );
                }
                break;
            }
        }
        finished
    }

    /// Validates the inputs of a node and runs its processor.
    ///
    /// Reads the context only, so the nodes of one layer run concurrently.
    async fn run_node(
        &self,
        workflow: &WorkflowDefinition,
        context: &ExecutionContext,
        node: &NodeDefinition,
        progress: Progress,
    ) -> NodeOutput {
        self.emit(
            ProgressEvent::new(ProgressEventKind::NodeStart, context.execution_id())
                .with_node(node)
                .with_status("running"),
            progress,
        );

        let started_at = Timestamp::now();
        let clock = Instant::now();

        let validation = validate_node_input_with_gate(
            node,
            context,
            &workflow.edges,
            &workflow.nodes,
            predecessor_gate(node),
        );
        if !validation.is_valid() {
            tracing::debug!(
                target: TRACING_TARGET,
                execution_id = %context.execution_id(),
                node_id = %node.id,
                node_name = %node.name,
                status = %validation.status,
                details = ?validation.details,
                "Input validation failed"
            );
            let mut output =
                NodeOutput::error(node, validation.error.clone().unwrap_or_default());
            output
                .data
                .insert("inputStatus".into(), Value::String(validation.status.to_string()));
            output.data.insert("details".into(), json!(validation.details));
            return output.with_timing(started_at, clock.elapsed());
        }

        let (kind, processor) = match self.registry.resolve(node) {
            Ok(resolved) => resolved,
            Err(error) => {
                return NodeOutput::error(node, error.to_string())
                    .with_timing(started_at, clock.elapsed());
            }
        };

        tracing::debug!(
            target: TRACING_TARGET,
            execution_id = %context.execution_id(),
            node_id = %node.id,
            node_name = %node.name,
            kind = ?kind,
            "Executing node"
        );

        let output = match processor.process(ProcessRequest::new(node, context, workflow)).await {
            Ok(mut output) => {
                output.node_id = node.id.clone();
                output.node_name = node.name.clone();
                output.node_type = node.node_type.clone();
                output
            }
            Err(error) => NodeOutput::error(node, error.message).with_retryable(error.retryable),
        };
        output.with_timing(started_at, clock.elapsed())
    }

    /// Accounts, persists and records a node output, then routes.
    async fn apply_output(
        &self,
        workflow: &WorkflowDefinition,
        node: &NodeDefinition,
        output: NodeOutput,
        state: &mut RunState,
    ) -> Disposition {
        let execution_id = state.context.execution_id();
        if let Some(usage) = &output.token_usage {
            let cost = self.pricing.estimate_cost(usage);
            state.usage.add(usage, cost);
        }

        let validation = (output.status.is_success() && self.config.validate_outputs)
            .then(|| self.validator.validate(&node.config, &output.data, None));
        let log = NodeLog::from_output(execution_id, &output).with_validation(validation.clone());
        state.writes.spawn_node_log(self.store.clone(), log);

        if output.status.is_success() && self.config.enable_analytics {
            if let Some(analytics) = &self.analytics {
                analytics
                    .collect_node_output(execution_id, &output, validation.as_ref())
                    .await;
            }
        }

        let status = output.status;
        let error = output.error.clone();
        let retryable = output.retryable;
        let approval_ref = output.approval_ref.clone();
        let decision = node
            .is_logic()
            .then(|| LogicDecision::from_output(&output))
            .flatten();
        state.record(output);

        match status {
            NodeStatus::Success => {
                self.emit(
                    ProgressEvent::new(ProgressEventKind::NodeComplete, execution_id)
                        .with_node(node)
                        .with_status(status.to_string())
                        .with_output_status(validation.map(|v| v.status)),
                    state.progress(),
                );
                if let Some(decision) = decision {
                    let skipped = route_skips(
                        &node.id,
                        &decision,
                        &workflow.edges,
                        |id| state.is_blocked(id),
                        |id| state.is_settled(id),
                    );
                    if !skipped.is_empty() {
                        tracing::debug!(
                            target: TRACING_TARGET,
                            node_id = %node.id,
                            taken = ?decision.taken,
                            skipped = ?skipped,
                            "Skipping branches not taken"
                        );
                    }
                    state.mark_skipped(skipped);
                }
                Disposition::Continue
            }
            NodeStatus::Skipped => {
                state.mark_skipped([node.id.clone()]);
                let blocked = cascade_skip(
                    std::slice::from_ref(&node.id),
                    &workflow.edges,
                    |id| state.is_blocked(id),
                    |id| state.is_settled(id),
                );
                state.mark_skipped(blocked);
                Disposition::Continue
            }
            NodeStatus::Paused => {
                tracing::info!(
                    target: TRACING_TARGET,
                    execution_id = %execution_id,
                    node_id = %node.id,
                    node_name = %node.name,
                    approval_ref = ?approval_ref,
                    "Node paused for approval"
                );
                Disposition::Paused(approval_ref)
            }
            NodeStatus::Error => {
                let error = error.unwrap_or_else(|| "node failed without a message".to_owned());
                let message = WorkflowError::processor(
                    node.id.clone(),
                    &node.name,
                    ProcessorError {
                        message: error.clone(),
                        retryable,
                    },
                )
                .to_string();

                tracing::warn!(
                    target: TRACING_TARGET,
                    execution_id = %execution_id,
                    node_id = %node.id,
                    node_name = %node.name,
                    retryable,
                    error = %error,
                    "Node failed"
                );
                self.emit(
                    ProgressEvent::new(ProgressEventKind::NodeError, execution_id)
                        .with_node(node)
                        .with_status(status.to_string())
                        .with_error(&error),
                    state.progress(),
                );
                state.record_failure(NodeFailure {
                    node_id: node.id.clone(),
                    node_name: node.name.clone(),
                    error,
                    message,
                    retryable,
                });
                Disposition::Failed
            }
        }
    }

    /// Writes checkpoints and the terminal record, then reports the result.
    #[allow(clippy::too_many_arguments)]
    async fn finish(
        &self,
        workflow: &WorkflowDefinition,
        request: &RunRequest,
        mut record: ExecutionRecord,
        mut state: RunState,
        outcome: RunOutcome,
        collect_errors: bool,
        clock: Instant,
    ) -> ExecutionResult {
        let execution_id = record.id;
        let mut output = final_output(workflow, &state.context);
        if collect_errors && !state.failures.is_empty() {
            let errors = state
                .failures
                .iter()
                .map(|failure| {
                    json!({
                        "nodeId": failure.node_id,
                        "nodeName": failure.node_name,
                        "error": failure.error,
                    })
                })
                .collect();
            output.insert(ERRORS_KEY.to_owned(), Value::Array(errors));
        }

        let mut error = None;
        let mut failed_node_id = None;
        let mut retryable = false;
        let mut paused_node_id = None;
        let mut approval_ref = None;
        let mut can_resume = false;

        let status = match outcome {
            RunOutcome::Completed => {
                if self.config.enable_checkpoints {
                    if let Some(source) = request.resume_from {
                        self.clear_checkpoint(source).await;
                    }
                }
                ExecutionStatus::Completed
            }
            RunOutcome::Failed => {
                if let Some(failure) = state.first_failure() {
                    error = Some(match state.failures.len() {
                        1 => failure.message.clone(),
                        n => format!("{} (and {} more failed nodes)", failure.message, n - 1),
                    });
                    failed_node_id = Some(failure.node_id.clone());
                    retryable = state.failures.iter().all(|failure| failure.retryable);
                }
                can_resume = self.save_checkpoint(&state, failed_node_id.clone()).await;
                ExecutionStatus::Failed
            }
            RunOutcome::Paused {
                node_id,
                approval_ref: reference,
            } => {
                can_resume = self.save_checkpoint(&state, None).await;
                paused_node_id = Some(node_id);
                approval_ref = reference;
                ExecutionStatus::Paused
            }
        };

        tracing::trace!(
            target: TRACING_TARGET,
            execution_id = %execution_id,
            pending_writes = state.writes.len(),
            "Flushing persistence"
        );
        state.writes.flush().await;

        let duration_ms = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX);
        let usage = state.usage;

        record.status = status;
        record.output = Some(Value::Object(output.clone()));
        record.error = error.clone();
        record.total_tokens = usage.total_tokens;
        record.prompt_tokens = usage.prompt_tokens;
        record.completion_tokens = usage.completion_tokens;
        record.cost = usage.cost;
        record.duration_ms = duration_ms;
        record.can_resume = can_resume;
        record.paused_node_id = paused_node_id.clone();
        record.approval_ref = approval_ref.clone();
        record.completed_at = Some(Timestamp::now());
        self.update_record(&record).await;

        let kind = match status {
            ExecutionStatus::Completed => ProgressEventKind::ExecutionComplete,
            ExecutionStatus::Paused => ProgressEventKind::ExecutionPaused,
            _ => ProgressEventKind::ExecutionError,
        };
        let mut event = ProgressEvent::new(kind, execution_id).with_status(status.to_string());
        if let Some(error) = &error {
            event = event.with_error(error);
        }
        self.emit(event, state.progress());

        if self.config.enable_analytics {
            if let Some(analytics) = &self.analytics {
                let meta = ExecutionMeta {
                    execution_id,
                    workflow_id: request.workflow_id.clone(),
                    organization_id: request.organization_id.clone(),
                    status,
                    node_count: workflow.nodes.len(),
                    executed_nodes: state.executed,
                    restored_nodes: state.restored_count(),
                    total_tokens: usage.total_tokens,
                    cost: usage.cost,
                    duration_ms,
                    resumed_from: request.resume_from,
                };
                analytics.collect_execution_meta(&meta).await;
            }
        }

        tracing::info!(
            target: TRACING_TARGET,
            execution_id = %execution_id,
            status = %status,
            executed = state.executed,
            restored = state.restored_count(),
            total_tokens = usage.total_tokens,
            duration_ms,
            "Execution finished"
        );

        ExecutionResult {
            execution_id,
            status,
            output,
            total_tokens: usage.total_tokens,
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            cost: usage.cost,
            duration_ms,
            error,
            failed_node_id,
            paused_node_id,
            approval_ref,
            resumed_from: request.resume_from,
            retryable,
            can_resume,
            executed_nodes: state.executed,
            restored_nodes: state.restored_count(),
        }
    }

    /// Saves a checkpoint of the run. Returns whether one was written.
    async fn save_checkpoint(&self, state: &RunState, failed_node_id: Option<NodeId>) -> bool {
        if !self.config.enable_checkpoints {
            return false;
        }
        let execution_id = state.context.execution_id();
        let snapshot =
            CheckpointSnapshot::capture(&state.context, failed_node_id, &state.workflow_hash);
        match self.checkpoints.save_checkpoint(execution_id, &snapshot).await {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(
                    target: TRACING_TARGET,
                    execution_id = %execution_id,
                    error = %error,
                    "Failed to save checkpoint"
                );
                false
            }
        }
    }

    async fn clear_checkpoint(&self, execution_id: ExecutionId) {
        if let Err(error) = self.checkpoints.clear_checkpoint(execution_id).await {
            tracing::warn!(
                target: TRACING_TARGET,
                execution_id = %execution_id,
                error = %error,
                "Failed to clear checkpoint"
            );
        }
    }

    async fn update_record(&self, record: &ExecutionRecord) {
        if let Err(error) = self.store.update_execution(record).await {
            tracing::warn!(
                target: TRACING_TARGET,
                execution_id = %record.id,
                status = %record.status,
                error = %error,
                "Failed to update execution record"
            );
        }
    }

    fn emit(&self, event: ProgressEvent, progress: Progress) {
        let event = event
            .with_progress(progress.settled, progress.total)
            .with_tokens(progress.total_tokens);
        self.sink.emit(&event);
    }
}

/// Restores checkpointed outputs and re-applies their routing decisions.
fn restore_snapshot(
    workflow: &WorkflowDefinition,
    order: &[&NodeDefinition],
    state: &mut RunState,
    snapshot: CheckpointSnapshot,
) {
    for (node_id, completed) in snapshot.completed_nodes {
        if workflow.node(&node_id).is_some() {
            state.restore(completed.output);
        }
    }

    let restored_logic: Vec<NodeId> = order
        .iter()
        .filter(|node| node.is_logic() && state.is_restored(&node.id))
        .map(|node| node.id.clone())
        .collect();

    for node_id in restored_logic {
        let Some(decision) = state
            .context
            .output(&node_id)
            .and_then(LogicDecision::from_output)
        else {
            continue;
        };
        let skipped = route_skips(
            &node_id,
            &decision,
            &workflow.edges,
            |id| state.is_blocked(id),
            |id| state.is_settled(id),
        );
        state.mark_skipped(skipped);
    }

    tracing::info!(
        target: TRACING_TARGET,
        execution_id = %state.context.execution_id(),
        restored = state.restored_count(),
        "Restored checkpoint"
    );
}

/// Data of every successful sink node, keyed by node name.
fn final_output(workflow: &WorkflowDefinition, context: &ExecutionContext) -> Map<String, Value> {
    workflow
        .nodes
        .iter()
        .filter(|node| successor_ids(&node.id, &workflow.edges).is_empty())
        .filter_map(|node| {
            let output = context.output(&node.id)?;
            output
                .status
                .is_success()
                .then(|| (node.name.clone(), Value::Object(output.data.clone())))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::ErrorKind;
    use crate::context::TokenUsage;
    use crate::definition::{EdgeDefinition, NodeType};
    use crate::mock::{
        RecordingAnalytics, RecordingSink, ScriptedProcessor, input_node, process_node,
        scripted_engine,
    };
    use crate::store::ExecutionStore;

    fn request() -> RunRequest {
        RunRequest::new("wf-1", "org-1", "user-1")
    }

    /// `in -> a -> b` and `in -> c`.
    fn fork() -> WorkflowDefinition {
        WorkflowDefinition::new(
            vec![
                input_node("in"),
                process_node("a", "A"),
                process_node("b", "B"),
                process_node("c", "C"),
            ],
            vec![
                EdgeDefinition::new("in", "a"),
                EdgeDefinition::new("a", "b"),
                EdgeDefinition::new("in", "c"),
            ],
        )
    }

    /// `in -> score -> gate`, with `gate` routing to `hi` or `lo`.
    fn routed(extra_nodes: Vec<NodeDefinition>, extra_edges: Vec<EdgeDefinition>) -> WorkflowDefinition {
        let mut nodes = vec![
            input_node("in"),
            process_node("score", "Score"),
            NodeDefinition::new("gate", "Gate", NodeType::Logic).with_config(json!({
                "branches": [
                    { "handle": "high", "conditions": [
                        { "left": "{{Score.value}}", "operator": "greater_than", "right": 7 }
                    ]}
                ],
                "defaultHandle": "low"
            })),
            process_node("hi", "Hi"),
            process_node("lo", "Lo"),
        ];
        nodes.extend(extra_nodes);
        let mut edges = vec![
            EdgeDefinition::new("in", "score"),
            EdgeDefinition::new("score", "gate"),
            EdgeDefinition::new("gate", "hi").with_source_handle("high"),
            EdgeDefinition::new("gate", "lo").with_source_handle("low"),
        ];
        edges.extend(extra_edges);
        WorkflowDefinition::new(nodes, edges)
    }

    #[tokio::test]
    async fn test_sequential_run_accumulates_tokens() {
        let processor = ScriptedProcessor::new()
            .succeed_with_tokens("A", json!({ "result": "a" }), TokenUsage::new(10, 5))
            .succeed_with_tokens("B", json!({ "result": "b" }), TokenUsage::new(3, 2));
        let (engine, store) = scripted_engine(processor);
        let workflow = WorkflowDefinition::new(
            vec![input_node("in"), process_node("a", "A"), process_node("b", "B")],
            vec![EdgeDefinition::new("in", "a"), EdgeDefinition::new("a", "b")],
        );

        let result = engine.execute(&workflow, request()).await.expect("runs");

        assert!(result.is_completed());
        assert_eq!(result.total_tokens, 20);
        assert_eq!(result.prompt_tokens, 13);
        assert_eq!(result.completion_tokens, 7);
        assert_eq!(result.executed_nodes, 3);
        assert_eq!(result.output.len(), 1);
        assert_eq!(result.output["B"]["result"], json!("b"));

        let record = store
            .get_execution(result.execution_id)
            .await
            .expect("store")
            .expect("record");
        assert_eq!(record.status, ExecutionStatus::Completed);
        assert_eq!(record.total_tokens, 20);
        assert!(record.completed_at.is_some());

        let logs = store.node_logs(result.execution_id).await.expect("logs");
        assert_eq!(logs.len(), 3);
    }

    #[tokio::test]
    async fn test_sequential_failure_stops_and_checkpoints() {
        let processor = ScriptedProcessor::new().fail("A", "boom");
        let (engine, store) = scripted_engine(processor.clone());

        let result = engine.execute(&fork(), request()).await.expect("runs");

        assert!(result.is_failed());
        assert_eq!(result.error.as_deref(), Some("node 'A' failed: boom"));
        assert_eq!(result.failed_node_id, Some(NodeId::new("a")));
        assert!(!result.retryable);
        assert!(result.can_resume);
        assert!(
            store
                .load_checkpoint(result.execution_id)
                .await
                .expect("store")
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_parallel_continue_skips_only_dependents() {
        let processor = ScriptedProcessor::new().fail("A", "boom");
        let (engine, _) = scripted_engine(processor.clone());
        let workflow = fork().with_parallel(ParallelErrorStrategy::Continue);

        let result = engine.execute(&workflow, request()).await.expect("runs");

        assert!(result.is_failed());
        assert_eq!(processor.calls("B"), 0);
        assert_eq!(processor.calls("C"), 1);
        assert!(result.output.contains_key("C"));
        assert!(!result.output.contains_key("B"));
        assert!(!result.output.contains_key(ERRORS_KEY));
        assert_eq!(result.error.as_deref(), Some("node 'A' failed: boom"));
    }

    #[tokio::test]
    async fn test_parallel_continue_records_skipped_dependents() {
        let processor = ScriptedProcessor::new().fail("A", "boom");
        let (engine, _) = scripted_engine(processor);
        let workflow = fork();
        let layers = parallel_layers(&workflow.nodes, &workflow.edges).expect("layers");
        let context = ExecutionContext::new(ExecutionId::new(), "org-1", "user-1");
        let mut state = RunState::new(context, String::new(), workflow.nodes.len());

        let outcome = engine
            .run_parallel(&workflow, &layers, true, &mut state)
            .await;

        assert_eq!(outcome, RunOutcome::Failed);
        let status = |id: &str| state.context.status(&NodeId::new(id));
        assert_eq!(status("a"), Some(NodeStatus::Error));
        assert_eq!(status("b"), Some(NodeStatus::Skipped));
        assert_eq!(status("c"), Some(NodeStatus::Success));
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_fail_fast_aborts_in_flight_siblings() {
        let processor = ScriptedProcessor::new()
            .fail("A", "boom")
            .delay("C", Duration::from_millis(1500));
        let (engine, store) = scripted_engine(processor.clone());
        let workflow = fork().with_parallel(ParallelErrorStrategy::FailFast);

        let clock = tokio::time::Instant::now();
        let result = engine.execute(&workflow, request()).await.expect("runs");

        assert!(result.is_failed());
        assert!(clock.elapsed() < Duration::from_millis(1500));
        assert_eq!(result.failed_node_id, Some(NodeId::new("a")));
        assert_eq!(processor.calls("B"), 0);
        assert!(!result.output.contains_key("C"));

        let logs = store.node_logs(result.execution_id).await.expect("logs");
        assert!(logs.iter().all(|log| log.node_name != "C"));
    }

    #[tokio::test]
    async fn test_parallel_collect_reports_errors() {
        let processor = ScriptedProcessor::new()
            .fail_retryable("A", "rate limited")
            .fail_retryable("C", "rate limited");
        let (engine, _) = scripted_engine(processor);
        let workflow = fork().with_parallel(ParallelErrorStrategy::Collect);

        let result = engine.execute(&workflow, request()).await.expect("runs");

        assert!(result.is_failed());
        assert!(result.retryable);
        let errors = result.output[ERRORS_KEY].as_array().expect("errors");
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0]["nodeName"], json!("A"));
        assert_eq!(errors[0]["error"], json!("rate limited"));
        assert_eq!(
            result.error.as_deref(),
            Some("node 'A' failed: rate limited (and 1 more failed nodes)")
        );
    }

    #[tokio::test]
    async fn test_condition_skips_branch_not_taken() {
        let processor = ScriptedProcessor::new().succeed("Score", json!({ "value": 9 }));
        let (engine, store) = scripted_engine(processor.clone());

        let result = engine
            .execute(&routed(Vec::new(), Vec::new()), request())
            .await
            .expect("runs");

        assert!(result.is_completed());
        assert_eq!(processor.calls("Hi"), 1);
        assert_eq!(processor.calls("Lo"), 0);
        assert!(result.output.contains_key("Hi"));
        assert!(!result.output.contains_key("Lo"));

        let logs = store.node_logs(result.execution_id).await.expect("logs");
        assert!(logs.iter().all(|log| log.node_name != "Lo"));
    }

    #[tokio::test]
    async fn test_merge_joins_taken_branch() {
        let processor = ScriptedProcessor::new().succeed("Score", json!({ "value": 2 }));
        let (engine, store) = scripted_engine(processor.clone());
        let workflow = routed(
            vec![
                NodeDefinition::new("join", "Join", NodeType::Logic)
                    .with_config(json!({ "mode": "merge" })),
                process_node("final", "Final"),
            ],
            vec![
                EdgeDefinition::new("hi", "join"),
                EdgeDefinition::new("lo", "join"),
                EdgeDefinition::new("join", "final"),
            ],
        );

        let result = engine.execute(&workflow, request()).await.expect("runs");

        assert!(result.is_completed());
        assert_eq!(processor.calls("Hi"), 0);
        assert_eq!(processor.calls("Final"), 1);
        assert!(result.output.contains_key("Final"));

        let logs = store.node_logs(result.execution_id).await.expect("logs");
        let join = logs
            .iter()
            .find(|log| log.node_name == "Join")
            .expect("join log");
        assert_eq!(join.data["result"], json!("Lo done"));
    }

    #[tokio::test]
    async fn test_pause_then_resume_restores_checkpoint() {
        let processor = ScriptedProcessor::new()
            .pause("B", "approval-1")
            .succeed("B", json!({ "result": "approved" }));
        let (engine, store) = scripted_engine(processor.clone());
        let workflow = WorkflowDefinition::new(
            vec![
                input_node("in"),
                process_node("a", "A"),
                process_node("b", "B"),
                process_node("c", "C"),
            ],
            vec![
                EdgeDefinition::new("in", "a"),
                EdgeDefinition::new("a", "b"),
                EdgeDefinition::new("b", "c"),
            ],
        );

        let paused = engine.execute(&workflow, request()).await.expect("runs");
        assert!(paused.is_paused());
        assert_eq!(paused.paused_node_id, Some(NodeId::new("b")));
        assert_eq!(paused.approval_ref.as_deref(), Some("approval-1"));
        assert!(paused.can_resume);
        assert_eq!(processor.calls("C"), 0);

        let resumed = engine
            .execute(&workflow, request().with_resume_from(paused.execution_id))
            .await
            .expect("resumes");

        assert!(resumed.is_completed());
        assert_eq!(resumed.resumed_from, Some(paused.execution_id));
        assert_eq!(resumed.restored_nodes, 2);
        assert_eq!(resumed.executed_nodes, 2);
        assert_eq!(processor.calls("A"), 1);
        assert_eq!(processor.calls("B"), 2);
        assert_eq!(processor.calls("C"), 1);
        assert!(
            store
                .load_checkpoint(paused.execution_id)
                .await
                .expect("store")
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_resume_keeps_branch_not_taken_skipped() {
        let processor = ScriptedProcessor::new()
            .succeed("Score", json!({ "value": 9 }))
            .pause("Tail", "approval-2")
            .succeed("Tail", json!({ "result": "approved" }));
        let (engine, _) = scripted_engine(processor.clone());
        let workflow = routed(
            vec![process_node("tail", "Tail")],
            vec![EdgeDefinition::new("hi", "tail")],
        );

        let paused = engine.execute(&workflow, request()).await.expect("runs");
        assert!(paused.is_paused());
        assert_eq!(paused.paused_node_id, Some(NodeId::new("tail")));
        assert_eq!(processor.calls("Lo"), 0);

        let resumed = engine
            .execute(&workflow, request().with_resume_from(paused.execution_id))
            .await
            .expect("resumes");

        assert!(resumed.is_completed());
        assert_eq!(processor.calls("Score"), 1);
        assert_eq!(processor.calls("Hi"), 1);
        assert_eq!(processor.calls("Tail"), 2);
        assert_eq!(processor.calls("Lo"), 0);
        assert!(resumed.output.contains_key("Tail"));
        assert!(!resumed.output.contains_key("Lo"));
    }

    #[tokio::test]
    async fn test_resume_without_checkpoint_is_rejected() {
        let (engine, store) = scripted_engine(ScriptedProcessor::new());
        let result = engine
            .execute(&fork(), request().with_resume_from(ExecutionId::new()))
            .await;

        let error = result.expect_err("no checkpoint");
        assert_eq!(error.kind(), ErrorKind::Checkpoint);
        assert_eq!(store.execution_count().await, 0);
    }

    #[tokio::test]
    async fn test_cycle_is_rejected_before_any_record() {
        let (engine, store) = scripted_engine(ScriptedProcessor::new());
        let workflow = WorkflowDefinition::new(
            vec![process_node("a", "A"), process_node("b", "B")],
            vec![EdgeDefinition::new("a", "b"), EdgeDefinition::new("b", "a")],
        );

        let error = engine
            .execute(&workflow, request())
            .await
            .expect_err("cycle");
        assert_eq!(error.kind(), ErrorKind::Graph);
        assert_eq!(store.execution_count().await, 0);
    }

    #[tokio::test]
    async fn test_unresolved_reference_fails_node() {
        let processor = ScriptedProcessor::new();
        let (engine, _) = scripted_engine(processor.clone());
        let workflow = WorkflowDefinition::new(
            vec![
                input_node("in"),
                process_node("b", "B").with_config(json!({ "prompt": "Use {{Missing.text}}" })),
            ],
            vec![EdgeDefinition::new("in", "b")],
        );

        let result = engine.execute(&workflow, request()).await.expect("runs");

        assert!(result.is_failed());
        assert_eq!(processor.calls("B"), 0);
        let error = result.error.expect("error");
        assert!(error.starts_with("node 'B' failed: unresolved variable reference"));
    }

    #[tokio::test]
    async fn test_events_and_analytics_follow_run() {
        let sink = RecordingSink::new();
        let analytics = RecordingAnalytics::new();
        let (engine, _) = scripted_engine(ScriptedProcessor::new());
        let engine = engine.with_sink(sink.clone()).with_analytics(analytics.clone());
        let workflow = WorkflowDefinition::new(
            vec![input_node("in"), process_node("a", "A")],
            vec![EdgeDefinition::new("in", "a")],
        );

        let result = engine.execute(&workflow, request()).await.expect("runs");

        assert_eq!(
            sink.kinds(),
            vec![
                ProgressEventKind::InitExecution,
                ProgressEventKind::NodeStart,
                ProgressEventKind::NodeComplete,
                ProgressEventKind::NodeStart,
                ProgressEventKind::NodeComplete,
                ProgressEventKind::ExecutionComplete,
            ]
        );
        let events = sink.events();
        assert_eq!(events[0].progress, 0);
        assert_eq!(events.last().map(|event| event.progress), Some(100));
        assert!(events.iter().all(|event| event.execution_id == result.execution_id));

        assert_eq!(analytics.nodes().len(), 2);
        let runs = analytics.runs();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, ExecutionStatus::Completed);
    }
}
