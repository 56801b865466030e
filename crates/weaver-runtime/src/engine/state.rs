//! Bookkeeping of one run.

use std::collections::HashSet;

use crate::context::{ExecutionContext, NodeOutput, TokenUsage};
use crate::definition::{NodeDefinition, NodeId};

use super::persistence::PendingWrites;
use super::result::NodeFailure;

/// Token and cost totals of the nodes executed in one run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct UsageTotals {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub cost: f64,
}

impl UsageTotals {
    pub fn add(&mut self, usage: &TokenUsage, cost: f64) {
        self.prompt_tokens += usage.prompt_tokens;
        self.completion_tokens += usage.completion_tokens;
        self.total_tokens += usage.total_tokens;
        self.cost += cost;
    }
}

/// Counters reported with progress events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Progress {
    pub settled: usize,
    pub total: usize,
    pub total_tokens: u64,
}

/// Mutable state of one run, owned by the task driving it.
#[derive(Debug)]
pub(crate) struct RunState {
    pub context: ExecutionContext,
    pub workflow_hash: String,
    skipped: HashSet<NodeId>,
    restored: HashSet<NodeId>,
    failed: HashSet<NodeId>,
    pub failures: Vec<NodeFailure>,
    pub usage: UsageTotals,
    pub executed: usize,
    pub settled: usize,
    pub total_nodes: usize,
    pub writes: PendingWrites,
}

impl RunState {
    pub fn new(context: ExecutionContext, workflow_hash: String, total_nodes: usize) -> Self {
        Self {
            context,
            workflow_hash,
            skipped: HashSet::new(),
            restored: HashSet::new(),
            failed: HashSet::new(),
            failures: Vec::new(),
            usage: UsageTotals::default(),
            executed: 0,
            settled: 0,
            total_nodes,
            writes: PendingWrites::default(),
        }
    }

    /// Records a checkpointed output as already written.
    pub fn restore(&mut self, output: NodeOutput) {
        let node_id = output.node_id.clone();
        if self.context.record_output(output) {
            self.restored.insert(node_id);
            self.settled += 1;
        }
    }

    pub fn is_restored(&self, node_id: &NodeId) -> bool {
        self.restored.contains(node_id)
    }

    pub fn restored_count(&self) -> usize {
        self.restored.len()
    }

    pub fn skipped(&self) -> &HashSet<NodeId> {
        &self.skipped
    }

    /// Marks nodes to be skipped when the schedule reaches them.
    pub fn mark_skipped(&mut self, node_ids: impl IntoIterator<Item = NodeId>) {
        self.skipped.extend(node_ids);
    }

    /// Records a skipped output for a node the schedule reached.
    pub fn skip_node(&mut self, node: &NodeDefinition) {
        self.skipped.insert(node.id.clone());
        if self.context.record_output(NodeOutput::skipped(node)) {
            self.settled += 1;
        }
    }

    /// Returns whether a node can no longer feed its dependents.
    pub fn is_blocked(&self, node_id: &NodeId) -> bool {
        self.skipped.contains(node_id) || self.failed.contains(node_id)
    }

    /// Returns whether a node already has an output.
    pub fn is_settled(&self, node_id: &NodeId) -> bool {
        self.context.output(node_id).is_some()
    }

    /// Records a node output produced in this run.
    pub fn record(&mut self, output: NodeOutput) {
        if self.context.record_output(output) {
            self.executed += 1;
            self.settled += 1;
        }
    }

    pub fn record_failure(&mut self, failure: NodeFailure) {
        self.failed.insert(failure.node_id.clone());
        self.failures.push(failure);
    }

    pub fn first_failure(&self) -> Option<&NodeFailure> {
        self.failures.first()
    }

    pub fn progress(&self) -> Progress {
        Progress {
            settled: self.settled,
            total: self.total_nodes,
            total_tokens: self.usage.total_tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Map;

    use super::*;
    use crate::context::ExecutionId;
    use crate::definition::NodeType;

    #[test]
    fn test_restored_and_executed_are_counted_apart() {
        let context = ExecutionContext::new(ExecutionId::new(), "org", "user");
        let mut state = RunState::new(context, "hash".into(), 3);
        let a = NodeDefinition::new("a", "A", NodeType::Process);
        let b = NodeDefinition::new("b", "B", NodeType::Process);
        let c = NodeDefinition::new("c", "C", NodeType::Process);

        state.restore(NodeOutput::success(&a, Map::new()));
        state.record(NodeOutput::success(&b, Map::new()));
        state.skip_node(&c);
        state.record(NodeOutput::success(&b, Map::new()));

        assert!(state.is_restored(&a.id));
        assert_eq!(state.restored_count(), 1);
        assert_eq!(state.executed, 1);
        assert_eq!(state.settled, 3);
        assert!(state.is_blocked(&c.id));
        assert!(state.is_settled(&c.id));
    }

    #[test]
    fn test_usage_totals_accumulate() {
        let mut totals = UsageTotals::default();
        totals.add(&TokenUsage::new(10, 5), 0.5);
        totals.add(&TokenUsage::new(1, 1), 0.25);
        assert_eq!(totals.total_tokens, 17);
        assert_eq!(totals.prompt_tokens, 11);
        assert!((totals.cost - 0.75).abs() < 1e-9);
    }
}
