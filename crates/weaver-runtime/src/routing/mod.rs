//! Branch routing for LOGIC nodes.
//!
//! A LOGIC node evaluates its configuration into a [`LogicDecision`]: the set
//! of source handles it takes. Targets reachable only through handles that
//! were not taken are skipped, and the skip cascades to every dependent
//! whose predecessors are all skipped.

mod config;
mod evaluate;

use std::collections::HashSet;

use serde_json::{Map, Value, json};

pub use config::{Branch, Combinator, Comparison, LogicConfig, LogicMode, Operator, SwitchCase};
pub use evaluate::{compare, evaluate_branch, evaluate_comparison, loosely_equal, resolve_operand};

use crate::context::{ExecutionContext, NodeOutput, NodeStatus};
use crate::definition::{EdgeDefinition, NodeDefinition, NodeId};
use crate::error::ProcessorError;
use crate::graph::{cascade_skip, predecessor_ids};
use crate::validation::PredecessorGate;
use crate::variable::{VariableResolver, format_value};

/// Tracing target for routing decisions.
pub const TRACING_TARGET: &str = "weaver_runtime::routing";

/// Outcome of evaluating a LOGIC node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicDecision {
    /// Mode that produced the decision.
    pub mode: LogicMode,
    /// Handles taken, in evaluation order.
    pub taken: Vec<String>,
    /// Whether every outgoing edge is taken regardless of handle.
    pub passthrough: bool,
}

impl LogicDecision {
    /// A decision that takes every outgoing edge.
    pub fn passthrough(mode: LogicMode) -> Self {
        Self {
            mode,
            taken: Vec::new(),
            passthrough: true,
        }
    }

    /// Returns whether an edge leaving through `handle` is taken.
    ///
    /// Edges without a handle are always taken.
    pub fn takes(&self, handle: Option<&str>) -> bool {
        match handle {
            None => true,
            Some(_) if self.passthrough => true,
            Some(handle) => self.taken.iter().any(|taken| taken == handle),
        }
    }

    /// Serializes the decision into node output data.
    pub fn to_data(&self) -> Map<String, Value> {
        let mut data = Map::new();
        data.insert("mode".into(), json!(self.mode.as_ref()));
        data.insert("handles".into(), json!(self.taken));
        data.insert("passthrough".into(), json!(self.passthrough));
        if let Some(first) = self.taken.first() {
            data.insert("result".into(), json!(first));
        }
        data
    }

    /// Reads a decision back from a recorded LOGIC output.
    pub fn from_output(output: &NodeOutput) -> Option<Self> {
        if output.status != NodeStatus::Success {
            return None;
        }
        let mode = output
            .data
            .get("mode")
            .and_then(Value::as_str)
            .and_then(|mode| mode.parse().ok())?;
        let taken = output
            .data
            .get("handles")
            .and_then(Value::as_array)
            .map(|handles| {
                handles
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();
        let passthrough = output
            .data
            .get("passthrough")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        Some(Self {
            mode,
            taken,
            passthrough,
        })
    }
}

/// Evaluates a LOGIC node against the run.
///
/// Returns the decision and the output data to record for the node.
pub fn evaluate_logic(
    node: &NodeDefinition,
    context: &ExecutionContext,
    edges: &[EdgeDefinition],
    nodes: &[NodeDefinition],
) -> Result<(LogicDecision, Map<String, Value>), ProcessorError> {
    let config = LogicConfig::from_node(node)?;
    let resolver = VariableResolver::new(context, nodes);

    let decision = match config.mode {
        LogicMode::Condition => {
            let matched = config
                .branches
                .iter()
                .find(|branch| evaluate_branch(&resolver, branch))
                .map(|branch| branch.handle.clone())
                .or_else(|| config.default_handle.clone());
            LogicDecision {
                mode: LogicMode::Condition,
                taken: matched.into_iter().collect(),
                passthrough: false,
            }
        }
        LogicMode::Switch => {
            let value = resolve_operand(&resolver, &config.value);
            let matched = config
                .cases
                .iter()
                .find(|case| loosely_equal(&value, &resolve_operand(&resolver, &case.value)))
                .map(|case| case.handle.clone())
                .or_else(|| config.default_handle.clone());
            LogicDecision {
                mode: LogicMode::Switch,
                taken: matched.into_iter().collect(),
                passthrough: false,
            }
        }
        LogicMode::Merge => LogicDecision::passthrough(LogicMode::Merge),
    };

    let mut data = decision.to_data();
    if decision.mode == LogicMode::Merge {
        let inputs = merged_inputs(node, context, edges);
        let joined = inputs
            .values()
            .map(format_value)
            .filter(|text| !text.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        data.insert("result".into(), Value::String(joined));
        data.insert("inputs".into(), Value::Object(inputs));
    }

    tracing::debug!(
        target: TRACING_TARGET,
        node_id = %node.id,
        node_name = %node.name,
        mode = %decision.mode,
        taken = ?decision.taken,
        "Evaluated logic node"
    );

    Ok((decision, data))
}

/// Primary content of every successful predecessor, keyed by node name.
fn merged_inputs(
    node: &NodeDefinition,
    context: &ExecutionContext,
    edges: &[EdgeDefinition],
) -> Map<String, Value> {
    predecessor_ids(&node.id, edges)
        .iter()
        .filter_map(|id| context.output(id))
        .filter(|output| output.status.is_success())
        .map(|output| {
            let text = output.primary_text().map(Value::String).unwrap_or(Value::Null);
            (output.node_name.clone(), text)
        })
        .collect()
}

/// Computes the nodes skipped by a routing decision.
///
/// A target of an edge that was not taken is skipped when none of its
/// incoming edges is live: each either leaves this node through a handle that
/// was not taken or comes from a node for which `is_blocked` holds. The skip
/// then cascades through [`cascade_skip`].
pub fn route_skips<B, S>(
    logic_node: &NodeId,
    decision: &LogicDecision,
    edges: &[EdgeDefinition],
    is_blocked: B,
    is_settled: S,
) -> Vec<NodeId>
where
    B: Fn(&NodeId) -> bool,
    S: Fn(&NodeId) -> bool,
{
    let is_dead_edge = |edge: &EdgeDefinition| {
        (&edge.source == logic_node && !decision.takes(edge.source_handle.as_deref()))
            || is_blocked(&edge.source)
    };

    let mut seen = HashSet::new();
    let direct: Vec<NodeId> = edges
        .iter()
        .filter(|edge| &edge.source == logic_node && !decision.takes(edge.source_handle.as_deref()))
        .map(|edge| edge.target.clone())
        .filter(|target| seen.insert(target.clone()))
        .filter(|target| !is_settled(target))
        .filter(|target| {
            edges
                .iter()
                .filter(|edge| &edge.target == target)
                .all(|edge| is_dead_edge(edge))
        })
        .collect();

    if direct.is_empty() {
        return direct;
    }

    let cascaded = cascade_skip(&direct, edges, &is_blocked, &is_settled);
    direct.into_iter().chain(cascaded).collect()
}

/// Decides whether a node should run.
///
/// A node runs unless it was marked skipped or it has predecessors that are
/// all skipped.
pub fn should_execute_node(
    node: &NodeDefinition,
    skipped: &HashSet<NodeId>,
    edges: &[EdgeDefinition],
    context: &ExecutionContext,
) -> bool {
    if skipped.contains(&node.id) {
        return false;
    }

    let predecessors = predecessor_ids(&node.id, edges);
    let all_skipped = !predecessors.is_empty()
        && predecessors.iter().all(|id| {
            skipped.contains(id) || context.status(id) == Some(NodeStatus::Skipped)
        });
    !all_skipped
}

/// Returns the predecessor gate applied to a node.
///
/// Merge nodes join alternative branches, so one successful predecessor is
/// enough. Every other node needs all of them.
pub fn predecessor_gate(node: &NodeDefinition) -> PredecessorGate {
    let is_merge = node.is_logic()
        && node
            .config_str("mode")
            .is_some_and(|mode| mode.eq_ignore_ascii_case("merge"));
    if is_merge {
        PredecessorGate::Any
    } else {
        PredecessorGate::All
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::context::ExecutionId;
    use crate::definition::NodeType;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn score_context(score: i64) -> (Vec<NodeDefinition>, ExecutionContext) {
        let nodes = vec![
            NodeDefinition::new("score", "Score", NodeType::Process),
            NodeDefinition::new("gate", "Gate", NodeType::Logic).with_config(json!({
                "branches": [
                    { "handle": "high", "conditions": [
                        { "left": "{{Score.value}}", "operator": "greater_than", "right": 7 }
                    ]}
                ],
                "defaultHandle": "low"
            })),
        ];
        let mut context = ExecutionContext::new(ExecutionId::new(), "org", "user");
        context.record_output(NodeOutput::success(&nodes[0], map(json!({ "value": score }))));
        (nodes, context)
    }

    #[test]
    fn test_condition_takes_matching_branch() {
        let (nodes, context) = score_context(9);
        let (decision, data) = evaluate_logic(&nodes[1], &context, &[], &nodes).expect("evaluates");
        assert_eq!(decision.taken, vec!["high".to_owned()]);
        assert_eq!(data.get("result"), Some(&json!("high")));
        assert!(!decision.takes(Some("low")));
        assert!(decision.takes(None));
    }

    #[test]
    fn test_condition_falls_back_to_default() {
        let (nodes, context) = score_context(3);
        let (decision, _) = evaluate_logic(&nodes[1], &context, &[], &nodes).expect("evaluates");
        assert_eq!(decision.taken, vec!["low".to_owned()]);
    }

    #[test]
    fn test_switch_mode() {
        let nodes = vec![
            NodeDefinition::new("in", "Ticket", NodeType::Input),
            NodeDefinition::new("sw", "Route", NodeType::Logic).with_config(json!({
                "mode": "switch",
                "value": "{{Ticket.priority}}",
                "cases": [{ "handle": "p1", "value": "urgent" }, { "handle": "p2", "value": "normal" }]
            })),
        ];
        let mut context = ExecutionContext::new(ExecutionId::new(), "org", "user");
        context.record_output(NodeOutput::success(&nodes[0], map(json!({ "priority": "normal" }))));

        let (decision, _) = evaluate_logic(&nodes[1], &context, &[], &nodes).expect("evaluates");
        assert_eq!(decision.taken, vec!["p2".to_owned()]);
    }

    #[test]
    fn test_merge_joins_successful_inputs() {
        let nodes = vec![
            NodeDefinition::new("a", "A", NodeType::Process),
            NodeDefinition::new("b", "B", NodeType::Process),
            NodeDefinition::new("m", "Join", NodeType::Logic).with_config(json!({ "mode": "merge" })),
        ];
        let edges = vec![EdgeDefinition::new("a", "m"), EdgeDefinition::new("b", "m")];
        let mut context = ExecutionContext::new(ExecutionId::new(), "org", "user");
        context.record_output(NodeOutput::success(&nodes[0], map(json!({ "result": "from a" }))));
        context.record_output(NodeOutput::skipped(&nodes[1]));

        let (decision, data) = evaluate_logic(&nodes[2], &context, &edges, &nodes).expect("evaluates");
        assert!(decision.passthrough);
        assert_eq!(data.get("result"), Some(&json!("from a")));
        assert_eq!(predecessor_gate(&nodes[2]), PredecessorGate::Any);
        assert_eq!(predecessor_gate(&nodes[0]), PredecessorGate::All);
    }

    #[test]
    fn test_decision_round_trips_through_output() {
        let node = NodeDefinition::new("gate", "Gate", NodeType::Logic);
        let decision = LogicDecision {
            mode: LogicMode::Condition,
            taken: vec!["yes".into()],
            passthrough: false,
        };
        let output = NodeOutput::success(&node, decision.to_data());
        assert_eq!(LogicDecision::from_output(&output), Some(decision));
    }

    #[test]
    fn test_route_skips_spare_shared_joins() {
        // gate -(yes)-> a -> join ; gate -(no)-> b -> join ; b -> only_b
        let edges = vec![
            EdgeDefinition::new("gate", "a").with_source_handle("yes"),
            EdgeDefinition::new("gate", "b").with_source_handle("no"),
            EdgeDefinition::new("a", "join"),
            EdgeDefinition::new("b", "join"),
            EdgeDefinition::new("b", "only_b"),
        ];
        let decision = LogicDecision {
            mode: LogicMode::Condition,
            taken: vec!["yes".into()],
            passthrough: false,
        };

        let skipped = route_skips(&NodeId::from("gate"), &decision, &edges, |_| false, |_| false);
        assert_eq!(skipped, vec![NodeId::from("b"), NodeId::from("only_b")]);
    }

    #[test]
    fn test_route_skips_keep_targets_with_live_edges() {
        let edges = vec![
            EdgeDefinition::new("gate", "t").with_source_handle("no"),
            EdgeDefinition::new("other", "t"),
        ];
        let decision = LogicDecision {
            mode: LogicMode::Condition,
            taken: vec!["yes".into()],
            passthrough: false,
        };
        let skipped = route_skips(&NodeId::from("gate"), &decision, &edges, |_| false, |_| false);
        assert!(skipped.is_empty());
    }

    #[test]
    fn test_should_execute_node() {
        let nodes = vec![
            NodeDefinition::new("a", "A", NodeType::Process),
            NodeDefinition::new("b", "B", NodeType::Process),
        ];
        let edges = vec![EdgeDefinition::new("a", "b")];
        let context = ExecutionContext::new(ExecutionId::new(), "org", "user");

        let mut skipped = HashSet::new();
        assert!(should_execute_node(&nodes[1], &skipped, &edges, &context));
        skipped.insert(NodeId::from("a"));
        assert!(!should_execute_node(&nodes[1], &skipped, &edges, &context));
        assert!(!should_execute_node(&nodes[0], &skipped, &edges, &context));
    }
}
