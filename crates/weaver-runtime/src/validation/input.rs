//! Pre-execution input checks.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

use crate::context::{ExecutionContext, NodeStatus};
use crate::definition::{EdgeDefinition, NodeDefinition, NodeId};
use crate::error::InputValidationError;
use crate::graph::predecessor_ids;
use crate::routing::LogicConfig;
use crate::variable::VariableResolver;

/// Config keys whose string values are templates.
pub const TEMPLATED_FIELDS: &[&str] = &[
    "prompt",
    "systemPrompt",
    "userPrompt",
    "template",
    "content",
    "message",
];

/// Classification of a node's inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[derive(AsRefStr, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum InputStatus {
    /// Inputs are satisfied.
    Valid,
    /// A variable reference cannot be resolved.
    Invalid,
    /// A predecessor or a required field is missing.
    Missing,
}

/// How many predecessors must have succeeded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PredecessorGate {
    /// Every predecessor must have succeeded.
    #[default]
    All,
    /// At least one predecessor must have succeeded and none may be pending.
    Any,
}

/// Result of [`validate_node_input`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputValidation {
    /// Classification.
    pub status: InputStatus,
    /// Summary message when not valid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Offending fields, predecessors or tokens.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

impl InputValidation {
    /// A passing result.
    pub fn valid() -> Self {
        Self {
            status: InputStatus::Valid,
            error: None,
            details: Vec::new(),
        }
    }

    fn failing(status: InputStatus, error: String, details: Vec<String>) -> Self {
        Self {
            status,
            error: Some(error),
            details,
        }
    }

    /// Returns whether the node may run.
    pub fn is_valid(&self) -> bool {
        self.status == InputStatus::Valid
    }

    /// Converts a failing result into an error attributed to `node`.
    pub fn into_error(self, node: &NodeDefinition) -> Option<InputValidationError> {
        if self.is_valid() {
            return None;
        }
        Some(InputValidationError {
            node_id: node.id.clone(),
            node_name: node.name.clone(),
            status: self.status.to_string(),
            message: self.error.unwrap_or_default(),
        })
    }
}

/// Validates a node's inputs with the default all-predecessors gate.
///
/// Pure function of the context: safe to call speculatively.
pub fn validate_node_input(
    node: &NodeDefinition,
    context: &ExecutionContext,
    edges: &[EdgeDefinition],
    nodes: &[NodeDefinition],
) -> InputValidation {
    validate_node_input_with_gate(node, context, edges, nodes, PredecessorGate::All)
}

/// Validates a node's inputs with an explicit predecessor gate.
///
/// Source nodes are checked for required fields only. Other nodes are
/// checked for predecessors first and for unresolved references second.
pub fn validate_node_input_with_gate(
    node: &NodeDefinition,
    context: &ExecutionContext,
    edges: &[EdgeDefinition],
    nodes: &[NodeDefinition],
    gate: PredecessorGate,
) -> InputValidation {
    if node.is_source() {
        return check_required_fields(node, context);
    }

    let predecessors = check_predecessors(node, context, edges, nodes, gate);
    if !predecessors.is_valid() {
        return predecessors;
    }

    check_references(node, context, nodes)
}

fn check_required_fields(node: &NodeDefinition, context: &ExecutionContext) -> InputValidation {
    let missing: Vec<String> = node
        .input_fields()
        .into_iter()
        .filter(|field| field.required)
        .filter(|field| field.effective_value(context.globals()).is_none())
        .map(|field| field.name)
        .collect();

    if missing.is_empty() {
        return InputValidation::valid();
    }

    InputValidation::failing(
        InputStatus::Missing,
        format!("required field(s) missing: {}", missing.join(", ")),
        missing,
    )
}

fn describe(status: Option<NodeStatus>) -> Option<&'static str> {
    match status {
        None => Some("has not run"),
        Some(NodeStatus::Error) => Some("failed"),
        Some(NodeStatus::Skipped) => Some("was skipped"),
        Some(NodeStatus::Paused) => Some("is awaiting approval"),
        Some(NodeStatus::Success) => None,
    }
}

fn check_predecessors(
    node: &NodeDefinition,
    context: &ExecutionContext,
    edges: &[EdgeDefinition],
    nodes: &[NodeDefinition],
    gate: PredecessorGate,
) -> InputValidation {
    let predecessors = predecessor_ids(&node.id, edges);
    let label = |id: &NodeId| {
        nodes
            .iter()
            .find(|candidate| &candidate.id == id)
            .map_or_else(|| id.to_string(), |candidate| candidate.name.clone())
    };

    let problems: Vec<(String, Option<NodeStatus>, &'static str)> = predecessors
        .iter()
        .filter_map(|id| {
            let status = context.status(id);
            describe(status).map(|reason| (label(id), status, reason))
        })
        .collect();

    let satisfied = match gate {
        PredecessorGate::All => problems.is_empty(),
        PredecessorGate::Any => {
            let pending = problems.iter().any(|(_, status, _)| status.is_none());
            let any_success = problems.len() < predecessors.len();
            !pending && (any_success || predecessors.is_empty())
        }
    };

    if satisfied {
        return InputValidation::valid();
    }

    let details: Vec<String> = problems
        .iter()
        .map(|(name, _, reason)| format!("{name} {reason}"))
        .collect();
    InputValidation::failing(
        InputStatus::Missing,
        format!("missing input from predecessor(s): {}", details.join("; ")),
        details,
    )
}

fn check_references(
    node: &NodeDefinition,
    context: &ExecutionContext,
    nodes: &[NodeDefinition],
) -> InputValidation {
    let resolver = VariableResolver::new(context, nodes);

    let mut templates: Vec<&str> = TEMPLATED_FIELDS
        .iter()
        .filter_map(|key| node.config_str(key))
        .collect();

    // An unparseable logic config is reported by the router when it runs.
    let logic_config = node
        .is_logic()
        .then(|| LogicConfig::from_node(node).ok())
        .flatten();
    if let Some(config) = &logic_config {
        templates.extend(config.operand_templates());
    }

    let mut unresolved: Vec<String> = Vec::new();
    for token in templates.iter().flat_map(|template| resolver.unresolved(template)) {
        if !unresolved.contains(&token) {
            unresolved.push(token);
        }
    }

    if unresolved.is_empty() {
        return InputValidation::valid();
    }

    InputValidation::failing(
        InputStatus::Invalid,
        format!("unresolved variable reference(s): {}", unresolved.join(", ")),
        unresolved,
    )
}

#[cfg(test)]
mod tests {
    use serde_json::{Map, Value, json};

    use super::*;
    use crate::context::{ExecutionId, NodeOutput};
    use crate::definition::NodeType;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn greeting_graph() -> (Vec<NodeDefinition>, Vec<EdgeDefinition>) {
        let nodes = vec![
            NodeDefinition::new("in", "User", NodeType::Input),
            NodeDefinition::new("greet", "Greeter", NodeType::Process)
                .with_config(json!({ "prompt": "Hello {{User.name}}" })),
        ];
        let edges = vec![EdgeDefinition::new("in", "greet")];
        (nodes, edges)
    }

    fn context() -> ExecutionContext {
        ExecutionContext::new(ExecutionId::new(), "org", "user")
    }

    #[test]
    fn test_valid_when_reference_resolves() {
        let (nodes, edges) = greeting_graph();
        let mut context = context();
        context.record_output(NodeOutput::success(&nodes[0], map(json!({ "name": "Ann" }))));

        assert!(validate_node_input(&nodes[1], &context, &edges, &nodes).is_valid());
    }

    #[test]
    fn test_invalid_names_the_token() {
        let (nodes, edges) = greeting_graph();
        let mut context = context();
        context.record_output(NodeOutput::success(&nodes[0], map(json!({ "email": "a@b.c" }))));

        let result = validate_node_input(&nodes[1], &context, &edges, &nodes);
        assert_eq!(result.status, InputStatus::Invalid);
        assert_eq!(result.details, vec!["{{User.name}}".to_owned()]);
        assert!(result.error.unwrap_or_default().contains("{{User.name}}"));
    }

    #[test]
    fn test_predecessor_problems_win_over_references() {
        let (nodes, edges) = greeting_graph();

        let result = validate_node_input(&nodes[1], &context(), &edges, &nodes);
        assert_eq!(result.status, InputStatus::Missing);
        assert_eq!(result.details, vec!["User has not run".to_owned()]);

        for output in [
            NodeOutput::error(&nodes[0], "boom"),
            NodeOutput::skipped(&nodes[0]),
            NodeOutput::paused(&nodes[0], "approval-1"),
        ] {
            let mut context = context();
            context.record_output(output);
            let result = validate_node_input(&nodes[1], &context, &edges, &nodes);
            assert_eq!(result.status, InputStatus::Missing);
        }
    }

    #[test]
    fn test_required_source_fields() {
        let node = NodeDefinition::new("in", "User", NodeType::Input).with_config(json!({
            "fields": [
                { "name": "topic", "required": true },
                { "name": "tone", "required": true, "defaultValue": "friendly" },
                { "name": "notes" }
            ]
        }));

        let result = validate_node_input(&node, &context(), &[], &[]);
        assert_eq!(result.status, InputStatus::Missing);
        assert_eq!(result.details, vec!["topic".to_owned()]);

        let context = context().with_globals(map(json!({ "topic": "async rust" })));
        assert!(validate_node_input(&node, &context, &[], &[]).is_valid());
    }

    #[test]
    fn test_any_gate_accepts_one_success() {
        let nodes = vec![
            NodeDefinition::new("a", "A", NodeType::Process),
            NodeDefinition::new("b", "B", NodeType::Process),
            NodeDefinition::new("m", "Join", NodeType::Logic).with_config(json!({ "mode": "merge" })),
        ];
        let edges = vec![EdgeDefinition::new("a", "m"), EdgeDefinition::new("b", "m")];
        let mut context = context();
        context.record_output(NodeOutput::success(&nodes[0], map(json!({ "result": "x" }))));
        context.record_output(NodeOutput::skipped(&nodes[1]));

        let strict = validate_node_input(&nodes[2], &context, &edges, &nodes);
        assert_eq!(strict.status, InputStatus::Missing);
        let relaxed =
            validate_node_input_with_gate(&nodes[2], &context, &edges, &nodes, PredecessorGate::Any);
        assert!(relaxed.is_valid());
    }

    #[test]
    fn test_logic_operands_are_checked() {
        let nodes = vec![
            NodeDefinition::new("s", "Score", NodeType::Process),
            NodeDefinition::new("g", "Gate", NodeType::Logic).with_config(json!({
                "branches": [{ "handle": "hi", "conditions": [
                    { "left": "{{Score.missing}}", "operator": "equals", "right": 1 }
                ]}]
            })),
        ];
        let edges = vec![EdgeDefinition::new("s", "g")];
        let mut context = context();
        context.record_output(NodeOutput::success(&nodes[0], map(json!({ "value": 1 }))));

        let result = validate_node_input(&nodes[1], &context, &edges, &nodes);
        assert_eq!(result.status, InputStatus::Invalid);

        let error = result.into_error(&nodes[1]).expect("invalid");
        assert_eq!(error.status, "invalid");
        assert_eq!(error.node_name, "Gate");
    }
}
