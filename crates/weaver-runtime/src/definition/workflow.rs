//! Workflow definition and execution settings.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumString};

use super::{EdgeDefinition, NodeDefinition, NodeId};
use crate::error::GraphError;

/// How parallel mode reacts to a failing node.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ParallelErrorStrategy {
    /// The first node error aborts the whole run.
    #[default]
    FailFast,
    /// Record the error, skip dependents, keep running independent branches.
    Continue,
    /// Like `Continue`, and attach the collected errors to the final output.
    Collect,
}

impl ParallelErrorStrategy {
    /// Returns whether independent branches keep running after an error.
    #[inline]
    pub const fn tolerates_errors(self) -> bool {
        matches!(self, Self::Continue | Self::Collect)
    }
}

/// Optional execution settings carried by a workflow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSettings {
    /// Run independent nodes of a layer concurrently.
    #[serde(default)]
    pub enable_parallel_execution: bool,
    /// Error policy for parallel mode.
    #[serde(default)]
    pub parallel_error_strategy: ParallelErrorStrategy,
}

/// Serializable workflow definition.
///
/// Immutable for the duration of one execution and owned by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    /// Nodes in declaration order. The order breaks scheduling ties.
    #[serde(default)]
    pub nodes: Vec<NodeDefinition>,
    /// Data-flow edges.
    #[serde(default)]
    pub edges: Vec<EdgeDefinition>,
    /// Variables available to every node.
    #[serde(default)]
    pub global_variables: Map<String, Value>,
    /// Execution settings.
    #[serde(default)]
    pub settings: ExecutionSettings,
}

impl WorkflowDefinition {
    /// Creates a workflow from nodes and edges with default settings.
    pub fn new(nodes: Vec<NodeDefinition>, edges: Vec<EdgeDefinition>) -> Self {
        Self {
            nodes,
            edges,
            ..Default::default()
        }
    }

    /// Enables parallel execution with the given error strategy.
    pub fn with_parallel(mut self, strategy: ParallelErrorStrategy) -> Self {
        self.settings = ExecutionSettings {
            enable_parallel_execution: true,
            parallel_error_strategy: strategy,
        };
        self
    }

    /// Adds a global variable.
    pub fn with_global(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.global_variables.insert(key.into(), value.into());
        self
    }

    /// Returns a node by id.
    pub fn node(&self, id: &NodeId) -> Option<&NodeDefinition> {
        self.nodes.iter().find(|node| &node.id == id)
    }

    /// Returns a node by its display name.
    pub fn node_by_name(&self, name: &str) -> Option<&NodeDefinition> {
        self.nodes.iter().find(|node| node.name == name)
    }

    /// Checks structural constraints that must hold before scheduling.
    ///
    /// Node ids and names must be unique and every edge endpoint must exist.
    /// Cycles are reported by the graph utilities.
    pub fn validate(&self) -> Result<(), GraphError> {
        let mut ids = HashSet::with_capacity(self.nodes.len());
        let mut names = HashSet::with_capacity(self.nodes.len());

        for node in &self.nodes {
            if !ids.insert(&node.id) {
                return Err(GraphError::DuplicateNodeId(node.id.to_string()));
            }
            if !names.insert(node.name.as_str()) {
                return Err(GraphError::DuplicateNodeName(node.name.clone()));
            }
        }

        for edge in &self.edges {
            for endpoint in [&edge.source, &edge.target] {
                if !ids.contains(endpoint) {
                    return Err(GraphError::UnknownNode {
                        edge_id: edge.id.clone(),
                        node_id: endpoint.to_string(),
                    });
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::definition::NodeType;

    #[test]
    fn test_settings_default_to_sequential_fail_fast() {
        let workflow: WorkflowDefinition =
            serde_json::from_value(json!({ "nodes": [], "edges": [] })).expect("valid");
        assert!(!workflow.settings.enable_parallel_execution);
        assert_eq!(
            workflow.settings.parallel_error_strategy,
            ParallelErrorStrategy::FailFast
        );
    }

    #[test]
    fn test_settings_parse_strategy() {
        let workflow: WorkflowDefinition = serde_json::from_value(json!({
            "nodes": [],
            "edges": [],
            "settings": { "enableParallelExecution": true, "parallelErrorStrategy": "collect" }
        }))
        .expect("valid");
        assert_eq!(
            workflow.settings.parallel_error_strategy,
            ParallelErrorStrategy::Collect
        );
        assert!(workflow.settings.parallel_error_strategy.tolerates_errors());
        assert_eq!(
            "continue".parse::<ParallelErrorStrategy>().ok(),
            Some(ParallelErrorStrategy::Continue)
        );
    }

    #[test]
    fn test_validate_rejects_unknown_edge_endpoint() {
        let workflow = WorkflowDefinition::new(
            vec![NodeDefinition::new("a", "A", NodeType::Input)],
            vec![EdgeDefinition::new("a", "ghost")],
        );
        assert_eq!(
            workflow.validate(),
            Err(GraphError::UnknownNode {
                edge_id: "a->ghost".into(),
                node_id: "ghost".into(),
            })
        );
    }

    #[test]
    fn test_validate_rejects_duplicate_names() {
        let workflow = WorkflowDefinition::new(
            vec![
                NodeDefinition::new("a", "Same", NodeType::Input),
                NodeDefinition::new("b", "Same", NodeType::Process),
            ],
            vec![],
        );
        assert_eq!(
            workflow.validate(),
            Err(GraphError::DuplicateNodeName("Same".into()))
        );
    }
}
