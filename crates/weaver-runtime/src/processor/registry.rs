//! Processor lookup by node type.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::{InputProcessor, LogicProcessor, NodeProcessor, SharedProcessor, TRACING_TARGET};
use crate::definition::{NodeDefinition, NodeType};
use crate::error::{WorkflowError, WorkflowResult};

/// Processor variant selected for a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessorKind {
    /// The processor registered for the node's type tag.
    Standard(NodeType),
    /// The tool-calling variant of the PROCESS processor.
    ToolAware,
}

/// Decides which processor variant runs a node.
///
/// PROCESS nodes with `enableTools: true` or a non-empty `tools` list are
/// routed to the tool-aware variant.
pub fn resolve_processor_kind(node: &NodeDefinition) -> ProcessorKind {
    let tools_enabled = node.config_flag("enableTools")
        || node
            .config_value("tools")
            .and_then(Value::as_array)
            .is_some_and(|tools| !tools.is_empty());

    if node.node_type == NodeType::Process && tools_enabled {
        ProcessorKind::ToolAware
    } else {
        ProcessorKind::Standard(node.node_type.clone())
    }
}

fn registry_key(node_type: &NodeType) -> String {
    node_type.as_str().to_ascii_uppercase()
}

/// Registry of node processors keyed by type tag.
///
/// Tags are matched case-insensitively.
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    processors: HashMap<String, SharedProcessor>,
    tool_aware: Option<SharedProcessor>,
}

impl fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.processors.keys().collect();
        types.sort();
        f.debug_struct("ProcessorRegistry")
            .field("types", &types)
            .field("tool_aware", &self.tool_aware.is_some())
            .finish()
    }
}

impl ProcessorRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the INPUT and LOGIC processors.
    pub fn with_builtins() -> Self {
        Self::new()
            .with_processor(NodeType::Input, InputProcessor)
            .with_processor(NodeType::Logic, LogicProcessor)
    }

    /// Registers a processor, replacing any previous one for the tag.
    pub fn register(
        &mut self,
        node_type: impl Into<NodeType>,
        processor: impl NodeProcessor + 'static,
    ) {
        let node_type = node_type.into();
        tracing::debug!(target: TRACING_TARGET, node_type = %node_type, "Registered processor");
        self.processors
            .insert(registry_key(&node_type), Arc::new(processor));
    }

    /// Registers a processor and returns the registry.
    pub fn with_processor(
        mut self,
        node_type: impl Into<NodeType>,
        processor: impl NodeProcessor + 'static,
    ) -> Self {
        self.register(node_type, processor);
        self
    }

    /// Sets the tool-aware processor.
    pub fn with_tool_aware(mut self, processor: impl NodeProcessor + 'static) -> Self {
        self.tool_aware = Some(Arc::new(processor));
        self
    }

    /// Returns the processor registered for a type tag.
    pub fn processor(&self, node_type: &NodeType) -> Option<SharedProcessor> {
        self.processors.get(&registry_key(node_type)).cloned()
    }

    /// Returns whether a processor is registered for a type tag.
    pub fn contains(&self, node_type: &NodeType) -> bool {
        self.processors.contains_key(&registry_key(node_type))
    }

    /// Resolves the processor that runs a node.
    ///
    /// A node asking for tools falls back to the PROCESS processor when no
    /// tool-aware variant is registered.
    pub fn resolve(&self, node: &NodeDefinition) -> WorkflowResult<(ProcessorKind, SharedProcessor)> {
        let kind = resolve_processor_kind(node);
        let processor = match &kind {
            ProcessorKind::ToolAware => self.tool_aware.clone().or_else(|| {
                tracing::warn!(
                    target: TRACING_TARGET,
                    node_id = %node.id,
                    node_name = %node.name,
                    "No tool-aware processor registered, using the PROCESS processor"
                );
                self.processor(&NodeType::Process)
            }),
            ProcessorKind::Standard(node_type) => self.processor(node_type),
        };

        processor
            .map(|processor| (kind, processor))
            .ok_or_else(|| WorkflowError::UnknownNodeType {
                node_name: node.name.clone(),
                node_type: node.node_type.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::processor::TemplateProcessor;

    #[test]
    fn test_tools_select_tool_aware_kind() {
        let plain = NodeDefinition::new("p", "Writer", NodeType::Process);
        assert_eq!(
            resolve_processor_kind(&plain),
            ProcessorKind::Standard(NodeType::Process)
        );

        let flagged = plain.clone().with_config(json!({ "enableTools": true }));
        assert_eq!(resolve_processor_kind(&flagged), ProcessorKind::ToolAware);

        let listed = plain.clone().with_config(json!({ "tools": ["search"] }));
        assert_eq!(resolve_processor_kind(&listed), ProcessorKind::ToolAware);

        let empty = plain.with_config(json!({ "tools": [] }));
        assert_eq!(
            resolve_processor_kind(&empty),
            ProcessorKind::Standard(NodeType::Process)
        );

        let logic = NodeDefinition::new("l", "Gate", NodeType::Logic)
            .with_config(json!({ "enableTools": true }));
        assert_eq!(
            resolve_processor_kind(&logic),
            ProcessorKind::Standard(NodeType::Logic)
        );
    }

    #[test]
    fn test_resolve_falls_back_and_reports_unknown_types() {
        let registry = ProcessorRegistry::with_builtins().with_processor("process", TemplateProcessor);
        let tools = NodeDefinition::new("p", "Agent", NodeType::Process)
            .with_config(json!({ "enableTools": true }));
        let (kind, _) = registry.resolve(&tools).expect("fallback");
        assert_eq!(kind, ProcessorKind::ToolAware);

        let custom = NodeDefinition::new("c", "Code", "CODE");
        let error = registry.resolve(&custom).err().expect("unknown");
        assert!(matches!(error, WorkflowError::UnknownNodeType { .. }));
        assert!(registry.contains(&NodeType::from("input")));
    }
}
