//! Edge types for connecting nodes in a workflow graph.

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use super::NodeId;

/// A data-flow edge between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Builder)]
#[builder(
    name = "EdgeBuilder",
    pattern = "owned",
    setter(into, strip_option, prefix = "with"),
    build_fn(validate = "Self::validate")
)]
#[serde(rename_all = "camelCase")]
pub struct EdgeDefinition {
    /// Edge id.
    #[builder(default)]
    pub id: String,
    /// Source node ID.
    pub source: NodeId,
    /// Target node ID.
    pub target: NodeId,
    /// Branch handle on the source node (used by LOGIC routing).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    pub source_handle: Option<String>,
    /// Port handle on the target node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    pub target_handle: Option<String>,
}

impl EdgeBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.source.is_none() {
            return Err("source is required".into());
        }
        if self.target.is_none() {
            return Err("target is required".into());
        }
        Ok(())
    }
}

impl EdgeDefinition {
    /// Creates a new edge between two nodes, deriving the id from its endpoints.
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            id: format!("{source}->{target}"),
            source,
            target,
            source_handle: None,
            target_handle: None,
        }
    }

    /// Sets the source branch handle.
    pub fn with_source_handle(mut self, handle: impl Into<String>) -> Self {
        self.source_handle = Some(handle.into());
        self
    }

    /// Returns a builder for creating an edge.
    pub fn builder() -> EdgeBuilder {
        EdgeBuilder::default()
    }
}
