//! Node definition types.

use std::fmt;

use derive_builder::Builder;
use derive_more::{Debug, Display, From, Into};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Unique identifier for a node in a workflow graph.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[derive(Debug, Display, From, Into)]
#[debug("{_0}")]
#[display("{_0}")]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Creates a node ID from any string-like value.
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Type tag of a node.
///
/// The three built-in tags get their own variants; anything else is resolved
/// through the processor registry by its literal tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeType {
    /// Source node holding user-supplied fields.
    Input,
    /// Processing node (model calls, code, ...).
    Process,
    /// Branching node (condition, switch, merge).
    Logic,
    /// Any other registered node type.
    Custom(String),
}

impl NodeType {
    /// Returns the canonical tag.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Input => "INPUT",
            Self::Process => "PROCESS",
            Self::Logic => "LOGIC",
            Self::Custom(tag) => tag,
        }
    }
}

impl From<String> for NodeType {
    fn from(tag: String) -> Self {
        match tag.to_ascii_uppercase().as_str() {
            "INPUT" => Self::Input,
            "PROCESS" => Self::Process,
            "LOGIC" => Self::Logic,
            _ => Self::Custom(tag),
        }
    }
}

impl From<&str> for NodeType {
    fn from(tag: &str) -> Self {
        Self::from(tag.to_owned())
    }
}

impl From<NodeType> for String {
    fn from(node_type: NodeType) -> Self {
        match node_type {
            NodeType::Custom(tag) => tag,
            other => other.as_str().to_owned(),
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position of a node in the visual editor.
///
/// Layout only; never consulted during execution.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
}

impl Position {
    /// Creates a new position.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A workflow node definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[builder(
    name = "NodeBuilder",
    pattern = "owned",
    setter(into, strip_option, prefix = "with")
)]
#[serde(rename_all = "camelCase")]
pub struct NodeDefinition {
    /// Unique id within the graph.
    pub id: NodeId,
    /// Human label; the addressable token in variable references.
    pub name: String,
    /// Type tag used for processor lookup.
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Open, type-specific configuration payload.
    #[serde(default)]
    #[builder(default)]
    pub config: Map<String, Value>,
    /// Position in the visual editor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    pub position: Option<Position>,
}

impl NodeDefinition {
    /// Creates a node with an empty config.
    pub fn new(id: impl Into<NodeId>, name: impl Into<String>, node_type: impl Into<NodeType>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            node_type: node_type.into(),
            config: Map::new(),
            position: None,
        }
    }

    /// Returns a builder for creating a node.
    pub fn builder() -> NodeBuilder {
        NodeBuilder::default()
    }

    /// Replaces the config with the given JSON object.
    ///
    /// Non-object values leave the config empty.
    pub fn with_config(mut self, config: Value) -> Self {
        self.config = match config {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self
    }

    /// Returns whether this is a source (INPUT) node.
    pub fn is_source(&self) -> bool {
        self.node_type == NodeType::Input
    }

    /// Returns whether this is a LOGIC node.
    pub fn is_logic(&self) -> bool {
        self.node_type == NodeType::Logic
    }

    /// Returns a config value by key.
    pub fn config_value(&self, key: &str) -> Option<&Value> {
        self.config.get(key)
    }

    /// Returns a string config value by key.
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(Value::as_str)
    }

    /// Returns a boolean config value by key, `false` when absent.
    pub fn config_flag(&self, key: &str) -> bool {
        self.config.get(key).and_then(Value::as_bool).unwrap_or(false)
    }
}
