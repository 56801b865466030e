//! Workflow error types.

use strum::{AsRefStr, Display, IntoStaticStr};
use thiserror::Error;

use crate::definition::NodeId;

/// Result type for workflow operations.
pub type WorkflowResult<T, E = WorkflowError> = Result<T, E>;

/// Categories of errors surfaced by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, IntoStaticStr, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or cyclic workflow graph.
    Graph,
    /// Node inputs were missing or unresolvable.
    InputValidation,
    /// A node processor failed.
    Processor,
    /// The stored checkpoint cannot be used for resume.
    CheckpointIncompatible,
    /// Checkpoint storage failed.
    Checkpoint,
    /// Store read or write failed.
    Persistence,
    /// Serialization/deserialization failed.
    Serialization,
    /// The requested workflow does not exist.
    NotFound,
    /// Anything else.
    Internal,
}

/// Structural problems with a workflow graph.
///
/// Always fatal and reported before any node runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// The graph contains at least one cycle.
    #[error("workflow graph contains a cycle through nodes: {}", nodes.join(", "))]
    Cycle {
        /// Ids of the nodes participating in the cycle.
        nodes: Vec<String>,
    },

    /// An edge references a node that does not exist.
    #[error("edge {edge_id} references unknown node {node_id}")]
    UnknownNode {
        /// Id of the offending edge.
        edge_id: String,
        /// Id that could not be found.
        node_id: String,
    },

    /// Two nodes share the same id.
    #[error("duplicate node id {0}")]
    DuplicateNodeId(String),

    /// Two nodes share the same name, making variable references ambiguous.
    #[error("duplicate node name '{0}'")]
    DuplicateNodeName(String),
}

/// A node could not start because its inputs were not satisfied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("input validation failed for node '{node_name}' ({status}): {message}")]
pub struct InputValidationError {
    /// Id of the rejected node.
    pub node_id: NodeId,
    /// Name of the rejected node.
    pub node_name: String,
    /// Either `missing` or `invalid`.
    pub status: String,
    /// Human-readable reason.
    pub message: String,
}

/// Failure reported by a node processor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ProcessorError {
    /// Human-readable reason.
    pub message: String,
    /// Whether the queue layer may retry the run.
    pub retryable: bool,
}

impl ProcessorError {
    /// Creates a non-retryable processor error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates a processor error the queue layer may retry.
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }
}

/// Checkpoint storage and compatibility errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckpointError {
    /// No checkpoint exists for the execution.
    #[error("no checkpoint found for execution {0}")]
    NotFound(String),

    /// The checkpoint was written for a different graph or schema version.
    #[error("checkpoint for execution {execution_id} is incompatible: {reason}")]
    Incompatible {
        /// Execution the checkpoint belongs to.
        execution_id: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The stored blob could not be decoded.
    #[error("checkpoint for execution {execution_id} is corrupted: {reason}")]
    Corrupted {
        /// Execution the checkpoint belongs to.
        execution_id: String,
        /// Decoder message.
        reason: String,
    },
}

/// Store read or write failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} failed: {reason}")]
pub struct PersistenceError {
    /// Name of the store operation.
    pub operation: String,
    /// Underlying message.
    pub reason: String,
}

impl PersistenceError {
    /// Creates a new persistence error.
    pub fn new(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            reason: reason.into(),
        }
    }
}

/// Errors that can occur during workflow operations.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Workflow graph is malformed.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Node inputs were not satisfied.
    #[error(transparent)]
    InputValidation(#[from] InputValidationError),

    /// Node execution failed.
    #[error("node '{node_name}' failed: {source}")]
    Processor {
        /// Id of the failed node.
        node_id: NodeId,
        /// Name of the failed node.
        node_name: String,
        /// Processor-reported failure.
        #[source]
        source: ProcessorError,
    },

    /// No processor is registered for a node type.
    #[error("no processor registered for node type '{node_type}' (node '{node_name}')")]
    UnknownNodeType {
        /// Name of the node.
        node_name: String,
        /// Unregistered type tag.
        node_type: String,
    },

    /// Checkpoint could not be used.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// Store operation failed.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No workflow definition exists for the id.
    #[error("workflow {0} not found")]
    WorkflowNotFound(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl WorkflowError {
    /// Creates a processor failure for a node.
    pub fn processor(
        node_id: NodeId,
        node_name: impl Into<String>,
        source: ProcessorError,
    ) -> Self {
        Self::Processor {
            node_id,
            node_name: node_name.into(),
            source,
        }
    }

    /// Returns the error category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Graph(_) => ErrorKind::Graph,
            Self::InputValidation(_) => ErrorKind::InputValidation,
            Self::Processor { .. } | Self::UnknownNodeType { .. } => ErrorKind::Processor,
            Self::Checkpoint(CheckpointError::Incompatible { .. }) => {
                ErrorKind::CheckpointIncompatible
            }
            Self::Checkpoint(_) => ErrorKind::Checkpoint,
            Self::Persistence(_) => ErrorKind::Persistence,
            Self::Serialization(_) => ErrorKind::Serialization,
            Self::WorkflowNotFound(_) => ErrorKind::NotFound,
            Self::InvalidConfig(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns whether a wrapping queue may retry the run.
    ///
    /// Only processor failures classified as retryable and store failures qualify.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Processor { source, .. } => source.retryable,
            Self::Persistence(_) => true,
            _ => false,
        }
    }

    /// Returns the id of the node the error is attributed to, if any.
    pub fn node_id(&self) -> Option<&NodeId> {
        match self {
            Self::InputValidation(e) => Some(&e.node_id),
            Self::Processor { node_id, .. } => Some(node_id),
            _ => None,
        }
    }
}
