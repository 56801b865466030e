//! Node processors and their registry.
//!
//! The engine treats a processor as an opaque capability: it receives the
//! node and a read-only view of the run and returns the node's output. The
//! [`ProcessorRegistry`] maps type tags to processors and substitutes a
//! tool-aware processor for PROCESS nodes that enable tool calling.

mod builtin;
mod registry;

use std::sync::Arc;

pub use builtin::{InputProcessor, LogicProcessor, TemplateProcessor};
pub use registry::{ProcessorKind, ProcessorRegistry, resolve_processor_kind};

use crate::context::{ExecutionContext, NodeOutput};
use crate::definition::{NodeDefinition, WorkflowDefinition};
use crate::error::ProcessorError;
use crate::variable::VariableResolver;

/// Tracing target for processor operations.
pub const TRACING_TARGET: &str = "weaver_runtime::processor";

/// Shared handle to a processor.
pub type SharedProcessor = Arc<dyn NodeProcessor>;

/// Everything a processor may read while running a node.
#[derive(Debug, Clone, Copy)]
pub struct ProcessRequest<'a> {
    /// Node being executed.
    pub node: &'a NodeDefinition,
    /// Outputs and variables of the run so far.
    pub context: &'a ExecutionContext,
    /// Workflow the node belongs to.
    pub workflow: &'a WorkflowDefinition,
}

impl<'a> ProcessRequest<'a> {
    /// Creates a request.
    pub fn new(
        node: &'a NodeDefinition,
        context: &'a ExecutionContext,
        workflow: &'a WorkflowDefinition,
    ) -> Self {
        Self {
            node,
            context,
            workflow,
        }
    }

    /// Returns a resolver over the run's outputs.
    pub fn resolver(&self) -> VariableResolver<'a> {
        VariableResolver::new(self.context, &self.workflow.nodes)
    }
}

/// Executes one kind of node.
///
/// Implementations return the node's output, which may carry any status.
/// Returning `Err` is equivalent to returning an `error` output and lets the
/// processor classify the failure as retryable.
#[async_trait::async_trait]
pub trait NodeProcessor: Send + Sync {
    /// Runs the node.
    async fn process(&self, request: ProcessRequest<'_>) -> Result<NodeOutput, ProcessorError>;
}
