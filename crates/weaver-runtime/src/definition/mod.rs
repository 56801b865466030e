//! Workflow definition types.
//!
//! This module contains serializable, editor-friendly types for defining workflows:
//! - [`WorkflowDefinition`]: nodes, edges, global variables and settings
//! - [`NodeDefinition`]: a typed processing step
//! - [`EdgeDefinition`]: a data-flow connection, optionally tied to a branch handle
//!
//! Definitions are immutable for the duration of one execution.

mod edge;
mod fields;
mod node;
mod workflow;

pub use edge::{EdgeBuilder, EdgeDefinition};
pub use fields::InputField;
pub use node::{NodeBuilder, NodeDefinition, NodeId, NodeType, Position};
pub use workflow::{ExecutionSettings, ParallelErrorStrategy, WorkflowDefinition};
