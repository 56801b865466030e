//! Workflow execution engine.
//!
//! [`Engine::execute`] takes a [`WorkflowDefinition`] and a [`RunRequest`]
//! and drives the run to a terminal [`ExecutionResult`]:
//!
//! 1. the graph is validated and ordered (cycles are rejected up front),
//! 2. a resumed run restores the checkpoint of an earlier execution,
//! 3. nodes run one at a time in topological order, or layer by layer when
//!    parallel execution is enabled,
//! 4. failures and pauses write a checkpoint so the run can be resumed.
//!
//! [`WorkflowDefinition`]: crate::definition::WorkflowDefinition

mod config;
mod executor;
mod persistence;
mod request;
mod result;
mod state;

pub use config::{EngineConfig, EngineConfigBuilder, EngineConfigBuilderError};
pub use executor::Engine;
pub use request::RunRequest;
pub use result::{ERRORS_KEY, ExecutionResult, NodeFailure};

/// Tracing target for engine operations.
pub const TRACING_TARGET: &str = "weaver_runtime::engine";
