//! Prelude module for convenient imports.
//!
//! This module re-exports commonly used types for ergonomic imports:
//!
//! ```rust
//! use weaver_runtime::prelude::*;
//! ```

pub use crate::context::{ExecutionContext, ExecutionId, NodeOutput, NodeStatus, TokenUsage};
pub use crate::definition::{
    EdgeDefinition, NodeDefinition, NodeId, NodeType, ParallelErrorStrategy, WorkflowDefinition,
};
pub use crate::engine::{Engine, EngineConfig, ExecutionResult, RunRequest};
pub use crate::error::{ProcessorError, WorkflowError, WorkflowResult};
pub use crate::events::{ProgressEvent, ProgressEventKind, ProgressSink};
pub use crate::processor::{NodeProcessor, ProcessRequest, ProcessorRegistry};
pub use crate::queue::{ExecutionQueue, QueueConfig, RetryConfig, WorkflowSource};
pub use crate::store::{ExecutionStatus, ExecutionStore, FileStore, MemoryStore};
