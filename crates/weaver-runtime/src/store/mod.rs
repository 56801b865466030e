//! Durable storage of executions, node logs and checkpoints.
//!
//! The engine talks to storage through [`ExecutionStore`]. Two backends ship
//! with the crate:
//! - [`MemoryStore`]: process-local maps, for tests and embedding
//! - [`FileStore`]: JSON files under a state directory

mod file;
mod memory;
mod record;

use std::sync::Arc;

use serde_json::Value;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use record::{ExecutionRecord, ExecutionStatus, NodeLog};

use crate::context::ExecutionId;
use crate::error::PersistenceError;

/// Tracing target for store operations.
pub const TRACING_TARGET: &str = "weaver_runtime::store";

/// Result type for store operations.
pub type StoreResult<T> = Result<T, PersistenceError>;

/// Shared handle to a store.
pub type SharedStore = Arc<dyn ExecutionStore>;

/// Persistence collaborator of the engine.
#[async_trait::async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Inserts a new execution record.
    async fn create_execution(&self, record: &ExecutionRecord) -> StoreResult<()>;

    /// Replaces an existing execution record.
    async fn update_execution(&self, record: &ExecutionRecord) -> StoreResult<()>;

    /// Reads an execution record.
    async fn get_execution(&self, id: ExecutionId) -> StoreResult<Option<ExecutionRecord>>;

    /// Appends a node log.
    async fn create_node_log(&self, log: &NodeLog) -> StoreResult<()>;

    /// Reads the node logs of an execution in insertion order.
    async fn node_logs(&self, id: ExecutionId) -> StoreResult<Vec<NodeLog>>;

    /// Writes the checkpoint blob of an execution, replacing any previous one.
    async fn save_checkpoint(&self, id: ExecutionId, checkpoint: &Value) -> StoreResult<()>;

    /// Reads the checkpoint blob of an execution.
    async fn load_checkpoint(&self, id: ExecutionId) -> StoreResult<Option<Value>>;

    /// Deletes the checkpoint blob of an execution.
    async fn clear_checkpoint(&self, id: ExecutionId) -> StoreResult<()>;

    /// Sets the resumable flag of an execution record.
    async fn set_can_resume(&self, id: ExecutionId, can_resume: bool) -> StoreResult<()>;
}
