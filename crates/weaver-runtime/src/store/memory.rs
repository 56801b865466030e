//! In-process store.

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::RwLock;

use super::{ExecutionRecord, ExecutionStore, NodeLog, StoreResult, TRACING_TARGET};
use crate::context::ExecutionId;
use crate::error::PersistenceError;

#[derive(Debug, Default)]
struct Inner {
    executions: HashMap<ExecutionId, ExecutionRecord>,
    logs: HashMap<ExecutionId, Vec<NodeLog>>,
    checkpoints: HashMap<ExecutionId, Value>,
}

/// Store backed by in-memory maps.
///
/// Contents live as long as the store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored executions.
    pub async fn execution_count(&self) -> usize {
        self.inner.read().await.executions.len()
    }
}

fn missing(operation: &str, id: ExecutionId) -> PersistenceError {
    PersistenceError::new(operation, format!("execution {id} does not exist"))
}

#[async_trait::async_trait]
impl ExecutionStore for MemoryStore {
    async fn create_execution(&self, record: &ExecutionRecord) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.executions.contains_key(&record.id) {
            return Err(PersistenceError::new(
                "create_execution",
                format!("execution {} already exists", record.id),
            ));
        }
        inner.executions.insert(record.id, record.clone());
        tracing::trace!(target: TRACING_TARGET, execution_id = %record.id, "Created execution");
        Ok(())
    }

    async fn update_execution(&self, record: &ExecutionRecord) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let slot = inner
            .executions
            .get_mut(&record.id)
            .ok_or_else(|| missing("update_execution", record.id))?;
        *slot = record.clone();
        Ok(())
    }

    async fn get_execution(&self, id: ExecutionId) -> StoreResult<Option<ExecutionRecord>> {
        Ok(self.inner.read().await.executions.get(&id).cloned())
    }

    async fn create_node_log(&self, log: &NodeLog) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner
            .logs
            .entry(log.execution_id)
            .or_default()
            .push(log.clone());
        Ok(())
    }

    async fn node_logs(&self, id: ExecutionId) -> StoreResult<Vec<NodeLog>> {
        Ok(self
            .inner
            .read()
            .await
            .logs
            .get(&id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_checkpoint(&self, id: ExecutionId, checkpoint: &Value) -> StoreResult<()> {
        self.inner
            .write()
            .await
            .checkpoints
            .insert(id, checkpoint.clone());
        Ok(())
    }

    async fn load_checkpoint(&self, id: ExecutionId) -> StoreResult<Option<Value>> {
        Ok(self.inner.read().await.checkpoints.get(&id).cloned())
    }

    async fn clear_checkpoint(&self, id: ExecutionId) -> StoreResult<()> {
        self.inner.write().await.checkpoints.remove(&id);
        Ok(())
    }

    async fn set_can_resume(&self, id: ExecutionId, can_resume: bool) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let record = inner
            .executions
            .get_mut(&id)
            .ok_or_else(|| missing("set_can_resume", id))?;
        record.can_resume = can_resume;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Map, json};

    use super::*;
    use crate::store::ExecutionStatus;

    #[tokio::test]
    async fn test_record_lifecycle() {
        let store = MemoryStore::new();
        let id = ExecutionId::new();
        let mut record = ExecutionRecord::pending(id, "wf", "org", "user", Map::new());

        store.create_execution(&record).await.expect("create");
        assert!(store.create_execution(&record).await.is_err());

        record.status = ExecutionStatus::Completed;
        store.update_execution(&record).await.expect("update");
        store.set_can_resume(id, true).await.expect("flag");

        let stored = store.get_execution(id).await.expect("get").expect("present");
        assert_eq!(stored.status, ExecutionStatus::Completed);
        assert!(stored.can_resume);
        assert_eq!(store.execution_count().await, 1);
    }

    #[tokio::test]
    async fn test_checkpoint_blob() {
        let store = MemoryStore::new();
        let id = ExecutionId::new();

        store.save_checkpoint(id, &json!({ "v": 1 })).await.expect("save");
        assert_eq!(store.load_checkpoint(id).await.expect("load"), Some(json!({ "v": 1 })));
        store.clear_checkpoint(id).await.expect("clear");
        assert_eq!(store.load_checkpoint(id).await.expect("load"), None);
    }

    #[tokio::test]
    async fn test_update_unknown_execution_fails() {
        let store = MemoryStore::new();
        let record = ExecutionRecord::pending(ExecutionId::new(), "wf", "org", "user", Map::new());
        assert!(store.update_execution(&record).await.is_err());
    }
}
