//! Checkpoints for resuming failed or paused runs.
//!
//! A [`CheckpointSnapshot`] holds the successful node outputs and variables
//! of a run together with the hash of the graph it ran. On resume the
//! [`CheckpointManager`] refuses snapshots whose schema major version or
//! graph hash no longer match.

mod hash;
mod snapshot;

use semver::Version;
use serde::{Deserialize, Serialize};

pub use hash::create_workflow_hash;
pub use snapshot::{CHECKPOINT_VERSION, CheckpointSnapshot, CompletedNode, SnapshotContext};

use crate::context::ExecutionId;
use crate::error::{CheckpointError, WorkflowError, WorkflowResult};
use crate::store::SharedStore;

/// Tracing target for checkpoint operations.
pub const TRACING_TARGET: &str = "weaver_runtime::checkpoint";

/// Outcome of [`CheckpointManager::validate_checkpoint`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointValidation {
    /// Whether the checkpoint can be used.
    pub valid: bool,
    /// Why it cannot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl CheckpointValidation {
    fn valid() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    fn rejected(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
        }
    }
}

/// Returns whether a snapshot written with `version` can be read.
///
/// Versions are compatible when their major components match.
pub fn is_compatible_version(version: &str) -> bool {
    match (Version::parse(version), Version::parse(CHECKPOINT_VERSION)) {
        (Ok(stored), Ok(current)) => stored.major == current.major,
        _ => false,
    }
}

/// Saves, loads and validates checkpoints through the execution store.
#[derive(Clone)]
pub struct CheckpointManager {
    store: SharedStore,
}

impl std::fmt::Debug for CheckpointManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointManager").finish_non_exhaustive()
    }
}

impl CheckpointManager {
    /// Creates a manager over a store.
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Persists a snapshot and marks the execution resumable.
    pub async fn save_checkpoint(
        &self,
        execution_id: ExecutionId,
        snapshot: &CheckpointSnapshot,
    ) -> WorkflowResult<()> {
        let blob = serde_json::to_value(snapshot)?;
        self.store.save_checkpoint(execution_id, &blob).await?;
        self.store.set_can_resume(execution_id, true).await?;

        tracing::debug!(
            target: TRACING_TARGET,
            execution_id = %execution_id,
            completed_nodes = snapshot.completed_nodes.len(),
            failed_node_id = ?snapshot.failed_node_id,
            "Saved checkpoint"
        );
        Ok(())
    }

    /// Loads the snapshot of an execution, if one exists.
    pub async fn load_checkpoint(
        &self,
        execution_id: ExecutionId,
    ) -> WorkflowResult<Option<CheckpointSnapshot>> {
        let Some(blob) = self.store.load_checkpoint(execution_id).await? else {
            return Ok(None);
        };

        serde_json::from_value(blob).map(Some).map_err(|e| {
            WorkflowError::from(CheckpointError::Corrupted {
                execution_id: execution_id.to_string(),
                reason: e.to_string(),
            })
        })
    }

    /// Checks whether the snapshot of an execution can resume the current graph.
    ///
    /// A missing, unreadable, version-incompatible or stale snapshot is
    /// rejected with a reason.
    pub async fn validate_checkpoint(
        &self,
        execution_id: ExecutionId,
        current_hash: &str,
    ) -> WorkflowResult<CheckpointValidation> {
        let snapshot = match self.load_checkpoint(execution_id).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return Ok(CheckpointValidation::rejected("no checkpoint found")),
            Err(WorkflowError::Checkpoint(error)) => {
                return Ok(CheckpointValidation::rejected(error.to_string()));
            }
            Err(error) => return Err(error),
        };

        Ok(check_snapshot(&snapshot, current_hash))
    }

    /// Loads a snapshot and fails unless it can resume the current graph.
    pub async fn load_for_resume(
        &self,
        execution_id: ExecutionId,
        current_hash: &str,
    ) -> WorkflowResult<CheckpointSnapshot> {
        let snapshot = self
            .load_checkpoint(execution_id)
            .await?
            .ok_or_else(|| CheckpointError::NotFound(execution_id.to_string()))?;

        let validation = check_snapshot(&snapshot, current_hash);
        if let Some(reason) = validation.reason.filter(|_| !validation.valid) {
            tracing::warn!(
                target: TRACING_TARGET,
                execution_id = %execution_id,
                reason = %reason,
                "Refusing incompatible checkpoint"
            );
            return Err(CheckpointError::Incompatible {
                execution_id: execution_id.to_string(),
                reason,
            }
            .into());
        }

        Ok(snapshot)
    }

    /// Deletes the snapshot of an execution and clears its resumable flag.
    pub async fn clear_checkpoint(&self, execution_id: ExecutionId) -> WorkflowResult<()> {
        self.store.clear_checkpoint(execution_id).await?;
        self.store.set_can_resume(execution_id, false).await?;
        tracing::debug!(target: TRACING_TARGET, execution_id = %execution_id, "Cleared checkpoint");
        Ok(())
    }
}

fn check_snapshot(snapshot: &CheckpointSnapshot, current_hash: &str) -> CheckpointValidation {
    if !is_compatible_version(&snapshot.version) {
        return CheckpointValidation::rejected(format!(
            "checkpoint version {} is not compatible with {CHECKPOINT_VERSION}",
            snapshot.version
        ));
    }
    if snapshot.workflow_hash != current_hash {
        return CheckpointValidation::rejected("workflow changed since the checkpoint was taken");
    }
    CheckpointValidation::valid()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{Map, Value, json};

    use super::*;
    use crate::context::{ExecutionContext, NodeOutput};
    use crate::definition::{NodeDefinition, NodeType};
    use crate::store::{ExecutionRecord, ExecutionStore, MemoryStore};

    async fn setup() -> (Arc<MemoryStore>, CheckpointManager, ExecutionId) {
        let store = Arc::new(MemoryStore::new());
        let id = ExecutionId::new();
        store
            .create_execution(&ExecutionRecord::pending(id, "wf", "org", "user", Map::new()))
            .await
            .expect("create");
        let manager = CheckpointManager::new(store.clone());
        (store, manager, id)
    }

    fn snapshot(id: ExecutionId) -> CheckpointSnapshot {
        let node = NodeDefinition::new("a", "A", NodeType::Process);
        let failed = NodeDefinition::new("b", "B", NodeType::Process);
        let mut context = ExecutionContext::new(id, "org", "user");
        context.set_global("topic", json!("rust"));
        let mut data = Map::new();
        data.insert("result".into(), json!("done"));
        context.record_output(NodeOutput::success(&node, data));
        context.record_output(NodeOutput::error(&failed, "boom"));
        CheckpointSnapshot::capture(&context, Some(failed.id.clone()), "hash-1")
    }

    #[tokio::test]
    async fn test_round_trip_preserves_nodes_and_variables() {
        let (store, manager, id) = setup().await;
        let saved = snapshot(id);

        manager.save_checkpoint(id, &saved).await.expect("save");
        let loaded = manager.load_checkpoint(id).await.expect("load").expect("present");

        assert_eq!(loaded.completed_nodes, saved.completed_nodes);
        assert_eq!(loaded.context.variables, saved.context.variables);
        assert_eq!(loaded.completed_nodes.len(), 1);
        let record = store.get_execution(id).await.expect("get").expect("present");
        assert!(record.can_resume);
    }

    #[tokio::test]
    async fn test_validation_rejects_changed_graph_and_versions() {
        let (_store, manager, id) = setup().await;
        let mut saved = snapshot(id);
        manager.save_checkpoint(id, &saved).await.expect("save");

        assert!(manager.validate_checkpoint(id, "hash-1").await.expect("ok").valid);
        let stale = manager.validate_checkpoint(id, "hash-2").await.expect("ok");
        assert!(!stale.valid);
        assert!(stale.reason.unwrap_or_default().contains("workflow changed"));

        saved.version = "2.0.0".into();
        manager.save_checkpoint(id, &saved).await.expect("save");
        assert!(!manager.validate_checkpoint(id, "hash-1").await.expect("ok").valid);
        let error = manager.load_for_resume(id, "hash-1").await.expect_err("incompatible");
        assert_eq!(error.kind(), crate::ErrorKind::CheckpointIncompatible);
    }

    #[tokio::test]
    async fn test_minor_versions_are_compatible() {
        assert!(is_compatible_version("1.4.2"));
        assert!(!is_compatible_version("0.9.0"));
        assert!(!is_compatible_version("garbage"));
    }

    #[tokio::test]
    async fn test_corrupted_and_cleared_checkpoints() {
        let (store, manager, id) = setup().await;
        store.save_checkpoint(id, &Value::String("nope".into())).await.expect("save");
        let corrupted = manager.validate_checkpoint(id, "hash-1").await.expect("ok");
        assert!(!corrupted.valid);

        manager.save_checkpoint(id, &snapshot(id)).await.expect("save");
        manager.clear_checkpoint(id).await.expect("clear");
        assert!(manager.load_checkpoint(id).await.expect("load").is_none());
        let record = store.get_execution(id).await.expect("get").expect("present");
        assert!(!record.can_resume);
    }
}
