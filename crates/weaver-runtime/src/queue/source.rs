//! Workflow definition lookup for queued jobs.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::definition::WorkflowDefinition;
use crate::error::{PersistenceError, WorkflowError, WorkflowResult};

/// Shared handle to a source.
pub type SharedSource = Arc<dyn WorkflowSource>;

/// Loads workflow definitions by id.
#[async_trait::async_trait]
pub trait WorkflowSource: Send + Sync {
    /// Loads the definition of a workflow owned by an organization.
    async fn load_workflow(
        &self,
        workflow_id: &str,
        organization_id: &str,
    ) -> WorkflowResult<Arc<WorkflowDefinition>>;
}

/// Source over a fixed set of definitions, shared by every organization.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    workflows: HashMap<String, Arc<WorkflowDefinition>>,
}

impl StaticSource {
    /// Creates an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a definition.
    pub fn with_workflow(mut self, workflow_id: impl Into<String>, workflow: WorkflowDefinition) -> Self {
        self.workflows.insert(workflow_id.into(), Arc::new(workflow));
        self
    }

    /// Returns the number of definitions.
    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    /// Returns whether the source is empty.
    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }
}

#[async_trait::async_trait]
impl WorkflowSource for StaticSource {
    async fn load_workflow(
        &self,
        workflow_id: &str,
        _organization_id: &str,
    ) -> WorkflowResult<Arc<WorkflowDefinition>> {
        self.workflows
            .get(workflow_id)
            .cloned()
            .ok_or_else(|| WorkflowError::WorkflowNotFound(workflow_id.to_owned()))
    }
}

/// Source reading `<dir>/<workflow_id>.json`.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    /// Creates a source over a directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait::async_trait]
impl WorkflowSource for DirectorySource {
    async fn load_workflow(
        &self,
        workflow_id: &str,
        _organization_id: &str,
    ) -> WorkflowResult<Arc<WorkflowDefinition>> {
        let valid_id = !workflow_id.is_empty()
            && workflow_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid_id {
            return Err(WorkflowError::WorkflowNotFound(workflow_id.to_owned()));
        }

        let path = self.root.join(format!("{workflow_id}.json"));
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Err(WorkflowError::WorkflowNotFound(workflow_id.to_owned()));
            }
            Err(error) => {
                return Err(PersistenceError::new("load_workflow", error.to_string()).into());
            }
        };
        let workflow: WorkflowDefinition = serde_json::from_slice(&bytes)?;
        Ok(Arc::new(workflow))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::definition::{EdgeDefinition, NodeDefinition, NodeType};

    fn workflow() -> WorkflowDefinition {
        WorkflowDefinition::new(
            vec![
                NodeDefinition::new("in", "Input", NodeType::Input),
                NodeDefinition::new("a", "A", NodeType::Process),
            ],
            vec![EdgeDefinition::new("in", "a")],
        )
    }

    #[tokio::test]
    async fn test_static_source_reports_unknown_ids() {
        let source = StaticSource::new().with_workflow("wf", workflow());
        assert!(source.load_workflow("wf", "org").await.is_ok());

        let error = source.load_workflow("other", "org").await.expect_err("unknown");
        assert_eq!(error.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_directory_source_reads_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let json = serde_json::to_vec(&workflow()).expect("serializes");
        tokio::fs::write(dir.path().join("wf-1.json"), json)
            .await
            .expect("writes");

        let source = DirectorySource::new(dir.path());
        let loaded = source.load_workflow("wf-1", "org").await.expect("loads");
        assert_eq!(loaded.nodes.len(), 2);

        let error = source.load_workflow("../wf-1", "org").await.expect_err("rejected");
        assert_eq!(error.kind(), ErrorKind::NotFound);
        let error = source.load_workflow("missing", "org").await.expect_err("missing");
        assert_eq!(error.kind(), ErrorKind::NotFound);
    }
}
