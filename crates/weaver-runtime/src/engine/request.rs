//! Run requests.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::ExecutionId;

/// Parameters of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    /// Workflow being run.
    pub workflow_id: String,
    /// Owning organization.
    pub organization_id: String,
    /// Triggering user.
    pub user_id: String,
    /// Run-time input, merged over the workflow's global variables.
    #[serde(default)]
    pub input: Map<String, Value>,
    /// Execution whose checkpoint this run resumes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_from: Option<ExecutionId>,
    /// Id to use for the new execution. Generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<ExecutionId>,
}

impl RunRequest {
    /// Creates a request without input.
    pub fn new(
        workflow_id: impl Into<String>,
        organization_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            organization_id: organization_id.into(),
            user_id: user_id.into(),
            ..Default::default()
        }
    }

    /// Sets the run-time input.
    pub fn with_input(mut self, input: Map<String, Value>) -> Self {
        self.input = input;
        self
    }

    /// Adds one input value.
    pub fn with_input_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.input.insert(key.into(), value.into());
        self
    }

    /// Resumes from the checkpoint of an earlier execution.
    pub fn with_resume_from(mut self, execution_id: ExecutionId) -> Self {
        self.resume_from = Some(execution_id);
        self
    }

    /// Fixes the id of the new execution.
    pub fn with_execution_id(mut self, execution_id: ExecutionId) -> Self {
        self.execution_id = Some(execution_id);
        self
    }
}
