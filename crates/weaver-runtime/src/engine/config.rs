//! Engine configuration.

use derive_builder::Builder;

use crate::definition::{ExecutionSettings, ParallelErrorStrategy};

/// Configuration for the workflow execution engine.
///
/// Unset overrides defer to the execution settings of each workflow.
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
#[builder(
    name = "EngineConfigBuilder",
    pattern = "owned",
    setter(into, strip_option, prefix = "with"),
    build_fn(validate = "Self::validate")
)]
pub struct EngineConfig {
    /// Forces parallel or sequential scheduling.
    #[builder(default)]
    pub parallel: Option<bool>,

    /// Overrides the parallel error strategy.
    #[builder(default)]
    pub error_strategy: Option<ParallelErrorStrategy>,

    /// Writes checkpoints on failure and pause.
    #[builder(default = "true")]
    pub enable_checkpoints: bool,

    /// Reports to the analytics collector, when one is set.
    #[builder(default = "true")]
    pub enable_analytics: bool,

    /// Classifies successful outputs for logs and events.
    #[builder(default = "true")]
    pub validate_outputs: bool,
}

impl EngineConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let (Some(Some(false)), Some(Some(strategy))) = (self.parallel, self.error_strategy) {
            return Err(format!(
                "error strategy '{strategy}' has no effect when parallel execution is disabled"
            ));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallel: None,
            error_strategy: None,
            enable_checkpoints: true,
            enable_analytics: true,
            validate_outputs: true,
        }
    }
}

impl EngineConfig {
    /// Returns a builder.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Returns whether a workflow runs in parallel mode.
    pub fn is_parallel(&self, settings: &ExecutionSettings) -> bool {
        self.parallel.unwrap_or(settings.enable_parallel_execution)
    }

    /// Returns the error strategy applied to a workflow.
    pub fn error_strategy(&self, settings: &ExecutionSettings) -> ParallelErrorStrategy {
        self.error_strategy
            .unwrap_or(settings.parallel_error_strategy)
    }
}
