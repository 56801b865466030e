//! Command arguments.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use serde_json::{Map, Value};
use weaver_runtime::context::ExecutionId;
use weaver_runtime::definition::ParallelErrorStrategy;
use weaver_runtime::engine::EngineConfig;
use weaver_runtime::queue::QueueConfig;

/// Default directory for records, logs and checkpoints.
pub const DEFAULT_STATE_DIR: &str = ".weaver";

/// Arguments of `weaver run`.
#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Path of the workflow definition (JSON).
    pub workflow: PathBuf,

    /// Run-time input as a JSON object.
    #[arg(long, short = 'i')]
    pub input: Option<String>,

    /// Resumes from the checkpoint of an earlier execution.
    #[arg(long = "resume", value_name = "EXECUTION_ID")]
    pub resume_from: Option<ExecutionId>,

    /// Forces parallel scheduling.
    #[arg(long, conflicts_with = "sequential")]
    pub parallel: bool,

    /// Forces sequential scheduling.
    #[arg(long)]
    pub sequential: bool,

    /// Error strategy for parallel runs: fail_fast, continue or collect.
    #[arg(long, conflicts_with = "sequential")]
    pub strategy: Option<ParallelErrorStrategy>,

    /// Directory holding records, node logs and checkpoints.
    #[arg(long, env = "WEAVER_STATE_DIR", default_value = DEFAULT_STATE_DIR)]
    pub state_dir: PathBuf,

    /// Prints progress events to stdout as JSON lines.
    #[arg(long)]
    pub events: bool,

    /// Workflow id recorded with the execution. Defaults to the file stem.
    #[arg(long)]
    pub workflow_id: Option<String>,

    /// Organization recorded with the execution.
    #[arg(long, env = "WEAVER_ORGANIZATION_ID", default_value = "local")]
    pub organization_id: String,

    /// User recorded with the execution.
    #[arg(long, env = "WEAVER_USER_ID", default_value = "local")]
    pub user_id: String,

    /// Pricing table (JSON) used for cost estimates.
    #[arg(long, env = "WEAVER_PRICING_FILE")]
    pub pricing: Option<PathBuf>,

    /// Disables checkpoints on failure and pause.
    #[arg(long)]
    pub no_checkpoints: bool,

    /// Queue, timeout and retry behavior.
    #[clap(flatten)]
    pub queue: QueueConfig,
}

impl RunArgs {
    /// Returns the scheduling override, if any.
    pub fn parallel_override(&self) -> Option<bool> {
        match (self.parallel, self.sequential) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }

    /// Parses the run-time input.
    pub fn input_map(&self) -> anyhow::Result<Map<String, Value>> {
        let Some(input) = &self.input else {
            return Ok(Map::new());
        };
        match serde_json::from_str(input).context("--input is not valid JSON")? {
            Value::Object(map) => Ok(map),
            other => anyhow::bail!("--input must be a JSON object, got {other}"),
        }
    }

    /// Returns the workflow id recorded with the execution.
    pub fn workflow_id(&self) -> String {
        self.workflow_id
            .clone()
            .unwrap_or_else(|| file_stem(&self.workflow))
    }

    /// Builds the engine configuration.
    pub fn engine_config(&self) -> anyhow::Result<EngineConfig> {
        let mut builder = EngineConfig::builder().with_enable_checkpoints(!self.no_checkpoints);
        if let Some(parallel) = self.parallel_override() {
            builder = builder.with_parallel(parallel);
        }
        if let Some(strategy) = self.strategy {
            builder = builder.with_error_strategy(strategy);
        }
        builder.build().context("invalid engine configuration")
    }
}

/// Arguments of `weaver inspect`.
#[derive(Debug, Clone, Args)]
pub struct InspectArgs {
    /// Path of the workflow definition (JSON).
    pub workflow: PathBuf,
}

/// Arguments of `weaver status`.
#[derive(Debug, Clone, Args)]
pub struct StatusArgs {
    /// Execution to print.
    pub execution_id: ExecutionId,

    /// Directory holding records, node logs and checkpoints.
    #[arg(long, env = "WEAVER_STATE_DIR", default_value = DEFAULT_STATE_DIR)]
    pub state_dir: PathBuf,

    /// Includes node logs.
    #[arg(long)]
    pub logs: bool,
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map_or_else(|| "workflow".to_owned(), str::to_owned)
}
