//! `weaver status`.

use std::process::ExitCode;

use anyhow::Context;
use serde_json::json;
use weaver_runtime::store::{ExecutionStore, FileStore};

use super::print_json;
use crate::config::StatusArgs;

/// Prints a stored execution.
pub(crate) async fn status(args: StatusArgs) -> anyhow::Result<ExitCode> {
    let store = FileStore::open(&args.state_dir)
        .await
        .with_context(|| format!("failed to open state directory {}", args.state_dir.display()))?;

    let Some(record) = store
        .get_execution(args.execution_id)
        .await
        .context("failed to read execution record")?
    else {
        anyhow::bail!("execution {} not found in {}", args.execution_id, args.state_dir.display());
    };

    let checkpoint = store
        .load_checkpoint(args.execution_id)
        .await
        .context("failed to read checkpoint")?
        .is_some();

    let mut report = json!({ "execution": record, "hasCheckpoint": checkpoint });
    if args.logs {
        let logs = store
            .node_logs(args.execution_id)
            .await
            .context("failed to read node logs")?;
        report["logs"] = serde_json::to_value(logs).context("failed to render node logs")?;
    }
    print_json(&report)?;

    Ok(ExitCode::SUCCESS)
}
