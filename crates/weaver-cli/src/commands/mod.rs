//! Command implementations.

mod inspect;
mod run;
mod status;

use std::path::Path;

use anyhow::Context;
pub(crate) use inspect::inspect;
pub(crate) use run::run;
pub(crate) use status::status;
use weaver_runtime::definition::WorkflowDefinition;

/// Reads a workflow definition from a JSON file.
async fn load_workflow(path: &Path) -> anyhow::Result<WorkflowDefinition> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read workflow file {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse workflow file {}", path.display()))
}

/// Writes a value to stdout as pretty JSON.
fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render output")?;
    println!("{rendered}");
    Ok(())
}
