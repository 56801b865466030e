//! `weaver inspect`.

use std::process::ExitCode;

use anyhow::Context;
use serde_json::json;
use weaver_runtime::checkpoint::create_workflow_hash;
use weaver_runtime::graph::{execution_order, parallel_layers};

use super::{load_workflow, print_json};
use crate::config::InspectArgs;

/// Validates a workflow file and prints its schedule.
pub(crate) async fn inspect(args: InspectArgs) -> anyhow::Result<ExitCode> {
    let workflow = load_workflow(&args.workflow).await?;
    workflow.validate().context("invalid workflow graph")?;

    let order = execution_order(&workflow.nodes, &workflow.edges)?;
    let layers = parallel_layers(&workflow.nodes, &workflow.edges)?;

    let report = json!({
        "nodes": workflow.nodes.len(),
        "edges": workflow.edges.len(),
        "hash": create_workflow_hash(&workflow.nodes, &workflow.edges),
        "settings": workflow.settings,
        "order": order.iter().map(|node| node.name.as_str()).collect::<Vec<_>>(),
        "layers": layers
            .iter()
            .map(|layer| layer.nodes.iter().map(|node| node.name.as_str()).collect::<Vec<_>>())
            .collect::<Vec<_>>(),
    });
    print_json(&report)?;

    Ok(ExitCode::SUCCESS)
}
