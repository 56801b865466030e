//! `weaver run`.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use weaver_runtime::definition::NodeType;
use weaver_runtime::engine::{Engine, RunRequest};
use weaver_runtime::events::{FanoutSink, ProgressEvent, TracingSink};
use weaver_runtime::pricing::PricingTable;
use weaver_runtime::processor::{ProcessorRegistry, TemplateProcessor};
use weaver_runtime::queue::{ExecutionQueue, StaticSource};
use weaver_runtime::store::{ExecutionStatus, FileStore};

use super::{load_workflow, print_json};
use crate::TRACING_TARGET_COMMAND;
use crate::config::RunArgs;

/// Exit code of a paused run.
const EXIT_PAUSED: u8 = 2;

/// Executes a workflow file and prints the result.
pub(crate) async fn run(args: RunArgs) -> anyhow::Result<ExitCode> {
    let workflow = load_workflow(&args.workflow).await?;
    let input = args.input_map()?;
    let config = args.engine_config()?;

    let store = FileStore::open(&args.state_dir)
        .await
        .with_context(|| format!("failed to open state directory {}", args.state_dir.display()))?;

    let registry =
        ProcessorRegistry::with_builtins().with_processor(NodeType::Process, TemplateProcessor);
    let mut engine = Engine::new(registry, Arc::new(store)).with_config(config);

    if let Some(path) = &args.pricing {
        engine = engine.with_pricing(load_pricing(path).await?);
    }

    let mut sink = FanoutSink::new().with_sink(TracingSink);
    if args.events {
        sink = sink.with_sink(print_event);
    }
    let engine = engine.with_sink(sink);

    let workflow_id = args.workflow_id();
    tracing::info!(
        target: TRACING_TARGET_COMMAND,
        workflow_id = %workflow_id,
        path = %args.workflow.display(),
        nodes = workflow.nodes.len(),
        edges = workflow.edges.len(),
        resume_from = ?args.resume_from,
        "Running workflow"
    );

    let source = StaticSource::new().with_workflow(workflow_id.clone(), workflow);
    let queue = ExecutionQueue::new(engine, source, args.queue.clone());

    let mut request =
        RunRequest::new(workflow_id, &args.organization_id, &args.user_id).with_input(input);
    if let Some(execution_id) = args.resume_from {
        request = request.with_resume_from(execution_id);
    }

    let outcome = queue.submit(request).wait().await.context("workflow run failed")?;
    print_json(&outcome.result)?;

    Ok(match outcome.result.status {
        ExecutionStatus::Completed => ExitCode::SUCCESS,
        ExecutionStatus::Paused => ExitCode::from(EXIT_PAUSED),
        _ => ExitCode::FAILURE,
    })
}

/// Prints one progress event as a JSON line.
fn print_event(event: &ProgressEvent) {
    match serde_json::to_string(event) {
        Ok(line) => println!("{line}"),
        Err(error) => tracing::warn!(
            target: TRACING_TARGET_COMMAND,
            error = %error,
            "Failed to render progress event"
        ),
    }
}

async fn load_pricing(path: &Path) -> anyhow::Result<PricingTable> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read pricing file {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse pricing file {}", path.display()))
}
