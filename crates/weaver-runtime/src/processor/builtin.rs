//! Processors shipped with the runtime.

use serde_json::{Map, Value};

use super::{NodeProcessor, ProcessRequest, TRACING_TARGET};
use crate::context::NodeOutput;
use crate::error::ProcessorError;
use crate::routing::evaluate_logic;

/// Config keys tried, in order, for the template of [`TemplateProcessor`].
const TEMPLATE_KEYS: &[&str] = &["prompt", "userPrompt", "template", "content", "message"];

/// Emits the declared fields of an INPUT node.
///
/// Each field takes its effective value: the run-time input of the same
/// name, then the configured value, then the default. Fields without a
/// value are omitted.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputProcessor;

#[async_trait::async_trait]
impl NodeProcessor for InputProcessor {
    async fn process(&self, request: ProcessRequest<'_>) -> Result<NodeOutput, ProcessorError> {
        let globals = request.context.globals();
        let data: Map<String, Value> = request
            .node
            .input_fields()
            .into_iter()
            .filter_map(|field| {
                let value = field.effective_value(globals)?;
                Some((field.name, value))
            })
            .collect();

        tracing::trace!(
            target: TRACING_TARGET,
            node_id = %request.node.id,
            fields = data.len(),
            "Collected input fields"
        );
        Ok(NodeOutput::success(request.node, data))
    }
}

/// Evaluates a LOGIC node and records the handles it takes.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogicProcessor;

#[async_trait::async_trait]
impl NodeProcessor for LogicProcessor {
    async fn process(&self, request: ProcessRequest<'_>) -> Result<NodeOutput, ProcessorError> {
        let (_, data) = evaluate_logic(
            request.node,
            request.context,
            &request.workflow.edges,
            &request.workflow.nodes,
        )?;
        Ok(NodeOutput::success(request.node, data))
    }
}

/// Renders the node's prompt and returns it as `result`.
///
/// Stands in for a model-calling processor when none is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateProcessor;

#[async_trait::async_trait]
impl NodeProcessor for TemplateProcessor {
    async fn process(&self, request: ProcessRequest<'_>) -> Result<NodeOutput, ProcessorError> {
        let template = TEMPLATE_KEYS
            .iter()
            .find_map(|key| request.node.config_str(key))
            .ok_or_else(|| {
                ProcessorError::new(format!("node '{}' has no prompt to render", request.node.name))
            })?;

        let resolved = request.resolver().resolve_text(template);
        if !resolved.is_complete() {
            return Err(ProcessorError::new(format!(
                "unresolved references: {}",
                resolved.unresolved.join(", ")
            )));
        }

        let mut data = Map::new();
        data.insert("result".into(), Value::String(resolved.text));
        Ok(NodeOutput::success(request.node, data))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::context::{ExecutionContext, ExecutionId, NodeStatus};
    use crate::definition::{EdgeDefinition, NodeDefinition, NodeType, WorkflowDefinition};

    fn user_node() -> NodeDefinition {
        NodeDefinition::new("in", "User", NodeType::Input).with_config(json!({
            "fields": [
                { "name": "name", "required": true, "value": "Ann" },
                { "name": "city", "defaultValue": "Oslo" },
                { "name": "note" }
            ]
        }))
    }

    #[tokio::test]
    async fn test_input_fields_prefer_run_input() {
        let node = user_node();
        let workflow = WorkflowDefinition::new(vec![node.clone()], vec![]);
        let mut globals = Map::new();
        globals.insert("city".into(), json!("Bergen"));
        let context = ExecutionContext::new(ExecutionId::new(), "org", "user").with_globals(globals);

        let output = InputProcessor
            .process(ProcessRequest::new(&node, &context, &workflow))
            .await
            .expect("input");
        assert_eq!(output.data.get("name"), Some(&json!("Ann")));
        assert_eq!(output.data.get("city"), Some(&json!("Bergen")));
        assert!(!output.data.contains_key("note"));
    }

    #[tokio::test]
    async fn test_template_renders_prompt() {
        let user = user_node();
        let writer = NodeDefinition::new("w", "Writer", NodeType::Process)
            .with_config(json!({ "prompt": "Hello {{User.name}}" }));
        let workflow = WorkflowDefinition::new(
            vec![user.clone(), writer.clone()],
            vec![EdgeDefinition::new("in", "w")],
        );
        let mut context = ExecutionContext::new(ExecutionId::new(), "org", "user");
        let mut data = Map::new();
        data.insert("name".into(), json!("Ann"));
        context.record_output(NodeOutput::success(&user, data));

        let output = TemplateProcessor
            .process(ProcessRequest::new(&writer, &context, &workflow))
            .await
            .expect("render");
        assert_eq!(output.status, NodeStatus::Success);
        assert_eq!(output.data.get("result"), Some(&json!("Hello Ann")));
    }

    #[tokio::test]
    async fn test_template_without_prompt_fails() {
        let node = NodeDefinition::new("w", "Writer", NodeType::Process);
        let workflow = WorkflowDefinition::new(vec![node.clone()], vec![]);
        let context = ExecutionContext::new(ExecutionId::new(), "org", "user");
        let error = TemplateProcessor
            .process(ProcessRequest::new(&node, &context, &workflow))
            .await
            .expect_err("no prompt");
        assert!(!error.retryable);
    }
}
