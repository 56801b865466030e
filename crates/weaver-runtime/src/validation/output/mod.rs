//! Post-execution output classification.
//!
//! Outputs are classified in order: `empty` (no content), `invalid` (fails
//! the checker of its declared type), `incomplete` (looks truncated), else
//! `valid`. Checkers live in a type-keyed table on [`OutputValidator`].

mod checkers;
mod truncation;

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{AsRefStr, Display};

pub use checkers::{
    Balance, CSV_RAGGED_TOLERANCE, OutputChecker, check_csv, check_html, check_json,
    check_markdown, check_text, strip_code_fence,
};
pub use truncation::detect_truncation;

use crate::variable::primary_content;

/// Tracing target for output validation.
pub const TRACING_TARGET: &str = "weaver_runtime::validation";

/// Config keys that declare an expected output type.
const TYPE_KEYS: &[&str] = &["outputType", "outputFormat"];

/// Classification of a node's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[derive(AsRefStr, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OutputStatus {
    /// Usable output.
    Valid,
    /// No key holds a non-blank value.
    Empty,
    /// Does not match the declared type.
    Invalid,
    /// Appears to be cut off.
    Incomplete,
}

/// Result of output validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputValidation {
    /// Classification.
    pub status: OutputStatus,
    /// Diagnostic when not valid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OutputValidation {
    fn new(status: OutputStatus, error: Option<String>) -> Self {
        Self { status, error }
    }

    /// Returns whether the output is usable.
    pub fn is_valid(&self) -> bool {
        self.status == OutputStatus::Valid
    }
}

/// Output validator with a pluggable checker table.
#[derive(Clone)]
pub struct OutputValidator {
    checkers: HashMap<String, Arc<dyn OutputChecker>>,
}

impl std::fmt::Debug for OutputValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<&String> = self.checkers.keys().collect();
        types.sort();
        f.debug_struct("OutputValidator")
            .field("types", &types)
            .finish()
    }
}

impl Default for OutputValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputValidator {
    /// Creates a validator with the built-in checkers.
    pub fn new() -> Self {
        Self::empty()
            .with_checker("json", check_json)
            .with_checker("html", check_html)
            .with_checker("csv", check_csv)
            .with_checker("markdown", check_markdown)
            .with_checker("md", check_markdown)
            .with_checker("text", check_text)
    }

    /// Creates a validator with no checkers.
    pub fn empty() -> Self {
        Self {
            checkers: HashMap::new(),
        }
    }

    /// Registers a checker for a type, replacing any existing one.
    pub fn register(&mut self, output_type: impl Into<String>, checker: impl OutputChecker + 'static) {
        self.checkers
            .insert(output_type.into().to_ascii_lowercase(), Arc::new(checker));
    }

    /// Builder form of [`register`](Self::register).
    pub fn with_checker(
        mut self,
        output_type: impl Into<String>,
        checker: impl OutputChecker + 'static,
    ) -> Self {
        self.register(output_type, checker);
        self
    }

    /// Returns whether a checker exists for a type.
    pub fn supports(&self, output_type: &str) -> bool {
        self.checkers.contains_key(&output_type.to_ascii_lowercase())
    }

    /// Classifies an output.
    ///
    /// The expected type is the argument, else `outputType` or `outputFormat`
    /// from the node config. Types without a registered checker are not
    /// structurally checked.
    pub fn validate(
        &self,
        node_config: &Map<String, Value>,
        output: &Map<String, Value>,
        expected_type: Option<&str>,
    ) -> OutputValidation {
        let Some(content) = primary_content(output) else {
            return OutputValidation::new(
                OutputStatus::Empty,
                Some("output has no non-blank content".to_owned()),
            );
        };

        let declared = expected_type.or_else(|| {
            TYPE_KEYS
                .iter()
                .find_map(|key| node_config.get(*key).and_then(Value::as_str))
        });

        if let Some(output_type) = declared {
            match self.checkers.get(&output_type.to_ascii_lowercase()) {
                Some(checker) => {
                    if let Err(diagnostic) = checker.check(&content) {
                        return OutputValidation::new(
                            OutputStatus::Invalid,
                            Some(format!("expected {output_type}: {diagnostic}")),
                        );
                    }
                }
                None => tracing::debug!(
                    target: TRACING_TARGET,
                    output_type,
                    "No checker registered for output type"
                ),
            }
        }

        match detect_truncation(&content) {
            Some(reason) => OutputValidation::new(OutputStatus::Incomplete, Some(reason)),
            None => OutputValidation::new(OutputStatus::Valid, None),
        }
    }
}

static DEFAULT_VALIDATOR: LazyLock<OutputValidator> = LazyLock::new(OutputValidator::new);

/// Classifies an output with the built-in checkers.
pub fn validate_node_output(
    node_config: &Map<String, Value>,
    output: &Map<String, Value>,
    expected_type: Option<&str>,
) -> OutputValidation {
    DEFAULT_VALIDATOR.validate(node_config, output, expected_type)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_empty_output() {
        let result = validate_node_output(&Map::new(), &map(json!({ "result": "  " })), None);
        assert_eq!(result.status, OutputStatus::Empty);
    }

    #[test]
    fn test_invalid_json_mentions_brace() {
        let output = map(json!({ "result": r#"{"a":1, "b":2"# }));
        let result = validate_node_output(&Map::new(), &output, Some("json"));
        assert_eq!(result.status, OutputStatus::Invalid);
        assert!(result.error.unwrap_or_default().contains("brace"));
    }

    #[test]
    fn test_type_from_node_config() {
        let config = map(json!({ "outputFormat": "JSON" }));
        let output = map(json!({ "text": "not json at all" }));
        assert_eq!(
            validate_node_output(&config, &output, None).status,
            OutputStatus::Invalid
        );
    }

    #[test]
    fn test_trailing_colon_is_incomplete() {
        let output = map(json!({ "result": "Please review the following items: " }));
        let result = validate_node_output(&Map::new(), &output, None);
        assert_eq!(result.status, OutputStatus::Incomplete);
    }

    #[test]
    fn test_valid_text() {
        let output = map(json!({ "response": "All checks passed." }));
        assert!(validate_node_output(&Map::new(), &output, Some("text")).is_valid());
    }

    #[test]
    fn test_registered_checker_is_dispatched() {
        let validator = OutputValidator::new().with_checker("yaml", |content: &str| {
            if content.contains(':') {
                Ok(())
            } else {
                Err("no mapping found".to_owned())
            }
        });
        assert!(validator.supports("YAML"));

        let output = map(json!({ "result": "just words" }));
        let result = validator.validate(&Map::new(), &output, Some("yaml"));
        assert_eq!(result.status, OutputStatus::Invalid);
        assert_eq!(result.error.as_deref(), Some("expected yaml: no mapping found"));
    }
}
