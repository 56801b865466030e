//! Field declarations carried by source nodes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::NodeDefinition;
use crate::variable::is_blank;

/// A user-supplied field declared by an INPUT node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputField {
    /// Field name, also the global variable that can override it.
    pub name: String,
    /// Display label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Whether a non-blank value is required before the run continues.
    #[serde(default)]
    pub required: bool,
    /// Configured value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Fallback when no value is configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
}

impl InputField {
    /// Resolves the effective value.
    ///
    /// Run-time globals win over the configured value, which wins over the
    /// default. Blank candidates are passed over.
    pub fn effective_value(&self, globals: &Map<String, Value>) -> Option<Value> {
        [
            globals.get(&self.name),
            self.value.as_ref(),
            self.default_value.as_ref(),
        ]
        .into_iter()
        .flatten()
        .find(|value| !is_blank(value))
        .cloned()
    }
}

impl NodeDefinition {
    /// Returns the declared input fields. Malformed entries are ignored.
    pub fn input_fields(&self) -> Vec<InputField> {
        self.config
            .get("fields")
            .and_then(Value::as_array)
            .map(|fields| {
                fields
                    .iter()
                    .filter_map(|field| serde_json::from_value(field.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::definition::NodeType;

    #[test]
    fn test_effective_value_precedence() {
        let field: InputField = serde_json::from_value(json!({
            "name": "topic",
            "required": true,
            "value": "  ",
            "defaultValue": "rust"
        }))
        .expect("valid field");

        assert_eq!(field.effective_value(&Map::new()), Some(json!("rust")));

        let mut globals = Map::new();
        globals.insert("topic".into(), json!("tokio"));
        assert_eq!(field.effective_value(&globals), Some(json!("tokio")));
    }

    #[test]
    fn test_input_fields_skip_malformed_entries() {
        let node = NodeDefinition::new("in", "User", NodeType::Input).with_config(json!({
            "fields": [{ "name": "a" }, { "label": "no name" }, 3]
        }));
        let fields = node.input_fields();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].name, "a");
    }
}
