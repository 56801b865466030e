//! LOGIC node configuration.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};

use crate::definition::NodeDefinition;
use crate::error::ProcessorError;

/// Behaviour of a LOGIC node.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[derive(AsRefStr, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LogicMode {
    /// Take the first branch whose conditions hold.
    #[default]
    Condition,
    /// Take the case whose value equals the switch value.
    Switch,
    /// Join incoming branches; every outgoing edge is taken.
    Merge,
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[derive(AsRefStr, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Operator {
    #[serde(alias = "==", alias = "eq")]
    Equals,
    #[serde(alias = "!=", alias = "ne")]
    NotEquals,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    #[serde(alias = ">", alias = "gt")]
    GreaterThan,
    #[serde(alias = ">=", alias = "gte")]
    GreaterOrEqual,
    #[serde(alias = "<", alias = "lt")]
    LessThan,
    #[serde(alias = "<=", alias = "lte")]
    LessOrEqual,
    IsEmpty,
    IsNotEmpty,
    Matches,
}

impl Operator {
    /// Returns whether the operator ignores its right operand.
    pub const fn is_unary(self) -> bool {
        matches!(self, Self::IsEmpty | Self::IsNotEmpty)
    }
}

/// How the comparisons of a branch combine.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Combinator {
    /// Every comparison must hold.
    #[default]
    And,
    /// At least one comparison must hold.
    Or,
}

/// A single comparison. Operands may contain variable references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    /// Left operand.
    pub left: Value,
    /// Operator.
    pub operator: Operator,
    /// Right operand, unused by unary operators.
    #[serde(default)]
    pub right: Value,
}

/// A condition-mode branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    /// Source handle taken when the branch matches.
    pub handle: String,
    /// Comparisons; an empty list always matches.
    #[serde(default)]
    pub conditions: Vec<Comparison>,
    /// How `conditions` combine.
    #[serde(default)]
    pub combinator: Combinator,
}

/// A switch-mode case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchCase {
    /// Source handle taken when the case matches.
    pub handle: String,
    /// Value compared against the switch value.
    pub value: Value,
}

/// Configuration of a LOGIC node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogicConfig {
    /// Mode.
    #[serde(default)]
    pub mode: LogicMode,
    /// Condition-mode branches, evaluated in order.
    #[serde(default)]
    pub branches: Vec<Branch>,
    /// Switch-mode value.
    #[serde(default)]
    pub value: Value,
    /// Switch-mode cases, evaluated in order.
    #[serde(default)]
    pub cases: Vec<SwitchCase>,
    /// Handle taken when nothing matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_handle: Option<String>,
}

impl LogicConfig {
    /// Reads the configuration from a node.
    pub fn from_node(node: &NodeDefinition) -> Result<Self, ProcessorError> {
        serde_json::from_value(serde_json::Value::Object(node.config.clone())).map_err(|e| {
            ProcessorError::new(format!("invalid logic configuration for '{}': {e}", node.name))
        })
    }

    /// Returns every operand string, for reference checking.
    pub fn operand_templates(&self) -> Vec<&str> {
        let comparisons = self.branches.iter().flat_map(|branch| &branch.conditions);
        let branch_operands = comparisons.flat_map(|comparison| [&comparison.left, &comparison.right]);
        let switch_operands =
            std::iter::once(&self.value).chain(self.cases.iter().map(|case| &case.value));

        branch_operands
            .chain(switch_operands)
            .filter_map(Value::as_str)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::definition::NodeType;

    #[test]
    fn test_parses_condition_config_with_aliases() {
        let node = NodeDefinition::new("l", "Gate", NodeType::Logic).with_config(json!({
            "mode": "condition",
            "branches": [{
                "handle": "high",
                "combinator": "or",
                "conditions": [
                    { "left": "{{Score.value}}", "operator": ">=", "right": 8 },
                    { "left": "{{Score.flag}}", "operator": "is_not_empty" }
                ]
            }],
            "defaultHandle": "low"
        }));

        let config = LogicConfig::from_node(&node).expect("valid config");
        assert_eq!(config.branches[0].conditions[0].operator, Operator::GreaterOrEqual);
        assert_eq!(config.branches[0].combinator, Combinator::Or);
        assert_eq!(config.default_handle.as_deref(), Some("low"));
        assert_eq!(
            config.operand_templates(),
            vec!["{{Score.value}}", "{{Score.flag}}"]
        );
    }

    #[test]
    fn test_rejects_unknown_operator() {
        let node = NodeDefinition::new("l", "Gate", NodeType::Logic).with_config(json!({
            "branches": [{ "handle": "x", "conditions": [{ "left": 1, "operator": "approx" }] }]
        }));
        assert!(LogicConfig::from_node(&node).is_err());
    }
}
