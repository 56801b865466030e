//! Operand resolution and operator evaluation.

use regex::Regex;
use serde_json::Value;

use super::TRACING_TARGET;
use super::config::{Branch, Combinator, Comparison, Operator};
use crate::variable::{VariableResolver, format_value, is_blank, parse_references};

/// Resolves an operand against the run.
///
/// A string that is exactly one reference keeps the referenced value's type;
/// any other string is rendered as text. Non-string operands are literals.
pub fn resolve_operand(resolver: &VariableResolver<'_>, operand: &Value) -> Value {
    let Value::String(template) = operand else {
        return operand.clone();
    };

    let references = parse_references(template);
    if let [only] = references.as_slice() {
        if only.span.start == 0 && only.span.end == template.len() {
            return resolver.resolve_ref(only).unwrap_or(Value::Null);
        }
    }

    Value::String(resolver.resolve_text(template).text)
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(_) | Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn as_text(value: &Value) -> String {
    format_value(value).trim().to_owned()
}

/// Loose equality: numeric, then boolean, then textual.
pub fn loosely_equal(left: &Value, right: &Value) -> bool {
    if let (Some(l), Some(r)) = (as_number(left), as_number(right)) {
        return (l - r).abs() < f64::EPSILON;
    }
    if let (Some(l), Some(r)) = (as_bool(left), as_bool(right)) {
        return l == r;
    }
    as_text(left) == as_text(right)
}

fn contains(left: &Value, right: &Value) -> bool {
    match left {
        Value::Array(items) => items.iter().any(|item| loosely_equal(item, right)),
        Value::Object(map) => map.contains_key(&as_text(right)),
        _ => as_text(left).contains(&as_text(right)),
    }
}

fn ordering(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
    as_number(left)?.partial_cmp(&as_number(right)?)
}

fn matches_pattern(left: &Value, right: &Value) -> bool {
    let pattern = as_text(right);
    match Regex::new(&pattern) {
        Ok(regex) => regex.is_match(&format_value(left)),
        Err(error) => {
            tracing::warn!(
                target: TRACING_TARGET,
                pattern = %pattern,
                error = %error,
                "Invalid regex in logic condition"
            );
            false
        }
    }
}

/// Applies an operator to resolved operands.
pub fn compare(operator: Operator, left: &Value, right: &Value) -> bool {
    use std::cmp::Ordering;

    match operator {
        Operator::Equals => loosely_equal(left, right),
        Operator::NotEquals => !loosely_equal(left, right),
        Operator::Contains => contains(left, right),
        Operator::NotContains => !contains(left, right),
        Operator::StartsWith => as_text(left).starts_with(&as_text(right)),
        Operator::EndsWith => as_text(left).ends_with(&as_text(right)),
        Operator::GreaterThan => ordering(left, right) == Some(Ordering::Greater),
        Operator::GreaterOrEqual => {
            matches!(ordering(left, right), Some(Ordering::Greater | Ordering::Equal))
        }
        Operator::LessThan => ordering(left, right) == Some(Ordering::Less),
        Operator::LessOrEqual => {
            matches!(ordering(left, right), Some(Ordering::Less | Ordering::Equal))
        }
        Operator::IsEmpty => is_blank(left),
        Operator::IsNotEmpty => !is_blank(left),
        Operator::Matches => matches_pattern(left, right),
    }
}

/// Evaluates one comparison.
pub fn evaluate_comparison(resolver: &VariableResolver<'_>, comparison: &Comparison) -> bool {
    let left = resolve_operand(resolver, &comparison.left);
    let right = if comparison.operator.is_unary() {
        Value::Null
    } else {
        resolve_operand(resolver, &comparison.right)
    };
    compare(comparison.operator, &left, &right)
}

/// Evaluates a branch. A branch without conditions always matches.
pub fn evaluate_branch(resolver: &VariableResolver<'_>, branch: &Branch) -> bool {
    let mut results = branch
        .conditions
        .iter()
        .map(|comparison| evaluate_comparison(resolver, comparison));

    match branch.combinator {
        Combinator::And => results.all(|holds| holds),
        Combinator::Or => branch.conditions.is_empty() || results.any(|holds| holds),
    }
}
