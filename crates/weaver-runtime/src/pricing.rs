//! Token cost estimation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::context::TokenUsage;

/// Estimates the cost of token usage.
pub trait PricingModel: Send + Sync {
    /// Returns the estimated cost of `usage`.
    fn estimate_cost(&self, usage: &TokenUsage) -> f64;
}

/// Price per 1000 tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelRate {
    /// Price per 1000 prompt tokens.
    pub prompt_per_1k: f64,
    /// Price per 1000 completion tokens.
    pub completion_per_1k: f64,
}

impl ModelRate {
    /// Creates a rate.
    pub const fn new(prompt_per_1k: f64, completion_per_1k: f64) -> Self {
        Self {
            prompt_per_1k,
            completion_per_1k,
        }
    }

    /// Returns the cost of the given token counts.
    pub fn cost(&self, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        (prompt_tokens as f64 / 1000.0) * self.prompt_per_1k
            + (completion_tokens as f64 / 1000.0) * self.completion_per_1k
    }
}

/// Rates keyed by model name.
///
/// A model is priced by its exact entry, then by the longest entry that is a
/// prefix of its name, then by the default rate. The empty table prices
/// everything at zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingTable {
    #[serde(default)]
    models: BTreeMap<String, ModelRate>,
    #[serde(default)]
    default_rate: ModelRate,
}

impl PricingTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the rate of a model or model prefix.
    pub fn with_model(mut self, model: impl Into<String>, rate: ModelRate) -> Self {
        self.models.insert(model.into(), rate);
        self
    }

    /// Sets the rate for unknown models.
    pub fn with_default_rate(mut self, rate: ModelRate) -> Self {
        self.default_rate = rate;
        self
    }

    /// Returns the rate applied to a model.
    pub fn rate_for(&self, model: Option<&str>) -> ModelRate {
        let Some(model) = model else {
            return self.default_rate;
        };
        if let Some(rate) = self.models.get(model) {
            return *rate;
        }
        self.models
            .iter()
            .filter(|(prefix, _)| model.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, rate)| *rate)
            .unwrap_or(self.default_rate)
    }
}

impl PricingModel for PricingTable {
    fn estimate_cost(&self, usage: &TokenUsage) -> f64 {
        self.rate_for(usage.model.as_deref())
            .cost(usage.prompt_tokens, usage.completion_tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> PricingTable {
        PricingTable::new()
            .with_model("gpt-4o", ModelRate::new(5.0, 15.0))
            .with_model("gpt-4o-mini", ModelRate::new(0.15, 0.6))
            .with_model("gpt", ModelRate::new(1.0, 1.0))
            .with_default_rate(ModelRate::new(0.5, 0.5))
    }

    #[test]
    fn test_rate_lookup_order() {
        let table = table();
        assert_eq!(table.rate_for(Some("gpt-4o")), ModelRate::new(5.0, 15.0));
        assert_eq!(
            table.rate_for(Some("gpt-4o-mini-2024-07-18")),
            ModelRate::new(0.15, 0.6)
        );
        assert_eq!(table.rate_for(Some("gpt-3.5")), ModelRate::new(1.0, 1.0));
        assert_eq!(table.rate_for(Some("claude")), ModelRate::new(0.5, 0.5));
        assert_eq!(table.rate_for(None), ModelRate::new(0.5, 0.5));
    }

    #[test]
    fn test_estimate_cost() {
        let usage = TokenUsage::new(2000, 1000).with_model("gpt-4o");
        assert!((table().estimate_cost(&usage) - 25.0).abs() < 1e-9);
        assert_eq!(PricingTable::new().estimate_cost(&usage), 0.0);
    }

    #[test]
    fn test_table_from_json() {
        let table: PricingTable = serde_json::from_str(
            r#"{ "models": { "m": { "promptPer1k": 2.0, "completionPer1k": 4.0 } } }"#,
        )
        .expect("parse");
        let usage = TokenUsage::new(500, 500).with_model("m-large");
        assert!((table.estimate_cost(&usage) - 3.0).abs() < 1e-9);
    }
}
