//! Built-in pricing table for the models experiments are usually run with.
//!
//! Prices are in USD per 1 million tokens, split into input and output.
//! Unknown models cost 0.0 so accounting never fails a run.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-million-token pricing for a model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Price per 1M input tokens in USD.
    pub input_per_m: f64,
    /// Price per 1M output tokens in USD.
    pub output_per_m: f64,
}

impl ModelPricing {
    pub fn new(input_per_m: f64, output_per_m: f64) -> Self {
        Self {
            input_per_m,
            output_per_m,
        }
    }

    /// Compute cost for the given token counts.
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 * self.input_per_m + output_tokens as f64 * self.output_per_m)
            / 1_000_000.0
    }
}

/// Model name → pricing, with provider-prefix and version-suffix matching.
#[derive(Debug, Clone, Default)]
pub struct PricingTable {
    prices: HashMap<String, ModelPricing>,
}

impl PricingTable {
    /// Create a pricing table with built-in model prices.
    pub fn with_defaults() -> Self {
        let mut table = Self::empty();

        // ── OpenAI chat ────────────────────────────────────────────
        table.set("gpt-4o", ModelPricing::new(2.5, 10.0));
        table.set("gpt-4o-mini", ModelPricing::new(0.15, 0.6));
        table.set("gpt-4.1", ModelPricing::new(2.0, 8.0));
        table.set("gpt-4.1-mini", ModelPricing::new(0.4, 1.6));
        table.set("gpt-4.1-nano", ModelPricing::new(0.1, 0.4));
        table.set("o3-mini", ModelPricing::new(1.1, 4.4));
        table.set("o4-mini", ModelPricing::new(1.1, 4.4));

        // ── OpenAI embeddings ──────────────────────────────────────
        table.set("text-embedding-3-small", ModelPricing::new(0.02, 0.0));
        table.set("text-embedding-3-large", ModelPricing::new(0.13, 0.0));

        table
    }

    pub fn empty() -> Self {
        Self {
            prices: HashMap::new(),
        }
    }

    /// Exact lookup.
    pub fn get(&self, model: &str) -> Option<ModelPricing> {
        self.prices.get(model).copied()
    }

    /// Add or update pricing for a model.
    pub fn set(&mut self, model: impl Into<String>, pricing: ModelPricing) {
        self.prices.insert(model.into(), pricing);
    }

    /// Resolve pricing for a model name as reported by a client.
    ///
    /// Tries an exact match, then the name without a `provider/` prefix, then
    /// the longest known name that prefixes it (`gpt-4o-mini-2024-07-18`
    /// resolves to `gpt-4o-mini`).
    pub fn resolve(&self, model: &str) -> Option<ModelPricing> {
        if let Some(p) = self.prices.get(model) {
            return Some(*p);
        }

        let bare = model.rsplit('/').next().unwrap_or(model).to_lowercase();
        if let Some(p) = self.prices.get(bare.as_str()) {
            return Some(*p);
        }

        self.prices
            .iter()
            .filter(|(key, _)| bare.starts_with(&key.to_lowercase()))
            .max_by_key(|(key, _)| key.len())
            .map(|(_, p)| *p)
    }

    /// Compute cost for a model call, returning 0.0 if the model is unknown.
    pub fn compute_cost(&self, model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        self.resolve(model)
            .map(|p| p.cost(input_tokens, output_tokens))
            .unwrap_or(0.0)
    }

    /// All known models with their pricing, sorted by name.
    pub fn entries(&self) -> Vec<(String, ModelPricing)> {
        let mut entries: Vec<_> = self
            .prices
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}
