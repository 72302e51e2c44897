//! Token usage accounting across the model calls of a task.

use reflace_core::model::Usage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::pricing::PricingTable;

/// Token usage keyed by the model that reported it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageLedger {
    by_model: BTreeMap<String, Usage>,
    calls: u64,
}

impl UsageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one model call. Calls without usage still count as calls.
    pub fn record(&mut self, model: &str, usage: Option<&Usage>) {
        self.calls += 1;
        if let Some(usage) = usage {
            self.by_model.entry(model.to_string()).or_default().add(usage);
        }
    }

    /// Fold another ledger into this one.
    pub fn merge(&mut self, other: &UsageLedger) {
        self.calls += other.calls;
        for (model, usage) in &other.by_model {
            self.by_model.entry(model.clone()).or_default().add(usage);
        }
    }

    /// Number of model calls recorded.
    pub fn calls(&self) -> u64 {
        self.calls
    }

    /// Usage summed over all models.
    pub fn total(&self) -> Usage {
        let mut total = Usage::default();
        for usage in self.by_model.values() {
            total.add(usage);
        }
        total
    }

    /// USD cost under the given pricing.
    pub fn cost(&self, pricing: &PricingTable) -> f64 {
        self.by_model
            .iter()
            .map(|(model, u)| pricing.compute_cost(model, u.input_tokens, u.output_tokens))
            .sum()
    }

    pub fn by_model(&self) -> impl Iterator<Item = (&str, &Usage)> {
        self.by_model.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Per-task accounting written into the performance report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskMetrics {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub model_calls: u64,
    pub cost_usd: f64,
    pub latency_ms: u64,
}

impl TaskMetrics {
    pub fn from_ledger(ledger: &UsageLedger, pricing: &PricingTable, latency_ms: u64) -> Self {
        let total = ledger.total();
        Self {
            input_tokens: total.input_tokens,
            output_tokens: total.output_tokens,
            total_tokens: total.total_tokens,
            model_calls: ledger.calls(),
            cost_usd: ledger.cost(pricing),
            latency_ms,
        }
    }

    pub fn add(&mut self, other: &TaskMetrics) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
        self.model_calls += other.model_calls;
        self.cost_usd += other.cost_usd;
        self.latency_ms += other.latency_ms;
    }
}
