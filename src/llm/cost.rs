//! Cost estimation for LLM usage.
//!
//! Per-instance spend is estimated from reported token usage with fixed
//! per-1K-token rates (`ModelPricing`). `CostTracker` aggregates that spend
//! across all instances of a batch, broken down by model.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use super::litellm::Usage;

/// Micro-dollars per dollar for the atomic batch counters.
const MICROS_PER_DOLLAR: f64 = 1_000_000.0;

/// Fixed per-token rates used to estimate the cost of one completion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Dollars per 1K prompt tokens.
    pub input_per_1k: f64,
    /// Dollars per 1K completion tokens.
    pub output_per_1k: f64,
}

impl Default for ModelPricing {
    fn default() -> Self {
        Self {
            input_per_1k: 0.003,
            output_per_1k: 0.015,
        }
    }
}

impl ModelPricing {
    /// Estimated dollar cost of one completion.
    pub fn estimate(&self, usage: &Usage) -> f64 {
        (usage.prompt_tokens as f64 / 1000.0) * self.input_per_1k
            + (usage.completion_tokens as f64 / 1000.0) * self.output_per_1k
    }
}

/// Batch-wide spend aggregated across concurrent workers.
#[derive(Debug, Default)]
pub struct CostTracker {
    total_micros: AtomicU64,
    api_calls: AtomicU64,
    by_model: RwLock<HashMap<String, u64>>,
}

/// Snapshot of a `CostTracker`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CostReport {
    pub total_cost: f64,
    pub api_calls: u64,
    pub by_model: HashMap<String, f64>,
}

impl CostTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the finished spend of one instance.
    pub fn record(&self, model: &str, api_calls: u32, cost: f64) {
        let micros = dollars_to_micros(cost);
        self.total_micros.fetch_add(micros, Ordering::SeqCst);
        self.api_calls.fetch_add(api_calls as u64, Ordering::SeqCst);

        match self.by_model.write() {
            Ok(mut by_model) => *by_model.entry(model.to_string()).or_insert(0) += micros,
            Err(poisoned) => *poisoned.into_inner().entry(model.to_string()).or_insert(0) += micros,
        }

        tracing::debug!(model = model, api_calls = api_calls, cost = cost, "Recorded instance spend");
    }

    /// Total spend in dollars.
    pub fn total_cost(&self) -> f64 {
        micros_to_dollars(self.total_micros.load(Ordering::SeqCst))
    }

    pub fn report(&self) -> CostReport {
        let by_model = match self.by_model.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        CostReport {
            total_cost: self.total_cost(),
            api_calls: self.api_calls.load(Ordering::SeqCst),
            by_model: by_model
                .into_iter()
                .map(|(model, micros)| (model, micros_to_dollars(micros)))
                .collect(),
        }
    }
}

fn dollars_to_micros(dollars: f64) -> u64 {
    if dollars.is_finite() && dollars > 0.0 {
        (dollars * MICROS_PER_DOLLAR).round() as u64
    } else {
        0
    }
}

fn micros_to_dollars(micros: u64) -> f64 {
    micros as f64 / MICROS_PER_DOLLAR
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(prompt: u32, completion: u32) -> Usage {
        Usage {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: prompt + completion,
        }
    }

    #[test]
    fn test_default_pricing_estimate() {
        let pricing = ModelPricing::default();
        let cost = pricing.estimate(&usage(1000, 1000));
        assert!((cost - 0.018).abs() < 1e-12);
        assert_eq!(pricing.estimate(&usage(0, 0)), 0.0);
    }

    #[test]
    fn test_tracker_aggregates_by_model() {
        let tracker = CostTracker::new();
        tracker.record("model-a", 3, 0.5);
        tracker.record("model-a", 2, 0.25);
        tracker.record("model-b", 1, 1.0);

        let report = tracker.report();
        assert!((report.total_cost - 1.75).abs() < 1e-9);
        assert_eq!(report.api_calls, 6);
        assert!((report.by_model["model-a"] - 0.75).abs() < 1e-9);
        assert!((report.by_model["model-b"] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_negative_or_nan_cost_ignored() {
        assert_eq!(dollars_to_micros(-1.0), 0);
        assert_eq!(dollars_to_micros(f64::NAN), 0);
        assert_eq!(dollars_to_micros(0.000_001), 1);
    }
}
