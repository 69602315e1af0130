//! Cost tracking and savings computation.
//!
//! Two jobs: estimate the cost of a routing decision up front from the
//! configured per-model pricing, and accumulate observed spend per tier so
//! the savings versus an always-premium baseline can be reported.
//!
//! Thread-safe: all counters use atomic operations for lock-free reads and
//! writes under concurrent request handlers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::config::{ModelPrice, Tier};

/// Conservative cap on the output tokens assumed for an estimate.
const ESTIMATE_MAX_OUTPUT: u64 = 4096;

/// Estimated cost of serving one request on one model.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CostEstimate {
    /// Estimated input cost in USD.
    pub input_cost: f64,
    /// Estimated output cost in USD.
    pub output_cost: f64,
    /// Estimated total cost in USD.
    pub total_cost: f64,
    /// Fraction saved versus the most expensive configured model, in
    /// `[0.0, 1.0]`. Zero when no baseline exists.
    pub savings_pct: f64,
}

/// Estimate the cost of a request against one model's pricing.
///
/// # Arguments
///
/// * `price` — The selected model's pricing.
/// * `pricing` — Full pricing table; the most expensive entry is the
///   savings baseline.
/// * `input_tokens` — Estimated input token count.
/// * `max_output_tokens` — Requested output budget, capped at 4096 for the
///   estimate.
///
/// # Panics
///
/// This function never panics.
pub fn estimate(
    price: &ModelPrice,
    pricing: &HashMap<String, ModelPrice>,
    input_tokens: u64,
    max_output_tokens: u64,
) -> CostEstimate {
    let output_tokens = max_output_tokens.min(ESTIMATE_MAX_OUTPUT);
    let input_cost = input_tokens as f64 * price.input_per_million / 1_000_000.0;
    let output_cost = output_tokens as f64 * price.output_per_million / 1_000_000.0;
    let total = input_cost + output_cost;

    let baseline = pricing
        .values()
        .map(|p| {
            input_tokens as f64 * p.input_per_million / 1_000_000.0
                + output_tokens as f64 * p.output_per_million / 1_000_000.0
        })
        .fold(0.0_f64, f64::max);

    let savings_pct = if baseline > 0.0 {
        ((baseline - total) / baseline).max(0.0)
    } else {
        0.0
    };

    CostEstimate {
        input_cost,
        output_cost,
        total_cost: total,
        savings_pct,
    }
}

/// Per-tier spend accumulation with savings versus an always-premium
/// baseline.
///
/// Costs are stored as micro-dollars (1 USD = 1 000 000 micro-dollars) to
/// avoid floating-point drift in long-running aggregations.
///
/// # Panics
///
/// This type and its methods never panic.
#[derive(Debug)]
pub struct CostTracker {
    /// Baseline rate in micro-dollars per 1K tokens: what an
    /// always-top-tier deployment would pay.
    baseline_rate_micro: u64,

    /// Per-tier request counts, indexed by tier rank.
    requests: [AtomicU64; 4],
    /// Per-tier token totals, indexed by tier rank.
    tokens: [AtomicU64; 4],
    /// Per-tier actual spend in micro-dollars, indexed by tier rank.
    cost_micro: [AtomicU64; 4],
}

impl CostTracker {
    /// Create a new tracker.
    ///
    /// # Arguments
    ///
    /// * `baseline_cost_per_1k` — USD per 1 000 tokens a premium-only
    ///   deployment would pay; drives the savings figure.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn new(baseline_cost_per_1k: f64) -> Self {
        Self {
            baseline_rate_micro: f64_to_micro(baseline_cost_per_1k),
            requests: [const { AtomicU64::new(0) }; 4],
            tokens: [const { AtomicU64::new(0) }; 4],
            cost_micro: [const { AtomicU64::new(0) }; 4],
        }
    }

    /// Derive the baseline from a pricing table: the most expensive model's
    /// input rate, converted to USD per 1K tokens.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn from_pricing(pricing: &HashMap<String, ModelPrice>) -> Self {
        let per_million = pricing
            .values()
            .map(|p| p.input_per_million)
            .fold(0.0_f64, f64::max);
        Self::new(per_million / 1000.0)
    }

    /// Record one completed request.
    ///
    /// # Arguments
    ///
    /// * `tier` — Tier the request was routed at.
    /// * `total_tokens` — Input plus output tokens.
    /// * `cost_usd` — Observed cost in USD.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn record(&self, tier: Tier, total_tokens: u64, cost_usd: f64) {
        let idx = tier.rank() as usize;
        self.requests[idx].fetch_add(1, Ordering::Relaxed);
        self.tokens[idx].fetch_add(total_tokens, Ordering::Relaxed);
        self.cost_micro[idx].fetch_add(f64_to_micro(cost_usd), Ordering::Relaxed);
    }

    /// Return a snapshot of current cost metrics.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn snapshot(&self) -> CostSnapshot {
        let mut per_tier = Vec::with_capacity(4);
        let mut total_tokens = 0u64;
        let mut actual_micro = 0u64;

        for tier in Tier::all() {
            let idx = tier.rank() as usize;
            let requests = self.requests[idx].load(Ordering::Relaxed);
            let tokens = self.tokens[idx].load(Ordering::Relaxed);
            let micro = self.cost_micro[idx].load(Ordering::Relaxed);
            total_tokens += tokens;
            actual_micro += micro;
            per_tier.push(TierCost {
                tier,
                requests,
                tokens,
                cost_usd: micro_to_f64(micro),
            });
        }

        let baseline_micro =
            (total_tokens as u128 * self.baseline_rate_micro as u128 / 1000) as u64;
        let savings_micro = baseline_micro.saturating_sub(actual_micro);

        CostSnapshot {
            per_tier,
            actual_cost_usd: micro_to_f64(actual_micro),
            baseline_cost_usd: micro_to_f64(baseline_micro),
            savings_usd: micro_to_f64(savings_micro),
            savings_percent: if baseline_micro > 0 {
                savings_micro as f64 / baseline_micro as f64 * 100.0
            } else {
                0.0
            },
        }
    }

    /// Reset all counters to zero.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn reset(&self) {
        for idx in 0..4 {
            self.requests[idx].store(0, Ordering::Relaxed);
            self.tokens[idx].store(0, Ordering::Relaxed);
            self.cost_micro[idx].store(0, Ordering::Relaxed);
        }
    }
}

/// Spend recorded for one tier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierCost {
    pub tier: Tier,
    pub requests: u64,
    pub tokens: u64,
    pub cost_usd: f64,
}

/// Point-in-time snapshot of cost tracking metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostSnapshot {
    /// Per-tier breakdown in rank order.
    pub per_tier: Vec<TierCost>,
    /// Actual total cost in USD.
    pub actual_cost_usd: f64,
    /// Hypothetical premium-only baseline cost in USD.
    pub baseline_cost_usd: f64,
    /// Money saved versus the baseline in USD.
    pub savings_usd: f64,
    /// Savings as a percentage of baseline.
    pub savings_percent: f64,
}

// ── Helpers ────────────────────────────────────────────────────────────

/// Convert USD to micro-dollars.
fn f64_to_micro(usd: f64) -> u64 {
    (usd * 1_000_000.0) as u64
}

/// Convert micro-dollars to USD.
fn micro_to_f64(micro: u64) -> f64 {
    micro as f64 / 1_000_000.0
}

// ── Tests ──────────────────────────────────────────────────────────────
