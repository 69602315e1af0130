//! # Stage: Adaptive Weight Management
//!
//! ## Responsibility
//!
//! Collect post-hoc routing feedback (latency, cost, success) per dimension
//! and per tier, and periodically re-tune per-dimension weight factors.
//! Each signal in a feedback record is resolved back to the dimension that
//! emitted it; that dimension's running aggregates then drive a normalised
//! performance score which is smoothed into an adjustment factor bounded to
//! `[min_adjustment, max_adjustment]` (default `[0.8, 1.2]`).
//!
//! ## Guarantees
//!
//! - **Thread-safe**: all state behind a `Mutex`; `Clone` shares state.
//! - **Bounded**: the recent-feedback buffer holds at most 100 records;
//!   per-dimension state is bounded by the number of dimensions.
//! - **Bounded adjustment**: `adjustment_factor` never leaves the
//!   configured range; `current_weight = base_weight × adjustment_factor`
//!   at all times.
//! - **Low-frequency**: adjustment runs every `adjustment_interval`
//!   recorded calls, and only for dimensions with enough samples.
//!
//! ## NOT Responsible For
//!
//! - Emitting signals (see `classify::dimensions`)
//! - Applying the weights to a score — the orchestrator reads
//!   [`AdaptiveWeights::all_weights`] and modulates the raw score itself.

use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::debug;

use crate::classify::keywords::resolve_signal;
use crate::config::{AdaptiveConfig, Tier};

/// Upper bound on retained feedback records.
const RECENT_BUFFER: usize = 100;

/// Smoothing applied when moving the adjustment factor toward its target.
const FACTOR_SMOOTHING: f64 = 0.3;

/// Performance-score component weights: latency, cost, success.
const PERF_WEIGHTS: (f64, f64, f64) = (0.3, 0.3, 0.4);

/// Latency above which the latency component bottoms out at 0.
const LATENCY_CEILING_MS: f64 = 10_000.0;

/// Cost above which the cost component bottoms out at 0.
const COST_CEILING: f64 = 0.1;

/// One completed routing outcome fed back into the manager.
#[derive(Debug, Clone)]
pub struct RoutingFeedback {
    /// Signals from the decision that produced this outcome.
    pub dimension_signals: Vec<String>,
    pub tier: Tier,
    pub latency_ms: u64,
    pub cost: f64,
    pub success: bool,
    pub error_kind: Option<String>,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Running aggregates for one dimension.
#[derive(Debug, Clone, Serialize)]
pub struct DimensionPerformance {
    pub name: String,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub total_latency_ms: u64,
    pub total_cost: f64,
    pub success_rate: f64,
    pub avg_latency_ms: f64,
    pub avg_cost: f64,
    pub base_weight: f64,
    pub adjustment_factor: f64,
    pub current_weight: f64,
}

impl DimensionPerformance {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            total_requests: 0,
            successful_requests: 0,
            total_latency_ms: 0,
            total_cost: 0.0,
            success_rate: 0.0,
            avg_latency_ms: 0.0,
            avg_cost: 0.0,
            base_weight: 1.0,
            adjustment_factor: 1.0,
            current_weight: 1.0,
        }
    }
}

/// EMA aggregates for one tier.
#[derive(Debug, Clone, Serialize)]
pub struct TierPerformance {
    pub tier: Tier,
    pub requests: u64,
    pub success_rate: f64,
    pub avg_latency_ms: f64,
    pub avg_cost: f64,
    #[serde(skip)]
    pub last_updated: Option<Instant>,
}

impl TierPerformance {
    fn new(tier: Tier) -> Self {
        Self {
            tier,
            requests: 0,
            success_rate: 0.0,
            avg_latency_ms: 0.0,
            avg_cost: 0.0,
            last_updated: None,
        }
    }
}

/// Point-in-time snapshot for dashboards.
#[derive(Debug, Clone, Serialize)]
pub struct AdaptiveStats {
    pub feedback_count: u64,
    pub dimensions: Vec<DimensionPerformance>,
    pub tiers: Vec<TierPerformance>,
}

#[derive(Debug)]
struct Inner {
    dimensions: HashMap<&'static str, DimensionPerformance>,
    tiers: HashMap<Tier, TierPerformance>,
    recent: VecDeque<RoutingFeedback>,
    feedback_count: u64,
}

/// Adaptive per-dimension weight manager.
///
/// Clone is cheap (`Arc`-based) and all clones share state.
#[derive(Debug, Clone)]
pub struct AdaptiveWeights {
    inner: Arc<Mutex<Inner>>,
    config: AdaptiveConfig,
}

impl AdaptiveWeights {
    pub fn new(config: AdaptiveConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                dimensions: HashMap::new(),
                tiers: HashMap::new(),
                recent: VecDeque::new(),
                feedback_count: 0,
            })),
            config,
        }
    }

    /// Record one completed outcome and, every `adjustment_interval` calls,
    /// re-tune the dimension weights.
    pub fn record_feedback(&self, feedback: RoutingFeedback) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };

        for signal in &feedback.dimension_signals {
            let Some(dim) = resolve_signal(signal) else {
                continue;
            };
            let perf = inner
                .dimensions
                .entry(dim)
                .or_insert_with(|| DimensionPerformance::new(dim));
            perf.total_requests += 1;
            if feedback.success {
                perf.successful_requests += 1;
            }
            perf.total_latency_ms += feedback.latency_ms;
            perf.total_cost += feedback.cost;
            perf.success_rate = perf.successful_requests as f64 / perf.total_requests as f64;
            perf.avg_latency_ms = perf.total_latency_ms as f64 / perf.total_requests as f64;
            perf.avg_cost = perf.total_cost / perf.total_requests as f64;
        }

        let alpha = self.config.ema_alpha;
        let tier_perf = inner
            .tiers
            .entry(feedback.tier)
            .or_insert_with(|| TierPerformance::new(feedback.tier));
        let success = if feedback.success { 1.0 } else { 0.0 };
        if tier_perf.requests == 0 {
            tier_perf.success_rate = success;
            tier_perf.avg_latency_ms = feedback.latency_ms as f64;
            tier_perf.avg_cost = feedback.cost;
        } else {
            tier_perf.success_rate = (1.0 - alpha) * tier_perf.success_rate + alpha * success;
            tier_perf.avg_latency_ms =
                (1.0 - alpha) * tier_perf.avg_latency_ms + alpha * feedback.latency_ms as f64;
            tier_perf.avg_cost = (1.0 - alpha) * tier_perf.avg_cost + alpha * feedback.cost;
        }
        tier_perf.requests += 1;
        tier_perf.last_updated = Some(Instant::now());

        inner.recent.push_back(feedback);
        while inner.recent.len() > RECENT_BUFFER {
            inner.recent.pop_front();
        }

        inner.feedback_count += 1;
        if inner.feedback_count % self.config.adjustment_interval == 0 {
            self.adjust_weights(&mut inner);
        }
    }

    /// Current per-dimension weights (`base × factor`) for every dimension
    /// that has received feedback.
    pub fn all_weights(&self) -> HashMap<String, f64> {
        self.inner
            .lock()
            .map(|inner| {
                inner
                    .dimensions
                    .iter()
                    .map(|(name, p)| (name.to_string(), p.current_weight))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Mean of all current weights, or 1.0 before any feedback.
    ///
    /// This scalar modulates the raw weighted score; the bounded factor
    /// range keeps it a stability nudge rather than a behavioural swing.
    pub fn mean_weight(&self) -> f64 {
        let weights = self.all_weights();
        if weights.is_empty() {
            return 1.0;
        }
        weights.values().sum::<f64>() / weights.len() as f64
    }

    pub fn stats(&self) -> AdaptiveStats {
        match self.inner.lock() {
            Ok(inner) => {
                let mut dimensions: Vec<_> = inner.dimensions.values().cloned().collect();
                dimensions.sort_by(|a, b| a.name.cmp(&b.name));
                let mut tiers: Vec<_> = inner.tiers.values().cloned().collect();
                tiers.sort_by_key(|t| t.tier.rank());
                AdaptiveStats {
                    feedback_count: inner.feedback_count,
                    dimensions,
                    tiers,
                }
            }
            Err(_) => AdaptiveStats {
                feedback_count: 0,
                dimensions: Vec::new(),
                tiers: Vec::new(),
            },
        }
    }

    /// Drop all recorded state.
    pub fn reset(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.dimensions.clear();
            inner.tiers.clear();
            inner.recent.clear();
            inner.feedback_count = 0;
        }
    }

    fn adjust_weights(&self, inner: &mut Inner) {
        let (w_l, w_c, w_s) = PERF_WEIGHTS;
        let (min_adj, max_adj) = (self.config.min_adjustment, self.config.max_adjustment);

        for perf in inner.dimensions.values_mut() {
            if perf.total_requests < self.config.min_requests {
                continue;
            }
            let latency_component = (1.0 - perf.avg_latency_ms / LATENCY_CEILING_MS).max(0.0);
            let cost_component = (1.0 - perf.avg_cost / COST_CEILING).max(0.0);
            let score = w_l * latency_component + w_c * cost_component + w_s * perf.success_rate;

            let target = min_adj + score * (max_adj - min_adj);
            perf.adjustment_factor = ((1.0 - FACTOR_SMOOTHING) * perf.adjustment_factor
                + FACTOR_SMOOTHING * target)
                .clamp(min_adj, max_adj);
            perf.current_weight = perf.base_weight * perf.adjustment_factor;
            debug!(
                dimension = %perf.name,
                factor = perf.adjustment_factor,
                "adjusted dimension weight"
            );
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
