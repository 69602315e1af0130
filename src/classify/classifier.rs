//! # Stage: Rule Classification
//!
//! ## Responsibility
//!
//! Map a free-text request into one of four difficulty tiers using the 15
//! weighted dimensions, with sigmoid confidence calibration and per-
//! fingerprint hysteresis so that near-duplicate requests do not flip tier
//! on tiny score movements.
//!
//! ## Guarantees
//!
//! - **Deterministic**: identical inputs with no score history produce
//!   identical results. Zero network I/O, zero allocation beyond the scan.
//! - **Thread-safe**: the score history sits behind a `Mutex` and the call
//!   counter is atomic; safe under concurrent request handlers.
//! - **Bounded**: score history is soft-capped at 1000 entries with
//!   oldest-first eviction plus a 5-minute TTL, cleaned on every 100th call.
//! - **Total**: every input produces a [`ScoringResult`]; ambiguity is
//!   reported as `tier = None`, never as an error.
//!
//! ## NOT Responsible For
//!
//! - Tier overrides (large-context, structured-output) — the orchestrator's job
//! - Model selection or health — see `health`
//! - Cross-request caching of full results — see `cache`

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::{ScoringConfig, Tier, TierBoundaries};

use super::dimensions::{score_dimensions, DimensionBreakdown};

/// Half-width of the fuzzy region around each tier boundary.
pub const FUZZY_WIDTH: f64 = 0.05;

/// Soft cap on score-history entries.
const HISTORY_MAX: usize = 1000;

/// Score-history entries older than this are dropped at cleanup.
const HISTORY_TTL: Duration = Duration::from_secs(5 * 60);

/// History cleanup runs once every this many classify calls.
const CLEANUP_EVERY: u64 = 100;

/// Output of a classification pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringResult {
    /// Weighted sum over all dimensions.
    pub weighted_score: f64,
    /// Assigned tier, or `None` when confidence fell below the threshold.
    pub tier: Option<Tier>,
    /// Calibrated confidence in `[0.0, 1.0]`.
    pub confidence: f64,
    /// Signals from every dimension that fired, in dimension order.
    pub signals: Vec<String>,
    /// Agentic indicator in `{0.0, 0.2, 0.6, 1.0}`.
    pub agentic_score: f64,
}

#[derive(Debug, Clone, Copy)]
struct HistoryEntry {
    tier: Tier,
    #[allow(dead_code)]
    score: f64,
    at: Instant,
}

/// Deterministic rule classifier with per-fingerprint hysteresis.
///
/// Clone is cheap (`Arc`-based) and all clones share the score history.
#[derive(Debug, Clone)]
pub struct RuleClassifier {
    history: Arc<Mutex<HashMap<String, HistoryEntry>>>,
    calls: Arc<AtomicU64>,
}

impl Default for RuleClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleClassifier {
    pub fn new() -> Self {
        Self {
            history: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Classify a request.
    ///
    /// # Arguments
    ///
    /// * `prompt` — The user prompt text.
    /// * `system_prompt` — Optional system prompt. Keyword dimensions see
    ///   the concatenation; `reasoningMarkers` and `questionComplexity` see
    ///   the user prompt only.
    /// * `estimated_tokens` — `ceil((len(system) + 1 + len(prompt)) / 4)`.
    /// * `cfg` — Scoring weights, boundaries, and keyword lists.
    /// * `fingerprint` — Optional stable key enabling hysteresis against the
    ///   previous tier observed for the same key.
    pub fn classify(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        estimated_tokens: u64,
        cfg: &ScoringConfig,
        fingerprint: Option<&str>,
    ) -> ScoringResult {
        self.maybe_cleanup();

        let full = format!("{} {}", system_prompt.unwrap_or(""), prompt).to_lowercase();
        let user = prompt.to_lowercase();
        let breakdown = score_dimensions(&full, &user, estimated_tokens, cfg);
        let weighted = Self::weighted_sum(&breakdown, cfg);
        let signals: Vec<String> = breakdown
            .scores
            .iter()
            .filter_map(|d| d.signal.clone())
            .collect();

        // Reasoning override: two distinct reasoning keywords in the user
        // prompt force REASONING, bypassing boundaries and hysteresis.
        if breakdown.reasoning_hits >= 2 {
            let confidence =
                sigmoid(cfg.confidence_steepness * weighted.max(0.3)).max(0.85);
            if let Some(fp) = fingerprint {
                self.remember(fp, Tier::Reasoning, weighted);
            }
            debug!(score = weighted, "reasoning override fired");
            return ScoringResult {
                weighted_score: weighted,
                tier: Some(Tier::Reasoning),
                confidence,
                signals,
                agentic_score: breakdown.agentic_score,
            };
        }

        let boundaries = cfg.tier_boundaries;
        let natural = boundaries.tier_for(weighted);
        let mut tier = natural;
        let mut distance = boundaries.distance_to_nearest(weighted);
        let mut held = false;

        if let Some(prev) = fingerprint.and_then(|fp| self.lookup(fp)) {
            if prev.tier != natural {
                if distance < FUZZY_WIDTH {
                    // Inside the fuzzy region: stick with the prior tier.
                    tier = prev.tier;
                    distance = FUZZY_WIDTH;
                    held = true;
                } else if !Self::cleared_boundary(weighted, prev.tier, natural, &boundaries) {
                    // Schmitt trigger: the score must clear the boundary by
                    // FUZZY_WIDTH in the direction of motion to transition.
                    tier = prev.tier;
                    distance = FUZZY_WIDTH;
                    held = true;
                }
            }
        }

        let raw_confidence = sigmoid(cfg.confidence_steepness * distance);
        let (tier_opt, confidence) = if held {
            // A hysteresis hold is a positive decision, not an ambiguous one.
            (Some(tier), raw_confidence.max(cfg.confidence_threshold))
        } else if raw_confidence < cfg.confidence_threshold {
            (None, raw_confidence)
        } else {
            (Some(tier), raw_confidence)
        };

        if let Some(fp) = fingerprint {
            self.remember(fp, tier, weighted);
        }

        ScoringResult {
            weighted_score: weighted,
            tier: tier_opt,
            confidence,
            signals,
            agentic_score: breakdown.agentic_score,
        }
    }

    /// Drop the score history. For tests and explicit resets.
    pub fn reset(&self) {
        if let Ok(mut history) = self.history.lock() {
            history.clear();
        }
    }

    /// Number of fingerprints currently held in the score history.
    pub fn history_len(&self) -> usize {
        self.history.lock().map(|h| h.len()).unwrap_or(0)
    }

    fn weighted_sum(breakdown: &DimensionBreakdown, cfg: &ScoringConfig) -> f64 {
        breakdown
            .scores
            .iter()
            .map(|d| d.score * cfg.dimension_weights.get(d.name).copied().unwrap_or(0.0))
            .sum()
    }

    /// Whether a score has moved past the boundary of its natural tier by at
    /// least [`FUZZY_WIDTH`] in the direction of motion away from `prev`.
    fn cleared_boundary(score: f64, prev: Tier, natural: Tier, b: &TierBoundaries) -> bool {
        if natural.rank() > prev.rank() {
            let entry = match natural {
                Tier::Medium => b.simple_medium,
                Tier::Complex => b.medium_complex,
                Tier::Reasoning => b.complex_reasoning,
                Tier::Simple => return true,
            };
            score >= entry + FUZZY_WIDTH
        } else {
            let entry = match natural {
                Tier::Simple => b.simple_medium,
                Tier::Medium => b.medium_complex,
                Tier::Complex => b.complex_reasoning,
                Tier::Reasoning => return true,
            };
            score <= entry - FUZZY_WIDTH
        }
    }

    fn lookup(&self, fingerprint: &str) -> Option<HistoryEntry> {
        self.history
            .lock()
            .ok()
            .and_then(|h| h.get(fingerprint).copied())
    }

    fn remember(&self, fingerprint: &str, tier: Tier, score: f64) {
        if let Ok(mut history) = self.history.lock() {
            history.insert(
                fingerprint.to_string(),
                HistoryEntry {
                    tier,
                    score,
                    at: Instant::now(),
                },
            );
        }
    }

    fn maybe_cleanup(&self) {
        let n = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        if n % CLEANUP_EVERY != 0 {
            return;
        }
        if let Ok(mut history) = self.history.lock() {
            history.retain(|_, e| e.at.elapsed() < HISTORY_TTL);
            while history.len() > HISTORY_MAX {
                let oldest = history
                    .iter()
                    .min_by_key(|(_, e)| e.at)
                    .map(|(k, _)| k.clone());
                match oldest {
                    Some(k) => {
                        history.remove(&k);
                    }
                    None => break,
                }
            }
        }
    }
}

/// Logistic squash: `1 / (1 + e^-x)`.
pub(crate) fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

// ── Tests ──────────────────────────────────────────────────────────────
