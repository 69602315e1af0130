//! # Stage: Route Orchestration
//!
//! ## Responsibility
//!
//! Compose fingerprinting, cached scores, rule classification, adaptive
//! weight modulation, overrides (large-context, structured-output, agentic,
//! ambiguous-default), health-aware model selection, and session pinning
//! into a single [`RoutingDecision`] per request, and fan completed-call
//! feedback back out to the adaptive, health, session, and cost stores.
//!
//! ## Guarantees
//!
//! - **Total**: [`Router::route`] never fails; any input produces a
//!   decision. Malformed configuration is rejected at construction instead.
//! - **Thread-safe**: the router is shared behind an `Arc` by concurrent
//!   handlers; every store guards its own state.
//! - **No mutual references**: stores are independent; the session store
//!   receives the health tracker by reference per call.
//!
//! ## NOT Responsible For
//!
//! - The upstream HTTP/SSE call, payment signing, or retries — the caller
//!   observes the outcome and reports it via [`Router::record_feedback`].

use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::adaptive::{AdaptiveStats, AdaptiveWeights, RoutingFeedback};
use crate::cache::{CacheStats, ScoreCache};
use crate::classify::RuleClassifier;
use crate::config::{ConfigError, RouterConfig, Tier, TierTable};
use crate::cost::{self, CostEstimate, CostSnapshot, CostTracker};
use crate::fingerprint::{estimated_tokens, fingerprint};
use crate::health::{HealthStats, HealthTracker};
use crate::session::{SessionOutcome, SessionStats, SessionStore};

/// Agentic score at or above which the agentic tier table is used.
const AGENTIC_TABLE_THRESHOLD: f64 = 0.75;

/// System prompts matching this request structured output.
static STRUCTURED_OUTPUT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)json|structured|schema")
        .unwrap_or_else(|e| std::panic::panic_any(format!("pattern: {e}")))
});

/// One request as seen by the routing core.
#[derive(Debug, Clone, Default)]
pub struct RouteRequest {
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub max_output_tokens: u64,
    /// Session id from the `X-Session-ID` header, if any.
    pub session_id: Option<String>,
    /// Set when the request carries a non-empty tool list.
    pub agentic_mode: bool,
}

/// Opaque decision metadata carried through to feedback.
#[derive(Debug, Clone)]
pub struct DecisionMeta {
    pub fingerprint: String,
    pub signals: Vec<String>,
    pub estimated_tokens: u64,
    pub session_id: Option<String>,
    pub agentic: bool,
    pub cache_hit: bool,
}

/// The routing verdict for one request.
#[derive(Debug, Clone)]
pub struct RoutingDecision {
    /// Unique id for trace correlation.
    pub id: String,
    pub tier: Tier,
    pub model: String,
    pub confidence: f64,
    /// Classification method; always `"rules"` in this core.
    pub method: &'static str,
    /// Human-readable explanation of how the decision was reached.
    pub reasoning: String,
    pub cost_estimate: Option<CostEstimate>,
    pub meta: DecisionMeta,
}

/// The observed outcome of the upstream call for a decision.
#[derive(Debug, Clone)]
pub struct RouteOutcome {
    pub success: bool,
    pub latency_ms: u64,
    pub cost: f64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// `timeout`, `rate_limit`, `server_5xx`, `auth`, `payment_required`,
    /// `canceled`, or `other`.
    pub error_type: Option<String>,
}

/// Operational snapshot across all stores.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RouterStats {
    pub cache: CacheStats,
    pub adaptive: AdaptiveStats,
    pub health: HealthStats,
    pub sessions: SessionStats,
    pub cost: CostSnapshot,
}

/// The routing core.
///
/// Owns the five shared stores and composes them per request. Cheap to
/// share behind an `Arc`; all stores are internally synchronised.
#[derive(Debug)]
pub struct Router {
    config: RouterConfig,
    classifier: RuleClassifier,
    cache: ScoreCache,
    adaptive: AdaptiveWeights,
    health: HealthTracker,
    sessions: SessionStore,
    cost: CostTracker,
}

impl Router {
    /// Build a router from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the offending field when the
    /// configuration is malformed (empty tier table, zero-sum weights, ...).
    pub fn new(config: RouterConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let cost = CostTracker::from_pricing(&config.pricing);
        Ok(Self {
            classifier: RuleClassifier::new(),
            cache: ScoreCache::new(config.cache.clone()),
            adaptive: AdaptiveWeights::new(config.adaptive.clone()),
            health: HealthTracker::new(config.health.clone()),
            sessions: SessionStore::new(config.session.clone()),
            cost,
            config,
        })
    }

    /// Route one request. Infallible: every input yields a decision.
    pub fn route(&self, request: &RouteRequest) -> RoutingDecision {
        let prompt = request.prompt.as_str();
        let system = request.system_prompt.as_deref();
        let overrides = &self.config.overrides;

        let tokens = estimated_tokens(prompt, system);
        let key = fingerprint(prompt, system);

        let cached = if self.config.enable_cache {
            self.cache.get_by_fingerprint(&key)
        } else {
            None
        };
        let cache_hit = cached.is_some();

        let rule = self
            .classifier
            .classify(prompt, system, tokens, &self.config.scoring, Some(&key));

        let mean_weight = if self.config.enable_adaptive {
            self.adaptive.mean_weight()
        } else {
            1.0
        };
        let adjusted_score = rule.weighted_score * mean_weight;

        if self.config.enable_cache {
            self.cache.set_by_fingerprint(
                &key,
                rule.clone(),
                &self.config.scoring.tier_boundaries,
                adjusted_score,
            );
        }

        let agentic = rule.agentic_score >= AGENTIC_TABLE_THRESHOLD
            || overrides.agentic_mode
            || request.agentic_mode;
        let table = self.tier_table(agentic);

        let mut reasons: Vec<String> = Vec::new();
        if agentic && self.config.agentic_tiers.is_some() {
            reasons.push("agentic tier table".to_string());
        }

        let mut tier;
        let mut confidence;

        if tokens > overrides.max_tokens_force_complex {
            tier = Tier::Complex;
            confidence = 0.95;
            reasons.push(format!(
                "Input exceeds {} tokens",
                overrides.max_tokens_force_complex
            ));
        } else {
            match rule.tier {
                Some(t) => {
                    tier = t;
                    confidence = rule.confidence;
                    reasons.push(format!("score {adjusted_score:.3} maps to {t}"));
                }
                None => {
                    tier = overrides.ambiguous_default_tier;
                    confidence = 0.5;
                    reasons.push(format!(
                        "ambiguous (confidence {:.2}), defaulting to {}",
                        rule.confidence, tier
                    ));
                }
            }

            if let Some(sys) = system {
                if STRUCTURED_OUTPUT_RE.is_match(sys)
                    && tier.rank() < overrides.structured_output_min_tier.rank()
                {
                    tier = overrides.structured_output_min_tier;
                    reasons.push(format!("structured output raises tier to {tier}"));
                }
            }

            if let Some(c) = &cached {
                if self.cache.should_use_cached_tier(c, adjusted_score, tier) {
                    if let Some(cached_tier) = c.result.tier {
                        tier = cached_tier;
                        confidence = c.result.confidence.max(0.7);
                        reasons.push(format!("fuzzy boundary, keeping cached {tier}"));
                    }
                }
            }
        }

        let chain = Self::chain_for(table, &self.config.tiers, tier);
        let primary = chain.first().cloned().unwrap_or_default();
        let mut model = primary.clone();

        if self.config.enable_health_tracking {
            match self.health.best_model(tier, &chain) {
                Some(best) => {
                    if best != primary {
                        reasons.push(format!("health-override: {primary} -> {best}"));
                    }
                    model = best;
                }
                // No candidate is available; name the primary anyway and let
                // the next feedback round cool it down.
                None => reasons.push("no available candidate, keeping primary".to_string()),
            }
        }

        if let Some(session_id) = &request.session_id {
            if let Some(session) = self.sessions.get(session_id) {
                let pin_usable = !session.degradation.is_degraded
                    && (!self.config.enable_health_tracking
                        || self.health.is_available(&session.model));
                if pin_usable {
                    model = session.model.clone();
                    reasons.push("session-pinned".to_string());
                }
            }
            self.sessions
                .set(session_id, &model, tier, adjusted_score, agentic);
        }

        let cost_estimate = self.config.pricing.get(&model).map(|price| {
            cost::estimate(
                price,
                &self.config.pricing,
                tokens,
                request.max_output_tokens,
            )
        });

        debug!(
            tier = %tier,
            model = %model,
            confidence = confidence,
            score = adjusted_score,
            agentic = agentic,
            cache_hit = cache_hit,
            "routed request"
        );

        RoutingDecision {
            id: Uuid::new_v4().to_string(),
            tier,
            model,
            confidence,
            method: "rules",
            reasoning: reasons.join("; "),
            cost_estimate,
            meta: DecisionMeta {
                fingerprint: key,
                signals: rule.signals,
                estimated_tokens: tokens,
                session_id: request.session_id.clone(),
                agentic,
                cache_hit,
            },
        }
    }

    /// Feed the observed outcome of a decision back into the stores.
    pub fn record_feedback(&self, decision: &RoutingDecision, outcome: &RouteOutcome) {
        if self.config.enable_adaptive {
            self.adaptive.record_feedback(RoutingFeedback {
                dimension_signals: decision.meta.signals.clone(),
                tier: decision.tier,
                latency_ms: outcome.latency_ms,
                cost: outcome.cost,
                success: outcome.success,
                error_kind: outcome.error_type.clone(),
                input_tokens: outcome.input_tokens,
                output_tokens: outcome.output_tokens,
            });
        }

        if self.config.enable_health_tracking {
            self.health.update(
                &decision.model,
                decision.tier,
                outcome.success,
                outcome.latency_ms,
                outcome.error_type.as_deref(),
            );
        }

        self.cost.record(
            decision.tier,
            outcome.input_tokens + outcome.output_tokens,
            outcome.cost,
        );

        if let Some(session_id) = &decision.meta.session_id {
            let table = self.tier_table(decision.meta.agentic);
            let chain = Self::chain_for(table, &self.config.tiers, decision.tier);
            self.sessions.record_result(
                session_id,
                &SessionOutcome {
                    success: outcome.success,
                    latency_ms: outcome.latency_ms,
                    cost: outcome.cost,
                    input_tokens: outcome.input_tokens,
                    output_tokens: outcome.output_tokens,
                    error_kind: outcome.error_type.clone(),
                },
                &self.health,
                &chain,
            );
        }
    }

    /// Operational snapshot for dashboards.
    pub fn stats(&self) -> RouterStats {
        RouterStats {
            cache: self.cache.stats(),
            adaptive: self.adaptive.stats(),
            health: self.health.stats(),
            sessions: self.sessions.stats(),
            cost: self.cost.snapshot(),
        }
    }

    /// Spawn the periodic maintenance sweeps (session expiry, cache TTL).
    /// Abort the handles to stop them.
    pub fn spawn_sweepers(&self) -> Vec<tokio::task::JoinHandle<()>> {
        vec![
            self.sessions.spawn_sweeper(),
            self.cache
                .spawn_sweeper(Duration::from_millis(self.config.session.sweep_interval_ms)),
        ]
    }

    /// Reset every store. For tests.
    pub fn reset(&self) {
        self.classifier.reset();
        self.cache.clear();
        self.adaptive.reset();
        self.health.reset();
        self.sessions.clear();
        self.cost.reset();
    }

    /// Direct access to the health tracker (e.g. for warm-up seeding).
    pub fn health(&self) -> &HealthTracker {
        &self.health
    }

    fn tier_table(&self, agentic: bool) -> &TierTable {
        if agentic {
            self.config.agentic_tiers.as_ref().unwrap_or(&self.config.tiers)
        } else {
            &self.config.tiers
        }
    }

    fn chain_for(table: &TierTable, fallback: &TierTable, tier: Tier) -> Vec<String> {
        table
            .get(&tier)
            .or_else(|| fallback.get(&tier))
            .map(|models| models.chain())
            .unwrap_or_default()
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
