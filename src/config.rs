//! Router configuration types.
//!
//! Provides the full configuration surface of the routing core: scoring
//! weights and boundaries, keyword lists, override knobs, tier → model
//! tables, and the tuning parameters of the cache, adaptive-weight, health,
//! and session stores. All types are (de)serialisable via serde for
//! TOML/JSON config files, with per-field defaults so a partial config is
//! always valid input.
//!
//! Malformed configuration is rejected at construction time by
//! [`RouterConfig::validate`], which returns a [`ConfigError`] naming the
//! offending field.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::classify::keywords;

/// Error produced when a configuration fails validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A field holds a value outside its allowed domain.
    #[error("invalid config field `{field}`: {message}")]
    Invalid {
        /// Dotted path of the offending field.
        field: String,
        /// Human-readable description of the violated constraint.
        message: String,
    },
}

impl ConfigError {
    fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

// ── Tier ───────────────────────────────────────────────────────────────

/// The four difficulty tiers a request can be classified into.
///
/// Totally ordered by rank: `Simple < Medium < Complex < Reasoning`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    Simple,
    Medium,
    Complex,
    Reasoning,
}

impl Tier {
    /// Numeric rank, 0 (Simple) through 3 (Reasoning).
    pub fn rank(self) -> u8 {
        match self {
            Tier::Simple => 0,
            Tier::Medium => 1,
            Tier::Complex => 2,
            Tier::Reasoning => 3,
        }
    }

    /// All tiers in ascending rank order.
    pub fn all() -> [Tier; 4] {
        [Tier::Simple, Tier::Medium, Tier::Complex, Tier::Reasoning]
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::Simple => write!(f, "SIMPLE"),
            Tier::Medium => write!(f, "MEDIUM"),
            Tier::Complex => write!(f, "COMPLEX"),
            Tier::Reasoning => write!(f, "REASONING"),
        }
    }
}

// ── Default value functions ────────────────────────────────────────────

fn default_simple_medium() -> f64 {
    0.0
}

fn default_medium_complex() -> f64 {
    0.18
}

fn default_complex_reasoning() -> f64 {
    0.40
}

fn default_confidence_steepness() -> f64 {
    12.0
}

fn default_confidence_threshold() -> f64 {
    0.7
}

fn default_token_simple() -> u64 {
    50
}

fn default_token_complex() -> u64 {
    500
}

fn default_fuzzy_boundary_width() -> f64 {
    0.05
}

fn default_cache_max_size() -> usize {
    1000
}

fn default_cache_ttl_ms() -> u64 {
    24 * 60 * 60 * 1000
}

fn default_jitter_threshold() -> usize {
    3
}

fn default_jitter_window() -> usize {
    5
}

fn default_adjustment_interval() -> u64 {
    10
}

fn default_min_requests_for_adjustment() -> u64 {
    5
}

fn default_min_adjustment() -> f64 {
    0.8
}

fn default_max_adjustment() -> f64 {
    1.2
}

fn default_ema_alpha() -> f64 {
    0.3
}

fn default_healthy_threshold() -> f64 {
    0.95
}

fn default_degraded_threshold() -> f64 {
    0.80
}

fn default_max_consecutive_errors() -> u32 {
    3
}

fn default_cooldown_duration_ms() -> u64 {
    5 * 60 * 1000
}

fn default_latency_threshold_ms() -> u64 {
    30_000
}

fn default_recovery_threshold() -> f64 {
    0.90
}

fn default_recovery_requests() -> usize {
    5
}

fn default_session_timeout_ms() -> u64 {
    30 * 60 * 1000
}

fn default_degradation_threshold() -> u32 {
    2
}

fn default_session_recovery_threshold() -> u32 {
    3
}

fn default_sweep_interval_ms() -> u64 {
    5 * 60 * 1000
}

fn default_ambiguous_tier() -> Tier {
    Tier::Medium
}

fn default_structured_output_min_tier() -> Tier {
    Tier::Medium
}

fn default_max_tokens_force_complex() -> u64 {
    100_000
}

fn default_true() -> bool {
    true
}

// ── Scoring ────────────────────────────────────────────────────────────

/// Score boundaries between adjacent tiers.
///
/// Half-open intervals: `(-inf, simple_medium)` is SIMPLE,
/// `[simple_medium, medium_complex)` is MEDIUM, and so on. The three
/// values must be strictly increasing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TierBoundaries {
    #[serde(default = "default_simple_medium")]
    pub simple_medium: f64,
    #[serde(default = "default_medium_complex")]
    pub medium_complex: f64,
    #[serde(default = "default_complex_reasoning")]
    pub complex_reasoning: f64,
}

impl Default for TierBoundaries {
    fn default() -> Self {
        Self {
            simple_medium: default_simple_medium(),
            medium_complex: default_medium_complex(),
            complex_reasoning: default_complex_reasoning(),
        }
    }
}

impl TierBoundaries {
    /// The boundaries as an ordered array, pairable with
    /// [`TierBoundaries::LABELS`].
    pub fn as_array(&self) -> [f64; 3] {
        [self.simple_medium, self.medium_complex, self.complex_reasoning]
    }

    /// Human-readable boundary names, index-aligned with [`Self::as_array`].
    pub const LABELS: [&'static str; 3] =
        ["simple-medium", "medium-complex", "complex-reasoning"];

    /// Map a weighted score to its natural tier.
    pub fn tier_for(&self, score: f64) -> Tier {
        if score < self.simple_medium {
            Tier::Simple
        } else if score < self.medium_complex {
            Tier::Medium
        } else if score < self.complex_reasoning {
            Tier::Complex
        } else {
            Tier::Reasoning
        }
    }

    /// Distance from a score to the nearest boundary.
    pub fn distance_to_nearest(&self, score: f64) -> f64 {
        self.as_array()
            .iter()
            .map(|b| (score - b).abs())
            .fold(f64::MAX, f64::min)
    }

    /// Label of the boundary nearest to a score.
    pub fn nearest_label(&self, score: f64) -> &'static str {
        let mut best = 0;
        let mut best_dist = f64::MAX;
        for (i, b) in self.as_array().iter().enumerate() {
            let d = (score - b).abs();
            if d < best_dist {
                best_dist = d;
                best = i;
            }
        }
        Self::LABELS[best]
    }
}

/// Token-count thresholds for the `tokenCount` dimension.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TokenThresholds {
    /// Below this many estimated tokens the dimension scores -1.
    #[serde(default = "default_token_simple")]
    pub simple: u64,
    /// Above this many estimated tokens the dimension scores +1.
    #[serde(default = "default_token_complex")]
    pub complex: u64,
}

impl Default for TokenThresholds {
    fn default() -> Self {
        Self {
            simple: default_token_simple(),
            complex: default_token_complex(),
        }
    }
}

/// Keyword lists for the keyword-matching dimensions.
///
/// Lists are data, not code: each is an ordered sequence of lowercase
/// strings matched by case-insensitive substring inclusion. The defaults
/// are multilingual (English + CJK).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeywordConfig {
    #[serde(default = "keywords::default_code_keywords")]
    pub code: Vec<String>,
    #[serde(default = "keywords::default_reasoning_keywords")]
    pub reasoning: Vec<String>,
    #[serde(default = "keywords::default_technical_keywords")]
    pub technical: Vec<String>,
    #[serde(default = "keywords::default_creative_keywords")]
    pub creative: Vec<String>,
    #[serde(default = "keywords::default_simple_keywords")]
    pub simple: Vec<String>,
    #[serde(default = "keywords::default_imperative_keywords")]
    pub imperative: Vec<String>,
    #[serde(default = "keywords::default_constraint_keywords")]
    pub constraint: Vec<String>,
    #[serde(default = "keywords::default_output_format_keywords")]
    pub output_format: Vec<String>,
    #[serde(default = "keywords::default_reference_keywords")]
    pub reference: Vec<String>,
    #[serde(default = "keywords::default_negation_keywords")]
    pub negation: Vec<String>,
    #[serde(default = "keywords::default_domain_keywords")]
    pub domain: Vec<String>,
    #[serde(default = "keywords::default_agentic_keywords")]
    pub agentic: Vec<String>,
    /// CJK interrogatives counted by the `questionComplexity` dimension.
    #[serde(default = "keywords::default_cjk_question_words")]
    pub cjk_question_words: Vec<String>,
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            code: keywords::default_code_keywords(),
            reasoning: keywords::default_reasoning_keywords(),
            technical: keywords::default_technical_keywords(),
            creative: keywords::default_creative_keywords(),
            simple: keywords::default_simple_keywords(),
            imperative: keywords::default_imperative_keywords(),
            constraint: keywords::default_constraint_keywords(),
            output_format: keywords::default_output_format_keywords(),
            reference: keywords::default_reference_keywords(),
            negation: keywords::default_negation_keywords(),
            domain: keywords::default_domain_keywords(),
            agentic: keywords::default_agentic_keywords(),
            cjk_question_words: keywords::default_cjk_question_words(),
        }
    }
}

/// Configuration for the rule classifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoringConfig {
    /// Per-dimension weights. Dimensions absent from the map weigh 0.
    #[serde(default = "keywords::default_dimension_weights")]
    pub dimension_weights: HashMap<String, f64>,

    #[serde(default)]
    pub tier_boundaries: TierBoundaries,

    #[serde(default)]
    pub token_thresholds: TokenThresholds,

    #[serde(default)]
    pub keywords: KeywordConfig,

    /// Steepness of the sigmoid mapping boundary distance to confidence.
    #[serde(default = "default_confidence_steepness")]
    pub confidence_steepness: f64,

    /// Below this confidence the classification is ambiguous (tier = None).
    ///
    /// Range: `(0.0, 1.0)`. Default: `0.7`.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            dimension_weights: keywords::default_dimension_weights(),
            tier_boundaries: TierBoundaries::default(),
            token_thresholds: TokenThresholds::default(),
            keywords: KeywordConfig::default(),
            confidence_steepness: default_confidence_steepness(),
            confidence_threshold: default_confidence_threshold(),
        }
    }
}

// ── Overrides ──────────────────────────────────────────────────────────

/// Post-classification override knobs applied by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OverrideConfig {
    /// Tier substituted when classification is ambiguous.
    #[serde(default = "default_ambiguous_tier")]
    pub ambiguous_default_tier: Tier,

    /// Minimum tier when the system prompt requests structured output.
    #[serde(default = "default_structured_output_min_tier")]
    pub structured_output_min_tier: Tier,

    /// Above this many estimated input tokens the tier is forced to COMPLEX.
    #[serde(default = "default_max_tokens_force_complex")]
    pub max_tokens_force_complex: u64,

    /// Force the agentic tier table for every request.
    #[serde(default)]
    pub agentic_mode: bool,
}

impl Default for OverrideConfig {
    fn default() -> Self {
        Self {
            ambiguous_default_tier: default_ambiguous_tier(),
            structured_output_min_tier: default_structured_output_min_tier(),
            max_tokens_force_complex: default_max_tokens_force_complex(),
            agentic_mode: false,
        }
    }
}

// ── Tier tables ────────────────────────────────────────────────────────

/// Primary model plus ordered fallback chain for one tier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TierModels {
    pub primary: String,
    #[serde(default)]
    pub fallbacks: Vec<String>,
}

impl TierModels {
    /// Primary followed by the fallbacks, as a candidate list.
    pub fn chain(&self) -> Vec<String> {
        let mut c = Vec::with_capacity(1 + self.fallbacks.len());
        c.push(self.primary.clone());
        c.extend(self.fallbacks.iter().cloned());
        c
    }
}

/// Mapping from tier to its model chain.
pub type TierTable = HashMap<Tier, TierModels>;

/// Reference tier → model table.
pub fn default_tier_table() -> TierTable {
    let mut m = HashMap::new();
    m.insert(
        Tier::Simple,
        TierModels {
            primary: "gemini-2.5-flash".into(),
            fallbacks: vec!["grok-code-fast-1".into()],
        },
    );
    m.insert(
        Tier::Medium,
        TierModels {
            primary: "grok-code-fast-1".into(),
            fallbacks: vec!["gemini-2.5-flash".into(), "gemini-2.5-pro".into()],
        },
    );
    m.insert(
        Tier::Complex,
        TierModels {
            primary: "gemini-2.5-pro".into(),
            fallbacks: vec!["grok-4-fast-reasoning".into()],
        },
    );
    m.insert(
        Tier::Reasoning,
        TierModels {
            primary: "grok-4-fast-reasoning".into(),
            fallbacks: vec!["gemini-2.5-pro".into()],
        },
    );
    m
}

/// Default agentic tier table, biased toward models that sustain long tool
/// chains.
pub fn default_agentic_tier_table() -> TierTable {
    let mut m = HashMap::new();
    m.insert(
        Tier::Simple,
        TierModels {
            primary: "grok-code-fast-1".into(),
            fallbacks: vec!["gemini-2.5-flash".into()],
        },
    );
    m.insert(
        Tier::Medium,
        TierModels {
            primary: "grok-code-fast-1".into(),
            fallbacks: vec!["gemini-2.5-pro".into()],
        },
    );
    m.insert(
        Tier::Complex,
        TierModels {
            primary: "gemini-2.5-pro".into(),
            fallbacks: vec!["grok-4-fast-reasoning".into()],
        },
    );
    m.insert(
        Tier::Reasoning,
        TierModels {
            primary: "grok-4-fast-reasoning".into(),
            fallbacks: vec!["gemini-2.5-pro".into()],
        },
    );
    m
}

/// Per-model pricing in USD per million tokens, used for cost estimates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct ModelPrice {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

// ── Store tuning ───────────────────────────────────────────────────────

/// Score cache tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    #[serde(default = "default_cache_max_size")]
    pub max_size: usize,
    #[serde(default = "default_cache_ttl_ms")]
    pub ttl_ms: u64,
    /// Half-width of the fuzzy region around each tier boundary.
    #[serde(default = "default_fuzzy_boundary_width")]
    pub fuzzy_boundary_width: f64,
    /// Number of trailing tier observations that must disagree before a
    /// jitter lock is installed.
    #[serde(default = "default_jitter_threshold")]
    pub jitter_threshold: usize,
    /// Length of the tier-history window kept per fingerprint.
    #[serde(default = "default_jitter_window")]
    pub jitter_window: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: default_cache_max_size(),
            ttl_ms: default_cache_ttl_ms(),
            fuzzy_boundary_width: default_fuzzy_boundary_width(),
            jitter_threshold: default_jitter_threshold(),
            jitter_window: default_jitter_window(),
        }
    }
}

/// Adaptive weight manager tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdaptiveConfig {
    /// Recorded feedback calls between weight adjustments.
    #[serde(default = "default_adjustment_interval")]
    pub adjustment_interval: u64,
    /// Minimum requests a dimension needs before its weight is adjusted.
    #[serde(default = "default_min_requests_for_adjustment")]
    pub min_requests: u64,
    #[serde(default = "default_min_adjustment")]
    pub min_adjustment: f64,
    #[serde(default = "default_max_adjustment")]
    pub max_adjustment: f64,
    /// EMA smoothing factor for per-tier aggregates.
    #[serde(default = "default_ema_alpha")]
    pub ema_alpha: f64,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            adjustment_interval: default_adjustment_interval(),
            min_requests: default_min_requests_for_adjustment(),
            min_adjustment: default_min_adjustment(),
            max_adjustment: default_max_adjustment(),
            ema_alpha: default_ema_alpha(),
        }
    }
}

/// Health tracker tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthConfig {
    #[serde(default = "default_healthy_threshold")]
    pub healthy_threshold: f64,
    #[serde(default = "default_degraded_threshold")]
    pub degraded_threshold: f64,
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,
    #[serde(default = "default_cooldown_duration_ms")]
    pub cooldown_duration_ms: u64,
    /// p95 latency above which a model is considered degraded.
    #[serde(default = "default_latency_threshold_ms")]
    pub latency_threshold_ms: u64,
    /// Recent success rate required to exit cooldown early.
    #[serde(default = "default_recovery_threshold")]
    pub recovery_threshold: f64,
    /// Samples required before the recovery check applies.
    #[serde(default = "default_recovery_requests")]
    pub recovery_requests: usize,
    #[serde(default = "default_ema_alpha")]
    pub ema_alpha: f64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            healthy_threshold: default_healthy_threshold(),
            degraded_threshold: default_degraded_threshold(),
            max_consecutive_errors: default_max_consecutive_errors(),
            cooldown_duration_ms: default_cooldown_duration_ms(),
            latency_threshold_ms: default_latency_threshold_ms(),
            recovery_threshold: default_recovery_threshold(),
            recovery_requests: default_recovery_requests(),
            ema_alpha: default_ema_alpha(),
        }
    }
}

/// Session store tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    /// Inactivity timeout after which a session expires.
    #[serde(default = "default_session_timeout_ms")]
    pub timeout_ms: u64,
    /// Consecutive per-session failures that trigger degradation.
    #[serde(default = "default_degradation_threshold")]
    pub degradation_threshold: u32,
    /// Consecutive successes on the degraded model that trigger restoration.
    #[serde(default = "default_session_recovery_threshold")]
    pub recovery_threshold: u32,
    /// Interval of the background expiry sweep.
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
    #[serde(default = "default_ema_alpha")]
    pub ema_alpha: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_session_timeout_ms(),
            degradation_threshold: default_degradation_threshold(),
            recovery_threshold: default_session_recovery_threshold(),
            sweep_interval_ms: default_sweep_interval_ms(),
            ema_alpha: default_ema_alpha(),
        }
    }
}

// ── RouterConfig ───────────────────────────────────────────────────────

/// Top-level configuration of the routing core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouterConfig {
    #[serde(default)]
    pub scoring: ScoringConfig,

    #[serde(default)]
    pub overrides: OverrideConfig,

    /// Default tier → model table.
    #[serde(default = "default_tier_table")]
    pub tiers: TierTable,

    /// Optional parallel table used when agentic mode is active.
    #[serde(default)]
    pub agentic_tiers: Option<TierTable>,

    /// Per-model pricing for cost estimates. May be empty.
    #[serde(default)]
    pub pricing: HashMap<String, ModelPrice>,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub adaptive: AdaptiveConfig,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default = "default_true")]
    pub enable_cache: bool,

    #[serde(default = "default_true")]
    pub enable_adaptive: bool,

    #[serde(default = "default_true")]
    pub enable_health_tracking: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            scoring: ScoringConfig::default(),
            overrides: OverrideConfig::default(),
            tiers: default_tier_table(),
            agentic_tiers: Some(default_agentic_tier_table()),
            pricing: HashMap::new(),
            cache: CacheConfig::default(),
            adaptive: AdaptiveConfig::default(),
            health: HealthConfig::default(),
            session: SessionConfig::default(),
            enable_cache: true,
            enable_adaptive: true,
            enable_health_tracking: true,
        }
    }
}

impl RouterConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let weights = &self.scoring.dimension_weights;
        if weights.is_empty() {
            return Err(ConfigError::invalid(
                "scoring.dimension_weights",
                "at least one dimension weight is required",
            ));
        }
        let sum: f64 = weights.values().sum();
        if !(sum > 0.0) {
            return Err(ConfigError::invalid(
                "scoring.dimension_weights",
                format!("weights must sum to a positive number, got {sum}"),
            ));
        }
        for (name, w) in weights {
            if !w.is_finite() {
                return Err(ConfigError::invalid(
                    "scoring.dimension_weights",
                    format!("weight for `{name}` is not finite"),
                ));
            }
        }

        let b = self.scoring.tier_boundaries;
        if !(b.simple_medium < b.medium_complex && b.medium_complex < b.complex_reasoning) {
            return Err(ConfigError::invalid(
                "scoring.tier_boundaries",
                format!(
                    "boundaries must be strictly increasing, got ({}, {}, {})",
                    b.simple_medium, b.medium_complex, b.complex_reasoning
                ),
            ));
        }

        let ct = self.scoring.confidence_threshold;
        if !(ct > 0.0 && ct < 1.0) {
            return Err(ConfigError::invalid(
                "scoring.confidence_threshold",
                format!("must be in (0.0, 1.0), got {ct}"),
            ));
        }
        if !(self.scoring.confidence_steepness > 0.0) {
            return Err(ConfigError::invalid(
                "scoring.confidence_steepness",
                "must be positive",
            ));
        }

        if self.scoring.token_thresholds.simple >= self.scoring.token_thresholds.complex {
            return Err(ConfigError::invalid(
                "scoring.token_thresholds",
                format!(
                    "simple ({}) must be below complex ({})",
                    self.scoring.token_thresholds.simple, self.scoring.token_thresholds.complex
                ),
            ));
        }

        Self::validate_tier_table("tiers", &self.tiers)?;
        if let Some(agentic) = &self.agentic_tiers {
            Self::validate_tier_table("agentic_tiers", agentic)?;
        }

        if self.cache.max_size == 0 {
            return Err(ConfigError::invalid("cache.max_size", "must be positive"));
        }
        if !(self.cache.fuzzy_boundary_width > 0.0) {
            return Err(ConfigError::invalid(
                "cache.fuzzy_boundary_width",
                "must be positive",
            ));
        }
        if self.cache.jitter_threshold == 0 || self.cache.jitter_threshold > self.cache.jitter_window
        {
            return Err(ConfigError::invalid(
                "cache.jitter_threshold",
                format!(
                    "must be in 1..={} (jitter_window), got {}",
                    self.cache.jitter_window, self.cache.jitter_threshold
                ),
            ));
        }

        if self.adaptive.adjustment_interval == 0 {
            return Err(ConfigError::invalid(
                "adaptive.adjustment_interval",
                "must be positive",
            ));
        }
        if !(self.adaptive.min_adjustment > 0.0
            && self.adaptive.min_adjustment < self.adaptive.max_adjustment)
        {
            return Err(ConfigError::invalid(
                "adaptive.min_adjustment",
                format!(
                    "must be positive and below max_adjustment ({}), got {}",
                    self.adaptive.max_adjustment, self.adaptive.min_adjustment
                ),
            ));
        }

        if !(self.health.degraded_threshold < self.health.healthy_threshold) {
            return Err(ConfigError::invalid(
                "health.degraded_threshold",
                format!(
                    "must be below healthy_threshold ({}), got {}",
                    self.health.healthy_threshold, self.health.degraded_threshold
                ),
            ));
        }
        if self.health.max_consecutive_errors == 0 {
            return Err(ConfigError::invalid(
                "health.max_consecutive_errors",
                "must be positive",
            ));
        }

        if self.session.degradation_threshold == 0 {
            return Err(ConfigError::invalid(
                "session.degradation_threshold",
                "must be positive",
            ));
        }
        if self.session.recovery_threshold == 0 {
            return Err(ConfigError::invalid(
                "session.recovery_threshold",
                "must be positive",
            ));
        }

        Ok(())
    }

    fn validate_tier_table(field: &str, table: &TierTable) -> Result<(), ConfigError> {
        if table.is_empty() {
            return Err(ConfigError::invalid(field, "tier table is empty"));
        }
        for tier in Tier::all() {
            match table.get(&tier) {
                None => {
                    return Err(ConfigError::invalid(
                        field,
                        format!("no model chain configured for tier {tier}"),
                    ));
                }
                Some(models) if models.primary.is_empty() => {
                    return Err(ConfigError::invalid(
                        field,
                        format!("empty primary model for tier {tier}"),
                    ));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
