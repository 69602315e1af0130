//! # Stage: Model Health Tracking
//!
//! ## Responsibility
//!
//! Track per-model success rate, latency (EMA + p95 over a bounded window),
//! and consecutive errors across all completed upstream calls. Gate model
//! availability: repeated failures put a model into cooldown, sustained low
//! success rate marks it unhealthy, and recovery always passes through
//! degraded before healthy. Select the best available model from a tier's
//! candidate chain.
//!
//! ## Guarantees
//!
//! - **Thread-safe**: records live in a `DashMap`; a single
//!   [`HealthTracker::update`] holds its model's entry for the whole
//!   mutation, so readers never observe partial fields.
//! - **Bounded**: the latency window holds the last 100 samples, the
//!   recent-results window the last 20.
//! - **Monotone recovery**: a cooldown exit lands on `degraded`, never
//!   directly on `healthy`.
//!
//! ## NOT Responsible For
//!
//! - Making the upstream call or classifying its failure kind
//! - Session-scoped degradation (see `session`)

use dashmap::DashMap;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::{HealthConfig, Tier};

/// Latency samples kept per model for the p95 computation.
const LATENCY_WINDOW: usize = 100;

/// Recent outcomes kept per model for the cooldown-recovery check.
const RECENT_WINDOW: usize = 20;

/// Requests a model needs before the success-rate thresholds can mark it
/// unhealthy; below this the verdict is capped at degraded.
const MIN_REQUESTS_FOR_UNHEALTHY: u64 = 10;

/// Failure kinds that are not the model's fault and never feed cooldown.
const EXEMPT_ERROR_KINDS: [&str; 2] = ["auth", "payment_required"];

/// Health classification of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Cooldown,
}

impl HealthStatus {
    /// Selection priority: lower sorts first.
    fn priority(self) -> u8 {
        match self {
            HealthStatus::Healthy => 0,
            HealthStatus::Degraded => 1,
            HealthStatus::Cooldown => 2,
            HealthStatus::Unhealthy => 3,
        }
    }
}

/// Mutable health record for one model.
#[derive(Debug, Clone)]
pub struct ModelHealthRecord {
    pub model: String,
    pub tier: Tier,
    pub status: HealthStatus,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub success_rate: f64,
    pub avg_latency_ms: f64,
    pub consecutive_errors: u32,
    pub error_types: HashMap<String, u64>,
    pub cooldown_until: Option<Instant>,
    pub cooldown_reason: Option<String>,
    pub last_request: Option<Instant>,
    pub last_success: Option<Instant>,
    latency_samples: VecDeque<u64>,
    recent_results: VecDeque<bool>,
}

impl ModelHealthRecord {
    fn new(model: &str, tier: Tier) -> Self {
        Self {
            model: model.to_string(),
            tier,
            status: HealthStatus::Healthy,
            total_requests: 0,
            successful_requests: 0,
            success_rate: 1.0,
            avg_latency_ms: 0.0,
            consecutive_errors: 0,
            error_types: HashMap::new(),
            cooldown_until: None,
            cooldown_reason: None,
            last_request: None,
            last_success: None,
            latency_samples: VecDeque::new(),
            recent_results: VecDeque::new(),
        }
    }

    /// p95 latency over the bounded sample window.
    pub fn p95_latency_ms(&self) -> u64 {
        if self.latency_samples.is_empty() {
            return 0;
        }
        let mut sorted: Vec<u64> = self.latency_samples.iter().copied().collect();
        sorted.sort_unstable();
        let idx = ((sorted.len() as f64) * 0.95).floor() as usize;
        sorted[idx.min(sorted.len() - 1)]
    }

    fn recent_success_rate(&self) -> Option<f64> {
        if self.recent_results.is_empty() {
            return None;
        }
        let ok = self.recent_results.iter().filter(|r| **r).count();
        Some(ok as f64 / self.recent_results.len() as f64)
    }
}

/// Serialisable summary of one model's health.
#[derive(Debug, Clone, Serialize)]
pub struct ModelHealthSnapshot {
    pub model: String,
    pub tier: Tier,
    pub status: HealthStatus,
    pub total_requests: u64,
    pub success_rate: f64,
    pub avg_latency_ms: f64,
    pub p95_latency_ms: u64,
    pub consecutive_errors: u32,
    pub error_types: HashMap<String, u64>,
    pub in_cooldown: bool,
}

/// Point-in-time tracker statistics.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStats {
    pub models: Vec<ModelHealthSnapshot>,
}

/// Global per-model health tracker.
///
/// Clone is cheap (`Arc`-based) and all clones share state.
#[derive(Debug, Clone)]
pub struct HealthTracker {
    records: Arc<DashMap<String, ModelHealthRecord>>,
    config: HealthConfig,
}

impl HealthTracker {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            records: Arc::new(DashMap::new()),
            config,
        }
    }

    /// Record one completed upstream call and recompute the model's status.
    pub fn update(
        &self,
        model: &str,
        tier: Tier,
        success: bool,
        latency_ms: u64,
        error_kind: Option<&str>,
    ) {
        let mut entry = self
            .records
            .entry(model.to_string())
            .or_insert_with(|| ModelHealthRecord::new(model, tier));
        let record = entry.value_mut();

        let now = Instant::now();
        record.last_request = Some(now);

        // auth/payment failures are the caller's problem, not the model's:
        // count them for observability and leave the health state alone.
        if !success {
            let kind = error_kind.unwrap_or("other");
            *record.error_types.entry(kind.to_string()).or_insert(0) += 1;
            if EXEMPT_ERROR_KINDS.contains(&kind) {
                return;
            }
        }

        record.total_requests += 1;
        if success {
            record.successful_requests += 1;
            record.consecutive_errors = 0;
            record.last_success = Some(now);
        } else {
            record.consecutive_errors += 1;
        }

        record.success_rate =
            record.successful_requests as f64 / record.total_requests as f64;

        let alpha = self.config.ema_alpha;
        if record.total_requests == 1 {
            record.avg_latency_ms = latency_ms as f64;
        } else {
            record.avg_latency_ms =
                (1.0 - alpha) * record.avg_latency_ms + alpha * latency_ms as f64;
        }

        record.latency_samples.push_back(latency_ms);
        while record.latency_samples.len() > LATENCY_WINDOW {
            record.latency_samples.pop_front();
        }
        record.recent_results.push_back(success);
        while record.recent_results.len() > RECENT_WINDOW {
            record.recent_results.pop_front();
        }

        self.recompute_status(record, now);
    }

    /// Whether a model may be selected right now.
    ///
    /// Unknown models are available. An expired cooldown downgrades the
    /// model to degraded and reports it available again.
    pub fn is_available(&self, model: &str) -> bool {
        let Some(mut entry) = self.records.get_mut(model) else {
            return true;
        };
        let record = entry.value_mut();
        match record.status {
            HealthStatus::Cooldown => match record.cooldown_until {
                Some(until) if Instant::now() >= until => {
                    record.status = HealthStatus::Degraded;
                    record.cooldown_until = None;
                    record.cooldown_reason = None;
                    record.consecutive_errors = 0;
                    info!(model = model, "cooldown expired, model degraded");
                    true
                }
                _ => false,
            },
            HealthStatus::Unhealthy => false,
            _ => true,
        }
    }

    /// Best available model from a candidate chain.
    ///
    /// Available candidates sort by status priority, then success rate
    /// (ties within ±0.05 fall through), then average latency.
    pub fn best_model(&self, tier: Tier, candidates: &[String]) -> Option<String> {
        let available: Vec<String> = candidates
            .iter()
            .filter(|m| self.is_available(m))
            .cloned()
            .collect();
        if available.is_empty() {
            return None;
        }

        let mut ranked: Vec<(u8, f64, f64, String)> = available
            .into_iter()
            .map(|model| match self.records.get(&model) {
                Some(r) => (r.status.priority(), r.success_rate, r.avg_latency_ms, model),
                // Untried models rank as fresh and healthy.
                None => (0, 1.0, 0.0, model),
            })
            .collect();

        ranked.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then_with(|| {
                    if (a.1 - b.1).abs() <= 0.05 {
                        std::cmp::Ordering::Equal
                    } else {
                        b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal)
                    }
                })
                .then_with(|| a.2.partial_cmp(&b.2).unwrap_or(std::cmp::Ordering::Equal))
        });

        let best = ranked.into_iter().next().map(|(_, _, _, m)| m);
        if let Some(ref model) = best {
            debug!(tier = %tier, model = %model, "health selected best model");
        }
        best
    }

    /// Health record snapshot for one model.
    pub fn record(&self, model: &str) -> Option<ModelHealthRecord> {
        self.records.get(model).map(|r| r.value().clone())
    }

    pub fn stats(&self) -> HealthStats {
        let mut models: Vec<ModelHealthSnapshot> = self
            .records
            .iter()
            .map(|r| ModelHealthSnapshot {
                model: r.model.clone(),
                tier: r.tier,
                status: r.status,
                total_requests: r.total_requests,
                success_rate: r.success_rate,
                avg_latency_ms: r.avg_latency_ms,
                p95_latency_ms: r.p95_latency_ms(),
                consecutive_errors: r.consecutive_errors,
                error_types: r.error_types.clone(),
                in_cooldown: r.status == HealthStatus::Cooldown,
            })
            .collect();
        models.sort_by(|a, b| a.model.cmp(&b.model));
        HealthStats { models }
    }

    /// Drop all records.
    pub fn reset(&self) {
        self.records.clear();
    }

    /// Recompute a record's status. Branch order matters: an active
    /// cooldown wins, then the consecutive-error trigger, then latency,
    /// then the success-rate bands.
    fn recompute_status(&self, record: &mut ModelHealthRecord, now: Instant) {
        if let Some(until) = record.cooldown_until {
            if now < until {
                record.status = HealthStatus::Cooldown;
                // Early exit when the recent window shows recovery.
                if record.recent_results.len() >= self.config.recovery_requests {
                    if let Some(rate) = record.recent_success_rate() {
                        if rate >= self.config.recovery_threshold {
                            record.status = HealthStatus::Degraded;
                            record.cooldown_until = None;
                            record.cooldown_reason = None;
                            info!(model = %record.model, "recovered early from cooldown");
                        }
                    }
                }
                return;
            }
            // Expired cooldown observed during an update.
            record.status = HealthStatus::Degraded;
            record.cooldown_until = None;
            record.cooldown_reason = None;
        }

        if record.consecutive_errors >= self.config.max_consecutive_errors {
            self.enter_cooldown(record, now, "consecutive errors");
            return;
        }

        if record.p95_latency_ms() > self.config.latency_threshold_ms {
            record.status = HealthStatus::Degraded;
            return;
        }

        record.status = if record.success_rate >= self.config.healthy_threshold {
            HealthStatus::Healthy
        } else if record.success_rate >= self.config.degraded_threshold
            || record.total_requests < MIN_REQUESTS_FOR_UNHEALTHY
        {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        };

        if record.status == HealthStatus::Unhealthy
            && record.total_requests >= MIN_REQUESTS_FOR_UNHEALTHY
        {
            self.enter_cooldown(record, now, "sustained low success rate");
        }
    }

    fn enter_cooldown(&self, record: &mut ModelHealthRecord, now: Instant, reason: &str) {
        record.status = HealthStatus::Cooldown;
        record.cooldown_until =
            Some(now + Duration::from_millis(self.config.cooldown_duration_ms));
        record.cooldown_reason = Some(reason.to_string());
        warn!(
            model = %record.model,
            reason = reason,
            cooldown_ms = self.config.cooldown_duration_ms,
            "model entered cooldown"
        );
    }
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker_with_cooldown_ms(ms: u64) -> HealthTracker {
        HealthTracker::new(HealthConfig {
            cooldown_duration_ms: ms,
            ..HealthConfig::default()
        })
    }

    fn tracker() -> HealthTracker {
        HealthTracker::new(HealthConfig::default())
    }

    // -- basics ----------------------------------------------------------

    #[test]
    fn test_unknown_model_is_available() {
        assert!(tracker().is_available("never-seen"));
    }

    #[test]
    fn test_success_updates_counters() {
        let health = tracker();
        health.update("m", Tier::Medium, true, 800, None);
        let record = health
            .record("m")
            .unwrap_or_else(|| std::panic::panic_any("record missing"));
        assert_eq!(record.total_requests, 1);
        assert_eq!(record.successful_requests, 1);
        assert!((record.success_rate - 1.0).abs() < f64::EPSILON);
        assert_eq!(record.status, HealthStatus::Healthy);
    }

    #[test]
    fn test_failure_resets_on_success() {
        let health = tracker();
        health.update("m", Tier::Medium, false, 800, Some("server_5xx"));
        health.update("m", Tier::Medium, false, 800, Some("server_5xx"));
        health.update("m", Tier::Medium, true, 800, None);
        let record = health
            .record("m")
            .unwrap_or_else(|| std::panic::panic_any("record missing"));
        assert_eq!(record.consecutive_errors, 0);
    }

    #[test]
    fn test_error_kinds_counted() {
        let health = tracker();
        health.update("m", Tier::Medium, false, 800, Some("timeout"));
        health.update("m", Tier::Medium, false, 800, Some("timeout"));
        health.update("m", Tier::Medium, false, 800, None);
        let record = health
            .record("m")
            .unwrap_or_else(|| std::panic::panic_any("record missing"));
        assert_eq!(record.error_types.get("timeout"), Some(&2));
        assert_eq!(record.error_types.get("other"), Some(&1));
    }

    // -- latency ---------------------------------------------------------

    #[test]
    fn test_latency_ema() {
        let health = tracker();
        health.update("m", Tier::Medium, true, 1000, None);
        health.update("m", Tier::Medium, true, 2000, None);
        let record = health
            .record("m")
            .unwrap_or_else(|| std::panic::panic_any("record missing"));
        // 1000 then 0.7*1000 + 0.3*2000 = 1300
        assert!((record.avg_latency_ms - 1300.0).abs() < 1e-9);
    }

    #[test]
    fn test_p95_from_window() {
        let health = tracker();
        for i in 1..=100u64 {
            health.update("m", Tier::Medium, true, i * 10, None);
        }
        let record = health
            .record("m")
            .unwrap_or_else(|| std::panic::panic_any("record missing"));
        assert_eq!(record.p95_latency_ms(), 960);
    }

    #[test]
    fn test_slow_p95_degrades() {
        let health = HealthTracker::new(HealthConfig {
            latency_threshold_ms: 500,
            ..HealthConfig::default()
        });
        for _ in 0..20 {
            health.update("m", Tier::Medium, true, 900, None);
        }
        let record = health
            .record("m")
            .unwrap_or_else(|| std::panic::panic_any("record missing"));
        assert_eq!(record.status, HealthStatus::Degraded);
        assert!(health.is_available("m"), "degraded models stay available");
    }

    // -- cooldown --------------------------------------------------------

    #[test]
    fn test_consecutive_errors_trigger_cooldown() {
        let health = tracker_with_cooldown_ms(10_000);
        for _ in 0..3 {
            health.update("m", Tier::Medium, false, 500, Some("server_5xx"));
        }
        let record = health
            .record("m")
            .unwrap_or_else(|| std::panic::panic_any("record missing"));
        assert_eq!(record.status, HealthStatus::Cooldown);
        assert!(!health.is_available("m"));
    }

    #[test]
    fn test_cooldown_expiry_lands_on_degraded_not_healthy() {
        let health = tracker_with_cooldown_ms(30);
        for _ in 0..3 {
            health.update("m", Tier::Medium, false, 500, Some("server_5xx"));
        }
        assert!(!health.is_available("m"));

        std::thread::sleep(Duration::from_millis(50));
        assert!(health.is_available("m"), "cooldown expired");
        let record = health
            .record("m")
            .unwrap_or_else(|| std::panic::panic_any("record missing"));
        assert_eq!(record.status, HealthStatus::Degraded);

        // One success after cooldown must not jump straight to healthy.
        health.update("m", Tier::Medium, true, 500, None);
        let record = health
            .record("m")
            .unwrap_or_else(|| std::panic::panic_any("record missing"));
        assert_eq!(record.status, HealthStatus::Degraded);
    }

    #[test]
    fn test_auth_failures_do_not_trigger_cooldown() {
        let health = tracker();
        for _ in 0..5 {
            health.update("m", Tier::Medium, false, 500, Some("auth"));
        }
        let record = health
            .record("m")
            .unwrap_or_else(|| std::panic::panic_any("record missing"));
        assert_eq!(record.consecutive_errors, 0);
        assert_ne!(record.status, HealthStatus::Cooldown);
        assert_eq!(record.error_types.get("auth"), Some(&5));
    }

    #[test]
    fn test_payment_failures_do_not_trigger_cooldown() {
        let health = tracker();
        for _ in 0..5 {
            health.update("m", Tier::Medium, false, 500, Some("payment_required"));
        }
        let record = health
            .record("m")
            .unwrap_or_else(|| std::panic::panic_any("record missing"));
        assert_ne!(record.status, HealthStatus::Cooldown);
    }

    #[test]
    fn test_sustained_low_success_rate_cools_down() {
        let health = tracker();
        // Alternate success/failure: consecutive errors never reach 3, but
        // the lifetime success rate sinks to 0.5 over >= 10 requests.
        for i in 0..12 {
            health.update("m", Tier::Medium, i % 2 == 0, 500, Some("server_5xx"));
        }
        let record = health
            .record("m")
            .unwrap_or_else(|| std::panic::panic_any("record missing"));
        assert_eq!(record.status, HealthStatus::Cooldown);
        assert_eq!(record.cooldown_reason.as_deref(), Some("sustained low success rate"));
    }

    #[test]
    fn test_warmup_failures_cap_at_degraded() {
        let health = tracker();
        health.update("m", Tier::Medium, false, 500, Some("server_5xx"));
        health.update("m", Tier::Medium, true, 500, None);
        let record = health
            .record("m")
            .unwrap_or_else(|| std::panic::panic_any("record missing"));
        // success_rate 0.5 over only 2 requests: degraded, not unhealthy.
        assert_eq!(record.status, HealthStatus::Degraded);
    }

    // -- best model ------------------------------------------------------

    #[test]
    fn test_best_model_skips_cooled_down_primary() {
        let health = tracker_with_cooldown_ms(60_000);
        for _ in 0..3 {
            health.update("primary", Tier::Medium, false, 500, Some("server_5xx"));
        }
        health.update("fallback", Tier::Medium, true, 500, None);

        let best = health.best_model(
            Tier::Medium,
            &["primary".to_string(), "fallback".to_string()],
        );
        assert_eq!(best.as_deref(), Some("fallback"));
    }

    #[test]
    fn test_best_model_prefers_healthy_over_degraded() {
        let health = tracker();
        for _ in 0..10 {
            health.update("good", Tier::Medium, true, 900, None);
        }
        health.update("shaky", Tier::Medium, false, 100, Some("other"));
        health.update("shaky", Tier::Medium, true, 100, None);

        let best = health.best_model(
            Tier::Medium,
            &["shaky".to_string(), "good".to_string()],
        );
        assert_eq!(best.as_deref(), Some("good"));
    }

    #[test]
    fn test_best_model_latency_breaks_close_success_ties() {
        let health = tracker();
        for _ in 0..20 {
            health.update("slow", Tier::Medium, true, 2000, None);
            health.update("fast", Tier::Medium, true, 200, None);
        }
        let best = health.best_model(Tier::Medium, &["slow".to_string(), "fast".to_string()]);
        assert_eq!(best.as_deref(), Some("fast"));
    }

    #[test]
    fn test_best_model_empty_candidates() {
        assert!(tracker().best_model(Tier::Medium, &[]).is_none());
    }

    #[test]
    fn test_best_model_unknown_candidates_pick_first() {
        let health = tracker();
        let best = health.best_model(Tier::Medium, &["a".to_string(), "b".to_string()]);
        assert_eq!(best.as_deref(), Some("a"));
    }

    // -- reset -----------------------------------------------------------

    #[test]
    fn test_reset_clears_records() {
        let health = tracker();
        health.update("m", Tier::Medium, true, 500, None);
        health.reset();
        assert!(health.stats().models.is_empty());
        assert!(health.record("m").is_none());
    }
}
