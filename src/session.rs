//! # Stage: Session Store
//!
//! ## Responsibility
//!
//! Pin a model per conversation and keep lightweight per-session context
//! (topics, complexity trend, response-length EMA) and metrics. Watch each
//! session's consecutive failures: past the degradation threshold the
//! session switches to the healthiest alternative in the same tier,
//! remembering the original model; after enough consecutive successes on
//! the substitute, the original is restored if it is available again.
//!
//! ## Guarantees
//!
//! - **Thread-safe**: one `Mutex` around the session map; a single
//!   [`SessionStore::record_result`] is atomic with respect to readers.
//! - **Bounded**: topics capped at 10, recent errors at 5.
//! - **Expiring**: sessions time out after `timeout_ms` of inactivity,
//!   enforced on access and by a periodic sweep.
//! - **One original per episode**: `original_model` is populated when a
//!   degradation episode starts and cleared on restoration, never
//!   overwritten mid-episode.
//!
//! ## NOT Responsible For
//!
//! - Global model health (see `health`; this store only consumes it)
//! - Deciding the tier of a request

use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::{SessionConfig, Tier};
use crate::health::HealthTracker;

/// Unique topics remembered per session.
const MAX_TOPICS: usize = 10;

/// Recent errors remembered per session.
const MAX_RECENT_ERRORS: usize = 5;

/// Rolling conversational context for a session.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ContextSnapshot {
    pub topics: Vec<String>,
    pub intent: Option<String>,
    /// EMA of classified complexity scores seen in this session.
    pub complexity_trend: f64,
    pub has_used_tools: bool,
    pub last_tool_sequence: Option<String>,
    /// EMA of response lengths in output tokens.
    pub avg_response_length: f64,
}

/// Per-session running metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub consecutive_failures: u32,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub avg_latency_ms: f64,
    pub avg_cost: f64,
    pub success_rate: f64,
}

/// Degradation episode state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DegradationState {
    pub is_degraded: bool,
    pub original_model: Option<String>,
    pub original_tier: Option<Tier>,
    pub reason: Option<String>,
    #[serde(skip)]
    pub degraded_at: Option<Instant>,
    pub recovery_requests: u32,
}

/// One recorded per-session error.
#[derive(Debug, Clone)]
pub struct SessionError {
    pub kind: String,
    pub at: Instant,
}

/// A pinned session.
#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub model: String,
    pub tier: Tier,
    pub created_at: Instant,
    pub last_used_at: Instant,
    pub request_count: u64,
    pub context: ContextSnapshot,
    pub metrics: SessionMetrics,
    pub degradation: DegradationState,
    pub recent_errors: VecDeque<SessionError>,
}

/// Outcome of one upstream call, as fed to [`SessionStore::record_result`].
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub success: bool,
    pub latency_ms: u64,
    pub cost: f64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub error_kind: Option<String>,
}

/// Point-in-time store statistics.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub active_sessions: usize,
    pub degraded_sessions: usize,
}

/// Per-session model pinning with failure-driven degradation.
///
/// Clone is cheap (`Arc`-based) and all clones share state.
#[derive(Debug, Clone)]
pub struct SessionStore {
    sessions: Arc<Mutex<HashMap<String, SessionEntry>>>,
    config: SessionConfig,
}

impl SessionStore {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            config,
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.config.timeout_ms)
    }

    /// Fetch a session, refreshing its last-used time. Expired sessions are
    /// removed and reported as absent.
    pub fn get(&self, session_id: &str) -> Option<SessionEntry> {
        let timeout = self.timeout();
        let mut sessions = self.sessions.lock().ok()?;
        let expired = sessions
            .get(session_id)
            .map(|s| s.last_used_at.elapsed() > timeout);
        match expired {
            None => None,
            Some(true) => {
                sessions.remove(session_id);
                debug!(session = session_id, "session expired");
                None
            }
            Some(false) => {
                let entry = sessions.get_mut(session_id)?;
                entry.last_used_at = Instant::now();
                Some(entry.clone())
            }
        }
    }

    /// Create or update a session pin.
    ///
    /// When the pinned model changes outside a degradation episode, the
    /// outgoing model is remembered so a later episode can restore it.
    pub fn set(
        &self,
        session_id: &str,
        model: &str,
        tier: Tier,
        complexity: f64,
        used_tools: bool,
    ) {
        let alpha = self.config.ema_alpha;
        let Ok(mut sessions) = self.sessions.lock() else {
            return;
        };
        let now = Instant::now();

        match sessions.get_mut(session_id) {
            Some(entry) => {
                if entry.model != model && !entry.degradation.is_degraded {
                    entry.degradation.original_model = Some(entry.model.clone());
                    entry.degradation.original_tier = Some(entry.tier);
                }
                entry.model = model.to_string();
                entry.tier = tier;
                entry.last_used_at = now;
                entry.request_count += 1;
                entry.context.complexity_trend =
                    (1.0 - alpha) * entry.context.complexity_trend + alpha * complexity;
                entry.context.has_used_tools |= used_tools;
            }
            None => {
                sessions.insert(
                    session_id.to_string(),
                    SessionEntry {
                        model: model.to_string(),
                        tier,
                        created_at: now,
                        last_used_at: now,
                        request_count: 1,
                        context: ContextSnapshot {
                            complexity_trend: complexity,
                            has_used_tools: used_tools,
                            ..ContextSnapshot::default()
                        },
                        metrics: SessionMetrics::default(),
                        degradation: DegradationState::default(),
                        recent_errors: VecDeque::new(),
                    },
                );
                debug!(session = session_id, model = model, tier = %tier, "session pinned");
            }
        }
    }

    /// Add a topic to the session's context, bounded and deduplicated.
    pub fn add_topic(&self, session_id: &str, topic: &str) {
        if let Ok(mut sessions) = self.sessions.lock() {
            if let Some(entry) = sessions.get_mut(session_id) {
                if !entry.context.topics.iter().any(|t| t == topic) {
                    entry.context.topics.push(topic.to_string());
                    while entry.context.topics.len() > MAX_TOPICS {
                        entry.context.topics.remove(0);
                    }
                }
            }
        }
    }

    /// Record the outcome of an upstream call for a session.
    ///
    /// Drives the degradation state machine: consecutive failures past the
    /// threshold switch the session to the best available model in the same
    /// tier (per `health`); consecutive successes while degraded count
    /// toward restoration of the original model.
    pub fn record_result(
        &self,
        session_id: &str,
        outcome: &SessionOutcome,
        health: &HealthTracker,
        tier_candidates: &[String],
    ) {
        enum Transition {
            None,
            Restore(String, Tier),
            Degrade(String),
        }

        let alpha = self.config.ema_alpha;
        let Ok(mut sessions) = self.sessions.lock() else {
            return;
        };
        let Some(entry) = sessions.get_mut(session_id) else {
            return;
        };

        let m = &mut entry.metrics;
        m.total_requests += 1;
        if outcome.success {
            m.successful_requests += 1;
        }
        m.total_input_tokens += outcome.input_tokens;
        m.total_output_tokens += outcome.output_tokens;
        let success_val = if outcome.success { 1.0 } else { 0.0 };
        if m.total_requests == 1 {
            m.avg_latency_ms = outcome.latency_ms as f64;
            m.avg_cost = outcome.cost;
            m.success_rate = success_val;
        } else {
            m.avg_latency_ms = (1.0 - alpha) * m.avg_latency_ms + alpha * outcome.latency_ms as f64;
            m.avg_cost = (1.0 - alpha) * m.avg_cost + alpha * outcome.cost;
            m.success_rate = (1.0 - alpha) * m.success_rate + alpha * success_val;
        }
        entry.context.avg_response_length = if m.total_requests == 1 {
            outcome.output_tokens as f64
        } else {
            (1.0 - alpha) * entry.context.avg_response_length
                + alpha * outcome.output_tokens as f64
        };

        let mut transition = Transition::None;
        if outcome.success {
            m.consecutive_failures = 0;
            if entry.degradation.is_degraded {
                entry.degradation.recovery_requests += 1;
                if entry.degradation.recovery_requests >= self.config.recovery_threshold {
                    if let (Some(model), Some(tier)) = (
                        entry.degradation.original_model.clone(),
                        entry.degradation.original_tier,
                    ) {
                        if health.is_available(&model) {
                            transition = Transition::Restore(model, tier);
                        }
                    }
                }
            }
        } else {
            m.consecutive_failures += 1;
            entry.recent_errors.push_back(SessionError {
                kind: outcome
                    .error_kind
                    .clone()
                    .unwrap_or_else(|| "other".to_string()),
                at: Instant::now(),
            });
            while entry.recent_errors.len() > MAX_RECENT_ERRORS {
                entry.recent_errors.pop_front();
            }

            if m.consecutive_failures >= self.config.degradation_threshold
                && !entry.degradation.is_degraded
            {
                if let Some(best) = health.best_model(entry.tier, tier_candidates) {
                    if best != entry.model {
                        transition = Transition::Degrade(best);
                    }
                }
            }
        }

        match transition {
            Transition::None => {}
            Transition::Restore(model, tier) => {
                info!(
                    session = session_id,
                    model = %model,
                    "session recovered, restoring original model"
                );
                entry.model = model;
                entry.tier = tier;
                entry.degradation = DegradationState::default();
            }
            Transition::Degrade(best) => {
                warn!(
                    session = session_id,
                    from = %entry.model,
                    to = %best,
                    failures = entry.metrics.consecutive_failures,
                    "session degrading to healthier model"
                );
                let d = &mut entry.degradation;
                if d.original_model.is_none() {
                    d.original_model = Some(entry.model.clone());
                    d.original_tier = Some(entry.tier);
                }
                d.is_degraded = true;
                d.reason = Some(format!(
                    "{} consecutive failures",
                    entry.metrics.consecutive_failures
                ));
                d.degraded_at = Some(Instant::now());
                d.recovery_requests = 0;
                entry.model = best;
            }
        }
    }

    /// Remove sessions past their inactivity timeout.
    pub fn run_sweep(&self) {
        let timeout = self.timeout();
        if let Ok(mut sessions) = self.sessions.lock() {
            let before = sessions.len();
            sessions.retain(|_, s| s.last_used_at.elapsed() <= timeout);
            let removed = before - sessions.len();
            if removed > 0 {
                debug!(removed = removed, "session sweep removed expired entries");
            }
        }
    }

    /// Spawn the periodic expiry sweep. Abort the handle to stop it.
    pub fn spawn_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        let interval = Duration::from_millis(self.config.sweep_interval_ms);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.tick().await; // immediate first tick
            loop {
                tick.tick().await;
                store.run_sweep();
            }
        })
    }

    pub fn stats(&self) -> SessionStats {
        match self.sessions.lock() {
            Ok(sessions) => SessionStats {
                active_sessions: sessions.len(),
                degraded_sessions: sessions
                    .values()
                    .filter(|s| s.degradation.is_degraded)
                    .count(),
            },
            Err(_) => SessionStats {
                active_sessions: 0,
                degraded_sessions: 0,
            },
        }
    }

    /// Drop all sessions.
    pub fn clear(&self) {
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.clear();
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
