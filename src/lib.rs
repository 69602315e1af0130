//! # prompt-router
//!
//! Cost-aware routing core for LLM chat-completion requests.
//!
//! Sits between a client and a remote aggregator API: each request is
//! classified into a difficulty tier by deterministic rules, the cheapest
//! healthy model for that tier is selected, and completed-call feedback
//! closes the loop.
//!
//! ## Architecture
//!
//! Five shared stores behind one orchestrator:
//! ```text
//! (prompt, system, session?) -> Fingerprinter -> ScoreCache -> RuleClassifier
//!          -> AdaptiveWeights -> overrides -> HealthTracker -> SessionStore
//!          -> RoutingDecision
//! ```
//! After the upstream call completes, [`Router::record_feedback`] fans the
//! observed outcome back into the adaptive, health, session, and cost
//! stores.
//!
//! Classification is CPU-bound and synchronous; only the periodic
//! maintenance sweeps ([`Router::spawn_sweepers`]) touch the async runtime.

pub mod adaptive;
pub mod cache;
pub mod classify;
pub mod config;
pub mod cost;
pub mod fingerprint;
pub mod health;
pub mod request;
pub mod router;
pub mod session;

// Re-exports
pub use adaptive::{AdaptiveWeights, RoutingFeedback};
pub use cache::{CachedScore, ScoreCache};
pub use classify::{RuleClassifier, ScoringResult};
pub use config::{ConfigError, RouterConfig, Tier};
pub use fingerprint::{estimated_tokens, fingerprint, fingerprints_similar};
pub use health::{HealthStatus, HealthTracker};
pub use request::{flatten_messages, ChatMessage, ChatRequest};
pub use router::{RouteOutcome, RouteRequest, Router, RouterStats, RoutingDecision};
pub use session::SessionStore;

/// Initialise tracing with env-filter support. Call once at binary startup.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .try_init();
}
