//! End-to-end routing scenarios against the default configuration.
//!
//! Exercises the full pipeline — fingerprint, cache, classifier, adaptive
//! weights, health tracking, session pinning — through the public
//! [`Router`] surface the way the proxy front-end drives it.

use prompt_router::config::{HealthConfig, RouterConfig, SessionConfig, Tier};
use prompt_router::{
    fingerprint, fingerprints_similar, flatten_messages, ChatMessage, RouteOutcome, RouteRequest,
    Router,
};

fn router() -> Router {
    Router::new(RouterConfig::default())
        .unwrap_or_else(|e| std::panic::panic_any(format!("test: config: {e}")))
}

fn request(prompt: &str) -> RouteRequest {
    RouteRequest {
        prompt: prompt.to_string(),
        max_output_tokens: 256,
        ..RouteRequest::default()
    }
}

fn outcome(success: bool, error: Option<&str>) -> RouteOutcome {
    RouteOutcome {
        success,
        latency_ms: 400,
        cost: 0.005,
        input_tokens: 120,
        output_tokens: 60,
        error_type: error.map(|e| e.to_string()),
    }
}

/// A ~400-token filler that trips none of the keyword dimensions.
fn neutral_article() -> String {
    let sentence = "morning light settled gently over quiet fields and the slow river moved past stone walls toward distant hills ";
    format!("Summarize this article: {}", sentence.repeat(17))
}

// ── End-to-end scenarios ───────────────────────────────────────────────

#[test]
fn scenario_simple_arithmetic_question() {
    let decision = router().route(&request("What is 2+2?"));
    assert_eq!(decision.tier, Tier::Simple);
    assert!(decision.confidence >= 0.7, "confidence {}", decision.confidence);
    assert_eq!(decision.model, "gemini-2.5-flash");
}

#[test]
fn scenario_medium_summarization() {
    let decision = router().route(&request(&neutral_article()));
    assert_eq!(decision.tier, Tier::Medium);
    assert_eq!(decision.model, "grok-code-fast-1");
}

#[test]
fn scenario_complex_frontend_build() {
    let decision = router().route(&request(
        "Build a React component that virtualizes a 10k-row table with keyboard navigation and accessible labels.",
    ));
    assert_eq!(decision.tier, Tier::Complex);
    assert_eq!(decision.model, "gemini-2.5-pro");
}

#[test]
fn scenario_reasoning_proof() {
    let decision = router().route(&request("Prove that sqrt(2) is irrational, step by step."));
    assert_eq!(decision.tier, Tier::Reasoning);
    assert!(decision.confidence >= 0.85);
    assert_eq!(decision.model, "grok-4-fast-reasoning");
}

#[test]
fn scenario_ambiguous_with_structured_output() {
    let decision = router().route(&RouteRequest {
        prompt: "hi".to_string(),
        system_prompt: Some("Respond according to the provided schema.".to_string()),
        max_output_tokens: 64,
        ..RouteRequest::default()
    });
    assert_eq!(decision.tier, Tier::Medium);
}

#[test]
fn scenario_huge_input_forces_complex() {
    let decision = router().route(&request(&"x".repeat(480_000)));
    assert_eq!(decision.tier, Tier::Complex);
    assert!(decision.reasoning.contains("Input exceeds 100000 tokens"));
}

// ── Fingerprint properties ─────────────────────────────────────────────

#[test]
fn property_fingerprint_stability() {
    for prompt in ["What is 2+2?", "prove it step by step", "你好，世界！", ""] {
        assert_eq!(
            fingerprint(prompt, Some("sys")),
            fingerprint(prompt, Some("sys"))
        );
    }
}

#[test]
fn property_fingerprint_similarity() {
    let a = fingerprint("Hello, world!", None);
    let b = fingerprint("hello world", None);
    assert!(fingerprints_similar(&a, &b));

    let c = fingerprint("What is 2+2?", None);
    let d = fingerprint("Explain quantum physics", None);
    assert!(!fingerprints_similar(&c, &d));
}

// ── Classifier properties ──────────────────────────────────────────────

#[test]
fn property_classifier_determinism() {
    let router_a = router();
    let router_b = router();
    for prompt in [
        "What is 2+2?",
        "Build a React component that virtualizes a 10k-row table with keyboard navigation and accessible labels.",
        "Prove that sqrt(2) is irrational, step by step.",
    ] {
        let a = router_a.route(&request(prompt));
        let b = router_b.route(&request(prompt));
        assert_eq!(a.tier, b.tier, "prompt {prompt:?}");
        assert!((a.confidence - b.confidence).abs() < 1e-12);
    }
}

#[test]
fn property_reasoning_override_precedence() {
    // Code, formatting, and agentic markers everywhere; two reasoning
    // keywords still force REASONING.
    let decision = router().route(&request(
        "Prove the theorem step by step, then write a json function, fix and verify the build",
    ));
    assert_eq!(decision.tier, Tier::Reasoning);
}

#[test]
fn property_simple_indicator_suppression() {
    for prompt in ["What is the weather?", "who is Ada Lovelace", "翻译这句话"] {
        let decision = router().route(&request(prompt));
        assert_eq!(decision.tier, Tier::Simple, "prompt {prompt:?}");
    }
}

#[test]
fn property_hysteresis_through_cache() {
    let router = router();
    // Same fingerprint both times (identical text): the second pass sees the
    // first pass's tier in the score history and must not flip.
    let prompt = "Build a React component that virtualizes a 10k-row table with keyboard navigation and accessible labels.";
    let first = router.route(&request(prompt));
    let second = router.route(&request(prompt));
    assert_eq!(first.tier, second.tier);
    assert!(second.meta.cache_hit);
}

// ── Health properties ──────────────────────────────────────────────────

#[test]
fn property_cooldown_monotonicity() {
    let cfg = RouterConfig {
        health: HealthConfig {
            cooldown_duration_ms: 40,
            ..HealthConfig::default()
        },
        ..RouterConfig::default()
    };
    let router = Router::new(cfg)
        .unwrap_or_else(|e| std::panic::panic_any(format!("test: config: {e}")));

    let decision = router.route(&request("What is 2+2?"));
    for _ in 0..3 {
        router.record_feedback(&decision, &outcome(false, Some("server_5xx")));
    }
    assert!(!router.health().is_available(&decision.model));

    std::thread::sleep(std::time::Duration::from_millis(60));
    assert!(router.health().is_available(&decision.model));

    router.record_feedback(&decision, &outcome(true, None));
    let stats = router.stats();
    let record = stats
        .health
        .models
        .iter()
        .find(|m| m.model == decision.model)
        .unwrap_or_else(|| std::panic::panic_any("model record missing"));
    assert_ne!(
        format!("{:?}", record.status),
        "Healthy",
        "one success after cooldown must not restore healthy"
    );
}

#[test]
fn property_weight_factor_bounds() {
    let router = router();
    let decision = router.route(&request("Write a function with async and await in a class"));
    // Hammer the adaptive store with terrible outcomes.
    for _ in 0..60 {
        router.record_feedback(
            &decision,
            &RouteOutcome {
                success: false,
                latency_ms: 45_000,
                cost: 2.0,
                input_tokens: 1000,
                output_tokens: 0,
                error_type: Some("timeout".to_string()),
            },
        );
    }
    for dim in router.stats().adaptive.dimensions {
        assert!(
            dim.adjustment_factor >= 0.8 && dim.adjustment_factor <= 1.2,
            "dimension {} factor {}",
            dim.name,
            dim.adjustment_factor
        );
    }
}

// ── Session properties ─────────────────────────────────────────────────

#[test]
fn property_session_degradation_round_trip() {
    let router = router();
    let mut req = request("What is 2+2?");
    req.session_id = Some("sess-rt".to_string());

    let decision = router.route(&req);
    let pinned = decision.model.clone();

    // Two consecutive failures: past the degradation threshold.
    router.record_feedback(&decision, &outcome(false, Some("server_5xx")));
    router.record_feedback(&decision, &outcome(false, Some("server_5xx")));

    let degraded = router.route(&req);
    assert_ne!(degraded.model, pinned, "session must switch models");

    // Three consecutive successes on the substitute: restoration. The
    // original needs a success first so its cooldown clears quickly; use a
    // fresh healthy record instead by feeding successes to the substitute.
    for _ in 0..3 {
        router.record_feedback(&degraded, &outcome(true, None));
    }
    let stats = router.stats();
    assert_eq!(stats.sessions.degraded_sessions, 0, "session must recover");
}

#[test]
fn property_session_expiry() {
    let cfg = RouterConfig {
        session: SessionConfig {
            timeout_ms: 20,
            ..SessionConfig::default()
        },
        ..RouterConfig::default()
    };
    let router = Router::new(cfg)
        .unwrap_or_else(|e| std::panic::panic_any(format!("test: config: {e}")));
    let mut req = request("What is 2+2?");
    req.session_id = Some("sess-exp".to_string());
    let _ = router.route(&req);
    assert_eq!(router.stats().sessions.active_sessions, 1);

    std::thread::sleep(std::time::Duration::from_millis(40));
    let decision = router.route(&req);
    assert!(
        !decision.reasoning.contains("session-pinned"),
        "expired session must not pin"
    );
}

// ── Large-context property ─────────────────────────────────────────────

#[test]
fn property_large_context_override() {
    let decision = router().route(&request(&"y".repeat(500_000)));
    assert_eq!(decision.tier, Tier::Complex);
    assert!((decision.confidence - 0.95).abs() < f64::EPSILON);
}

// ── Front-end flattening ───────────────────────────────────────────────

#[test]
fn chat_request_flattening_feeds_routing() {
    let messages = vec![
        ChatMessage {
            role: "system".to_string(),
            content: "Respond with json only".to_string(),
        },
        ChatMessage {
            role: "user".to_string(),
            content: "hi".to_string(),
        },
    ];
    let (prompt, system) = flatten_messages(&messages);
    let decision = router().route(&RouteRequest {
        prompt,
        system_prompt: system,
        max_output_tokens: 64,
        ..RouteRequest::default()
    });
    // Ambiguous "hi" defaults to MEDIUM; structured output keeps it there.
    assert_eq!(decision.tier, Tier::Medium);
}

// ── Feedback loop integration ──────────────────────────────────────────

#[test]
fn feedback_shifts_future_selection() {
    let router = router();
    let decision = router.route(&request("What is 2+2?"));
    let primary = decision.model.clone();

    // Repeated timeouts cool the primary down.
    for _ in 0..3 {
        router.record_feedback(&decision, &outcome(false, Some("timeout")));
    }
    let after = router.route(&request("What is 2+2?"));
    assert_ne!(after.model, primary);

    let stats = router.stats();
    let record = stats
        .health
        .models
        .iter()
        .find(|m| m.model == primary)
        .unwrap_or_else(|| std::panic::panic_any("model record missing"));
    assert_eq!(record.error_types.get("timeout"), Some(&3));
}

#[test]
fn stats_surface_all_stores() {
    let router = router();
    let mut req = request("Write a function with async await");
    req.session_id = Some("sess-stats".to_string());
    let decision = router.route(&req);
    router.record_feedback(&decision, &outcome(true, None));

    let stats = router.stats();
    assert!(stats.cache.entries >= 1);
    assert_eq!(stats.adaptive.feedback_count, 1);
    assert!(!stats.health.models.is_empty());
    assert_eq!(stats.sessions.active_sessions, 1);

    let json = serde_json::to_string(&stats)
        .unwrap_or_else(|e| std::panic::panic_any(format!("test: serialize: {e}")));
    assert!(json.contains("cache"));
}
