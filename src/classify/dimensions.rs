//! The 15 scoring dimensions.
//!
//! Each dimension inspects the request text and produces a
//! [`DimensionScore`] in `[-1.0, 1.0]` plus an optional human-readable
//! signal (e.g. `"code (function, class)"`). Signals double as the join key
//! for post-hoc feedback: the adaptive weight manager resolves a signal back
//! to its dimension through
//! [`keywords::resolve_signal`](super::keywords::resolve_signal).
//!
//! All keyword dimensions operate on the lowercased concatenation of system
//! and user prompt, except `reasoningMarkers` and `questionComplexity`,
//! which look at the user prompt only: a system prompt instructing "think
//! step by step" must not drag a trivial user question into REASONING.

use crate::config::ScoringConfig;

use super::keywords::MULTI_STEP_PATTERNS;

/// One dimension's contribution to the weighted score.
#[derive(Debug, Clone, PartialEq)]
pub struct DimensionScore {
    /// Dimension name, matching a key of `dimension_weights`.
    pub name: &'static str,
    /// Raw score in `[-1.0, 1.0]` before weighting.
    pub score: f64,
    /// Debug signal, present when the dimension fired.
    pub signal: Option<String>,
}

/// All dimension scores plus the out-of-band extras the orchestrator needs.
#[derive(Debug, Clone)]
pub struct DimensionBreakdown {
    pub scores: Vec<DimensionScore>,
    /// Agentic indicator, same value as the `agenticTask` dimension score.
    pub agentic_score: f64,
    /// Distinct reasoning keywords matched in the user prompt.
    pub reasoning_hits: usize,
}

/// Distinct keywords from `list` contained in `text` (already lowercased).
fn matched<'a>(text: &str, list: &'a [String]) -> Vec<&'a str> {
    list.iter()
        .filter(|kw| !kw.is_empty() && text.contains(kw.as_str()))
        .map(|kw| kw.as_str())
        .collect()
}

/// Two-step threshold scoring shared by most keyword dimensions.
fn stepped(count: usize, low: usize, high: usize, low_val: f64, high_val: f64) -> f64 {
    if count >= high {
        high_val
    } else if count >= low {
        low_val
    } else {
        0.0
    }
}

fn keyword_signal(label: &str, hits: &[&str]) -> Option<String> {
    if hits.is_empty() {
        None
    } else {
        Some(format!("{} ({})", label, hits.join(", ")))
    }
}

/// Score all 15 dimensions.
///
/// `full` and `user` must already be lowercased; `estimated_tokens` is
/// `ceil((len(system) + 1 + len(prompt)) / 4)`.
pub fn score_dimensions(
    full: &str,
    user: &str,
    estimated_tokens: u64,
    cfg: &ScoringConfig,
) -> DimensionBreakdown {
    let kw = &cfg.keywords;
    let mut scores = Vec::with_capacity(15);

    // tokenCount
    let tc = if estimated_tokens < cfg.token_thresholds.simple {
        -1.0
    } else if estimated_tokens > cfg.token_thresholds.complex {
        1.0
    } else {
        0.0
    };
    scores.push(DimensionScore {
        name: "tokenCount",
        score: tc,
        signal: (tc != 0.0).then(|| format!("tokens ({estimated_tokens})")),
    });

    // codePresence
    let code = matched(full, &kw.code);
    scores.push(DimensionScore {
        name: "codePresence",
        score: stepped(code.len(), 1, 2, 0.5, 1.0),
        signal: keyword_signal("code", &code),
    });

    // reasoningMarkers — user prompt only
    let reasoning = matched(user, &kw.reasoning);
    let reasoning_hits = reasoning.len();
    scores.push(DimensionScore {
        name: "reasoningMarkers",
        score: stepped(reasoning_hits, 1, 2, 0.7, 1.0),
        signal: keyword_signal("reasoning", &reasoning),
    });

    // technicalTerms
    let technical = matched(full, &kw.technical);
    scores.push(DimensionScore {
        name: "technicalTerms",
        score: stepped(technical.len(), 2, 4, 0.5, 1.0),
        signal: keyword_signal("technical", &technical),
    });

    // creativeMarkers
    let creative = matched(full, &kw.creative);
    scores.push(DimensionScore {
        name: "creativeMarkers",
        score: stepped(creative.len(), 1, 2, 0.5, 0.7),
        signal: keyword_signal("creative", &creative),
    });

    // simpleIndicators — any hit pulls the score down
    let simple = matched(full, &kw.simple);
    scores.push(DimensionScore {
        name: "simpleIndicators",
        score: if simple.is_empty() { 0.0 } else { -1.0 },
        signal: keyword_signal("simple", &simple),
    });

    // multiStepPatterns
    let multi = MULTI_STEP_PATTERNS
        .iter()
        .filter(|re| re.is_match(full))
        .count();
    scores.push(DimensionScore {
        name: "multiStepPatterns",
        score: if multi > 0 { 0.5 } else { 0.0 },
        signal: (multi > 0).then(|| format!("multistep ({multi} patterns)")),
    });

    // questionComplexity — user prompt only
    let question_marks = user.matches('?').count() + user.matches('？').count();
    let cjk_questions: usize = kw
        .cjk_question_words
        .iter()
        .map(|w| user.matches(w.as_str()).count())
        .sum();
    let (q_score, q_signal) = if question_marks > 3 {
        (0.5, Some(format!("question ({question_marks})")))
    } else if question_marks == 0 && cjk_questions >= 2 {
        (0.5, Some(format!("question (cjk {cjk_questions})")))
    } else {
        (0.0, None)
    };
    scores.push(DimensionScore {
        name: "questionComplexity",
        score: q_score,
        signal: q_signal,
    });

    // imperativeVerbs
    let imperative = matched(full, &kw.imperative);
    scores.push(DimensionScore {
        name: "imperativeVerbs",
        score: stepped(imperative.len(), 1, 2, 0.3, 0.5),
        signal: keyword_signal("imperative", &imperative),
    });

    // constraintCount
    let constraint = matched(full, &kw.constraint);
    scores.push(DimensionScore {
        name: "constraintCount",
        score: stepped(constraint.len(), 1, 3, 0.3, 0.7),
        signal: keyword_signal("constraint", &constraint),
    });

    // outputFormat
    let format = matched(full, &kw.output_format);
    scores.push(DimensionScore {
        name: "outputFormat",
        score: stepped(format.len(), 1, 2, 0.4, 0.7),
        signal: keyword_signal("format", &format),
    });

    // referenceComplexity
    let reference = matched(full, &kw.reference);
    scores.push(DimensionScore {
        name: "referenceComplexity",
        score: stepped(reference.len(), 1, 2, 0.3, 0.5),
        signal: keyword_signal("reference", &reference),
    });

    // negationComplexity
    let negation = matched(full, &kw.negation);
    scores.push(DimensionScore {
        name: "negationComplexity",
        score: stepped(negation.len(), 2, 3, 0.3, 0.5),
        signal: keyword_signal("negation", &negation),
    });

    // domainSpecificity
    let domain = matched(full, &kw.domain);
    scores.push(DimensionScore {
        name: "domainSpecificity",
        score: stepped(domain.len(), 1, 2, 0.5, 0.8),
        signal: keyword_signal("domain", &domain),
    });

    // agenticTask
    let agentic = matched(full, &kw.agentic);
    let agentic_score = match agentic.len() {
        n if n >= 4 => 1.0,
        3 => 0.6,
        n if n >= 1 => 0.2,
        _ => 0.0,
    };
    scores.push(DimensionScore {
        name: "agenticTask",
        score: agentic_score,
        signal: keyword_signal("agentic", &agentic),
    });

    DimensionBreakdown {
        scores,
        agentic_score,
        reasoning_hits,
    }
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn breakdown(full: &str, user: &str, tokens: u64) -> DimensionBreakdown {
        score_dimensions(full, user, tokens, &ScoringConfig::default())
    }

    fn score_of(b: &DimensionBreakdown, name: &str) -> f64 {
        b.scores
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.score)
            .unwrap_or_else(|| std::panic::panic_any(format!("missing dimension {name}")))
    }

    // -- tokenCount ------------------------------------------------------

    #[test]
    fn test_token_count_short_scores_negative() {
        let b = breakdown("hello there", "hello there", 10);
        assert!((score_of(&b, "tokenCount") + 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_token_count_long_scores_positive() {
        let b = breakdown("x", "x", 600);
        assert!((score_of(&b, "tokenCount") - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_token_count_middle_scores_zero() {
        let b = breakdown("x", "x", 200);
        assert!(score_of(&b, "tokenCount").abs() < f64::EPSILON);
    }

    // -- codePresence ----------------------------------------------------

    #[test]
    fn test_code_two_keywords_scores_full() {
        let b = breakdown("write a function using async calls", "", 100);
        assert!((score_of(&b, "codePresence") - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_code_one_keyword_scores_half() {
        let b = breakdown("write a function for me", "", 100);
        assert!((score_of(&b, "codePresence") - 0.5).abs() < f64::EPSILON);
    }

    // -- reasoningMarkers uses the user prompt only ----------------------

    #[test]
    fn test_reasoning_ignores_system_prompt() {
        // "step by step" and "prove" only in the full (system) text.
        let b = breakdown(
            "think step by step and prove it what time is it",
            "what time is it",
            100,
        );
        assert!(score_of(&b, "reasoningMarkers").abs() < f64::EPSILON);
        assert_eq!(b.reasoning_hits, 0);
    }

    #[test]
    fn test_reasoning_counts_user_prompt() {
        let b = breakdown(
            "prove the theorem step by step",
            "prove the theorem step by step",
            100,
        );
        assert!((score_of(&b, "reasoningMarkers") - 1.0).abs() < f64::EPSILON);
        assert!(b.reasoning_hits >= 2);
    }

    // -- simpleIndicators ------------------------------------------------

    #[test]
    fn test_simple_indicator_pulls_down() {
        let b = breakdown("what is the weather", "what is the weather", 100);
        assert!((score_of(&b, "simpleIndicators") + 1.0).abs() < f64::EPSILON);
    }

    // -- multiStepPatterns -----------------------------------------------

    #[test]
    fn test_multistep_numbered_list() {
        let b = breakdown("do this:\n1. first thing\n2. second thing", "", 100);
        assert!((score_of(&b, "multiStepPatterns") - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_multistep_absent() {
        let b = breakdown("just one plain request", "", 100);
        assert!(score_of(&b, "multiStepPatterns").abs() < f64::EPSILON);
    }

    // -- questionComplexity ----------------------------------------------

    #[test]
    fn test_question_many_marks() {
        let b = breakdown("", "a? b? c? d?", 100);
        assert!((score_of(&b, "questionComplexity") - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_question_cjk_interrogatives_without_marks() {
        let b = breakdown("", "如何部署服务 如何配置网络", 100);
        assert!((score_of(&b, "questionComplexity") - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_question_few_marks_scores_zero() {
        let b = breakdown("", "what now?", 100);
        assert!(score_of(&b, "questionComplexity").abs() < f64::EPSILON);
    }

    // -- agenticTask -----------------------------------------------------

    #[test]
    fn test_agentic_levels() {
        let none = breakdown("plain text request", "", 100);
        assert!(none.agentic_score.abs() < f64::EPSILON);

        let one = breakdown("please fix this", "", 100);
        assert!((one.agentic_score - 0.2).abs() < f64::EPSILON);

        let four = breakdown("read the file then fix, verify and debug it", "", 100);
        assert!((four.agentic_score - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_agentic_score_matches_dimension_score() {
        let b = breakdown("fix and verify and debug everything", "", 100);
        assert!((b.agentic_score - score_of(&b, "agenticTask")).abs() < f64::EPSILON);
    }

    // -- signals ---------------------------------------------------------

    #[test]
    fn test_signal_lists_matched_keywords() {
        let b = breakdown("write a function in a class", "", 100);
        let code = b
            .scores
            .iter()
            .find(|d| d.name == "codePresence")
            .and_then(|d| d.signal.clone())
            .unwrap_or_default();
        assert!(code.starts_with("code ("), "unexpected signal: {code}");
        assert!(code.contains("function"));
        assert!(code.contains("class"));
    }

    #[test]
    fn test_inactive_dimension_has_no_signal() {
        let b = breakdown("plain words only", "plain words only", 100);
        let domain = b.scores.iter().find(|d| d.name == "domainSpecificity");
        assert!(domain.and_then(|d| d.signal.clone()).is_none());
    }

    #[test]
    fn test_always_fifteen_dimensions() {
        let b = breakdown("", "", 100);
        assert_eq!(b.scores.len(), 15);
    }
}
