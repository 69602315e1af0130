//! Request fingerprinting.
//!
//! Produces a stable key summarising the structure and content of a
//! (prompt, system prompt) pair:
//!
//! ```text
//! <sorted feature tags>|<content digest>|<system digest>
//! ```
//!
//! Feature tags come from the fixed set `CODE`, `REASONING`, `MULTISTEP`,
//! `Q1`..`Q3`, and a length bucket (`SHORT`, `MEDIUM`, `LONG`, `XLONG`).
//! The digests are the normalised texts themselves (whitespace collapsed,
//! quotes unified, decorative punctuation stripped, CJK punctuation folded,
//! lowercased), truncated past 150 characters. Two near-duplicate prompts
//! therefore produce either identical fingerprints or fingerprints that
//! [`fingerprints_similar`] accepts.

use regex::Regex;
use std::sync::LazyLock;

/// Maximum digest length before truncation kicks in.
const DIGEST_MAX: usize = 150;
/// Prefix kept when truncating.
const DIGEST_PREFIX: usize = 100;
/// Suffix kept when truncating.
const DIGEST_SUFFIX: usize = 50;
/// Maximum normalised edit distance for two digests to count as similar.
const SIMILARITY_BUDGET: f64 = 0.10;

/// Reasoning words scanned for the `REASONING` tag (English + CJK).
static REASONING_WORDS: &[&str] = &[
    "step", "prove", "explain", "why", "how", "分析", "证明", "解释", "步骤",
];

static DEF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bdef\s+\w+").unwrap_or_else(|e| std::panic::panic_any(format!("pattern: {e}"))));
static CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bclass\s+\w+").unwrap_or_else(|e| std::panic::panic_any(format!("pattern: {e}"))));
static BRACES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[^{}]*\}|\[[^\[\]]*\]").unwrap_or_else(|e| std::panic::panic_any(format!("pattern: {e}"))));
static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?[a-zA-Z][^<>]*>").unwrap_or_else(|e| std::panic::panic_any(format!("pattern: {e}"))));
static INLINE_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`[^`]+`").unwrap_or_else(|e| std::panic::panic_any(format!("pattern: {e}"))));
static NUMBERED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*\d+[.)]\s").unwrap_or_else(|e| std::panic::panic_any(format!("pattern: {e}"))));
static STEP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bstep\s+\d").unwrap_or_else(|e| std::panic::panic_any(format!("pattern: {e}"))));
static CJK_STEP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"第\s*\d+\s*步|步骤").unwrap_or_else(|e| std::panic::panic_any(format!("pattern: {e}"))));

/// Compute the fingerprint for a (prompt, system prompt) pair.
pub fn fingerprint(prompt: &str, system_prompt: Option<&str>) -> String {
    let tags = feature_tags(prompt);
    format!(
        "{}|{}|{}",
        tags.join(","),
        digest(prompt),
        digest(system_prompt.unwrap_or(""))
    )
}

/// Approximate similarity between two fingerprints.
///
/// Feature tag blocks must match exactly; content digests must be within a
/// 10% edit distance, approximated as (differing positions in the common
/// prefix) + (length difference), normalised by the longer length.
pub fn fingerprints_similar(a: &str, b: &str) -> bool {
    let mut pa = a.splitn(3, '|');
    let mut pb = b.splitn(3, '|');
    let (tags_a, content_a) = (pa.next().unwrap_or(""), pa.next().unwrap_or(""));
    let (tags_b, content_b) = (pb.next().unwrap_or(""), pb.next().unwrap_or(""));

    if tags_a != tags_b {
        return false;
    }

    let ca: Vec<char> = content_a.chars().collect();
    let cb: Vec<char> = content_b.chars().collect();
    let max_len = ca.len().max(cb.len());
    if max_len == 0 {
        return true;
    }

    let prefix_diffs = ca.iter().zip(cb.iter()).filter(|(x, y)| x != y).count();
    let length_diff = ca.len().abs_diff(cb.len());
    let distance = (prefix_diffs + length_diff) as f64 / max_len as f64;
    distance <= SIMILARITY_BUDGET
}

/// Estimate the token count of a request as `ceil((system + 1 + prompt) / 4)`
/// characters.
pub fn estimated_tokens(prompt: &str, system_prompt: Option<&str>) -> u64 {
    let chars = system_prompt.map(|s| s.chars().count()).unwrap_or(0)
        + 1
        + prompt.chars().count();
    chars.div_ceil(4) as u64
}

/// Extract the sorted feature tags of a prompt.
fn feature_tags(prompt: &str) -> Vec<&'static str> {
    let mut tags = Vec::with_capacity(4);
    let lower = prompt.to_lowercase();

    if has_code_markers(prompt, &lower) {
        tags.push("CODE");
    }
    if REASONING_WORDS.iter().any(|w| lower.contains(*w)) {
        tags.push("REASONING");
    }
    if NUMBERED_RE.is_match(prompt) || STEP_RE.is_match(prompt) || CJK_STEP_RE.is_match(prompt) {
        tags.push("MULTISTEP");
    }

    let questions = prompt.matches('?').count() + prompt.matches('？').count();
    match questions.min(3) {
        1 => tags.push("Q1"),
        2 => tags.push("Q2"),
        3 => tags.push("Q3"),
        _ => {}
    }

    let tokens = prompt.chars().count().div_ceil(4);
    tags.push(if tokens < 50 {
        "SHORT"
    } else if tokens < 200 {
        "MEDIUM"
    } else if tokens < 1000 {
        "LONG"
    } else {
        "XLONG"
    });

    tags.sort_unstable();
    tags
}

fn has_code_markers(raw: &str, lower: &str) -> bool {
    lower.contains("function")
        || raw.contains("```")
        || DEF_RE.is_match(raw)
        || CLASS_RE.is_match(raw)
        || BRACES_RE.is_match(raw)
        || TAG_RE.is_match(raw)
        || INLINE_CODE_RE.is_match(raw)
}

/// Normalise a text into its content digest.
fn digest(text: &str) -> String {
    let normalized = normalize(text);
    truncate_digest(&normalized)
}

/// Collapse whitespace, unify quotes, fold CJK punctuation, strip decorative
/// punctuation, and lowercase.
fn normalize(text: &str) -> String {
    let folded: String = text
        .chars()
        .map(|c| match c {
            '，' | '、' => ',',
            '。' => '.',
            '！' => '!',
            '？' => '?',
            '；' => ';',
            '：' => ':',
            '（' => '(',
            '）' => ')',
            '【' => '[',
            '】' => ']',
            '\u{2018}' | '\u{2019}' | '\u{201C}' | '\u{201D}' | '「' | '」' | '\u{00B4}'
            | '`' => '"',
            other => other,
        })
        .collect();

    let stripped: String = folded
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();

    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Keep `prefix + "..." + suffix` for digests past [`DIGEST_MAX`] chars.
fn truncate_digest(normalized: &str) -> String {
    let chars: Vec<char> = normalized.chars().collect();
    if chars.len() <= DIGEST_MAX {
        return normalized.to_string();
    }
    let prefix: String = chars[..DIGEST_PREFIX].iter().collect();
    let suffix: String = chars[chars.len() - DIGEST_SUFFIX..].iter().collect();
    format!("{prefix}...{suffix}")
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // -- stability -------------------------------------------------------

    #[test]
    fn test_fingerprint_is_stable() {
        let a = fingerprint("Explain how Rust ownership works", Some("Be concise"));
        let b = fingerprint("Explain how Rust ownership works", Some("Be concise"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_fingerprint_shape() {
        let fp = fingerprint("What is 2+2?", None);
        let parts: Vec<&str> = fp.splitn(3, '|').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "Q1,SHORT");
        assert_eq!(parts[1], "what is 2 2");
        assert_eq!(parts[2], "");
    }

    // -- feature tags ----------------------------------------------------

    #[test]
    fn test_code_tag_from_fence() {
        let fp = fingerprint("fix this\n```rust\nfn main() {}\n```", None);
        assert!(fp.starts_with("CODE"), "fingerprint: {fp}");
    }

    #[test]
    fn test_code_tag_from_inline_backticks() {
        let fp = fingerprint("use `println` for output", None);
        assert!(fp.contains("CODE"));
    }

    #[test]
    fn test_reasoning_tag_multilingual() {
        assert!(fingerprint("prove this statement", None).contains("REASONING"));
        assert!(fingerprint("请证明这个结论", None).contains("REASONING"));
    }

    #[test]
    fn test_multistep_tag_from_numbered_list() {
        let fp = fingerprint("1. first\n2. second", None);
        assert!(fp.contains("MULTISTEP"));
    }

    #[test]
    fn test_question_tag_clamped_at_three() {
        let fp = fingerprint("a? b? c? d? e?", None);
        assert!(fp.contains("Q3"));
        assert!(!fp.contains("Q1"));
    }

    #[test]
    fn test_fullwidth_question_marks_counted() {
        let fp = fingerprint("这是什么？", None);
        assert!(fp.contains("Q1"));
    }

    #[test]
    fn test_length_buckets() {
        assert!(fingerprint("short", None).contains("SHORT"));
        let medium = "word ".repeat(50); // 250 chars -> 63 tokens
        assert!(fingerprint(&medium, None).contains("MEDIUM"));
        let long = "word ".repeat(200); // 1000 chars -> 250 tokens
        assert!(fingerprint(&long, None).contains("LONG"));
        let xlong = "word ".repeat(1000); // 5000 chars -> 1250 tokens
        assert!(fingerprint(&xlong, None).contains("XLONG"));
    }

    #[test]
    fn test_tags_sorted_lexicographically() {
        let fp = fingerprint("prove this?\n```code```", None);
        let tags = fp.splitn(2, '|').next().unwrap_or("");
        let mut sorted: Vec<&str> = tags.split(',').collect();
        let original = sorted.clone();
        sorted.sort_unstable();
        assert_eq!(original, sorted);
    }

    // -- normalisation ---------------------------------------------------

    #[test]
    fn test_digest_collapses_whitespace_and_case() {
        let a = fingerprint("Hello   WORLD", None);
        let b = fingerprint("hello world", None);
        assert_eq!(a, b);
    }

    #[test]
    fn test_digest_folds_cjk_punctuation() {
        let a = fingerprint("你好，世界！", None);
        let b = fingerprint("你好, 世界!", None);
        assert_eq!(a, b);
    }

    #[test]
    fn test_digest_truncation_past_150_chars() {
        let long: String = "abcdefghij".repeat(30); // 300 chars, no spaces
        let fp = fingerprint(&long, None);
        let content = fp.splitn(3, '|').nth(1).unwrap_or("");
        assert_eq!(content.chars().count(), DIGEST_PREFIX + 3 + DIGEST_SUFFIX);
        assert!(content.contains("..."));
    }

    // -- similarity ------------------------------------------------------

    #[test]
    fn test_similar_near_duplicates() {
        let a = fingerprint("Hello, world!", None);
        let b = fingerprint("hello world", None);
        assert!(fingerprints_similar(&a, &b));
    }

    #[test]
    fn test_dissimilar_different_content() {
        let a = fingerprint("What is 2+2?", None);
        let b = fingerprint("Explain quantum physics", None);
        assert!(!fingerprints_similar(&a, &b));
    }

    #[test]
    fn test_dissimilar_when_tags_differ() {
        let a = fingerprint("do the thing", None);
        let b = fingerprint("do the thing?", None); // adds Q1
        assert!(!fingerprints_similar(&a, &b));
    }

    #[test]
    fn test_similar_is_reflexive() {
        let fp = fingerprint("some request text", None);
        assert!(fingerprints_similar(&fp, &fp));
    }

    // -- token estimation ------------------------------------------------

    #[test]
    fn test_estimated_tokens_rounds_up() {
        // 1 + 1 + 7 = 9 chars -> ceil(9/4) = 3
        assert_eq!(estimated_tokens("seven77", Some("s")), 3);
    }

    #[test]
    fn test_estimated_tokens_no_system() {
        // 0 + 1 + 4 = 5 chars -> ceil(5/4) = 2
        assert_eq!(estimated_tokens("four", None), 2);
    }
}
