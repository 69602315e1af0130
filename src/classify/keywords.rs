//! Keyword lists and pattern constants for the rule classifier.
//!
//! Lists are data, not code: every keyword-matching dimension works by
//! case-insensitive substring inclusion over these sequences, so deployments
//! can replace any list through [`KeywordConfig`](crate::config::KeywordConfig)
//! without touching the scoring logic. Defaults are multilingual
//! (English + CJK).

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

fn owned(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

/// Default weights for all 15 scoring dimensions.
pub fn default_dimension_weights() -> HashMap<String, f64> {
    HashMap::from([
        ("tokenCount".to_string(), 0.08),
        ("codePresence".to_string(), 0.15),
        ("reasoningMarkers".to_string(), 0.18),
        ("technicalTerms".to_string(), 0.10),
        ("creativeMarkers".to_string(), 0.05),
        ("simpleIndicators".to_string(), 0.02),
        ("multiStepPatterns".to_string(), 0.12),
        ("questionComplexity".to_string(), 0.05),
        ("imperativeVerbs".to_string(), 0.03),
        ("constraintCount".to_string(), 0.04),
        ("outputFormat".to_string(), 0.03),
        ("referenceComplexity".to_string(), 0.02),
        ("negationComplexity".to_string(), 0.01),
        ("domainSpecificity".to_string(), 0.02),
        ("agenticTask".to_string(), 0.04),
    ])
}

pub fn default_code_keywords() -> Vec<String> {
    owned(&[
        "function", "def ", "class", "import", "struct", "enum", "async", "await", "const ",
        "lambda", "component", "react", "sql", "regex", "```", "函数", "代码",
    ])
}

pub fn default_reasoning_keywords() -> Vec<String> {
    owned(&[
        "prove", "theorem", "derive", "step by step", "chain of thought", "formally",
        "mathematical", "proof", "logically", "rigorous", "证明", "推导", "逐步", "一步一步",
        "定理",
    ])
}

pub fn default_technical_keywords() -> Vec<String> {
    owned(&[
        "algorithm", "optimize", "architecture", "distributed", "kubernetes", "microservice",
        "database", "infrastructure", "concurrency", "latency", "throughput", "scalab",
        "encryption", "protocol", "compiler", "virtual", "component", "navigation", "accessib",
        "算法", "架构", "数据库", "并发",
    ])
}

pub fn default_creative_keywords() -> Vec<String> {
    owned(&[
        "story", "poem", "compose", "brainstorm", "creative", "imagine", "fiction", "lyrics",
        "故事", "诗歌", "创意",
    ])
}

pub fn default_simple_keywords() -> Vec<String> {
    owned(&[
        "what is", "what's", "define", "translate", "hello", "yes or no", "capital of",
        "who is", "when was", "how old", "什么是", "是什么", "翻译", "你好",
    ])
}

pub fn default_imperative_keywords() -> Vec<String> {
    owned(&[
        "build", "create", "implement", "design", "develop", "construct", "generate", "deploy",
        "configure", "set up", "refactor", "实现", "构建", "编写",
    ])
}

pub fn default_constraint_keywords() -> Vec<String> {
    owned(&[
        "at most", "at least", "no more than", "within", "under ", "maximum", "minimum",
        "limit", "budget", "constraint", "不超过", "至少", "限制",
    ])
}

pub fn default_output_format_keywords() -> Vec<String> {
    owned(&[
        "json", "yaml", "xml", "csv", "markdown", "table", "bullet", "schema", "format as",
        "structured", "label", "表格", "格式",
    ])
}

pub fn default_reference_keywords() -> Vec<String> {
    owned(&[
        "above", "below", "previous", "earlier", "the docs", "the code", "attached",
        "aforementioned", "as mentioned", "上面", "之前", "如上",
    ])
}

pub fn default_negation_keywords() -> Vec<String> {
    owned(&[
        "don't", "do not", "avoid", "never", "without", "except", "exclude", "must not",
        "不要", "避免", "除了",
    ])
}

pub fn default_domain_keywords() -> Vec<String> {
    owned(&[
        "quantum", "fpga", "vlsi", "risc-v", "asic", "photonics", "genomics", "proteomics",
        "homomorphic", "zero-knowledge", "lattice-based", "blockchain", "cryptograph",
        "neural network", "量子", "区块链",
    ])
}

pub fn default_agentic_keywords() -> Vec<String> {
    owned(&[
        "read the file", "read file", "look at", "check the", "open the", "edit", "modify",
        "update the", "change the", "write to", "create file", "execute", "install", "compile",
        "run the", "after that", "and also", "once done", "fix", "debug", "until it works",
        "keep trying", "iterate", "make sure", "verify", "confirm", "修改", "执行", "运行",
    ])
}

pub fn default_cjk_question_words() -> Vec<String> {
    owned(&["怎么", "如何", "怎样"])
}

/// Multi-step instruction patterns (English + CJK), matched against the
/// lowercased full text. The `with ... and` pattern catches compound
/// requirement clauses ("build X with A and B").
pub static MULTI_STEP_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?m)^\s*\d+\.\s",
        r"(?m)^\s*\d+\)\s",
        r"(?i)\bstep\s+\d",
        r"(?i)\bfirst\b.*\bthen\b",
        r"(?i)\bwith\b.+\band\b",
        r"第\s*\d+\s*步",
        r"步骤",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap_or_else(|e| std::panic::panic_any(format!("pattern: {e}"))))
    .collect()
});

/// Signal-prefix → dimension-name map used to resolve feedback signals
/// back to the dimension that emitted them.
pub static SIGNAL_PREFIXES: &[(&str, &str)] = &[
    ("tokens", "tokenCount"),
    ("code", "codePresence"),
    ("reasoning", "reasoningMarkers"),
    ("technical", "technicalTerms"),
    ("creative", "creativeMarkers"),
    ("simple", "simpleIndicators"),
    ("multistep", "multiStepPatterns"),
    ("question", "questionComplexity"),
    ("imperative", "imperativeVerbs"),
    ("constraint", "constraintCount"),
    ("format", "outputFormat"),
    ("reference", "referenceComplexity"),
    ("negation", "negationComplexity"),
    ("domain", "domainSpecificity"),
    ("agentic", "agenticTask"),
];

/// Resolve a signal string (e.g. `"code (function, class)"`) to the name of
/// the dimension that produced it.
pub fn resolve_signal(signal: &str) -> Option<&'static str> {
    let prefix = signal
        .split([' ', '(', ':'])
        .next()
        .unwrap_or(signal)
        .trim();
    SIGNAL_PREFIXES
        .iter()
        .find(|(p, _)| *p == prefix)
        .map(|(_, dim)| *dim)
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weights_cover_fifteen_dimensions() {
        assert_eq!(default_dimension_weights().len(), 15);
    }

    #[test]
    fn test_multi_step_patterns_compile() {
        assert_eq!(MULTI_STEP_PATTERNS.len(), 7);
    }

    #[test]
    fn test_multi_step_matches_numbered_list() {
        let text = "please do:\n1. step one\n2. step two";
        assert!(MULTI_STEP_PATTERNS.iter().any(|re| re.is_match(text)));
    }

    #[test]
    fn test_multi_step_matches_compound_requirements() {
        let text = "build a table with keyboard navigation and accessible labels";
        assert!(MULTI_STEP_PATTERNS.iter().any(|re| re.is_match(text)));
    }

    #[test]
    fn test_multi_step_matches_cjk() {
        assert!(MULTI_STEP_PATTERNS.iter().any(|re| re.is_match("第2步 完成部署")));
        assert!(MULTI_STEP_PATTERNS.iter().any(|re| re.is_match("按照步骤操作")));
    }

    #[test]
    fn test_resolve_signal_with_parenthesised_detail() {
        assert_eq!(resolve_signal("code (function, class)"), Some("codePresence"));
        assert_eq!(resolve_signal("tokens (26)"), Some("tokenCount"));
        assert_eq!(resolve_signal("agentic (fix, verify)"), Some("agenticTask"));
    }

    #[test]
    fn test_resolve_signal_bare_prefix() {
        assert_eq!(resolve_signal("multistep"), Some("multiStepPatterns"));
    }

    #[test]
    fn test_resolve_signal_unknown_returns_none() {
        assert_eq!(resolve_signal("mystery (1)"), None);
        assert_eq!(resolve_signal(""), None);
    }

    #[test]
    fn test_every_prefix_maps_to_known_weight() {
        let weights = default_dimension_weights();
        for (_, dim) in SIGNAL_PREFIXES {
            assert!(weights.contains_key(*dim), "unknown dimension {dim}");
        }
    }
}
