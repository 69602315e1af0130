//! Rule-based tier classification.
//!
//! Splits into three layers: [`keywords`] holds the multilingual keyword
//! lists and pattern constants (data), [`dimensions`] scores the 15
//! individual dimensions, and [`classifier`] aggregates them into a
//! [`ScoringResult`] with confidence calibration and hysteresis.

pub mod classifier;
pub mod dimensions;
pub mod keywords;

// Re-exports for convenience
pub use classifier::{RuleClassifier, ScoringResult, FUZZY_WIDTH};
pub use dimensions::{DimensionBreakdown, DimensionScore};
