//! Reports produced by the post-decision validators.

use serde::{Deserialize, Serialize};

use crate::trace::Layer;

/// Risk band used by the financial and fraud validators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    LowMedium,
    Medium,
    High,
}

/// Per-line detail from a validator that scores lines individually.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineFinding {
    pub sequence: u32,
    pub valid: bool,
    pub score: f64,
    pub flags: Vec<String>,
}

/// The outcome of one validator pass over the working decision set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub validator: Layer,
    /// Request-level flags (e.g. "duplicate_request", "high_total_cost").
    pub flags: Vec<String>,
    /// Validator score. For necessity this is a quality score (1.0 = clean);
    /// for the risk validators it is a risk score (0.0 = clean).
    pub score: f64,
    pub risk_level: Option<RiskLevel>,
    /// Sequences this validator forced to human review.
    pub forced_review: Vec<u32>,
    #[serde(default)]
    pub lines: Vec<LineFinding>,
}

impl ValidationReport {
    pub fn new(validator: Layer) -> Self {
        Self {
            validator,
            flags: Vec::new(),
            score: 0.0,
            risk_level: None,
            forced_review: Vec::new(),
            lines: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.flags.is_empty() && self.forced_review.is_empty()
    }

    /// Trace verdict label for this report.
    pub fn verdict(&self) -> &'static str {
        if !self.forced_review.is_empty() {
            "REVIEW_FORCED"
        } else if !self.flags.is_empty() {
            "FLAGGED"
        } else {
            "PASS"
        }
    }
}
