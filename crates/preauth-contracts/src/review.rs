//! Human-in-the-loop review types.
//!
//! `ReviewPriority` is totally ordered (`Auto < Low < Medium < High <
//! Urgent`). Escalation is `max`, so a later rule can raise the priority but
//! never lower it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How soon a human must look at a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewPriority {
    Auto,
    Low,
    Medium,
    High,
    Urgent,
}

impl ReviewPriority {
    /// Raise to `other` if it is higher; never lowers.
    pub fn escalate(self, other: ReviewPriority) -> ReviewPriority {
        self.max(other)
    }

    /// Service-level target for completing the review.
    pub fn sla(self) -> &'static str {
        match self {
            ReviewPriority::Auto => "N/A",
            ReviewPriority::Low => "Within 7 days",
            ReviewPriority::Medium => "Within 3 days",
            ReviewPriority::High => "Within 24 hours",
            ReviewPriority::Urgent => "Within 4 hours",
        }
    }
}

/// Why a line was routed to a reviewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewReason {
    LowConfidence,
    HighCost,
    Experimental,
    ComplexCase,
    PolicyConflict,
    /// A post-decision validator already forced review on the line.
    ValidatorFlag,
    /// A required health declaration is missing.
    UndeclaredCondition,
}

impl ReviewReason {
    pub fn message(self) -> &'static str {
        match self {
            ReviewReason::LowConfidence => "Low confidence score",
            ReviewReason::HighCost => "High cost procedure",
            ReviewReason::Experimental => "Experimental or investigational",
            ReviewReason::ComplexCase => "Complex medical case",
            ReviewReason::PolicyConflict => "Conflicting policy guidance",
            ReviewReason::ValidatorFlag => "Flagged by post-decision validation",
            ReviewReason::UndeclaredCondition => "Undeclared health condition",
        }
    }
}

impl fmt::Display for ReviewReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// What happens to the line once review routing is decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinalAction {
    AutoApproved,
    AutoDenied,
    RequiresReview,
}

/// The reviewer's verdict for one service line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewAssessment {
    pub sequence: u32,
    pub requires_review: bool,
    pub priority: ReviewPriority,
    pub reasons: Vec<ReviewReason>,
    pub final_action: FinalAction,
    pub recommended_reviewer: String,
    pub estimated_review_time: String,
    #[serde(default)]
    pub reviewer_notes: String,
}

impl ReviewAssessment {
    /// Reasons joined for display on the decision line.
    pub fn reason_summary(&self) -> String {
        self.reasons
            .iter()
            .map(|r| r.message())
            .collect::<Vec<_>>()
            .join("; ")
    }
}
