//! Per-line decisions and the overall verdict derived from them.

use serde::{Deserialize, Serialize};

use crate::claim::ServiceLine;

/// Adjudication outcome for a line, or for the claim as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionKind {
    Approved,
    Denied,
    /// Partially approved (mixed outcome across lines).
    Partial,
    /// Needs a human before anything is paid or refused.
    Pending,
    /// Processing error on this line.
    Error,
}

impl DecisionKind {
    /// Derive the claim-level verdict from the per-line decisions.
    ///
    /// all approved → Approved; all denied → Denied; any pending → Pending;
    /// mixed with some approved → Partial; anything else → Pending.
    pub fn overall<'a>(decisions: impl IntoIterator<Item = &'a ServiceLineDecision>) -> Self {
        let mut total = 0usize;
        let mut approved = 0usize;
        let mut denied = 0usize;
        let mut pending = 0usize;

        for d in decisions {
            total += 1;
            match d.decision {
                DecisionKind::Approved => approved += 1,
                DecisionKind::Denied => denied += 1,
                DecisionKind::Pending => pending += 1,
                DecisionKind::Partial | DecisionKind::Error => {}
            }
        }

        if total > 0 && approved == total {
            DecisionKind::Approved
        } else if total > 0 && denied == total {
            DecisionKind::Denied
        } else if pending > 0 {
            DecisionKind::Pending
        } else if approved > 0 {
            DecisionKind::Partial
        } else {
            DecisionKind::Pending
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DecisionKind::Approved => "APPROVED",
            DecisionKind::Denied => "DENIED",
            DecisionKind::Partial => "PARTIAL",
            DecisionKind::Pending => "PENDING",
            DecisionKind::Error => "ERROR",
        }
    }
}

/// Coarse confidence band shown to reviewers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    /// ≥ 0.8 → High, ≥ 0.5 → Medium, otherwise Low.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            ConfidenceLevel::High
        } else if score >= 0.5 {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }
}

/// The decision for one service line.
///
/// Created by whichever layer first resolves the line, then refined in place
/// by later layers: confidence only goes down, the review flag is only ever
/// OR'd on. A decision is never replaced once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceLineDecision {
    pub sequence: u32,
    pub service_code: String,
    pub service_description: String,
    pub requested_amount: Option<f64>,
    pub decision: DecisionKind,
    pub approved_amount: Option<f64>,
    pub confidence: f64,
    pub confidence_level: ConfidenceLevel,
    pub explanation: String,
    #[serde(default)]
    pub clinical_rationale: Option<String>,
    #[serde(default)]
    pub policy_references: Vec<String>,
    #[serde(default)]
    pub rules_applied: Vec<String>,
    #[serde(default)]
    pub requires_human_review: bool,
    #[serde(default)]
    pub review_reason: Option<String>,
    #[serde(default)]
    pub medical_necessity_met: Option<bool>,
}

impl ServiceLineDecision {
    /// Start a decision for `line` with the given verdict and confidence.
    ///
    /// The approved amount defaults to the requested amount for approvals and
    /// zero for everything else.
    pub fn for_line(
        line: &ServiceLine,
        decision: DecisionKind,
        confidence: f64,
        explanation: impl Into<String>,
    ) -> Self {
        let confidence = confidence.clamp(0.0, 1.0);
        let approved_amount = match decision {
            DecisionKind::Approved => line.requested_amount,
            _ => Some(0.0),
        };
        Self {
            sequence: line.sequence,
            service_code: line.code.clone(),
            service_description: line.description.clone(),
            requested_amount: line.requested_amount,
            decision,
            approved_amount,
            confidence,
            confidence_level: ConfidenceLevel::from_score(confidence),
            explanation: explanation.into(),
            clinical_rationale: None,
            policy_references: Vec::new(),
            rules_applied: Vec::new(),
            requires_human_review: false,
            review_reason: None,
            medical_necessity_met: None,
        }
    }

    /// Replace the confidence score, keeping the band in sync.
    pub fn set_confidence(&mut self, confidence: f64) {
        self.confidence = confidence.clamp(0.0, 1.0);
        self.confidence_level = ConfidenceLevel::from_score(self.confidence);
    }

    /// Multiply the confidence by `factor` (a downgrade when `factor < 1`).
    pub fn scale_confidence(&mut self, factor: f64) {
        self.set_confidence(self.confidence * factor);
    }

    /// Force human review. An existing reason is kept.
    pub fn flag_for_review(&mut self, reason: impl Into<String>) {
        self.requires_human_review = true;
        if self.review_reason.is_none() {
            self.review_reason = Some(reason.into());
        }
    }

    /// Force human review and replace whatever reason was recorded before.
    pub fn override_review_reason(&mut self, reason: impl Into<String>) {
        self.requires_human_review = true;
        self.review_reason = Some(reason.into());
    }

    /// The requested amount, treating an absent amount as zero.
    pub fn cost(&self) -> f64 {
        self.requested_amount.unwrap_or(0.0)
    }
}
