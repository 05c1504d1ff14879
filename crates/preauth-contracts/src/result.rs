//! The adjudication result returned to the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decision::{ConfidenceLevel, DecisionKind, ServiceLineDecision};
use crate::review::ReviewAssessment;
use crate::rules::RuleOutcome;
use crate::screening::HdReport;
use crate::trace::{DecidingLayer, DecisionTrace};
use crate::validation::ValidationReport;

/// Unique identifier for one adjudication run.
///
/// Appears in the trace and in every log line the orchestrator emits for
/// the run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AdjudicationId(pub uuid::Uuid);

impl AdjudicationId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for AdjudicationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AdjudicationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything the engine concluded about one clinical request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjudicationResult {
    pub adjudication_id: AdjudicationId,
    pub request_id: String,
    pub patient_id: String,
    pub overall_decision: DecisionKind,
    /// Mean confidence across the line decisions.
    pub overall_confidence: f64,
    pub overall_confidence_level: ConfidenceLevel,
    /// One decision per input service line, in input order.
    pub service_decisions: Vec<ServiceLineDecision>,
    pub review_assessments: Vec<ReviewAssessment>,
    /// True when any line requires human review.
    pub flagged_for_review: bool,
    /// Sequences of every line that requires human review, in input order.
    pub flagged_sequences: Vec<u32>,
    pub deciding_layer: DecidingLayer,
    pub trace: DecisionTrace,
    pub hd_report: HdReport,
    /// Absent when HD screening ended the run before rule evaluation.
    pub rule_outcome: Option<RuleOutcome>,
    pub validation_reports: Vec<ValidationReport>,
    pub hd_blocked: bool,
    pub policy_consulted: bool,
    pub reasoning_consulted: bool,
    pub total_requested: f64,
    pub total_approved: f64,
    pub total_denied: f64,
    pub completed_at: DateTime<Utc>,
}

impl AdjudicationResult {
    pub fn decision_for(&self, sequence: u32) -> Option<&ServiceLineDecision> {
        self.service_decisions.iter().find(|d| d.sequence == sequence)
    }

    pub fn assessment_for(&self, sequence: u32) -> Option<&ReviewAssessment> {
        self.review_assessments.iter().find(|a| a.sequence == sequence)
    }
}

/// `(requested, approved, denied)` totals over a decision set.
pub fn totals(decisions: &[ServiceLineDecision]) -> (f64, f64, f64) {
    decisions.iter().fold((0.0, 0.0, 0.0), |(req, app, den), d| {
        let requested = d.cost();
        match d.decision {
            DecisionKind::Approved => (req + requested, app + d.approved_amount.unwrap_or(0.0), den),
            DecisionKind::Denied => (req + requested, app, den + requested),
            _ => (req + requested, app, den),
        }
    })
}
