//! Health-declaration (HD) types.
//!
//! The condition table says which diagnoses must have been declared at policy
//! inception; `HdRecord`s are what the member actually declared. The
//! validator compares the two and produces an `HdReport`.

use serde::{Deserialize, Serialize};

/// Clinical severity attached to an HD-required condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Medium,
    High,
    Critical,
}

/// One row of the HD-required condition table.
///
/// `code` may be a full code ("E11.9"), a 3-character prefix ("E11"), or a
/// 1-character category ("C" for all malignant neoplasms).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HdCondition {
    pub code: String,
    pub name: String,
    pub category: String,
    pub severity: Severity,
    /// Falls back to the screening default when absent.
    #[serde(default)]
    pub waiting_period_days: Option<i64>,
}

/// A condition the member declared.
///
/// Dates are kept as submitted; a malformed date is a data-quality issue the
/// validator reports rather than a parse failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HdRecord {
    pub member_id: String,
    pub icd10_code: String,
    pub condition_name: String,
    #[serde(default)]
    pub diagnosis_date: Option<String>,
    #[serde(default)]
    pub declaration_date: Option<String>,
    #[serde(default = "default_declared_by")]
    pub declared_by: String,
}

fn default_declared_by() -> String {
    "member".to_string()
}

/// What the orchestrator must do after HD screening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HdOutcome {
    /// No diagnosis requires a declaration.
    NotRequired,
    /// Every required condition was declared and clears the waiting period.
    Proceed,
    /// A required condition was never declared. Terminal; routes to review.
    HitlRequired,
    /// A declared pre-existing condition is still inside its waiting period.
    /// Terminal; denies without review.
    DenyPreExisting,
}

impl HdOutcome {
    pub fn can_proceed(self) -> bool {
        matches!(self, HdOutcome::NotRequired | HdOutcome::Proceed)
    }

    pub fn label(self) -> &'static str {
        match self {
            HdOutcome::NotRequired => "NOT_REQUIRED",
            HdOutcome::Proceed => "PROCEED_TO_ADJUDICATION",
            HdOutcome::HitlRequired => "HITL_REVIEW_REQUIRED",
            HdOutcome::DenyPreExisting => "DENY_PRE_EXISTING",
        }
    }
}

/// A diagnosis on the claim that hit the condition table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedCondition {
    /// The diagnosis code as it appeared on the claim.
    pub icd10_code: String,
    pub diagnosis_display: String,
    /// The table row it matched.
    pub condition: HdCondition,
}

/// Per-condition result of the declaration check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionCheck {
    pub condition_name: String,
    pub icd10_code: String,
    pub declared: bool,
    pub diagnosis_date: Option<String>,
    pub declaration_date: Option<String>,
    pub is_pre_existing: bool,
    pub within_waiting_period: bool,
    pub can_proceed: bool,
    pub requires_hitl: bool,
    pub reason: String,
}

/// Full screening report for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HdReport {
    pub member_id: String,
    pub outcome: HdOutcome,
    pub conditions_found: Vec<MatchedCondition>,
    pub checks: Vec<ConditionCheck>,
    /// Names of the conditions responsible for a terminal outcome.
    pub flagged_conditions: Vec<String>,
    pub reason: String,
    /// Malformed dates and similar data problems that did not block.
    pub data_quality_flags: Vec<String>,
}

impl HdReport {
    /// A report for a request with no HD-relevant diagnoses.
    pub fn not_required(member_id: impl Into<String>) -> Self {
        Self {
            member_id: member_id.into(),
            outcome: HdOutcome::NotRequired,
            conditions_found: Vec::new(),
            checks: Vec::new(),
            flagged_conditions: Vec::new(),
            reason: "No HD validation required".to_string(),
            data_quality_flags: Vec::new(),
        }
    }

    /// True when at least one diagnosis required a declaration.
    pub fn validation_required(&self) -> bool {
        !self.conditions_found.is_empty()
    }

    pub fn can_proceed(&self) -> bool {
        self.outcome.can_proceed()
    }

    pub fn requires_hitl(&self) -> bool {
        self.outcome == HdOutcome::HitlRequired
    }
}

/// A member's declared conditions, for operator tooling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberHdSummary {
    pub member_id: String,
    pub total_declared_conditions: usize,
    pub declared_conditions: Vec<HdRecord>,
}
