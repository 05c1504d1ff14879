//! Trait seams of the adjudication pipeline.
//!
//! The orchestrator owns one boxed implementation of each:
//!
//! - `HealthScreen`:     pre-screening health-declaration check
//! - `RuleEngine`:       deterministic rule evaluation
//! - `PolicyRetriever`:  external policy search (untrusted, may fail)
//! - `ClinicalReasoner`: external clinical reasoning (untrusted, may fail)
//! - `Validator`:        one post-decision check; run as an ordered list
//! - `Reviewer`:         per-line HITL routing
//! - `TraceWriter`:      hash-chained decision trace sink
//!
//! `HdRecordStore` is consumed by `HealthScreen` implementations rather than
//! by the orchestrator directly.

use chrono::{DateTime, NaiveDate, Utc};

use preauth_contracts::{
    claim::ClinicalRequest,
    decision::ServiceLineDecision,
    error::PreauthResult,
    policy::PolicyHit,
    review::ReviewAssessment,
    rules::RuleOutcome,
    screening::{HdOutcome, HdRecord, HdReport},
    trace::{DecidingLayer, DecisionStep, DecisionTrace, Layer},
    validation::ValidationReport,
};

/// Health-declaration pre-screening.
pub trait HealthScreen: Send + Sync {
    /// Check the request's diagnoses against the member's declarations.
    ///
    /// `today` is supplied by the caller so waiting-period arithmetic is
    /// deterministic. A non-proceeding outcome ends the run.
    fn screen(
        &self,
        request: &ClinicalRequest,
        member_id: &str,
        policy_start: NaiveDate,
        today: NaiveDate,
    ) -> PreauthResult<HdReport>;
}

/// Declared-condition storage, owned outside the engine.
pub trait HdRecordStore: Send + Sync {
    fn get_records(&self, member_id: &str) -> PreauthResult<Vec<HdRecord>>;

    fn add_record(&self, member_id: &str, record: HdRecord) -> PreauthResult<()>;
}

/// Deterministic rule evaluation.
///
/// Must not call out to any collaborator. An outcome with
/// `auto_decision = None` continues the pipeline.
pub trait RuleEngine: Send + Sync {
    fn evaluate(&self, request: &ClinicalRequest) -> PreauthResult<RuleOutcome>;
}

/// External policy-passage search.
///
/// Failures and timeouts must surface as
/// `PreauthError::CollaboratorUnavailable`; the orchestrator falls back.
pub trait PolicyRetriever: Send + Sync {
    fn retrieve(
        &self,
        request: &ClinicalRequest,
        top_k: usize,
        min_relevance: f64,
    ) -> PreauthResult<Vec<PolicyHit>>;
}

/// External clinical reasoning.
///
/// Expected to return one decision per service line. Lines it leaves out are
/// filled with fallback decisions.
pub trait ClinicalReasoner: Send + Sync {
    fn reason(
        &self,
        request: &ClinicalRequest,
        rules: &RuleOutcome,
        hits: &[PolicyHit],
    ) -> PreauthResult<Vec<ServiceLineDecision>>;
}

/// One post-decision check.
///
/// Implementations may lower confidence and force review on the working
/// decisions. They never change a line's decision kind.
pub trait Validator: Send + Sync {
    /// The trace layer this validator reports under.
    fn layer(&self) -> Layer;

    fn validate(
        &self,
        request: &ClinicalRequest,
        decisions: &mut [ServiceLineDecision],
        now: DateTime<Utc>,
    ) -> PreauthResult<ValidationReport>;
}

/// Orchestration state visible to the reviewer.
#[derive(Debug, Clone, Copy)]
pub struct ReviewContext<'a> {
    /// Mean line confidence after validation.
    pub orchestration_confidence: f64,
    /// Which layer produced the line decisions (never `HealthDeclaration`
    /// unless the run was HD-blocked).
    pub decision_source: DecidingLayer,
    pub hd_outcome: HdOutcome,
    pub policy_hits: &'a [PolicyHit],
}

/// Per-line HITL routing.
pub trait Reviewer: Send + Sync {
    fn assess(
        &self,
        decision: &ServiceLineDecision,
        request: &ClinicalRequest,
        ctx: &ReviewContext<'_>,
    ) -> ReviewAssessment;
}

/// Sink for the per-run decision trace.
///
/// Steps are appended in order under the run's adjudication id; `seal`
/// closes the run and returns the chained trace. A run that fails before
/// sealing is dropped with `discard`; discarding an unknown id is not an
/// error.
pub trait TraceWriter: Send + Sync {
    fn append(&self, adjudication_id: &str, step: &DecisionStep) -> PreauthResult<()>;

    fn seal(&self, adjudication_id: &str) -> PreauthResult<DecisionTrace>;

    fn discard(&self, adjudication_id: &str) -> PreauthResult<()>;
}
