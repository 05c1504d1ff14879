//! The decision orchestrator: the layered adjudication state machine.
//!
//! Every request walks the same fixed sequence of stages:
//!
//!   HdCheck → RuleCheck → [PolicyRetrieval → ClinicalReasoning] → Blend
//!     → Validation (necessity, history, financial, fraud) → HitlCheck → Done
//!
//! Two exits skip ahead. An HD block (`HitlRequired` or `DenyPreExisting`)
//! jumps straight to HitlCheck with synthetic per-line decisions; no rule,
//! policy, or reasoning step is ever recorded for it. A decisive rule outcome
//! skips retrieval and reasoning entirely: the collaborators are
//! structurally unreachable on that path.
//!
//! Collaborator failures never abort the run. Affected lines fall back to a
//! low-confidence Pending decision that is forced to review, and the trace
//! records both the failure and the fallback.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::{debug, error, info, warn};

use preauth_contracts::{
    claim::ClinicalRequest,
    config::{BlendConfig, OrchestratorConfig, RetrievalConfig, ScreeningConfig},
    decision::{ConfidenceLevel, DecisionKind, ServiceLineDecision},
    error::{PreauthError, PreauthResult},
    policy::PolicyHit,
    result::{self, AdjudicationId, AdjudicationResult},
    review::{FinalAction, ReviewAssessment, ReviewReason},
    rules::RuleOutcome,
    screening::{HdOutcome, HdReport},
    trace::{DecidingLayer, DecisionStep, DecisionTrace, Layer},
    validation::ValidationReport,
};

use crate::blend;
use crate::clock::Clock;
use crate::traits::{
    ClinicalReasoner, HealthScreen, PolicyRetriever, ReviewContext, Reviewer, RuleEngine,
    TraceWriter, Validator,
};

/// Explanation prefix for lines of a request whose declarations were checked.
pub const HD_VALIDATED_PREFIX: &str = "[HD Validated] ";

/// Orchestration stages, in the only order they may be entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    HdCheck,
    RuleCheck,
    PolicyRetrieval,
    ClinicalReasoning,
    Blend,
    Validation,
    HitlCheck,
    Done,
}

/// Tunables the orchestrator reads directly.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorSettings {
    pub retrieval: RetrievalConfig,
    pub blend: BlendConfig,
    pub orchestrator: OrchestratorConfig,
    pub screening: ScreeningConfig,
}

/// The components an orchestrator is assembled from.
pub struct OrchestratorParts {
    pub screen: Box<dyn HealthScreen>,
    pub rules: Box<dyn RuleEngine>,
    pub retriever: Box<dyn PolicyRetriever>,
    pub reasoner: Box<dyn ClinicalReasoner>,
    /// Run in list order after blending.
    pub validators: Vec<Box<dyn Validator>>,
    pub reviewer: Box<dyn Reviewer>,
    pub trace: Box<dyn TraceWriter>,
    pub clock: Box<dyn Clock>,
}

/// Drives one request at a time through the layered pipeline.
///
/// Holds no per-request state, so a single orchestrator can be shared across
/// threads behind an `Arc`.
pub struct Orchestrator {
    screen: Box<dyn HealthScreen>,
    rules: Box<dyn RuleEngine>,
    retriever: Box<dyn PolicyRetriever>,
    reasoner: Box<dyn ClinicalReasoner>,
    validators: Vec<Box<dyn Validator>>,
    reviewer: Box<dyn Reviewer>,
    trace: Box<dyn TraceWriter>,
    clock: Box<dyn Clock>,
    settings: OrchestratorSettings,
}

// ── Per-run working state ────────────────────────────────────────────────────

/// Trace position and stage of a single run.
struct Run<'a> {
    id: String,
    stage: Stage,
    trace: &'a dyn TraceWriter,
    sealed: bool,
}

impl<'a> Run<'a> {
    fn new(id: String, trace: &'a dyn TraceWriter) -> Self {
        Self {
            id,
            stage: Stage::HdCheck,
            trace,
            sealed: false,
        }
    }

    /// Move forward to `next`. Re-entering the current stage is allowed;
    /// going backwards is not.
    fn enter(&mut self, next: Stage) -> PreauthResult<()> {
        if next < self.stage {
            return Err(PreauthError::StateMachineError {
                reason: format!("cannot move from {:?} back to {:?}", self.stage, next),
            });
        }
        debug!(adjudication_id = %self.id, stage = ?next, "entering stage");
        self.stage = next;
        Ok(())
    }

    fn record(&self, step: DecisionStep) -> PreauthResult<()> {
        self.trace.append(&self.id, &step)
    }

    fn seal(&mut self) -> PreauthResult<DecisionTrace> {
        let trace = self.trace.seal(&self.id)?;
        self.sealed = true;
        Ok(trace)
    }
}

/// A run that ends without sealing (any error return) releases its open
/// chain so the writer does not hold it forever.
impl Drop for Run<'_> {
    fn drop(&mut self) {
        if self.sealed {
            return;
        }
        if let Err(e) = self.trace.discard(&self.id) {
            warn!(adjudication_id = %self.id, error = %e, "could not discard unsealed trace");
        } else {
            debug!(adjudication_id = %self.id, "unsealed trace discarded");
        }
    }
}

/// What the policy/reasoning path produced.
struct Consultation {
    decisions: Vec<ServiceLineDecision>,
    source: DecidingLayer,
    hits: Vec<PolicyHit>,
    policy_consulted: bool,
    reasoning_consulted: bool,
}

/// Everything needed to assemble the result once the stages are done.
struct Outcome {
    hd_report: HdReport,
    rule_outcome: Option<RuleOutcome>,
    decisions: Vec<ServiceLineDecision>,
    assessments: Vec<ReviewAssessment>,
    validation_reports: Vec<ValidationReport>,
    deciding_layer: DecidingLayer,
    hd_blocked: bool,
    policy_consulted: bool,
    reasoning_consulted: bool,
}

impl Orchestrator {
    pub fn new(parts: OrchestratorParts, settings: OrchestratorSettings) -> Self {
        Self {
            screen: parts.screen,
            rules: parts.rules,
            retriever: parts.retriever,
            reasoner: parts.reasoner,
            validators: parts.validators,
            reviewer: parts.reviewer,
            trace: parts.trace,
            clock: parts.clock,
            settings,
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Adjudicate one clinical request.
    ///
    /// `policy_start` defaults to today minus the configured policy age.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` when the request fails intake checks (no layer runs),
    /// a trace-writer failure, or `StateMachineError` on an illegal stage
    /// transition. Collaborator and validator failures are contained and
    /// never surface here.
    pub fn adjudicate(
        &self,
        request: &ClinicalRequest,
        policy_start: Option<NaiveDate>,
    ) -> PreauthResult<AdjudicationResult> {
        request.check()?;

        let adjudication_id = AdjudicationId::new();
        let mut run = Run::new(adjudication_id.to_string(), self.trace.as_ref());
        let now = self.clock.now();
        let today = now.date_naive();
        let policy_start = policy_start
            .unwrap_or_else(|| today - Duration::days(self.settings.screening.default_policy_age_days));

        info!(
            adjudication_id = %run.id,
            request_id = %request.request_id,
            patient_id = %request.patient_id,
            services = request.services.len(),
            policy_start = %policy_start,
            "adjudication starting"
        );

        // ── Step 1: Health declaration pre-screening ────────────────────────
        let hd_report = self.screen_declarations(&run, request, policy_start, today);
        let hd_confidence = if hd_report.validation_required() { 0.95 } else { 0.99 };
        let mut hd_step = DecisionStep::new(Layer::HealthDeclaration, hd_report.outcome.label(), hd_confidence)
            .because(hd_report.reason.clone());
        if !hd_report.can_proceed() {
            hd_step = hd_step.deciding();
        }
        run.record(hd_step)?;

        if !hd_report.can_proceed() {
            return self.finish_hd_block(run, request, hd_report, adjudication_id);
        }

        // ── Step 2: Rule evaluation ──────────────────────────────────────────
        run.enter(Stage::RuleCheck)?;
        let (rule_outcome, rules_failed) = match self.rules.evaluate(request) {
            Ok(outcome) => (outcome, false),
            Err(e) => {
                error!(adjudication_id = %run.id, error = %e, "rule evaluation failed, treating as uncertain");
                run.record(DecisionStep::new(Layer::RulesEngine, "ERROR", 0.0).because(e.to_string()))?;
                (RuleOutcome::uncertain("unavailable"), true)
            }
        };

        let consultation = match rule_outcome.auto_decision {
            Some(kind) => {
                info!(
                    adjudication_id = %run.id,
                    decision = kind.label(),
                    rules = %rule_outcome.triggered_rules.join(","),
                    "rules engine decided"
                );
                let reason = if rule_outcome.reasons.is_empty() {
                    rule_outcome.triggered_rules.join(", ")
                } else {
                    rule_outcome.reasons.join("; ")
                };
                run.record(
                    DecisionStep::new(Layer::RulesEngine, kind.label(), rule_outcome.confidence)
                        .deciding()
                        .because(reason),
                )?;
                Consultation {
                    decisions: blend::stamp_rule_decision(request, &rule_outcome),
                    source: DecidingLayer::RulesEngine,
                    hits: Vec::new(),
                    policy_consulted: false,
                    reasoning_consulted: false,
                }
            }
            None => {
                if !rules_failed {
                    let reason = if rule_outcome.risk_flags.is_empty() {
                        "No definitive rule match".to_string()
                    } else {
                        format!("No definitive rule match; risk flags: {}", rule_outcome.risk_flags.join(", "))
                    };
                    run.record(
                        DecisionStep::new(Layer::RulesEngine, "UNCERTAIN", rule_outcome.confidence).because(reason),
                    )?;
                }
                self.consult(&mut run, request, &rule_outcome)?
            }
        };

        let Consultation {
            mut decisions,
            source,
            hits,
            policy_consulted,
            reasoning_consulted,
        } = consultation;

        if hd_report.validation_required() {
            for d in decisions.iter_mut() {
                d.explanation = format!("{HD_VALIDATED_PREFIX}{}", d.explanation);
            }
        }

        // ── Step 3: Post-decision validators ─────────────────────────────────
        run.enter(Stage::Validation)?;
        let validation_reports = self.run_validators(&run, request, &mut decisions, now)?;

        // ── Step 4: HITL review ──────────────────────────────────────────────
        run.enter(Stage::HitlCheck)?;
        let ctx = ReviewContext {
            orchestration_confidence: blend::mean_confidence(&decisions),
            decision_source: source,
            hd_outcome: hd_report.outcome,
            policy_hits: &hits,
        };
        let assessments = self.review(&run, request, &mut decisions, &ctx)?;

        let deciding_layer = if hd_report.validation_required() {
            DecidingLayer::HealthDeclaration
        } else {
            source
        };

        self.finish(
            run,
            request,
            adjudication_id,
            Outcome {
                hd_report,
                rule_outcome: Some(rule_outcome),
                decisions,
                assessments,
                validation_reports,
                deciding_layer,
                hd_blocked: false,
                policy_consulted,
                reasoning_consulted,
            },
        )
    }

    // ── Stage helpers ─────────────────────────────────────────────────────────

    /// Run HD screening. A screening failure holds the request for review,
    /// since declarations cannot be confirmed.
    fn screen_declarations(
        &self,
        run: &Run<'_>,
        request: &ClinicalRequest,
        policy_start: NaiveDate,
        today: NaiveDate,
    ) -> HdReport {
        match self.screen.screen(request, &request.patient_id, policy_start, today) {
            Ok(report) => {
                debug!(
                    adjudication_id = %run.id,
                    outcome = report.outcome.label(),
                    conditions = report.conditions_found.len(),
                    "health declaration screened"
                );
                report
            }
            Err(e) => {
                error!(adjudication_id = %run.id, error = %e, "health declaration screening failed");
                let mut report = HdReport::not_required(&request.patient_id);
                report.outcome = HdOutcome::HitlRequired;
                report.reason = format!("Health declaration records unavailable: {e}");
                report
            }
        }
    }

    /// Policy retrieval, clinical reasoning, and blending.
    fn consult(
        &self,
        run: &mut Run<'_>,
        request: &ClinicalRequest,
        rule_outcome: &RuleOutcome,
    ) -> PreauthResult<Consultation> {
        let retrieval = &self.settings.retrieval;

        run.enter(Stage::PolicyRetrieval)?;
        let hits = match self.retriever.retrieve(request, retrieval.top_k, retrieval.min_relevance) {
            Ok(hits) => hits,
            Err(e) => return self.fall_back(run, request, Layer::PolicyRetrieval, &e, Vec::new(), false),
        };

        let strong = blend::high_relevance_hits(&hits, &self.settings.blend).len();
        let policy_step = match blend::rag_confidence(&hits, &self.settings.blend) {
            Some(rag) => DecisionStep::new(Layer::PolicyRetrieval, "POLICY_GUIDED", rag)
                .because(format!("{strong} high-relevance passage(s) of {}", hits.len())),
            None => DecisionStep::new(
                Layer::PolicyRetrieval,
                "LOW_CONFIDENCE",
                self.settings.orchestrator.unguided_policy_confidence,
            )
            .because(format!("{} passage(s), none strong enough to guide reasoning", hits.len())),
        };
        run.record(policy_step)?;

        run.enter(Stage::ClinicalReasoning)?;
        let reasoning = match self.reasoner.reason(request, rule_outcome, &hits) {
            Ok(lines) => lines,
            Err(e) => return self.fall_back(run, request, Layer::ClinicalReasoning, &e, hits, true),
        };

        run.enter(Stage::Blend)?;
        let blended = blend::blend(
            request,
            reasoning,
            &hits,
            &self.settings.blend,
            self.settings.orchestrator.fallback_confidence,
        );
        if !blended.filled.is_empty() {
            warn!(
                adjudication_id = %run.id,
                missing = ?blended.filled,
                "clinical reasoning skipped lines, filled with fallback decisions"
            );
        }

        let mut reason = if blended.policy_guided() {
            "Clinical reasoning blended with policy guidance".to_string()
        } else {
            "Clinical reasoning without policy guidance".to_string()
        };
        if !blended.filled.is_empty() {
            reason.push_str(&format!("; {} line(s) fell back to review", blended.filled.len()));
        }
        run.record(
            DecisionStep::new(
                Layer::ClinicalReasoning,
                DecisionKind::overall(&blended.decisions).label(),
                blend::mean_confidence(&blended.decisions),
            )
            .deciding()
            .because(reason),
        )?;

        let source = if blended.policy_guided() {
            DecidingLayer::RagSystemGuidedLlm
        } else {
            DecidingLayer::LlmOnly
        };
        Ok(Consultation {
            decisions: blended.decisions,
            source,
            hits,
            policy_consulted: true,
            reasoning_consulted: true,
        })
    }

    /// Replace every line with a fallback decision after `failed` errored.
    fn fall_back(
        &self,
        run: &mut Run<'_>,
        request: &ClinicalRequest,
        failed: Layer,
        err: &PreauthError,
        hits: Vec<PolicyHit>,
        policy_consulted: bool,
    ) -> PreauthResult<Consultation> {
        warn!(
            adjudication_id = %run.id,
            layer = %failed,
            error = %err,
            "collaborator unavailable, falling back to review"
        );
        run.record(DecisionStep::new(failed, "UNAVAILABLE", 0.0).because(err.to_string()))?;

        run.enter(Stage::Blend)?;
        let confidence = self.settings.orchestrator.fallback_confidence;
        let decisions = blend::fallback_all(request, confidence, &err.to_string());
        run.record(
            DecisionStep::new(Layer::ClinicalReasoning, "FALLBACK", confidence)
                .deciding()
                .because(format!("{failed} unavailable; all lines pending review")),
        )?;

        Ok(Consultation {
            decisions,
            source: DecidingLayer::LlmOnly,
            hits,
            policy_consulted,
            reasoning_consulted: false,
        })
    }

    /// Run every validator in order. A failing validator is contained: it is
    /// logged, recorded as an `ERROR` step, and forces review on every line.
    fn run_validators(
        &self,
        run: &Run<'_>,
        request: &ClinicalRequest,
        decisions: &mut [ServiceLineDecision],
        now: DateTime<Utc>,
    ) -> PreauthResult<Vec<ValidationReport>> {
        let mut reports = Vec::with_capacity(self.validators.len());

        for validator in &self.validators {
            let layer = validator.layer();
            match validator.validate(request, decisions, now) {
                Ok(report) => {
                    if report.is_clean() {
                        debug!(adjudication_id = %run.id, layer = %layer, "validator passed");
                    } else {
                        warn!(
                            adjudication_id = %run.id,
                            layer = %layer,
                            flags = %report.flags.join(","),
                            forced_review = report.forced_review.len(),
                            "validator flagged request"
                        );
                    }
                    let mut step = DecisionStep::new(layer, report.verdict(), report.score);
                    if !report.flags.is_empty() {
                        step = step.because(report.flags.join(", "));
                    }
                    run.record(step)?;
                    reports.push(report);
                }
                Err(e) => {
                    error!(adjudication_id = %run.id, layer = %layer, error = %e, "validator failed");
                    for d in decisions.iter_mut() {
                        d.flag_for_review(format!("{layer} check unavailable"));
                    }
                    run.record(DecisionStep::new(layer, "ERROR", 0.0).because(e.to_string()))?;
                }
            }
        }

        Ok(reports)
    }

    /// Assess every line and fold review requirements back into the decisions.
    fn review(
        &self,
        run: &Run<'_>,
        request: &ClinicalRequest,
        decisions: &mut [ServiceLineDecision],
        ctx: &ReviewContext<'_>,
    ) -> PreauthResult<Vec<ReviewAssessment>> {
        let mut assessments = Vec::with_capacity(decisions.len());
        for d in decisions.iter_mut() {
            let assessment = self.reviewer.assess(d, request, ctx);
            if assessment.requires_review {
                apply_review(d, &assessment);
            }
            assessments.push(assessment);
        }

        let queued = assessments.iter().filter(|a| a.requires_review).count();
        let top = assessments.iter().map(|a| a.priority).max();
        let verdict = if queued > 0 { "REVIEW_REQUIRED" } else { "AUTO" };
        let mut step = DecisionStep::new(Layer::HitlReview, verdict, ctx.orchestration_confidence)
            .because(format!("{queued} of {} line(s) queued for review", assessments.len()));
        if let Some(priority) = top.filter(|_| queued > 0) {
            step.reason = step.reason.map(|r| format!("{r}; top priority {priority:?}"));
        }
        run.record(step)?;

        Ok(assessments)
    }

    // ── Terminal paths ────────────────────────────────────────────────────────

    /// Synthesize per-line decisions for an HD block and finish the run.
    fn finish_hd_block(
        &self,
        mut run: Run<'_>,
        request: &ClinicalRequest,
        hd_report: HdReport,
        adjudication_id: AdjudicationId,
    ) -> PreauthResult<AdjudicationResult> {
        let confidence = self.settings.orchestrator.hd_decision_confidence;
        let flagged = hd_report.flagged_conditions.join(", ");

        let mut decisions: Vec<ServiceLineDecision> = match hd_report.outcome {
            HdOutcome::DenyPreExisting => {
                warn!(adjudication_id = %run.id, reason = %hd_report.reason, "denied on pre-existing condition");
                request
                    .services
                    .iter()
                    .map(|line| {
                        let mut d = ServiceLineDecision::for_line(
                            line,
                            DecisionKind::Denied,
                            confidence,
                            format!("Denied: {}", hd_report.reason),
                        );
                        d.clinical_rationale =
                            Some(format!("Pre-existing condition within waiting period: {flagged}"));
                        d.rules_applied = vec!["hd_pre_existing_waiting_period".to_string()];
                        d
                    })
                    .collect()
            }
            _ => {
                warn!(adjudication_id = %run.id, reason = %hd_report.reason, "health declaration review required");
                request
                    .services
                    .iter()
                    .map(|line| {
                        let mut d = ServiceLineDecision::for_line(
                            line,
                            DecisionKind::Pending,
                            confidence,
                            format!("Health Declaration Review Required: {}", hd_report.reason),
                        );
                        if !flagged.is_empty() {
                            d.clinical_rationale = Some(format!(
                                "Member has undeclared conditions requiring health declaration: {flagged}"
                            ));
                        }
                        d.rules_applied = vec!["hd_validation_required".to_string()];
                        d.flag_for_review(hd_report.reason.clone());
                        d
                    })
                    .collect()
            }
        };

        run.enter(Stage::HitlCheck)?;
        let ctx = ReviewContext {
            orchestration_confidence: blend::mean_confidence(&decisions),
            decision_source: DecidingLayer::HealthDeclaration,
            hd_outcome: hd_report.outcome,
            policy_hits: &[],
        };
        let assessments = self.review(&run, request, &mut decisions, &ctx)?;

        self.finish(
            run,
            request,
            adjudication_id,
            Outcome {
                hd_report,
                rule_outcome: None,
                decisions,
                assessments,
                validation_reports: Vec::new(),
                deciding_layer: DecidingLayer::HealthDeclaration,
                hd_blocked: true,
                policy_consulted: false,
                reasoning_consulted: false,
            },
        )
    }

    /// Aggregate, seal the trace, and build the result.
    fn finish(
        &self,
        mut run: Run<'_>,
        request: &ClinicalRequest,
        adjudication_id: AdjudicationId,
        outcome: Outcome,
    ) -> PreauthResult<AdjudicationResult> {
        run.enter(Stage::Done)?;

        let overall_decision = DecisionKind::overall(&outcome.decisions);
        let overall_confidence = blend::mean_confidence(&outcome.decisions);
        let flagged_sequences: Vec<u32> = outcome
            .decisions
            .iter()
            .filter(|d| d.requires_human_review)
            .map(|d| d.sequence)
            .collect();
        let flagged_for_review = !flagged_sequences.is_empty();
        let (total_requested, total_approved, total_denied) = result::totals(&outcome.decisions);
        let trace = run.seal()?;

        info!(
            adjudication_id = %run.id,
            request_id = %request.request_id,
            decision = overall_decision.label(),
            confidence = overall_confidence,
            deciding_layer = %outcome.deciding_layer,
            flagged_for_review,
            terminal_hash = %trace.terminal_hash,
            "adjudication complete"
        );

        Ok(AdjudicationResult {
            adjudication_id,
            request_id: request.request_id.clone(),
            patient_id: request.patient_id.clone(),
            overall_decision,
            overall_confidence,
            overall_confidence_level: ConfidenceLevel::from_score(overall_confidence),
            service_decisions: outcome.decisions,
            review_assessments: outcome.assessments,
            flagged_for_review,
            flagged_sequences,
            deciding_layer: outcome.deciding_layer,
            trace,
            hd_report: outcome.hd_report,
            rule_outcome: outcome.rule_outcome,
            validation_reports: outcome.validation_reports,
            hd_blocked: outcome.hd_blocked,
            policy_consulted: outcome.policy_consulted,
            reasoning_consulted: outcome.reasoning_consulted,
            total_requested,
            total_approved,
            total_denied,
            completed_at: self.clock.now(),
        })
    }
}

/// Fold a review requirement into the line.
///
/// Reasons set earlier (HD hold, fraud investigation, validator flags) stay
/// first; the reviewer's own reasons are appended after them.
fn apply_review(decision: &mut ServiceLineDecision, assessment: &ReviewAssessment) {
    let own: Vec<&str> = assessment
        .reasons
        .iter()
        .filter(|r| !matches!(r, ReviewReason::ValidatorFlag | ReviewReason::UndeclaredCondition))
        .map(|r| r.message())
        .collect();

    if own.is_empty() {
        let fallback = match assessment.final_action {
            FinalAction::RequiresReview if assessment.reasons.is_empty() => {
                format!("Manual review required for {} decision", decision.decision.label())
            }
            _ => assessment.reason_summary(),
        };
        decision.flag_for_review(fallback);
        return;
    }

    let own = own.join("; ");
    match decision.review_reason.take() {
        Some(existing) if existing.contains(&own) => decision.override_review_reason(existing),
        Some(existing) => decision.override_review_reason(format!("{existing}; {own}")),
        None => decision.flag_for_review(own),
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
