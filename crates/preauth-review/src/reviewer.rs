//! The per-line HITL reviewer.

use tracing::{debug, warn};

use preauth_contracts::{
    claim::ClinicalRequest,
    config::ReviewConfig,
    decision::{DecisionKind, ServiceLineDecision},
    review::{FinalAction, ReviewAssessment, ReviewPriority, ReviewReason},
    screening::HdOutcome,
    trace::DecidingLayer,
};
use preauth_core::traits::{ReviewContext, Reviewer};

use crate::routing;

/// Reasons fired so far and the priority they raised.
///
/// Priority only ever moves up; a reason already present is not repeated.
#[derive(Debug, Clone, PartialEq)]
pub struct Escalation {
    pub priority: ReviewPriority,
    pub reasons: Vec<ReviewReason>,
}

impl Default for Escalation {
    fn default() -> Self {
        Self {
            priority: ReviewPriority::Auto,
            reasons: Vec::new(),
        }
    }
}

impl Escalation {
    pub fn raise(&mut self, reason: ReviewReason, priority: ReviewPriority) {
        self.priority = self.priority.escalate(priority);
        if !self.reasons.contains(&reason) {
            self.reasons.push(reason);
        }
    }
}

/// Routes each line to automatic handling or a human queue.
#[derive(Debug, Clone, Default)]
pub struct HitlReviewer {
    config: ReviewConfig,
}

impl HitlReviewer {
    pub fn new(config: ReviewConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ReviewConfig {
        &self.config
    }

    fn is_experimental(&self, decision: &ServiceLineDecision) -> bool {
        let description = decision.service_description.to_lowercase();
        self.config
            .experimental_keywords
            .iter()
            .any(|k| description.contains(&k.to_lowercase()))
    }

    fn is_complex(&self, request: &ClinicalRequest, ctx: &ReviewContext<'_>) -> bool {
        let cfg = &self.config;
        request.diagnoses.len() >= cfg.complex_min_diagnoses
            || request.procedures.len() >= cfg.complex_min_procedures
            || ctx.orchestration_confidence < cfg.complex_orchestration_confidence
    }

    /// Two or more strong hits from different policy documents.
    fn has_policy_conflict(&self, ctx: &ReviewContext<'_>) -> bool {
        let mut sources: Vec<&str> = ctx
            .policy_hits
            .iter()
            .filter(|h| h.relevance_score >= self.config.conflict_relevance)
            .map(|h| h.source.as_str())
            .collect();
        if sources.len() < 2 {
            return false;
        }
        sources.sort_unstable();
        sources.dedup();
        sources.len() >= 2
    }

    /// Run every escalation rule against the line.
    pub fn escalate(
        &self,
        decision: &ServiceLineDecision,
        request: &ClinicalRequest,
        ctx: &ReviewContext<'_>,
    ) -> Escalation {
        let cfg = &self.config;
        let mut esc = Escalation::default();
        let cost = decision.cost();

        if decision.confidence < cfg.review_confidence {
            esc.raise(ReviewReason::LowConfidence, ReviewPriority::High);
        }
        if cost >= cfg.urgent_cost {
            esc.raise(ReviewReason::HighCost, ReviewPriority::Urgent);
        } else if cost >= cfg.high_cost {
            esc.raise(ReviewReason::HighCost, ReviewPriority::High);
        }
        if self.is_experimental(decision) {
            esc.raise(ReviewReason::Experimental, ReviewPriority::High);
        }
        if self.is_complex(request, ctx) {
            esc.raise(ReviewReason::ComplexCase, ReviewPriority::Medium);
        }
        if self.has_policy_conflict(ctx) {
            esc.raise(ReviewReason::PolicyConflict, ReviewPriority::Medium);
        }
        if ctx.decision_source == DecidingLayer::LlmOnly && decision.confidence < cfg.reasoning_only_confidence {
            esc.raise(ReviewReason::ComplexCase, ReviewPriority::High);
        }
        if decision.requires_human_review {
            esc.raise(ReviewReason::ValidatorFlag, ReviewPriority::Medium);
        }
        esc
    }

    pub fn final_action(&self, decision: &ServiceLineDecision, esc: &Escalation) -> FinalAction {
        let cfg = &self.config;
        let clean = esc.reasons.is_empty();
        match decision.decision {
            DecisionKind::Approved
                if clean
                    && decision.confidence >= cfg.auto_approve_confidence
                    && decision.cost() <= cfg.auto_approve_max_cost =>
            {
                FinalAction::AutoApproved
            }
            DecisionKind::Denied if clean && decision.confidence >= cfg.auto_deny_confidence => {
                FinalAction::AutoDenied
            }
            _ => FinalAction::RequiresReview,
        }
    }

    fn assessment(
        &self,
        decision: &ServiceLineDecision,
        request: &ClinicalRequest,
        ctx: &ReviewContext<'_>,
        esc: Escalation,
        final_action: FinalAction,
    ) -> ReviewAssessment {
        let requires_review = final_action == FinalAction::RequiresReview;
        // A line held back with no specific reason still needs a queue slot.
        let priority = if requires_review {
            esc.priority.escalate(ReviewPriority::Low)
        } else {
            esc.priority
        };
        ReviewAssessment {
            sequence: decision.sequence,
            requires_review,
            priority,
            recommended_reviewer: routing::recommend_reviewer(request, &esc.reasons),
            estimated_review_time: priority.sla().to_string(),
            reviewer_notes: routing::reviewer_notes(decision, request, ctx, &esc.reasons),
            reasons: esc.reasons,
            final_action,
        }
    }
}

impl Reviewer for HitlReviewer {
    fn assess(
        &self,
        decision: &ServiceLineDecision,
        request: &ClinicalRequest,
        ctx: &ReviewContext<'_>,
    ) -> ReviewAssessment {
        // HD blocks are already decided; only the routing is added here.
        let (esc, final_action) = match ctx.hd_outcome {
            HdOutcome::HitlRequired => {
                let mut esc = Escalation::default();
                esc.raise(ReviewReason::UndeclaredCondition, ReviewPriority::High);
                (esc, FinalAction::RequiresReview)
            }
            HdOutcome::DenyPreExisting => (Escalation::default(), FinalAction::AutoDenied),
            HdOutcome::NotRequired | HdOutcome::Proceed => {
                let esc = self.escalate(decision, request, ctx);
                let action = self.final_action(decision, &esc);
                (esc, action)
            }
        };

        let assessment = self.assessment(decision, request, ctx, esc, final_action);
        if assessment.requires_review {
            warn!(
                request_id = %request.request_id,
                sequence = assessment.sequence,
                priority = ?assessment.priority,
                reasons = %assessment.reason_summary(),
                reviewer = %assessment.recommended_reviewer,
                "review required"
            );
        } else {
            debug!(
                request_id = %request.request_id,
                sequence = assessment.sequence,
                action = ?assessment.final_action,
                "auto decision"
            );
        }
        assessment
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use preauth_contracts::{
        claim::{Diagnosis, ServiceLine},
        policy::PolicyHit,
    };

    use super::*;

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn line(description: &str, amount: f64) -> ServiceLine {
        ServiceLine {
            sequence: 1,
            code: "99213".to_string(),
            description: description.to_string(),
            requested_amount: Some(amount),
            clinical_notes: None,
        }
    }

    fn request(diagnoses: &[(&str, &str)], procedures: usize) -> ClinicalRequest {
        ClinicalRequest {
            request_id: "REQ-R".to_string(),
            patient_id: "PAT".to_string(),
            provider_id: "PRV".to_string(),
            coverage_id: Some("COV".to_string()),
            patient_age: Some(50),
            patient_gender: Some("male".to_string()),
            diagnoses: diagnoses.iter().map(|(c, d)| Diagnosis::new(*c, *d)).collect(),
            procedures: (0..procedures).map(|i| format!("P{i}")).collect(),
            services: vec![line("Office visit", 200.0)],
            total_cost: None,
            clinical_notes: None,
        }
    }

    fn decision(kind: DecisionKind, confidence: f64, description: &str, amount: f64) -> ServiceLineDecision {
        ServiceLineDecision::for_line(&line(description, amount), kind, confidence, "test")
    }

    fn ctx(source: DecidingLayer, confidence: f64, hits: &[PolicyHit]) -> ReviewContext<'_> {
        ReviewContext {
            orchestration_confidence: confidence,
            decision_source: source,
            hd_outcome: HdOutcome::NotRequired,
            policy_hits: hits,
        }
    }

    fn hit(source: &str, relevance: f64) -> PolicyHit {
        PolicyHit {
            content: format!("Clause from {source}"),
            relevance_score: relevance,
            source: source.to_string(),
            can_override_llm: false,
        }
    }

    // ── 1. final action ───────────────────────────────────────────────────────

    #[test]
    fn test_low_cost_high_confidence_approval_is_automatic() {
        let r = HitlReviewer::default();
        let d = decision(DecisionKind::Approved, 0.90, "Office consultation", 500.0);
        let a = r.assess(&d, &request(&[], 0), &ctx(DecidingLayer::RulesEngine, 0.90, &[]));
        assert_eq!(a.final_action, FinalAction::AutoApproved);
        assert!(!a.requires_review);
        assert_eq!(a.priority, ReviewPriority::Auto);
        assert_eq!(a.estimated_review_time, "N/A");
    }

    #[test]
    fn test_confident_denial_is_automatic() {
        let r = HitlReviewer::default();
        let d = decision(DecisionKind::Denied, 0.95, "Cosmetic procedure", 3000.0);
        let a = r.assess(&d, &request(&[], 0), &ctx(DecidingLayer::RulesEngine, 0.95, &[]));
        assert_eq!(a.final_action, FinalAction::AutoDenied);
    }

    /// Approved above the auto-approve cost ceiling but below the high-cost
    /// threshold: no reason fires, yet it is not automatic.
    #[test]
    fn test_reasonless_hold_gets_low_priority() {
        let r = HitlReviewer::default();
        let d = decision(DecisionKind::Approved, 0.92, "Imaging", 8_000.0);
        let a = r.assess(&d, &request(&[], 0), &ctx(DecidingLayer::RulesEngine, 0.92, &[]));
        assert!(a.reasons.is_empty());
        assert_eq!(a.final_action, FinalAction::RequiresReview);
        assert!(a.requires_review);
        assert_eq!(a.priority, ReviewPriority::Low);
        assert_eq!(a.estimated_review_time, "Within 7 days");
    }

    #[test]
    fn test_partial_and_pending_never_automatic() {
        let r = HitlReviewer::default();
        for kind in [DecisionKind::Partial, DecisionKind::Pending] {
            let d = decision(kind, 0.99, "Office visit", 100.0);
            let a = r.assess(&d, &request(&[], 0), &ctx(DecidingLayer::RulesEngine, 0.99, &[]));
            assert_eq!(a.final_action, FinalAction::RequiresReview, "{kind:?} must go to review");
        }
    }

    // ── 2. escalation ─────────────────────────────────────────────────────────

    #[test]
    fn test_priority_never_decreases() {
        let r = HitlReviewer::default();
        // Urgent cost, then medium-priority complexity.
        let d = decision(DecisionKind::Approved, 0.95, "Knee replacement", 60_000.0);
        let req = request(&[("M17", "Knee osteoarthritis"), ("E11", "Diabetes"), ("I10", "Hypertension")], 0);
        let a = r.assess(&d, &req, &ctx(DecidingLayer::RagSystemGuidedLlm, 0.95, &[]));
        assert_eq!(a.priority, ReviewPriority::Urgent);
        assert_eq!(a.reasons, vec![ReviewReason::HighCost, ReviewReason::ComplexCase]);
        assert_eq!(a.recommended_reviewer, "Financial + Clinical Reviewer");
        assert_eq!(a.estimated_review_time, "Within 4 hours");
    }

    #[test]
    fn test_cost_thresholds_are_inclusive() {
        let r = HitlReviewer::default();
        let c = ctx(DecidingLayer::RulesEngine, 0.95, &[]);
        let at_high = r.escalate(&decision(DecisionKind::Approved, 0.95, "x", 20_000.0), &request(&[], 0), &c);
        assert_eq!(at_high.priority, ReviewPriority::High);
        let at_urgent = r.escalate(&decision(DecisionKind::Approved, 0.95, "x", 50_000.0), &request(&[], 0), &c);
        assert_eq!(at_urgent.priority, ReviewPriority::Urgent);
        let below = r.escalate(&decision(DecisionKind::Approved, 0.95, "x", 19_999.0), &request(&[], 0), &c);
        assert!(below.reasons.is_empty());
    }

    #[test]
    fn test_experimental_routes_to_medical_director() {
        let r = HitlReviewer::default();
        let d = decision(DecisionKind::Approved, 0.95, "Investigational gene therapy", 1_000.0);
        let a = r.assess(&d, &request(&[], 0), &ctx(DecidingLayer::RagSystemGuidedLlm, 0.95, &[]));
        assert_eq!(a.reasons, vec![ReviewReason::Experimental]);
        assert_eq!(a.priority, ReviewPriority::High);
        assert_eq!(a.recommended_reviewer, "Medical Director");
    }

    #[test]
    fn test_policy_conflict_needs_distinct_sources() {
        let r = HitlReviewer::default();
        let d = decision(DecisionKind::Approved, 0.95, "Office visit", 100.0);
        let same = [hit("policy-a", 0.9), hit("policy-a", 0.85)];
        let a = r.escalate(&d, &request(&[], 0), &ctx(DecidingLayer::RagSystemGuidedLlm, 0.95, &same));
        assert!(!a.reasons.contains(&ReviewReason::PolicyConflict));

        let distinct = [hit("policy-a", 0.9), hit("policy-b", 0.80), hit("policy-c", 0.5)];
        let a = r.escalate(&d, &request(&[], 0), &ctx(DecidingLayer::RagSystemGuidedLlm, 0.95, &distinct));
        assert_eq!(a.reasons, vec![ReviewReason::PolicyConflict]);
        assert_eq!(a.priority, ReviewPriority::Medium);
    }

    #[test]
    fn test_reasoning_only_has_stricter_bar() {
        let r = HitlReviewer::default();
        let d = decision(DecisionKind::Approved, 0.78, "Office visit", 100.0);
        let guided = r.escalate(&d, &request(&[], 0), &ctx(DecidingLayer::RagSystemGuidedLlm, 0.78, &[]));
        assert!(guided.reasons.is_empty(), "0.78 clears the general threshold");

        let alone = r.escalate(&d, &request(&[], 0), &ctx(DecidingLayer::LlmOnly, 0.78, &[]));
        assert_eq!(alone.reasons, vec![ReviewReason::ComplexCase]);
        assert_eq!(alone.priority, ReviewPriority::High);
    }

    #[test]
    fn test_complexity_triggers() {
        let r = HitlReviewer::default();
        let d = decision(DecisionKind::Approved, 0.95, "Office visit", 100.0);
        let by_procedures = r.escalate(&d, &request(&[], 2), &ctx(DecidingLayer::RulesEngine, 0.95, &[]));
        assert_eq!(by_procedures.reasons, vec![ReviewReason::ComplexCase]);
        let by_confidence = r.escalate(&d, &request(&[], 0), &ctx(DecidingLayer::RulesEngine, 0.69, &[]));
        assert_eq!(by_confidence.reasons, vec![ReviewReason::ComplexCase]);
    }

    #[test]
    fn test_validator_flag_blocks_automation() {
        let r = HitlReviewer::default();
        let mut d = decision(DecisionKind::Approved, 0.95, "Office visit", 100.0);
        d.flag_for_review("Fraud investigation required");
        let a = r.assess(&d, &request(&[], 0), &ctx(DecidingLayer::RulesEngine, 0.95, &[]));
        assert_eq!(a.reasons, vec![ReviewReason::ValidatorFlag]);
        assert_eq!(a.final_action, FinalAction::RequiresReview);
        assert_eq!(a.priority, ReviewPriority::Medium);
    }

    // ── 3. health declaration ─────────────────────────────────────────────────

    #[test]
    fn test_hd_outcomes() {
        let r = HitlReviewer::default();
        let req = request(&[("E11", "Type 2 diabetes")], 0);

        let mut held = decision(DecisionKind::Pending, 0.95, "Office visit", 100.0);
        held.flag_for_review("Health declaration required but not found in member records");
        let mut c = ctx(DecidingLayer::HealthDeclaration, 0.95, &[]);
        c.hd_outcome = HdOutcome::HitlRequired;
        let a = r.assess(&held, &req, &c);
        assert_eq!(a.reasons, vec![ReviewReason::UndeclaredCondition]);
        assert_eq!(a.priority, ReviewPriority::High);
        assert_eq!(a.recommended_reviewer, routing::UNDERWRITER);

        let denied = decision(DecisionKind::Denied, 0.95, "Office visit", 60_000.0);
        c.hd_outcome = HdOutcome::DenyPreExisting;
        let a = r.assess(&denied, &req, &c);
        assert_eq!(a.final_action, FinalAction::AutoDenied);
        assert!(!a.requires_review, "pre-existing denial is not reviewed even at high cost");
    }

    // ── 4. routing and notes ──────────────────────────────────────────────────

    #[test]
    fn test_specialty_from_primary_diagnosis() {
        let cases = [
            (&[("I25", "Chronic ischemic heart disease")][..], "Cardiology"),
            (&[("M17", "Osteoarthritis of knee")][..], "Orthopedics"),
            (&[("C50", "Breast cancer")][..], "Oncology"),
            (&[("E11", "Type 2 diabetes mellitus")][..], "Endocrinology"),
            (&[("J06", "Upper respiratory infection"), ("I25", "Heart disease")][..], "General Medicine"),
            (&[][..], "General Medicine"),
        ];
        for (dx, expected) in cases {
            assert_eq!(routing::specialty(&request(dx, 0)), expected, "diagnoses {dx:?}");
        }

        let complex = routing::recommend_reviewer(&request(&[("I25", "Heart disease")], 0), &[ReviewReason::ComplexCase]);
        assert_eq!(complex, "Clinical Reviewer (Cardiology)");
    }

    #[test]
    fn test_notes_summarize_case() {
        let r = HitlReviewer::default();
        let mut d = decision(DecisionKind::Approved, 0.6, "Office visit", 150.0);
        d.policy_references = vec!["x".repeat(150)];
        let req = request(&[("E11", "Diabetes")], 0);
        let a = r.assess(&d, &req, &ctx(DecidingLayer::LlmOnly, 0.6, &[]));

        assert!(a.reviewer_notes.contains("Decision: APPROVED"), "notes: {}", a.reviewer_notes);
        assert!(a.reviewer_notes.contains("Confidence: 60%"));
        assert!(a.reviewer_notes.contains("Deciding layer: llm_only"));
        assert!(a.reviewer_notes.contains("  - Low confidence score"));
        assert!(a.reviewer_notes.contains("  - E11: Diabetes"));
        assert!(a.reviewer_notes.contains(&format!("  - {}...", "x".repeat(100))));
    }
}
