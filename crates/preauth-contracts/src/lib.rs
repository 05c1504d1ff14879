//! # preauth-contracts
//!
//! Shared types, tunables, and error definitions for the pre-authorization
//! adjudication engine.
//!
//! Every other crate in the workspace imports from here. No adjudication
//! logic lives in this crate, only data definitions and the small helpers
//! that keep them consistent.

pub mod claim;
pub mod config;
pub mod decision;
pub mod error;
pub mod policy;
pub mod result;
pub mod review;
pub mod rules;
pub mod screening;
pub mod trace;
pub mod validation;

#[cfg(test)]
mod tests {
    use super::*;
    use claim::{ClinicalRequest, Diagnosis, ServiceLine};
    use config::{BlendConfig, HistoryConfig};
    use decision::{ConfidenceLevel, DecisionKind, ServiceLineDecision};
    use error::PreauthError;
    use policy::PolicyHit;
    use result::AdjudicationId;
    use review::{ReviewPriority, ReviewReason};
    use trace::DecisionStep;

    fn line(seq: u32, amount: f64) -> ServiceLine {
        ServiceLine {
            sequence: seq,
            code: format!("9921{seq}"),
            description: "Office consultation".to_string(),
            requested_amount: Some(amount),
            clinical_notes: None,
        }
    }

    fn request(services: Vec<ServiceLine>) -> ClinicalRequest {
        ClinicalRequest {
            request_id: "REQ-1".to_string(),
            patient_id: "PAT001".to_string(),
            provider_id: "PRV-1".to_string(),
            coverage_id: Some("COV-1".to_string()),
            patient_age: Some(40),
            patient_gender: None,
            diagnoses: vec![Diagnosis::new("J06.9", "Upper respiratory infection")],
            procedures: Vec::new(),
            services,
            total_cost: None,
            clinical_notes: None,
        }
    }

    fn decided(seq: u32, kind: DecisionKind) -> ServiceLineDecision {
        ServiceLineDecision::for_line(&line(seq, 100.0), kind, 0.9, "test")
    }

    // ── DecisionKind::overall ────────────────────────────────────────────────

    #[test]
    fn overall_all_approved_is_approved() {
        let ds = vec![decided(1, DecisionKind::Approved), decided(2, DecisionKind::Approved)];
        assert_eq!(DecisionKind::overall(&ds), DecisionKind::Approved);
    }

    #[test]
    fn overall_all_denied_is_denied() {
        let ds = vec![decided(1, DecisionKind::Denied), decided(2, DecisionKind::Denied)];
        assert_eq!(DecisionKind::overall(&ds), DecisionKind::Denied);
    }

    #[test]
    fn overall_any_pending_wins_over_partial() {
        let ds = vec![
            decided(1, DecisionKind::Approved),
            decided(2, DecisionKind::Denied),
            decided(3, DecisionKind::Pending),
        ];
        assert_eq!(DecisionKind::overall(&ds), DecisionKind::Pending);
    }

    #[test]
    fn overall_mixed_approved_and_denied_is_partial() {
        let ds = vec![decided(1, DecisionKind::Approved), decided(2, DecisionKind::Denied)];
        assert_eq!(DecisionKind::overall(&ds), DecisionKind::Partial);
    }

    #[test]
    fn overall_empty_is_pending() {
        let ds: Vec<ServiceLineDecision> = Vec::new();
        assert_eq!(DecisionKind::overall(&ds), DecisionKind::Pending);
    }

    // ── ServiceLineDecision ──────────────────────────────────────────────────

    #[test]
    fn approved_line_pays_requested_amount_denied_pays_zero() {
        let approved = ServiceLineDecision::for_line(&line(1, 250.0), DecisionKind::Approved, 0.9, "ok");
        let denied = ServiceLineDecision::for_line(&line(2, 250.0), DecisionKind::Denied, 0.9, "no");
        assert_eq!(approved.approved_amount, Some(250.0));
        assert_eq!(denied.approved_amount, Some(0.0));
    }

    #[test]
    fn scale_confidence_keeps_level_in_sync() {
        let mut d = decided(1, DecisionKind::Approved);
        assert_eq!(d.confidence_level, ConfidenceLevel::High);
        d.scale_confidence(0.5);
        assert!((d.confidence - 0.45).abs() < 1e-9);
        assert_eq!(d.confidence_level, ConfidenceLevel::Low);
    }

    #[test]
    fn flag_for_review_keeps_first_reason() {
        let mut d = decided(1, DecisionKind::Pending);
        d.flag_for_review("Duplicate request");
        d.flag_for_review("High fraud risk");
        assert!(d.requires_human_review);
        assert_eq!(d.review_reason.as_deref(), Some("Duplicate request"));

        d.override_review_reason("Undeclared health condition");
        assert_eq!(d.review_reason.as_deref(), Some("Undeclared health condition"));
    }

    #[test]
    fn totals_split_by_decision() {
        let ds = vec![
            decided(1, DecisionKind::Approved),
            decided(2, DecisionKind::Denied),
            decided(3, DecisionKind::Pending),
        ];
        let (req, app, den) = result::totals(&ds);
        assert_eq!(req, 300.0);
        assert_eq!(app, 100.0);
        assert_eq!(den, 100.0);
    }

    // ── ClinicalRequest ──────────────────────────────────────────────────────

    #[test]
    fn effective_total_sums_lines_when_total_absent() {
        let mut req = request(vec![line(1, 100.0), line(2, 50.5)]);
        assert_eq!(req.effective_total(), 150.5);
        req.total_cost = Some(1_000.0);
        assert_eq!(req.effective_total(), 1_000.0);
    }

    #[test]
    fn check_rejects_request_without_services() {
        let err = request(Vec::new()).check().unwrap_err();
        assert!(matches!(err, PreauthError::InvalidRequest { .. }));
        assert!(err.to_string().contains("no service lines"));
    }

    #[test]
    fn check_rejects_duplicate_sequences() {
        let err = request(vec![line(1, 10.0), line(1, 20.0)]).check().unwrap_err();
        assert!(err.to_string().contains("duplicate service sequence 1"));
    }

    #[test]
    fn check_rejects_negative_amount() {
        let err = request(vec![line(1, -5.0)]).check().unwrap_err();
        assert!(err.to_string().contains("invalid requested amount"));
    }

    #[test]
    fn check_accepts_well_formed_request() {
        assert!(request(vec![line(1, 10.0)]).check().is_ok());
    }

    #[test]
    fn blank_notes_do_not_count_as_clinical_notes() {
        let mut req = request(vec![line(1, 10.0)]);
        req.clinical_notes = Some("   ".to_string());
        assert!(!req.has_clinical_notes());
        req.services[0].clinical_notes = Some("Failed conservative therapy".to_string());
        assert!(req.has_clinical_notes());
    }

    #[test]
    fn request_deserializes_with_optional_fields_missing() {
        let json = r#"{
            "request_id": "REQ-9",
            "patient_id": "PAT009",
            "services": [{ "sequence": 1, "code": "99213" }]
        }"#;
        let req: ClinicalRequest = serde_json::from_str(json).unwrap();
        assert!(req.diagnoses.is_empty());
        assert_eq!(req.services[0].requested_amount, None);
        assert_eq!(req.effective_total(), 0.0);
    }

    // ── Review priority ──────────────────────────────────────────────────────

    #[test]
    fn escalate_never_lowers_priority() {
        assert_eq!(ReviewPriority::High.escalate(ReviewPriority::Low), ReviewPriority::High);
        assert_eq!(ReviewPriority::Low.escalate(ReviewPriority::Urgent), ReviewPriority::Urgent);
        assert_eq!(ReviewPriority::Urgent.sla(), "Within 4 hours");
    }

    #[test]
    fn review_reason_serializes_snake_case() {
        let json = serde_json::to_string(&ReviewReason::HighCost).unwrap();
        assert_eq!(json, "\"high_cost\"");
    }

    // ── Trace step ───────────────────────────────────────────────────────────

    #[test]
    fn decision_step_serializes_final_flag() {
        let step = DecisionStep::new(trace::Layer::RulesEngine, "APPROVED", 0.9).deciding();
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["final"], true);
        assert_eq!(json["layer"], "rules_engine");
    }

    // ── Policy hits ──────────────────────────────────────────────────────────

    #[test]
    fn excerpt_truncates_on_char_boundary() {
        let hit = PolicyHit {
            content: "é".repeat(10),
            relevance_score: 0.9,
            source: "policy.pdf".to_string(),
            can_override_llm: true,
        };
        assert_eq!(hit.excerpt(3), "ééé...");
        assert_eq!(hit.excerpt(50), hit.content);
    }

    // ── Config ───────────────────────────────────────────────────────────────

    #[test]
    fn blend_weights_normalize() {
        let cfg = BlendConfig {
            reasoning_weight: 2.0,
            policy_weight: 3.0,
            ..BlendConfig::default()
        };
        let (r, p) = cfg.normalized_weights();
        assert!((r - 0.4).abs() < 1e-9);
        assert!((p - 0.6).abs() < 1e-9);
    }

    #[test]
    fn blend_weights_fall_back_when_degenerate() {
        let cfg = BlendConfig {
            reasoning_weight: 0.0,
            policy_weight: 0.0,
            ..BlendConfig::default()
        };
        assert_eq!(cfg.normalized_weights(), (0.4, 0.6));
    }

    #[test]
    fn partial_config_table_keeps_defaults() {
        let cfg: HistoryConfig = serde_json::from_str(r#"{ "duplicate_window_days": 14 }"#).unwrap();
        assert_eq!(cfg.duplicate_window_days, 14);
        assert_eq!(cfg.max_requests_per_year, 10);
    }

    // ── Ids and errors ───────────────────────────────────────────────────────

    #[test]
    fn adjudication_ids_are_unique() {
        let ids: std::collections::HashSet<String> =
            (0..100).map(|_| AdjudicationId::new().to_string()).collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn error_unavailable_display() {
        let err = PreauthError::unavailable("policy_retrieval", "timed out after 5s");
        let msg = err.to_string();
        assert!(msg.contains("policy_retrieval"));
        assert!(msg.contains("timed out"));
    }

    #[test]
    fn error_store_display() {
        let msg = PreauthError::store("lock poisoned").to_string();
        assert!(msg.contains("store error"));
        assert!(msg.contains("lock poisoned"));
    }
}
