//! # preauth-validate
//!
//! Request intake validation and the post-decision validation gauntlet.
//!
//! ## Intake
//!
//! [`RequestSchemaValidator`] checks raw JSON against the request schema
//! (via `jsonschema`) and then runs the semantic `ClinicalRequest::check`.
//!
//! ## Post-decision validators
//!
//! Each implements [`Validator`](preauth_core::traits::Validator) and runs in
//! this order over the working decision set:
//!
//! 1. [`MedicalNecessityValidator`]
//! 2. [`PatientHistoryAnalyzer`]
//! 3. [`FinancialRiskAnalyzer`]
//! 4. [`FraudDetector`]
//!
//! Validators lower confidence and force review. They never change a line's
//! decision.

pub mod financial;
pub mod fraud;
pub mod history;
pub mod intake;
pub mod keyed;
pub mod necessity;

use std::sync::Arc;

use preauth_contracts::config::{FinancialConfig, FraudConfig, HistoryConfig, NecessityConfig};
use preauth_core::traits::Validator;

pub use financial::FinancialRiskAnalyzer;
pub use fraud::{FraudDetector, ProviderStats, ProviderStatsStore};
pub use history::{HistoryEntry, HistoryStore, PatientHistoryAnalyzer};
pub use intake::{request_schema, RequestSchemaValidator};
pub use keyed::KeyedStore;
pub use necessity::MedicalNecessityValidator;

/// The four validators in pipeline order, sharing the given stores.
pub fn standard_validators(
    necessity: NecessityConfig,
    history: (Arc<HistoryStore>, HistoryConfig),
    financial: FinancialConfig,
    fraud: (Arc<ProviderStatsStore>, FraudConfig),
) -> Vec<Box<dyn Validator>> {
    vec![
        Box::new(MedicalNecessityValidator::new(necessity)),
        Box::new(PatientHistoryAnalyzer::new(history.0, history.1)),
        Box::new(FinancialRiskAnalyzer::new(financial)),
        Box::new(FraudDetector::new(fraud.0, fraud.1)),
    ]
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use chrono::{DateTime, Duration, TimeZone, Utc};
    use serde_json::json;

    use preauth_contracts::{
        claim::{ClinicalRequest, Diagnosis, ServiceLine},
        config::{FinancialConfig, FraudConfig, HistoryConfig, NecessityConfig},
        decision::{DecisionKind, ServiceLineDecision},
        error::PreauthError,
        trace::Layer,
        validation::RiskLevel,
    };
    use preauth_core::traits::Validator;

    use super::*;
    use crate::financial::FINANCIAL_REVIEW_REASON;
    use crate::fraud::FRAUD_REVIEW_REASON;
    use crate::history::HISTORY_REVIEW_REASON;
    use crate::necessity::NECESSITY_REVIEW_REASON;

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 1, 12, 0, 0).unwrap()
    }

    fn line(seq: u32, code: &str, amount: f64) -> ServiceLine {
        ServiceLine {
            sequence: seq,
            code: code.to_string(),
            description: format!("Service {code}"),
            requested_amount: Some(amount),
            clinical_notes: None,
        }
    }

    fn request(patient: &str, provider: &str, dx: &[&str], services: Vec<ServiceLine>) -> ClinicalRequest {
        ClinicalRequest {
            request_id: format!("REQ-{patient}"),
            patient_id: patient.to_string(),
            provider_id: provider.to_string(),
            coverage_id: Some("COV".to_string()),
            patient_age: Some(67),
            patient_gender: Some("female".to_string()),
            diagnoses: dx.iter().map(|c| Diagnosis::new(*c, "diagnosis")).collect(),
            procedures: Vec::new(),
            services,
            total_cost: None,
            clinical_notes: None,
        }
    }

    fn approved(req: &ClinicalRequest, confidence: f64) -> Vec<ServiceLineDecision> {
        req.services
            .iter()
            .map(|l| ServiceLineDecision::for_line(l, DecisionKind::Approved, confidence, "ok"))
            .collect()
    }

    // ── 1. intake ─────────────────────────────────────────────────────────────

    #[test]
    fn test_intake_accepts_valid_request() {
        let intake = RequestSchemaValidator::new().unwrap();
        let raw = json!({
            "request_id": "REQ-1",
            "patient_id": "PAT001",
            "provider_id": "PRV-1",
            "coverage_id": "COV-1",
            "patient_age": 54,
            "diagnoses": [{ "code": "M17.11", "display": "Primary osteoarthritis, right knee" }],
            "services": [{ "sequence": 1, "code": "27447", "description": "Total knee arthroplasty", "requested_amount": 45000.0 }]
        });
        let req = intake.parse(&raw).unwrap();
        assert_eq!(req.services.len(), 1);
        assert_eq!(req.diagnoses[0].code, "M17.11");
        assert!(req.procedures.is_empty());
    }

    #[test]
    fn test_intake_collects_every_schema_violation() {
        let intake = RequestSchemaValidator::new().unwrap();
        let raw = json!({
            "request_id": "",
            "patient_id": "PAT001",
            "services": [{ "sequence": 1, "code": "99213", "requested_amount": -5 }]
        });
        let violations = intake.violations(&raw);
        assert_eq!(violations.len(), 2, "got {violations:?}");
        assert!(violations.iter().any(|v| v.starts_with("/request_id")));
        assert!(violations.iter().any(|v| v.starts_with("/services/0/requested_amount")));

        match intake.parse(&raw).unwrap_err() {
            PreauthError::InvalidRequest { reason } => assert!(reason.starts_with("schema violation")),
            other => panic!("expected InvalidRequest, got {other:?}"),
        }
    }

    #[test]
    fn test_intake_rejects_missing_services_and_bad_json() {
        let intake = RequestSchemaValidator::new().unwrap();
        let err = intake
            .parse(&json!({ "request_id": "R", "patient_id": "P", "services": [] }))
            .unwrap_err();
        assert!(matches!(err, PreauthError::InvalidRequest { .. }));

        let err = intake.parse_str("{ not json").unwrap_err();
        match err {
            PreauthError::InvalidRequest { reason } => assert!(reason.contains("not valid JSON"), "got: {reason}"),
            other => panic!("expected InvalidRequest, got {other:?}"),
        }
    }

    /// Duplicate sequences pass the schema but fail the semantic check.
    #[test]
    fn test_intake_runs_semantic_check() {
        let intake = RequestSchemaValidator::new().unwrap();
        let raw = json!({
            "request_id": "R",
            "patient_id": "P",
            "services": [
                { "sequence": 1, "code": "99213" },
                { "sequence": 1, "code": "99214" }
            ]
        });
        assert!(intake.violations(&raw).is_empty());
        match intake.parse(&raw).unwrap_err() {
            PreauthError::InvalidRequest { reason } => assert!(reason.contains("duplicate service sequence")),
            other => panic!("expected InvalidRequest, got {other:?}"),
        }
    }

    // ── 2. medical necessity ──────────────────────────────────────────────────

    #[test]
    fn test_necessity_supported_service_is_clean() {
        let v = MedicalNecessityValidator::new(NecessityConfig::default());
        let req = request("P", "V", &["M17.11"], vec![line(1, "27447", 40_000.0)]);
        let mut ds = approved(&req, 0.9);

        let report = v.validate(&req, &mut ds, now()).unwrap();
        assert!(report.is_clean());
        assert_eq!(report.score, 1.0);
        assert_eq!(ds[0].confidence, 0.9);
        assert_eq!(report.validator, Layer::MedicalNecessity);
    }

    /// One flag lowers the line score but leaves the decision alone.
    #[test]
    fn test_necessity_single_flag_is_still_valid() {
        let v = MedicalNecessityValidator::new(NecessityConfig::default());
        let req = request("P", "V", &["J06.9"], vec![line(1, "99213", 200.0)]);
        let mut ds = approved(&req, 0.9);

        let report = v.validate(&req, &mut ds, now()).unwrap();
        assert_eq!(report.flags, vec!["diagnosis_mismatch".to_string()]);
        assert!((report.lines[0].score - 0.8).abs() < 1e-9);
        assert!(report.lines[0].valid);
        assert!(report.forced_review.is_empty());
        assert_eq!(ds[0].confidence, 0.9);
        assert!(!ds[0].requires_human_review);
    }

    #[test]
    fn test_necessity_two_flags_downgrade_and_force_review() {
        let v = MedicalNecessityValidator::new(NecessityConfig::default());
        let mut req = request("P", "V", &["J06.9"], vec![line(1, "27447", 40_000.0), line(2, "M0001", 50.0)]);
        req.patient_age = Some(30);
        let mut ds = approved(&req, 0.9);

        let report = v.validate(&req, &mut ds, now()).unwrap();
        assert_eq!(report.forced_review, vec![1]);
        assert!((ds[0].confidence - 0.9 * 0.65).abs() < 1e-9, "got {}", ds[0].confidence);
        assert_eq!(ds[0].medical_necessity_met, Some(false));
        assert_eq!(ds[0].review_reason.as_deref(), Some(NECESSITY_REVIEW_REASON));
        assert_eq!(ds[0].decision, DecisionKind::Approved, "validators never change the decision");
        assert!(!ds[1].requires_human_review, "sibling line unaffected");
    }

    #[test]
    fn test_necessity_score_floor() {
        let cfg = NecessityConfig {
            mismatch_penalty: 0.4,
            age_penalty: 0.4,
            ..NecessityConfig::default()
        };
        let v = MedicalNecessityValidator::new(cfg);
        let mut req = request("P", "V", &["J06.9"], vec![line(1, "27447", 40_000.0)]);
        req.patient_age = Some(20);
        let mut ds = approved(&req, 1.0);

        let report = v.validate(&req, &mut ds, now()).unwrap();
        assert_eq!(report.lines[0].score, 0.5);
        assert_eq!(ds[0].confidence, 0.5);
    }

    // ── 3. patient history ────────────────────────────────────────────────────

    fn analyzer(config: HistoryConfig) -> PatientHistoryAnalyzer {
        PatientHistoryAnalyzer::new(Arc::new(HistoryStore::new()), config)
    }

    #[test]
    fn test_history_first_request_is_clean_and_recorded() {
        let a = analyzer(HistoryConfig::default());
        let req = request("PAT-H", "V", &[], vec![line(1, "99213", 200.0)]);
        let mut ds = approved(&req, 0.9);

        let report = a.validate(&req, &mut ds, now()).unwrap();
        assert!(report.is_clean());
        assert_eq!(a.store().entries("PAT-H").unwrap().len(), 1, "current request always appended");
    }

    #[test]
    fn test_history_duplicate_within_window() {
        let a = analyzer(HistoryConfig::default());
        let req = request("PAT-H", "V", &[], vec![line(1, "99213", 200.0)]);

        a.validate(&req, &mut approved(&req, 0.9), now() - Duration::days(29)).unwrap();
        let mut ds = approved(&req, 0.9);
        let report = a.validate(&req, &mut ds, now()).unwrap();
        assert_eq!(report.flags, vec!["duplicate_request".to_string()]);
        assert!((report.score - 0.2).abs() < 1e-9);
        assert!(report.forced_review.is_empty(), "0.2 is below the review threshold");

        let later = a
            .validate(&req, &mut approved(&req, 0.9), now() + Duration::days(31))
            .unwrap();
        assert!(later.is_clean(), "last request is 31 days back, outside the window");
    }

    /// Duplicate plus frequency reaches exactly 0.5, which does not exceed
    /// the default threshold. A lower threshold forces review.
    #[test]
    fn test_history_review_threshold_is_strict() {
        let req = request("PAT-F", "V", &[], vec![line(1, "99213", 200.0)]);
        let seed = |a: &PatientHistoryAnalyzer| {
            for i in 0..11 {
                a.store()
                    .record(
                        "PAT-F",
                        HistoryEntry {
                            request_id: format!("OLD-{i}"),
                            at: now() - Duration::days(40 + i),
                            service_codes: vec!["99213".to_string()],
                            cost: 100.0,
                        },
                        &HistoryConfig::default(),
                    )
                    .unwrap();
            }
        };

        let a = analyzer(HistoryConfig::default());
        seed(&a);
        a.validate(&req, &mut approved(&req, 0.9), now() - Duration::days(1)).unwrap();
        let mut ds = approved(&req, 0.9);
        let report = a.validate(&req, &mut ds, now()).unwrap();
        assert_eq!(report.flags.len(), 2, "got {:?}", report.flags);
        assert!((report.score - 0.5).abs() < 1e-9);
        assert!(report.forced_review.is_empty());

        let strict = analyzer(HistoryConfig {
            review_risk_threshold: 0.4,
            ..HistoryConfig::default()
        });
        seed(&strict);
        strict.validate(&req, &mut approved(&req, 0.9), now() - Duration::days(1)).unwrap();
        let mut ds = approved(&req, 0.9);
        let report = strict.validate(&req, &mut ds, now()).unwrap();
        assert_eq!(report.forced_review, vec![1]);
        assert_eq!(ds[0].review_reason.as_deref(), Some(HISTORY_REVIEW_REASON));
    }

    #[test]
    fn test_history_retention_and_cap() {
        let config = HistoryConfig {
            max_entries_per_patient: 3,
            ..HistoryConfig::default()
        };
        let store = HistoryStore::new();
        let entry = |days_ago: i64| HistoryEntry {
            request_id: format!("R-{days_ago}"),
            at: now() - Duration::days(days_ago),
            service_codes: vec!["99213".to_string()],
            cost: 0.0,
        };
        store.record("P", entry(400), &config).unwrap();
        store.record("P", entry(10), &config).unwrap();
        assert_eq!(store.entries("P").unwrap().len(), 1, "entry past retention pruned");

        for d in [5, 4, 3, 2] {
            store.record("P", entry(d), &config).unwrap();
        }
        let kept: Vec<String> = store.entries("P").unwrap().into_iter().map(|e| e.request_id).collect();
        assert_eq!(kept, vec!["R-4", "R-3", "R-2"], "oldest dropped beyond the cap");
    }

    #[test]
    fn test_history_sweep_forgets_expired_patients() {
        let config = HistoryConfig::default();
        let store = HistoryStore::new();
        let start = Utc.with_ymd_and_hms(2020, 1, 1, 9, 0, 0).unwrap();
        let entry = |id: &str, at: DateTime<Utc>| HistoryEntry {
            request_id: id.to_string(),
            at,
            service_codes: vec!["99213".to_string()],
            cost: 100.0,
        };
        for i in 0..1000 {
            store.record(&format!("PAT-{i}"), entry(&format!("R-{i}"), start), &config).unwrap();
        }
        assert_eq!(store.patient_count().unwrap(), 1000);

        store.record("PAT-NEW", entry("R-NEW", start + Duration::days(2000)), &config).unwrap();

        assert_eq!(store.patient_count().unwrap(), 1, "only the live patient is retained");
        assert!(store.entries("PAT-0").unwrap().is_empty(), "expired log still held");
        assert_eq!(store.entries("PAT-NEW").unwrap().len(), 1);
    }

    #[test]
    fn test_history_analyzer_sweeps_while_validating() {
        let a = analyzer(HistoryConfig::default());
        let old = request("PAT-OLD", "V", &[], vec![line(1, "99213", 100.0)]);
        a.validate(&old, &mut approved(&old, 0.9), now() - Duration::days(800)).unwrap();

        let req = request("PAT-LIVE", "V", &[], vec![line(1, "99213", 100.0)]);
        a.validate(&req, &mut approved(&req, 0.9), now()).unwrap();

        assert_eq!(a.store().patient_count().unwrap(), 1);
        assert!(a.store().entries("PAT-OLD").unwrap().is_empty());
        assert_eq!(a.store().prune_expired(now(), &HistoryConfig::default()).unwrap(), 0);
    }

    #[test]
    fn test_history_concurrent_appends_for_one_patient() {
        let a = Arc::new(analyzer(HistoryConfig::default()));
        thread::scope(|s| {
            for t in 0..8 {
                let a = Arc::clone(&a);
                s.spawn(move || {
                    for i in 0..25 {
                        let req = request("PAT-C", "V", &[], vec![line(1, &format!("C{t}-{i}"), 10.0)]);
                        a.validate(&req, &mut approved(&req, 0.9), now()).unwrap();
                    }
                });
            }
        });
        assert_eq!(a.store().entries("PAT-C").unwrap().len(), 200, "no append lost");
    }

    // ── 4. financial risk ─────────────────────────────────────────────────────

    #[test]
    fn test_financial_low_risk_outlier_only() {
        let v = FinancialRiskAnalyzer::new(FinancialConfig::default());
        let req = request("P", "V", &[], vec![line(1, "27447", 95_000.0)]);
        let mut ds = approved(&req, 0.9);

        let report = v.validate(&req, &mut ds, now()).unwrap();
        assert_eq!(report.flags, vec!["cost_outlier_27447".to_string()]);
        assert_eq!(report.risk_level, Some(RiskLevel::Low));
        assert!(!ds[0].requires_human_review);
    }

    #[test]
    fn test_financial_medium_and_high_force_review() {
        let v = FinancialRiskAnalyzer::new(FinancialConfig::default());

        let medium = request("P", "V", &[], vec![line(1, "99999", 120_000.0)]);
        let mut ds = approved(&medium, 0.9);
        let report = v.validate(&medium, &mut ds, now()).unwrap();
        assert_eq!(report.risk_level, Some(RiskLevel::Medium));
        assert_eq!(report.forced_review, vec![1]);
        assert_eq!(ds[0].review_reason.as_deref(), Some(FINANCIAL_REVIEW_REASON));

        let high = request("P", "V", &[], vec![line(1, "27447", 100_000.0), line(2, "92928", 170_000.0)]);
        let mut ds = approved(&high, 0.9);
        let report = v.validate(&high, &mut ds, now()).unwrap();
        assert_eq!(report.risk_level, Some(RiskLevel::High));
        assert!(report.flags.contains(&"requires_financial_review".to_string()));
        assert_eq!(report.forced_review, vec![1, 2]);
    }

    #[test]
    fn test_financial_zero_total_is_low() {
        let v = FinancialRiskAnalyzer::default();
        let mut req = request("P", "V", &[], vec![line(1, "27447", 0.0)]);
        req.services[0].requested_amount = None;
        let report = v.validate(&req, &mut approved(&req, 0.9), now()).unwrap();
        assert_eq!(report.risk_level, Some(RiskLevel::Low));
        assert!(report.is_clean());
    }

    // ── 5. fraud ──────────────────────────────────────────────────────────────

    fn detector() -> FraudDetector {
        FraudDetector::new(Arc::new(ProviderStatsStore::new()), FraudConfig::default())
    }

    /// 21 requests inside 7 days trips the frequency flag but on its own is
    /// not enough for an investigation.
    #[test]
    fn test_fraud_frequency_alone_is_not_investigated() {
        let d = detector();
        let req = request("P", "PRV-F", &[], vec![line(1, "99213", 200.0)]);

        let mut last = None;
        for i in 0..21 {
            let mut ds = approved(&req, 0.9);
            let at = now() - Duration::hours(21 - i);
            last = Some((d.validate(&req, &mut ds, at).unwrap(), ds));
        }
        let (report, ds) = last.unwrap();
        assert_eq!(report.flags, vec!["high_frequency".to_string()]);
        assert_eq!(report.risk_level, Some(RiskLevel::Low));
        assert!(report.forced_review.is_empty());
        assert!(!ds[0].requires_human_review);
    }

    #[test]
    fn test_fraud_medium_overrides_review_reason() {
        let d = detector();
        let services = (1..=11).map(|i| line(i, "99213", 6_000.0)).collect();
        let req = request("P", "PRV-M", &[], services);
        let mut ds = approved(&req, 0.9);
        ds[0].flag_for_review("Earlier reason");

        let report = d.validate(&req, &mut ds, now()).unwrap();
        assert_eq!(report.risk_level, Some(RiskLevel::Medium));
        assert_eq!(report.forced_review.len(), 11);
        assert!(ds.iter().all(|l| l.review_reason.as_deref() == Some(FRAUD_REVIEW_REASON)));
    }

    #[test]
    fn test_fraud_high_risk_and_levels() {
        let d = detector();
        assert_eq!(d.risk_level(0.0), RiskLevel::Low);
        assert_eq!(d.risk_level(0.3), RiskLevel::LowMedium);
        assert_eq!(d.risk_level(0.5), RiskLevel::Medium);
        assert_eq!(d.risk_level(0.2 + 0.2 + 0.3), RiskLevel::High);

        let small = request("P", "PRV-H", &[], vec![line(1, "99213", 10.0)]);
        for i in 0..20 {
            d.validate(&small, &mut approved(&small, 0.9), now() - Duration::minutes(30 + i)).unwrap();
        }
        let services = (1..=11).map(|i| line(i, "33510", 6_000.0)).collect();
        let big = request("P", "PRV-H", &[], services);
        let report = d.validate(&big, &mut approved(&big, 0.9), now()).unwrap();
        assert_eq!(report.flags.len(), 3, "got {:?}", report.flags);
        assert_eq!(report.risk_level, Some(RiskLevel::High));
    }

    #[test]
    fn test_fraud_window_pruning_keeps_lifetime_counters() {
        let d = detector();
        let expensive = request("P", "PRV-W", &[], vec![line(1, "33510", 60_000.0)]);
        d.validate(&expensive, &mut approved(&expensive, 0.9), now() - Duration::days(30)).unwrap();
        d.validate(&expensive, &mut approved(&expensive, 0.9), now() - Duration::days(8)).unwrap();
        let report = d.validate(&expensive, &mut approved(&expensive, 0.9), now()).unwrap();
        assert_eq!(report.flags, vec!["high_cost_claim".to_string()]);

        let stats = d.store().snapshot("PRV-W").unwrap().unwrap();
        assert_eq!(stats.total_requests, 3);
        assert_eq!(stats.high_cost_claims, 3);
        assert_eq!(stats.recent.len(), 1, "only the request inside 7 days is kept");
        assert!(d.store().snapshot("PRV-NONE").unwrap().is_none());
    }

    #[test]
    fn test_fraud_sweep_forgets_providers_past_retention() {
        let d = detector();
        let req = |provider: &str| request("P", provider, &[], vec![line(1, "99213", 10.0)]);
        for i in 0..200 {
            let r = req(&format!("PRV-OLD-{i}"));
            d.validate(&r, &mut approved(&r, 0.9), now() - Duration::days(500)).unwrap();
        }
        // Outside the window but inside retention: counters survive.
        let recent = req("PRV-QUIET");
        d.validate(&recent, &mut approved(&recent, 0.9), now() - Duration::days(30)).unwrap();
        assert_eq!(d.store().provider_count().unwrap(), 1, "old providers swept at the 30-day request");

        let live = req("PRV-LIVE");
        d.validate(&live, &mut approved(&live, 0.9), now()).unwrap();

        assert_eq!(d.store().provider_count().unwrap(), 2);
        assert!(d.store().snapshot("PRV-OLD-0").unwrap().is_none());
        let quiet = d.store().snapshot("PRV-QUIET").unwrap().unwrap();
        assert_eq!(quiet.total_requests, 1, "lifetime counters kept within retention");
        assert!(quiet.recent.is_empty(), "sweep expired the stale window");
    }

    #[test]
    fn test_fraud_providers_are_independent() {
        let d = Arc::new(detector());
        thread::scope(|s| {
            for p in 0..4 {
                let d = Arc::clone(&d);
                s.spawn(move || {
                    let req = request("P", &format!("PRV-{p}"), &[], vec![line(1, "99213", 10.0)]);
                    for _ in 0..30 {
                        d.validate(&req, &mut approved(&req, 0.9), now()).unwrap();
                    }
                });
            }
        });
        for p in 0..4 {
            let stats = d.store().snapshot(&format!("PRV-{p}")).unwrap().unwrap();
            assert_eq!(stats.total_requests, 30);
        }
    }

    // ── 6. pipeline order ─────────────────────────────────────────────────────

    #[test]
    fn test_standard_validators_order() {
        let validators = standard_validators(
            NecessityConfig::default(),
            (Arc::new(HistoryStore::new()), HistoryConfig::default()),
            FinancialConfig::default(),
            (Arc::new(ProviderStatsStore::new()), FraudConfig::default()),
        );
        let layers: Vec<Layer> = validators.iter().map(|v| v.layer()).collect();
        assert_eq!(
            layers,
            vec![
                Layer::MedicalNecessity,
                Layer::PatientHistory,
                Layer::FinancialRisk,
                Layer::FraudDetection
            ]
        );
    }
}
