//! Simulated member and policy data for the reference runtime.
//!
//! Everything here is hardcoded and fictional. It stands in for the member
//! declaration database and the policy document corpus of a real
//! deployment.

use preauth_contracts::{
    claim::{ClinicalRequest, Diagnosis, ServiceLine},
    screening::HdRecord,
};

// ── Health declarations ──────────────────────────────────────────────────────

/// Declared conditions for the demo members.
///
/// - PAT001: type 2 diabetes, diagnosed 2023-01-15
/// - PAT002: chronic ischemic heart disease (2022-05-10) and hypertension
///   (2023-03-20)
///
/// Every other member has declared nothing.
pub fn demo_hd_records() -> Vec<HdRecord> {
    vec![
        record("PAT001", "E11", "Type 2 Diabetes Mellitus", "2023-01-15", "2023-06-01"),
        record("PAT002", "I25", "Chronic Ischemic Heart Disease", "2022-05-10", "2023-01-01"),
        record("PAT002", "I10", "Essential Hypertension", "2023-03-20", "2023-06-01"),
    ]
}

fn record(member: &str, code: &str, name: &str, diagnosed: &str, declared: &str) -> HdRecord {
    HdRecord {
        member_id: member.to_string(),
        icd10_code: code.to_string(),
        condition_name: name.to_string(),
        diagnosis_date: Some(diagnosed.to_string()),
        declaration_date: Some(declared.to_string()),
        declared_by: "member".to_string(),
    }
}

// ── Policy corpus ────────────────────────────────────────────────────────────

/// One passage in the mock policy corpus.
#[derive(Debug, Clone)]
pub struct PolicyPassage {
    pub source: &'static str,
    pub content: &'static str,
    /// Lower-case terms the passage is indexed under.
    pub keywords: &'static [&'static str],
    /// Whether the passage is binding enough to steer a clinical verdict.
    pub authoritative: bool,
}

pub fn policy_corpus() -> Vec<PolicyPassage> {
    vec![
        PolicyPassage {
            source: "orthopedic-coverage-2024",
            content: "Total knee replacement (arthroplasty) is covered for members with documented \
                      osteoarthritis after failed conservative treatment. Prior authorization is required.",
            keywords: &["knee", "arthroplasty", "replacement", "osteoarthritis"],
            authoritative: true,
        },
        PolicyPassage {
            source: "surgical-benefits-2024",
            content: "Inpatient surgical procedures require prior authorization and a documented \
                      surgical indication.",
            keywords: &["surgery", "surgical", "operation"],
            authoritative: false,
        },
        PolicyPassage {
            source: "exclusions-2024",
            content: "Experimental, investigational, or unproven treatments, including stem cell \
                      therapy outside an approved protocol, are not covered.",
            keywords: &["experimental", "investigational", "stem cell", "unproven"],
            authoritative: true,
        },
        PolicyPassage {
            source: "outpatient-benefits-2024",
            content: "Outpatient consultations with a licensed physician are covered up to twelve \
                      visits per benefit year.",
            keywords: &["consultation", "office visit", "outpatient"],
            authoritative: false,
        },
        PolicyPassage {
            source: "rehabilitation-guidance-2024",
            content: "Physical therapy sessions are covered when ordered by a physician with a \
                      documented functional goal.",
            keywords: &["therapy", "physical", "rehabilitation"],
            authoritative: false,
        },
        PolicyPassage {
            source: "cardiology-coverage-2024",
            content: "Coronary angioplasty and bypass procedures are covered for documented \
                      ischemic heart disease following cardiology review.",
            keywords: &["coronary", "angioplasty", "bypass", "ischemic", "heart"],
            authoritative: true,
        },
    ]
}

// ── Request builders ─────────────────────────────────────────────────────────

pub fn service(sequence: u32, code: &str, description: &str, amount: f64) -> ServiceLine {
    ServiceLine {
        sequence,
        code: code.to_string(),
        description: description.to_string(),
        requested_amount: Some(amount),
        clinical_notes: None,
    }
}

/// A covered request with the given diagnoses and lines.
pub fn request(
    request_id: &str,
    patient_id: &str,
    age: u32,
    diagnoses: &[(&str, &str)],
    services: Vec<ServiceLine>,
) -> ClinicalRequest {
    ClinicalRequest {
        request_id: request_id.to_string(),
        patient_id: patient_id.to_string(),
        provider_id: "PRV-CITY-CLINIC".to_string(),
        coverage_id: Some(format!("COV-{patient_id}")),
        patient_age: Some(age),
        patient_gender: Some("female".to_string()),
        diagnoses: diagnoses.iter().map(|(code, display)| Diagnosis::new(*code, *display)).collect(),
        procedures: Vec::new(),
        services,
        total_cost: None,
        clinical_notes: Some("Referred by primary care physician.".to_string()),
    }
}
