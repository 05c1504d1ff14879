//! Reviewer assignment and the notes handed to the reviewer.

use std::fmt::Write as _;

use preauth_contracts::{
    claim::ClinicalRequest,
    decision::ServiceLineDecision,
    review::ReviewReason,
};
use preauth_core::traits::ReviewContext;

pub const DEFAULT_REVIEWER: &str = "Clinical Reviewer";
pub const UNDERWRITER: &str = "Medical Underwriter";

/// Keywords in the primary diagnosis display text, checked in order.
const SPECIALTIES: &[(&[&str], &str)] = &[
    (&["cardiac", "heart"], "Cardiology"),
    (&["orthopedic", "joint", "knee"], "Orthopedics"),
    (&["cancer", "tumor"], "Oncology"),
    (&["diabetes"], "Endocrinology"),
];

/// Specialty for the request, taken from the first diagnosis only.
pub fn specialty(request: &ClinicalRequest) -> &'static str {
    let Some(primary) = request.diagnoses.first() else {
        return "General Medicine";
    };
    let display = primary.display.to_lowercase();
    SPECIALTIES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| display.contains(k)))
        .map(|(_, name)| *name)
        .unwrap_or("General Medicine")
}

/// Who should look at the line, given the reasons that fired.
pub fn recommend_reviewer(request: &ClinicalRequest, reasons: &[ReviewReason]) -> String {
    if reasons.contains(&ReviewReason::UndeclaredCondition) {
        UNDERWRITER.to_string()
    } else if reasons.contains(&ReviewReason::HighCost) {
        "Financial + Clinical Reviewer".to_string()
    } else if reasons.contains(&ReviewReason::Experimental) {
        "Medical Director".to_string()
    } else if reasons.contains(&ReviewReason::ComplexCase) {
        format!("{DEFAULT_REVIEWER} ({})", specialty(request))
    } else {
        DEFAULT_REVIEWER.to_string()
    }
}

/// Plain-text case summary for the reviewer queue.
pub fn reviewer_notes(
    decision: &ServiceLineDecision,
    request: &ClinicalRequest,
    ctx: &ReviewContext<'_>,
    reasons: &[ReviewReason],
) -> String {
    let mut notes = String::new();
    // Writing to a String cannot fail.
    let _ = writeln!(notes, "Decision: {}", decision.decision.label());
    let _ = writeln!(notes, "Confidence: {:.0}%", decision.confidence * 100.0);
    let _ = writeln!(notes, "Deciding layer: {}", ctx.decision_source);
    let _ = writeln!(notes, "Health declaration: {}", ctx.hd_outcome.label());

    if !reasons.is_empty() {
        let _ = writeln!(notes, "Review reasons:");
        for reason in reasons {
            let _ = writeln!(notes, "  - {reason}");
        }
    }

    let age = request
        .patient_age
        .map(|a| a.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let gender = request.patient_gender.as_deref().unwrap_or("unknown");
    let _ = writeln!(notes, "Patient: age {age}, {gender}");
    let _ = writeln!(notes, "Service: {} ({})", decision.service_description, decision.service_code);
    let _ = writeln!(notes, "Cost: {:.2}", decision.cost());

    if !request.diagnoses.is_empty() {
        let _ = writeln!(notes, "Diagnoses:");
        for dx in request.diagnoses.iter().take(3) {
            let _ = writeln!(notes, "  - {}: {}", dx.code, dx.display);
        }
    }

    if !decision.policy_references.is_empty() {
        let _ = writeln!(notes, "Policy references:");
        for reference in decision.policy_references.iter().take(2) {
            let cut: String = reference.chars().take(100).collect();
            let ellipsis = if reference.chars().count() > 100 { "..." } else { "" };
            let _ = writeln!(notes, "  - {cut}{ellipsis}");
        }
    }

    notes.trim_end().to_string()
}
