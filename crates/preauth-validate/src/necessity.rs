//! Medical-necessity validation.
//!
//! Each line is scored against two guideline tables: which service codes a
//! diagnosis (by 3-character prefix) supports, and the age range a service
//! is appropriate for. A line with enough flags is invalid; its confidence is
//! multiplied by its score and it is forced to review.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use preauth_contracts::{
    claim::ClinicalRequest,
    config::NecessityConfig,
    decision::ServiceLineDecision,
    error::PreauthResult,
    trace::Layer,
    validation::{LineFinding, ValidationReport},
};
use preauth_core::traits::Validator;

pub const NECESSITY_REVIEW_REASON: &str = "Medical necessity criteria not met";

#[derive(Debug, Clone, Default)]
pub struct MedicalNecessityValidator {
    config: NecessityConfig,
}

impl MedicalNecessityValidator {
    pub fn new(config: NecessityConfig) -> Self {
        Self { config }
    }

    /// True when no diagnosis is on file, or some diagnosis supports the code.
    fn diagnosis_supports(&self, request: &ClinicalRequest, service_code: &str) -> bool {
        if request.diagnoses.is_empty() {
            return true;
        }
        request.diagnoses.iter().any(|dx| {
            let prefix: String = dx.code.trim().to_ascii_uppercase().chars().take(3).collect();
            self.config
                .diagnosis_service_map
                .get(&prefix)
                .is_some_and(|codes| codes.iter().any(|c| c == service_code))
        })
    }

    /// True when the age is unknown or the service has no age guideline.
    fn age_appropriate(&self, request: &ClinicalRequest, service_code: &str) -> bool {
        match (request.patient_age, self.config.age_guidelines.get(service_code)) {
            (Some(age), Some(range)) => range.contains(age),
            _ => true,
        }
    }

    fn score_line(&self, request: &ClinicalRequest, decision: &ServiceLineDecision) -> LineFinding {
        let mut flags = Vec::new();
        let mut score = 1.0;

        if !self.diagnosis_supports(request, &decision.service_code) {
            flags.push("diagnosis_mismatch".to_string());
            score -= self.config.mismatch_penalty;
        }
        if !self.age_appropriate(request, &decision.service_code) {
            flags.push("age_inappropriate".to_string());
            score -= self.config.age_penalty;
        }

        LineFinding {
            sequence: decision.sequence,
            valid: flags.len() < self.config.invalid_flag_count,
            score: f64::max(self.config.score_floor, score),
            flags,
        }
    }
}

impl Validator for MedicalNecessityValidator {
    fn layer(&self) -> Layer {
        Layer::MedicalNecessity
    }

    fn validate(
        &self,
        request: &ClinicalRequest,
        decisions: &mut [ServiceLineDecision],
        _now: DateTime<Utc>,
    ) -> PreauthResult<ValidationReport> {
        let mut report = ValidationReport::new(Layer::MedicalNecessity);

        for decision in decisions.iter_mut() {
            let finding = self.score_line(request, decision);
            debug!(
                sequence = finding.sequence,
                score = finding.score,
                flags = %finding.flags.join(","),
                "necessity scored"
            );

            if !finding.valid {
                warn!(
                    request_id = %request.request_id,
                    sequence = finding.sequence,
                    flags = %finding.flags.join(","),
                    "medical necessity not met, downgrading confidence"
                );
                decision.scale_confidence(finding.score);
                decision.medical_necessity_met = Some(false);
                decision.flag_for_review(NECESSITY_REVIEW_REASON);
                report.forced_review.push(decision.sequence);
            }

            for flag in &finding.flags {
                if !report.flags.contains(flag) {
                    report.flags.push(flag.clone());
                }
            }
            report.lines.push(finding);
        }

        report.score = if report.lines.is_empty() {
            1.0
        } else {
            report.lines.iter().map(|l| l.score).sum::<f64>() / report.lines.len() as f64
        };
        Ok(report)
    }
}
