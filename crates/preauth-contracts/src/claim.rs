//! The canonical clinical request handed to the engine.
//!
//! A `ClinicalRequest` is produced once by the external claim parser and is
//! read-only for the rest of the pipeline. Every layer borrows it; nothing
//! mutates it.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{PreauthError, PreauthResult};

/// One coded diagnosis attached to the claim (ICD-10).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnosis {
    /// ICD-10 code, e.g. "E11.9".
    pub code: String,
    /// Human-readable display text.
    #[serde(default)]
    pub display: String,
}

impl Diagnosis {
    pub fn new(code: impl Into<String>, display: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            display: display.into(),
        }
    }
}

/// One billable item within the claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceLine {
    /// Position of the line within the claim (1-based, unique).
    pub sequence: u32,
    /// Procedure / service code (CPT or local).
    pub code: String,
    /// Free-text description; the rule evaluator classifies on it.
    #[serde(default)]
    pub description: String,
    /// Amount requested for this line, in policy currency units.
    #[serde(default)]
    pub requested_amount: Option<f64>,
    /// Line-level clinical notes, if the provider supplied any.
    #[serde(default)]
    pub clinical_notes: Option<String>,
}

impl ServiceLine {
    /// The requested amount, treating an absent amount as zero.
    pub fn amount(&self) -> f64 {
        self.requested_amount.unwrap_or(0.0)
    }
}

/// The immutable per-adjudication input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalRequest {
    pub request_id: String,
    /// Patient / member identifier. Keys the HD store and the history log.
    pub patient_id: String,
    /// Requesting provider. Keys the fraud counters.
    #[serde(default)]
    pub provider_id: String,
    /// Coverage reference; absent or "unknown" fails the eligibility rule.
    #[serde(default)]
    pub coverage_id: Option<String>,
    #[serde(default)]
    pub patient_age: Option<u32>,
    #[serde(default)]
    pub patient_gender: Option<String>,
    #[serde(default)]
    pub diagnoses: Vec<Diagnosis>,
    /// Procedure codes listed separately from the service lines.
    #[serde(default)]
    pub procedures: Vec<String>,
    pub services: Vec<ServiceLine>,
    /// Aggregate claim cost as submitted.
    #[serde(default)]
    pub total_cost: Option<f64>,
    #[serde(default)]
    pub clinical_notes: Option<String>,
}

impl ClinicalRequest {
    /// The submitted total, or the sum of line amounts when no total was given.
    pub fn effective_total(&self) -> f64 {
        self.total_cost
            .unwrap_or_else(|| self.services.iter().map(ServiceLine::amount).sum())
    }

    /// True if the claim or any of its lines carries non-blank clinical notes.
    pub fn has_clinical_notes(&self) -> bool {
        let non_blank = |n: &Option<String>| n.as_deref().is_some_and(|s| !s.trim().is_empty());
        non_blank(&self.clinical_notes) || self.services.iter().any(|s| non_blank(&s.clinical_notes))
    }

    /// Semantic intake checks.
    ///
    /// Returns `PreauthError::InvalidRequest` describing the first problem
    /// found. Structural (JSON shape) validation happens earlier, in the
    /// intake validator; this covers what a schema cannot express.
    pub fn check(&self) -> PreauthResult<()> {
        let invalid = |reason: String| Err(PreauthError::InvalidRequest { reason });

        if self.request_id.trim().is_empty() {
            return invalid("request_id must not be empty".to_string());
        }
        if self.patient_id.trim().is_empty() {
            return invalid("patient_id must not be empty".to_string());
        }
        if self.services.is_empty() {
            return invalid(format!("request '{}' has no service lines", self.request_id));
        }

        let mut seen = HashSet::new();
        for line in &self.services {
            if !seen.insert(line.sequence) {
                return invalid(format!("duplicate service sequence {}", line.sequence));
            }
            if line.code.trim().is_empty() {
                return invalid(format!("service line {} has no code", line.sequence));
            }
            if let Some(amount) = line.requested_amount {
                if !amount.is_finite() || amount < 0.0 {
                    return invalid(format!(
                        "service line {} has invalid requested amount {amount}",
                        line.sequence
                    ));
                }
            }
        }

        if let Some(total) = self.total_cost {
            if !total.is_finite() || total < 0.0 {
                return invalid(format!("total_cost {total} is invalid"));
            }
        }

        Ok(())
    }
}
