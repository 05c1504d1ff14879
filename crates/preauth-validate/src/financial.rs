//! Financial risk assessment.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use preauth_contracts::{
    claim::ClinicalRequest,
    config::FinancialConfig,
    decision::ServiceLineDecision,
    error::PreauthResult,
    trace::Layer,
    validation::{RiskLevel, ValidationReport},
};
use preauth_core::traits::Validator;

pub const FINANCIAL_REVIEW_REASON: &str = "Financial risk review required";

/// Tolerance for comparing accumulated float weights against a threshold.
const EPSILON: f64 = 1e-9;

pub(crate) fn reaches(score: f64, threshold: f64) -> bool {
    score + EPSILON >= threshold
}

/// Scores cost outliers against per-code averages and very large totals.
///
/// Medium and High risk both force review on every line.
#[derive(Debug, Clone, Default)]
pub struct FinancialRiskAnalyzer {
    config: FinancialConfig,
}

impl FinancialRiskAnalyzer {
    pub fn new(config: FinancialConfig) -> Self {
        Self { config }
    }

    pub fn risk_level(&self, score: f64) -> RiskLevel {
        if reaches(score, self.config.high_threshold) {
            RiskLevel::High
        } else if reaches(score, self.config.medium_threshold) {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

impl Validator for FinancialRiskAnalyzer {
    fn layer(&self) -> Layer {
        Layer::FinancialRisk
    }

    fn validate(
        &self,
        request: &ClinicalRequest,
        decisions: &mut [ServiceLineDecision],
        _now: DateTime<Utc>,
    ) -> PreauthResult<ValidationReport> {
        let cfg = &self.config;
        let mut report = ValidationReport::new(Layer::FinancialRisk);
        let total = request.effective_total();

        if total <= 0.0 {
            report.risk_level = Some(RiskLevel::Low);
            return Ok(report);
        }

        if total > cfg.high_total_cost {
            report.flags.push("high_total_cost".to_string());
            report.score += cfg.high_total_weight;
        }

        for line in &request.services {
            let Some(average) = cfg.average_costs.get(&line.code) else {
                continue;
            };
            if line.amount() > average * cfg.outlier_multiplier {
                debug!(
                    code = %line.code,
                    requested = line.amount(),
                    average = *average,
                    ratio = line.amount() / average,
                    "cost outlier"
                );
                report.flags.push(format!("cost_outlier_{}", line.code));
                report.score += cfg.outlier_weight;
            }
        }

        let level = self.risk_level(report.score);
        report.risk_level = Some(level);

        if level >= RiskLevel::Medium {
            if level == RiskLevel::High {
                report.flags.push("requires_financial_review".to_string());
            }
            warn!(
                request_id = %request.request_id,
                level = ?level,
                score = report.score,
                flags = %report.flags.join(","),
                "financial risk requires review"
            );
            for d in decisions.iter_mut() {
                d.flag_for_review(FINANCIAL_REVIEW_REASON);
                report.forced_review.push(d.sequence);
            }
        }
        Ok(report)
    }
}
