//! Health Declaration Validator.
//!
//! Screening algorithm:
//!
//! 1. Match every diagnosis against the condition table (exact code, then
//!    3-character prefix, then 1-character category). No match anywhere
//!    means `NotRequired`.
//! 2. Fetch the member's declarations. A declaration covers a diagnosis if
//!    the codes are equal or the diagnosis code starts with the declared code.
//! 3. Undeclared conditions are held for underwriting (`HitlRequired`).
//! 4. Declared conditions diagnosed on or before policy start are
//!    pre-existing. If the policy is younger than the condition's waiting
//!    period, the request is denied (`DenyPreExisting`).
//!
//! `HitlRequired` takes precedence over `DenyPreExisting`.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use tracing::{debug, error, info, warn};

use preauth_contracts::{
    claim::ClinicalRequest,
    config::{MalformedDatePolicy, ScreeningConfig},
    error::PreauthResult,
    screening::{ConditionCheck, HdOutcome, HdRecord, HdReport, MatchedCondition, MemberHdSummary},
};
use preauth_core::traits::{HdRecordStore, HealthScreen};

use crate::table::ConditionTable;

pub struct HealthDeclarationValidator {
    table: ConditionTable,
    store: Arc<dyn HdRecordStore>,
    config: ScreeningConfig,
}

impl HealthDeclarationValidator {
    pub fn new(table: ConditionTable, store: Arc<dyn HdRecordStore>, config: ScreeningConfig) -> Self {
        info!(conditions = table.len(), "health declaration validator initialized");
        Self { table, store, config }
    }

    /// Built-in condition table and default screening settings.
    pub fn with_store(store: Arc<dyn HdRecordStore>) -> Self {
        Self::new(ConditionTable::builtin(), store, ScreeningConfig::default())
    }

    pub fn is_condition_hd_required(&self, icd10_code: &str) -> bool {
        self.table.lookup(icd10_code).is_some()
    }

    pub fn add_record(&self, member_id: &str, record: HdRecord) -> PreauthResult<()> {
        self.store.add_record(member_id, record)
    }

    pub fn member_summary(&self, member_id: &str) -> PreauthResult<MemberHdSummary> {
        let declared_conditions = self.store.get_records(member_id)?;
        Ok(MemberHdSummary {
            member_id: member_id.to_string(),
            total_declared_conditions: declared_conditions.len(),
            declared_conditions,
        })
    }

    fn matched_conditions(&self, request: &ClinicalRequest) -> Vec<MatchedCondition> {
        request
            .diagnoses
            .iter()
            .filter_map(|dx| {
                self.table.lookup(&dx.code).map(|condition| MatchedCondition {
                    icd10_code: dx.code.trim().to_ascii_uppercase(),
                    diagnosis_display: dx.display.clone(),
                    condition: condition.clone(),
                })
            })
            .collect()
    }

    fn check_condition(
        &self,
        matched: &MatchedCondition,
        records: &[HdRecord],
        policy_start: NaiveDate,
        today: NaiveDate,
        quality_flags: &mut Vec<String>,
    ) -> ConditionCheck {
        let name = matched.condition.name.clone();
        let waiting_period = matched
            .condition
            .waiting_period_days
            .unwrap_or(self.config.default_waiting_period_days);

        let mut check = ConditionCheck {
            condition_name: name.clone(),
            icd10_code: matched.icd10_code.clone(),
            declared: false,
            diagnosis_date: None,
            declaration_date: None,
            is_pre_existing: false,
            within_waiting_period: false,
            can_proceed: false,
            requires_hitl: false,
            reason: String::new(),
        };

        let declared = records.iter().find(|r| {
            let code = r.icd10_code.trim().to_ascii_uppercase();
            !code.is_empty() && matched.icd10_code.starts_with(&code)
        });
        let Some(record) = declared else {
            check.requires_hitl = true;
            check.reason = format!("{name} requires health declaration but was not declared by member");
            return check;
        };

        check.declared = true;
        check.diagnosis_date = record.diagnosis_date.clone();
        check.declaration_date = record.declaration_date.clone();

        let Some(diagnosed) = record.diagnosis_date.as_deref().and_then(parse_date) else {
            let raw = record.diagnosis_date.as_deref().unwrap_or("<missing>");
            warn!(
                icd10_code = %matched.icd10_code,
                diagnosis_date = %raw,
                policy = ?self.config.malformed_date_policy,
                "declared condition has no usable diagnosis date"
            );
            quality_flags.push(format!(
                "Unusable diagnosis date '{raw}' on declared {name} ({})",
                record.icd10_code
            ));
            match self.config.malformed_date_policy {
                MalformedDatePolicy::Permissive => {
                    check.can_proceed = true;
                    check.reason = "Condition declared in health declaration; pre-existing status not provable".to_string();
                }
                MalformedDatePolicy::RequireReview => {
                    check.requires_hitl = true;
                    check.reason = format!("{name} declared but its diagnosis date cannot be verified");
                }
            }
            return check;
        };

        if diagnosed > policy_start {
            check.can_proceed = true;
            check.reason = "Condition declared and discovered after policy start".to_string();
            return check;
        }

        check.is_pre_existing = true;
        let policy_age = (today - policy_start).num_days();
        if policy_age < waiting_period {
            check.within_waiting_period = true;
            check.reason = format!("Pre-existing condition within {waiting_period}-day waiting period");
        } else {
            check.can_proceed = true;
            check.reason = "Pre-existing condition declared, waiting period satisfied".to_string();
        }
        check
    }
}

impl HealthScreen for HealthDeclarationValidator {
    fn screen(
        &self,
        request: &ClinicalRequest,
        member_id: &str,
        policy_start: NaiveDate,
        today: NaiveDate,
    ) -> PreauthResult<HdReport> {
        let conditions_found = self.matched_conditions(request);
        if conditions_found.is_empty() {
            debug!(member_id = %member_id, "no hd-required conditions");
            return Ok(HdReport::not_required(member_id));
        }

        info!(
            member_id = %member_id,
            conditions = %conditions_found.iter().map(|c| c.icd10_code.as_str()).collect::<Vec<_>>().join(","),
            "hd-required conditions found"
        );

        let records = self.store.get_records(member_id)?;
        let mut data_quality_flags = Vec::new();
        let checks: Vec<ConditionCheck> = conditions_found
            .iter()
            .map(|m| self.check_condition(m, &records, policy_start, today, &mut data_quality_flags))
            .collect();

        let held: Vec<String> = checks
            .iter()
            .filter(|c| c.requires_hitl)
            .map(|c| c.condition_name.clone())
            .collect();
        let denied: Vec<String> = checks
            .iter()
            .filter(|c| !c.requires_hitl && !c.can_proceed)
            .map(|c| c.condition_name.clone())
            .collect();

        let (outcome, flagged_conditions, reason) = if !held.is_empty() {
            let reason = if checks.iter().any(|c| c.requires_hitl && !c.declared) {
                "Health declaration required but not found in member records"
            } else {
                "Declared condition could not be verified against policy start"
            };
            error!(member_id = %member_id, flagged = %held.join(", "), "hitl required: {reason}");
            (HdOutcome::HitlRequired, held, reason.to_string())
        } else if !denied.is_empty() {
            warn!(member_id = %member_id, flagged = %denied.join(", "), "pre-existing condition within waiting period");
            (
                HdOutcome::DenyPreExisting,
                denied,
                "Pre-existing condition within waiting period".to_string(),
            )
        } else {
            info!(member_id = %member_id, "hd validated, proceeding to adjudication");
            (
                HdOutcome::Proceed,
                Vec::new(),
                "All HD conditions properly declared".to_string(),
            )
        };

        Ok(HdReport {
            member_id: member_id.to_string(),
            outcome,
            conditions_found,
            checks,
            flagged_conditions,
            reason,
            data_quality_flags,
        })
    }
}

/// Parse `YYYY-MM-DD`, an RFC 3339 timestamp, or a naive ISO timestamp.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.date_naive());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|ts| ts.date())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_date_accepts_common_iso_forms() {
        let expected = NaiveDate::from_ymd_opt(2023, 1, 15);
        assert_eq!(parse_date("2023-01-15"), expected);
        assert_eq!(parse_date("2023-01-15T08:30:00Z"), expected);
        assert_eq!(parse_date("2023-01-15T08:30:00+03:00"), expected);
        assert_eq!(parse_date("2023-01-15T08:30:00"), expected);
    }

    #[test]
    fn parse_date_rejects_garbage() {
        for raw in ["", "   ", "15/01/2023", "2023-13-40", "yesterday"] {
            assert_eq!(parse_date(raw), None, "{raw:?} should not parse");
        }
    }
}
