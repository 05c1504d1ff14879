//! Patient history analysis.
//!
//! Keeps an append-only, per-patient log of past requests and scores the
//! current request against it:
//!
//! - the same service code requested within the duplicate window
//! - more requests in the current calendar year than allowed
//!
//! The current request is always appended after scoring. Entries past the
//! retention horizon or beyond the per-patient cap are pruned on append, and
//! a periodic sweep forgets patients whose whole log has expired.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use preauth_contracts::{
    claim::ClinicalRequest,
    config::HistoryConfig,
    decision::ServiceLineDecision,
    error::PreauthResult,
    trace::Layer,
    validation::ValidationReport,
};
use preauth_core::traits::Validator;

use crate::keyed::{KeyedStore, SweepClock};

pub const HISTORY_REVIEW_REASON: &str = "Patient history risk";

/// One past request in a patient's log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub request_id: String,
    pub at: DateTime<Utc>,
    pub service_codes: Vec<String>,
    pub cost: f64,
}

/// Per-patient request log.
#[derive(Debug)]
pub struct HistoryStore {
    log: KeyedStore<Vec<HistoryEntry>>,
    sweep: SweepClock,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryStore {
    pub fn new() -> Self {
        Self {
            log: KeyedStore::new("history"),
            sweep: SweepClock::default(),
        }
    }

    /// A copy of the patient's log, oldest first.
    pub fn entries(&self, patient_id: &str) -> PreauthResult<Vec<HistoryEntry>> {
        Ok(self.log.peek(patient_id, |log| log.clone())?.unwrap_or_default())
    }

    /// Append without scoring; used to seed prior history.
    pub fn record(&self, patient_id: &str, entry: HistoryEntry, config: &HistoryConfig) -> PreauthResult<()> {
        let now = entry.at;
        self.log.with(patient_id, |log| {
            log.push(entry);
            prune(log, now, config);
        })?;
        self.sweep_if_due(now, config)
    }

    pub fn patient_count(&self) -> PreauthResult<usize> {
        self.log.key_count()
    }

    /// Prune every patient's log as of `now` and drop patients left with
    /// nothing. Returns how many patients were dropped.
    pub fn prune_expired(&self, now: DateTime<Utc>, config: &HistoryConfig) -> PreauthResult<usize> {
        self.log.evict_where(|log| {
            prune(log, now, config);
            log.is_empty()
        })
    }

    /// [`HistoryStore::prune_expired`], at most once per sweep interval.
    pub fn sweep_if_due(&self, now: DateTime<Utc>, config: &HistoryConfig) -> PreauthResult<()> {
        if !self.sweep.due(now, Duration::hours(config.sweep_interval_hours))? {
            return Ok(());
        }
        let dropped = self.prune_expired(now, config)?;
        if dropped > 0 {
            debug!(dropped, "expired patient histories swept");
        }
        Ok(())
    }
}

fn prune(log: &mut Vec<HistoryEntry>, now: DateTime<Utc>, config: &HistoryConfig) {
    let horizon = now - Duration::days(config.retention_days);
    log.retain(|e| e.at >= horizon);
    if log.len() > config.max_entries_per_patient {
        let excess = log.len() - config.max_entries_per_patient;
        log.drain(..excess);
    }
}

/// What the log says about the current request.
#[derive(Debug, Clone, Default, PartialEq)]
struct HistoryScore {
    prior_requests: usize,
    duplicate: bool,
    year_requests: usize,
    ytd_cost: f64,
}

fn score(log: &[HistoryEntry], request: &ClinicalRequest, now: DateTime<Utc>, config: &HistoryConfig) -> HistoryScore {
    let cutoff = now - Duration::days(config.duplicate_window_days);
    let duplicate = log.iter().filter(|e| e.at > cutoff).any(|e| {
        request
            .services
            .iter()
            .any(|s| e.service_codes.iter().any(|c| *c == s.code))
    });
    let this_year: Vec<&HistoryEntry> = log.iter().filter(|e| e.at.year() == now.year()).collect();

    HistoryScore {
        prior_requests: log.len(),
        duplicate,
        year_requests: this_year.len(),
        ytd_cost: this_year.iter().map(|e| e.cost).sum(),
    }
}

pub struct PatientHistoryAnalyzer {
    store: Arc<HistoryStore>,
    config: HistoryConfig,
}

impl PatientHistoryAnalyzer {
    pub fn new(store: Arc<HistoryStore>, config: HistoryConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<HistoryStore> {
        &self.store
    }
}

impl Validator for PatientHistoryAnalyzer {
    fn layer(&self) -> Layer {
        Layer::PatientHistory
    }

    fn validate(
        &self,
        request: &ClinicalRequest,
        decisions: &mut [ServiceLineDecision],
        now: DateTime<Utc>,
    ) -> PreauthResult<ValidationReport> {
        let config = &self.config;
        let entry = HistoryEntry {
            request_id: request.request_id.clone(),
            at: now,
            service_codes: request.services.iter().map(|s| s.code.clone()).collect(),
            cost: request.effective_total(),
        };

        let found = self.store.log.with(&request.patient_id, |log| {
            let found = score(log, request, now, config);
            log.push(entry);
            prune(log, now, config);
            found
        })?;
        self.store.sweep_if_due(now, config)?;

        let mut report = ValidationReport::new(Layer::PatientHistory);
        if found.duplicate {
            report.flags.push("duplicate_request".to_string());
            report.score += config.duplicate_weight;
        }
        if found.year_requests > config.max_requests_per_year {
            report.flags.push("frequency_violation".to_string());
            report.score += config.frequency_weight;
        }

        debug!(
            patient_id = %request.patient_id,
            prior_requests = found.prior_requests,
            year_requests = found.year_requests,
            ytd_cost = found.ytd_cost,
            risk = report.score,
            "history analyzed"
        );

        if report.score > config.review_risk_threshold {
            warn!(
                patient_id = %request.patient_id,
                flags = %report.flags.join(","),
                risk = report.score,
                "patient history risk above threshold"
            );
            for d in decisions.iter_mut() {
                d.flag_for_review(HISTORY_REVIEW_REASON);
                report.forced_review.push(d.sequence);
            }
        }
        Ok(report)
    }
}
