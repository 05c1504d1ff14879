//! Provider-level fraud pattern detection.
//!
//! Counters live in a `ProviderStatsStore` keyed by provider id. Each request
//! is counted before scoring, so the frequency check sees it. Request
//! timestamps older than the window are dropped; lifetime counters are kept
//! until the provider goes unseen past the retention horizon, when the
//! periodic sweep drops the provider entirely.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info};

use preauth_contracts::{
    claim::ClinicalRequest,
    config::FraudConfig,
    decision::ServiceLineDecision,
    error::PreauthResult,
    trace::Layer,
    validation::{RiskLevel, ValidationReport},
};
use preauth_core::traits::Validator;

use crate::financial::reaches;
use crate::keyed::{KeyedStore, SweepClock};

pub const FRAUD_REVIEW_REASON: &str = "Fraud investigation required";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderStats {
    pub total_requests: u64,
    pub high_cost_claims: u64,
    /// Request times inside the frequency window, oldest first.
    pub recent: VecDeque<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
}

impl ProviderStats {
    fn record(&mut self, at: DateTime<Utc>, high_cost: bool, window: Duration) {
        self.total_requests += 1;
        if high_cost {
            self.high_cost_claims += 1;
        }
        self.recent.push_back(at);
        self.last_seen = self.last_seen.max(Some(at));
        self.expire_window(at - window);
    }

    fn expire_window(&mut self, cutoff: DateTime<Utc>) {
        while self.recent.front().is_some_and(|t| *t <= cutoff) {
            self.recent.pop_front();
        }
    }
}

#[derive(Debug)]
pub struct ProviderStatsStore {
    stats: KeyedStore<ProviderStats>,
    sweep: SweepClock,
}

impl Default for ProviderStatsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderStatsStore {
    pub fn new() -> Self {
        Self {
            stats: KeyedStore::new("provider stats"),
            sweep: SweepClock::default(),
        }
    }

    pub fn snapshot(&self, provider_id: &str) -> PreauthResult<Option<ProviderStats>> {
        self.stats.peek(provider_id, ProviderStats::clone)
    }

    pub fn provider_count(&self) -> PreauthResult<usize> {
        self.stats.key_count()
    }

    /// Expire every provider's window as of `now` and drop providers with an
    /// empty window that have not been seen within the retention horizon.
    /// Returns how many providers were dropped.
    pub fn prune_expired(&self, now: DateTime<Utc>, config: &FraudConfig) -> PreauthResult<usize> {
        let cutoff = now - Duration::days(config.window_days);
        let horizon = now - Duration::days(config.retention_days);
        self.stats.evict_where(|stats| {
            stats.expire_window(cutoff);
            stats.recent.is_empty() && !stats.last_seen.is_some_and(|t| t >= horizon)
        })
    }

    /// [`ProviderStatsStore::prune_expired`], at most once per sweep interval.
    pub fn sweep_if_due(&self, now: DateTime<Utc>, config: &FraudConfig) -> PreauthResult<()> {
        if !self.sweep.due(now, Duration::hours(config.sweep_interval_hours))? {
            return Ok(());
        }
        let dropped = self.prune_expired(now, config)?;
        if dropped > 0 {
            debug!(dropped, "expired provider stats swept");
        }
        Ok(())
    }
}

/// What one request did to its provider's counters.
struct Observation {
    high_cost: bool,
    total_requests: u64,
    in_window: usize,
}

pub struct FraudDetector {
    store: Arc<ProviderStatsStore>,
    config: FraudConfig,
}

impl FraudDetector {
    pub fn new(store: Arc<ProviderStatsStore>, config: FraudConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<ProviderStatsStore> {
        &self.store
    }

    pub fn risk_level(&self, score: f64) -> RiskLevel {
        let cfg = &self.config;
        if reaches(score, cfg.high_threshold) {
            RiskLevel::High
        } else if reaches(score, cfg.medium_threshold) {
            RiskLevel::Medium
        } else if reaches(score, cfg.low_medium_threshold) {
            RiskLevel::LowMedium
        } else {
            RiskLevel::Low
        }
    }

    fn observe(&self, request: &ClinicalRequest, now: DateTime<Utc>) -> PreauthResult<Observation> {
        let cfg = &self.config;
        let high_cost = request.effective_total() > cfg.high_cost_claim;
        let window = Duration::days(cfg.window_days);

        let seen = self.store.stats.with(&request.provider_id, |stats| {
            stats.record(now, high_cost, window);
            Observation {
                high_cost,
                total_requests: stats.total_requests,
                in_window: stats.recent.len(),
            }
        })?;
        self.store.sweep_if_due(now, cfg)?;
        Ok(seen)
    }
}

impl Validator for FraudDetector {
    fn layer(&self) -> Layer {
        Layer::FraudDetection
    }

    fn validate(
        &self,
        request: &ClinicalRequest,
        decisions: &mut [ServiceLineDecision],
        now: DateTime<Utc>,
    ) -> PreauthResult<ValidationReport> {
        let cfg = &self.config;
        let seen = self.observe(request, now)?;
        let mut report = ValidationReport::new(Layer::FraudDetection);

        if seen.high_cost {
            report.flags.push("high_cost_claim".to_string());
            report.score += cfg.high_cost_weight;
        }
        if seen.total_requests >= cfg.min_history_for_frequency as u64 && seen.in_window > cfg.max_requests_in_window {
            report.flags.push("high_frequency".to_string());
            report.score += cfg.frequency_weight;
        }
        if request.services.len() > cfg.max_service_lines {
            report.flags.push("unusual_service_combination".to_string());
            report.score += cfg.service_anomaly_weight;
        }

        let level = self.risk_level(report.score);
        report.risk_level = Some(level);
        info!(
            provider_id = %request.provider_id,
            risk = ?level,
            score = report.score,
            "fraud analysis"
        );

        if level >= RiskLevel::Medium {
            error!(
                provider_id = %request.provider_id,
                request_id = %request.request_id,
                flags = %report.flags.join(","),
                "fraud investigation required"
            );
            for d in decisions.iter_mut() {
                d.override_review_reason(FRAUD_REVIEW_REASON);
                report.forced_review.push(d.sequence);
            }
        }
        Ok(report)
    }
}
