//! Tunable configuration for every layer.
//!
//! Each struct deserializes from its own TOML table and falls back to the
//! values below for any key that is absent, so a config file only needs to
//! list what it changes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ── Orchestration ────────────────────────────────────────────────────────────

/// Parameters passed to the policy-retrieval collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub min_relevance: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            min_relevance: 0.6,
        }
    }
}

/// Weights for merging policy relevance into clinical-reasoning confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendConfig {
    pub reasoning_weight: f64,
    pub policy_weight: f64,
    /// Minimum relevance for a hit to count as high-relevance.
    pub relevance_threshold: f64,
    /// How many hit excerpts are attached as policy references.
    pub max_policy_references: usize,
    pub excerpt_chars: usize,
}

impl Default for BlendConfig {
    fn default() -> Self {
        Self {
            reasoning_weight: 0.4,
            policy_weight: 0.6,
            relevance_threshold: 0.75,
            max_policy_references: 2,
            excerpt_chars: 200,
        }
    }
}

impl BlendConfig {
    /// `(reasoning, policy)` weights scaled to sum to 1.
    ///
    /// Degenerate weights (negative, non-finite, or both zero) fall back to
    /// the defaults.
    pub fn normalized_weights(&self) -> (f64, f64) {
        let (r, p) = (self.reasoning_weight, self.policy_weight);
        let usable = r.is_finite() && p.is_finite() && r >= 0.0 && p >= 0.0 && r + p > 0.0;
        if usable {
            (r / (r + p), p / (r + p))
        } else {
            let d = BlendConfig::default();
            (d.reasoning_weight, d.policy_weight)
        }
    }
}

/// Orchestrator-level constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Confidence stamped on lines when a collaborator fails.
    pub fallback_confidence: f64,
    /// Confidence stamped on lines decided by an HD block.
    pub hd_decision_confidence: f64,
    /// Confidence recorded for the policy step when no hit is strong enough
    /// to guide reasoning.
    pub unguided_policy_confidence: f64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            fallback_confidence: 0.3,
            hd_decision_confidence: 0.95,
            unguided_policy_confidence: 0.6,
        }
    }
}

// ── Health declaration ───────────────────────────────────────────────────────

/// How a malformed or missing diagnosis date on a declared record is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedDatePolicy {
    /// Cannot prove pre-existing, so the condition clears. Logged and flagged.
    Permissive,
    /// Route the request to human review instead.
    RequireReview,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreeningConfig {
    /// Policy start assumed when the caller supplies none: today minus this.
    pub default_policy_age_days: i64,
    /// Waiting period used for a condition that does not set its own.
    pub default_waiting_period_days: i64,
    pub malformed_date_policy: MalformedDatePolicy,
}

impl Default for ScreeningConfig {
    fn default() -> Self {
        Self {
            default_policy_age_days: 180,
            default_waiting_period_days: 180,
            malformed_date_policy: MalformedDatePolicy::Permissive,
        }
    }
}

// ── HITL review ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    pub review_confidence: f64,
    pub high_cost: f64,
    pub urgent_cost: f64,
    pub auto_approve_confidence: f64,
    pub auto_approve_max_cost: f64,
    pub auto_deny_confidence: f64,
    /// Stricter confidence bar for lines decided by clinical reasoning alone.
    pub reasoning_only_confidence: f64,
    pub complex_min_diagnoses: usize,
    pub complex_min_procedures: usize,
    pub complex_orchestration_confidence: f64,
    pub conflict_relevance: f64,
    pub experimental_keywords: Vec<String>,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            review_confidence: 0.75,
            high_cost: 20_000.0,
            urgent_cost: 50_000.0,
            auto_approve_confidence: 0.90,
            auto_approve_max_cost: 5_000.0,
            auto_deny_confidence: 0.90,
            reasoning_only_confidence: 0.80,
            complex_min_diagnoses: 3,
            complex_min_procedures: 2,
            complex_orchestration_confidence: 0.70,
            conflict_relevance: 0.80,
            experimental_keywords: ["experimental", "investigational", "trial", "research", "novel", "unproven"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

// ── Post-decision validators ─────────────────────────────────────────────────

/// Inclusive patient-age range for a service code.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgeRange {
    #[serde(default)]
    pub min_age: u32,
    #[serde(default = "AgeRange::default_max")]
    pub max_age: u32,
}

impl AgeRange {
    fn default_max() -> u32 {
        120
    }

    pub fn contains(&self, age: u32) -> bool {
        self.min_age <= age && age <= self.max_age
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NecessityConfig {
    /// 3-character ICD-10 prefix → service codes that diagnosis supports.
    pub diagnosis_service_map: BTreeMap<String, Vec<String>>,
    /// Service code → appropriate patient age range.
    pub age_guidelines: BTreeMap<String, AgeRange>,
    pub mismatch_penalty: f64,
    pub age_penalty: f64,
    pub score_floor: f64,
    /// A line with at least this many flags is not medically necessary.
    pub invalid_flag_count: usize,
}

impl Default for NecessityConfig {
    fn default() -> Self {
        let map = |pairs: &[(&str, &[&str])]| {
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
                .collect()
        };
        let range = |min_age, max_age| AgeRange { min_age, max_age };
        Self {
            diagnosis_service_map: map(&[
                ("M17", &["27447"]),
                ("M16", &["27130"]),
                ("I25", &["33510", "92928"]),
                ("E11", &["99213"]),
                ("I50", &["33510"]),
            ]),
            age_guidelines: [
                ("27447".to_string(), range(45, 85)),
                ("27130".to_string(), range(45, 85)),
                ("33510".to_string(), range(30, 85)),
            ]
            .into_iter()
            .collect(),
            mismatch_penalty: 0.2,
            age_penalty: 0.15,
            score_floor: 0.5,
            invalid_flag_count: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub duplicate_window_days: i64,
    pub max_requests_per_year: usize,
    pub duplicate_weight: f64,
    pub frequency_weight: f64,
    /// Risk strictly above this forces review on every line.
    pub review_risk_threshold: f64,
    /// Entries older than this are pruned when a patient's log is appended
    /// and by the periodic sweep, which also forgets patients left empty.
    pub retention_days: i64,
    pub max_entries_per_patient: usize,
    pub sweep_interval_hours: i64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            duplicate_window_days: 30,
            max_requests_per_year: 10,
            duplicate_weight: 0.2,
            frequency_weight: 0.3,
            review_risk_threshold: 0.5,
            retention_days: 366,
            max_entries_per_patient: 500,
            sweep_interval_hours: 24,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FinancialConfig {
    /// Service code → average cost.
    pub average_costs: BTreeMap<String, f64>,
    pub outlier_multiplier: f64,
    pub outlier_weight: f64,
    pub high_total_cost: f64,
    pub high_total_weight: f64,
    pub high_threshold: f64,
    pub medium_threshold: f64,
}

impl Default for FinancialConfig {
    fn default() -> Self {
        Self {
            average_costs: [
                ("27447", 45_000.0),
                ("27130", 50_000.0),
                ("33510", 150_000.0),
                ("92928", 80_000.0),
            ]
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect(),
            outlier_multiplier: 2.0,
            outlier_weight: 0.2,
            high_total_cost: 100_000.0,
            high_total_weight: 0.3,
            high_threshold: 0.5,
            medium_threshold: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FraudConfig {
    pub high_cost_claim: f64,
    pub high_cost_weight: f64,
    pub window_days: i64,
    pub max_requests_in_window: usize,
    /// The frequency check only runs once this many requests are on record.
    pub min_history_for_frequency: usize,
    pub frequency_weight: f64,
    pub max_service_lines: usize,
    pub service_anomaly_weight: f64,
    pub high_threshold: f64,
    pub medium_threshold: f64,
    pub low_medium_threshold: f64,
    /// A provider unseen for this long is dropped by the periodic sweep,
    /// lifetime counters included.
    pub retention_days: i64,
    pub sweep_interval_hours: i64,
}

impl Default for FraudConfig {
    fn default() -> Self {
        Self {
            high_cost_claim: 50_000.0,
            high_cost_weight: 0.3,
            window_days: 7,
            max_requests_in_window: 20,
            min_history_for_frequency: 10,
            frequency_weight: 0.2,
            max_service_lines: 10,
            service_anomaly_weight: 0.2,
            high_threshold: 0.7,
            medium_threshold: 0.5,
            low_medium_threshold: 0.3,
            retention_days: 366,
            sweep_interval_hours: 24,
        }
    }
}
