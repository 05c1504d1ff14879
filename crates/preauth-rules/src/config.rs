//! Full engine configuration document.
//!
//! One TOML file configures every layer. Each table is optional and falls
//! back to its defaults, so an empty document is a valid configuration.
//!
//! ```toml
//! [ruleset]
//! version = "2024.2"
//!
//! [[hd_conditions]]
//! code = "E11"
//! name = "Type 2 Diabetes Mellitus"
//! category = "Endocrine"
//! severity = "high"
//! waiting_period_days = 180
//!
//! [screening]
//! malformed_date_policy = "require_review"
//!
//! [blend]
//! reasoning_weight = 0.4
//! policy_weight = 0.6
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use preauth_contracts::{
    config::{
        BlendConfig, FinancialConfig, FraudConfig, HistoryConfig, NecessityConfig, OrchestratorConfig,
        RetrievalConfig, ReviewConfig, ScreeningConfig,
    },
    error::{PreauthError, PreauthResult},
    screening::HdCondition,
};

use crate::rule::RuleSet;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub ruleset: RuleSet,
    /// HD-required condition table. Empty means the built-in table.
    pub hd_conditions: Vec<HdCondition>,
    pub screening: ScreeningConfig,
    pub retrieval: RetrievalConfig,
    pub blend: BlendConfig,
    pub orchestrator: OrchestratorConfig,
    pub review: ReviewConfig,
    pub necessity: NecessityConfig,
    pub history: HistoryConfig,
    pub financial: FinancialConfig,
    pub fraud: FraudConfig,
}

impl EngineConfig {
    /// Returns `PreauthError::ConfigError` if the TOML is malformed, does not
    /// match the schema, or carries out-of-range values.
    pub fn from_toml_str(s: &str) -> PreauthResult<Self> {
        let config: EngineConfig = toml::from_str(s).map_err(|e| PreauthError::ConfigError {
            reason: format!("failed to parse engine config TOML: {}", e),
        })?;
        config.check()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> PreauthResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| PreauthError::ConfigError {
            reason: format!("failed to read engine config file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Reject values that would make a layer misbehave at request time.
    pub fn check(&self) -> PreauthResult<()> {
        let unit = [
            ("retrieval.min_relevance", self.retrieval.min_relevance),
            ("blend.relevance_threshold", self.blend.relevance_threshold),
            ("orchestrator.fallback_confidence", self.orchestrator.fallback_confidence),
            ("orchestrator.hd_decision_confidence", self.orchestrator.hd_decision_confidence),
            ("review.review_confidence", self.review.review_confidence),
            ("ruleset.confidence.approve", self.ruleset.confidence.approve),
            ("ruleset.confidence.deny", self.ruleset.confidence.deny),
        ];
        for (key, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                return Err(PreauthError::ConfigError {
                    reason: format!("{key} must lie in [0, 1], got {value}"),
                });
            }
        }

        for (key, weight) in [
            ("blend.reasoning_weight", self.blend.reasoning_weight),
            ("blend.policy_weight", self.blend.policy_weight),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(PreauthError::ConfigError {
                    reason: format!("{key} must be a non-negative number, got {weight}"),
                });
            }
        }

        for condition in &self.hd_conditions {
            if condition.code.trim().is_empty() {
                return Err(PreauthError::ConfigError {
                    reason: format!("hd condition '{}' has an empty code", condition.name),
                });
            }
            if condition.waiting_period_days.is_some_and(|days| days < 0) {
                return Err(PreauthError::ConfigError {
                    reason: format!(
                        "hd condition '{}' has a negative waiting period",
                        condition.code
                    ),
                });
            }
        }

        if self.fraud.window_days <= 0 {
            return Err(PreauthError::ConfigError {
                reason: "fraud.window_days must be positive".to_string(),
            });
        }
        for (key, hours) in [
            ("history.sweep_interval_hours", self.history.sweep_interval_hours),
            ("fraud.sweep_interval_hours", self.fraud.sweep_interval_hours),
        ] {
            if hours <= 0 {
                return Err(PreauthError::ConfigError {
                    reason: format!("{key} must be positive, got {hours}"),
                });
            }
        }
        Ok(())
    }
}
