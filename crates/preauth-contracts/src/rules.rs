//! Rule-evaluation outcome types.

use serde::{Deserialize, Serialize};

use crate::decision::DecisionKind;

/// Patient age band used by age-restriction rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgeCategory {
    Pediatric,
    Adult,
    Elderly,
}

/// What the rule evaluator concluded about a request.
///
/// `auto_decision = None` means "uncertain": no decisive rule fired and the
/// orchestrator must continue to policy retrieval and clinical reasoning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleOutcome {
    pub auto_decision: Option<DecisionKind>,
    /// Labels of every rule that matched, decisive or not.
    pub triggered_rules: Vec<String>,
    /// Non-terminal risk indicators raised along the way.
    pub risk_flags: Vec<String>,
    /// Human-readable reasons behind a decisive verdict.
    pub reasons: Vec<String>,
    /// Confidence attached to a decisive verdict.
    pub confidence: f64,
    pub age_category: Option<AgeCategory>,
    /// Rule set version the request was evaluated against.
    pub ruleset_version: String,
}

impl RuleOutcome {
    pub fn uncertain(ruleset_version: impl Into<String>) -> Self {
        Self {
            auto_decision: None,
            triggered_rules: Vec::new(),
            risk_flags: Vec::new(),
            reasons: Vec::new(),
            confidence: 0.5,
            age_category: None,
            ruleset_version: ruleset_version.into(),
        }
    }

    pub fn is_decisive(&self) -> bool {
        self.auto_decision.is_some()
    }

    /// Record a risk flag once.
    pub fn raise(&mut self, flag: impl Into<String>) {
        let flag = flag.into();
        if !self.risk_flags.contains(&flag) {
            self.risk_flags.push(flag);
        }
    }

    /// Record a triggered rule label once.
    pub fn trigger(&mut self, rule: impl Into<String>) {
        let rule = rule.into();
        if !self.triggered_rules.contains(&rule) {
            self.triggered_rules.push(rule);
        }
    }
}
