//! TOML-driven rule evaluator.
//!
//! `TomlRuleEngine` holds the active `RuleSet` behind `RwLock<Arc<_>>`.
//! Each evaluation clones the `Arc` once and works on that snapshot, so a
//! concurrent `reload` never changes the rules halfway through a request.
//!
//! Evaluation order (first decisive step wins):
//!
//! 1. Auto-deny: excluded service categories and excluded diagnoses.
//! 2. Coverage: a missing or `"unknown"` coverage id denies.
//! 3. Service checks: prior-authorization and per-category cost ceilings.
//!    Labels only.
//! 4. Age: categorize the patient; only `terminal` restrictions deny.
//! 5. Frequency limits against the `UtilizationSource`. Unknown usage passes.
//! 6. Cost thresholds: totals above the auto-approve ceiling raise a flag.
//! 7. Medical-necessity triggers raise flags.
//! 8. Auto-approve when nothing was flagged.
//!
//! Anything that reaches the end undecided is "uncertain" and continues to
//! policy retrieval and clinical reasoning.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, RwLock};

use tracing::{debug, info};

use preauth_contracts::{
    claim::ClinicalRequest,
    decision::DecisionKind,
    error::{PreauthError, PreauthResult},
    rules::RuleOutcome,
};
use preauth_core::traits::RuleEngine;

use crate::rule::{age_category, RuleSet};

/// Prior utilization lookup for frequency limits.
pub trait UtilizationSource: Send + Sync {
    /// Services of `category` the patient used in the current year, or
    /// `None` when usage is unknown.
    fn services_used(&self, patient_id: &str, category: &str) -> PreauthResult<Option<u32>>;
}

/// A source that knows nothing, so every frequency limit passes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoUtilization;

impl UtilizationSource for NoUtilization {
    fn services_used(&self, _patient_id: &str, _category: &str) -> PreauthResult<Option<u32>> {
        Ok(None)
    }
}

pub struct TomlRuleEngine {
    rules: RwLock<Arc<RuleSet>>,
    utilization: Box<dyn UtilizationSource>,
}

impl fmt::Debug for TomlRuleEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let version = self
            .snapshot()
            .map(|r| r.version.clone())
            .unwrap_or_else(|_| "<poisoned>".to_string());
        f.debug_struct("TomlRuleEngine").field("version", &version).finish()
    }
}

impl TomlRuleEngine {
    pub fn new(rules: RuleSet) -> Self {
        Self {
            rules: RwLock::new(Arc::new(rules)),
            utilization: Box::new(NoUtilization),
        }
    }

    /// Replace the utilization source used by frequency limits.
    pub fn with_utilization(mut self, source: Box<dyn UtilizationSource>) -> Self {
        self.utilization = source;
        self
    }

    /// Parse `s` as a bare rule set document (the contents of `[ruleset]`).
    ///
    /// Returns `PreauthError::ConfigError` if the TOML is malformed or does
    /// not match the `RuleSet` schema.
    pub fn from_toml_str(s: &str) -> PreauthResult<Self> {
        Ok(Self::new(parse_ruleset(s)?))
    }

    pub fn from_file(path: &Path) -> PreauthResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| PreauthError::ConfigError {
            reason: format!("failed to read rule set file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    /// The rule set currently in force.
    pub fn snapshot(&self) -> PreauthResult<Arc<RuleSet>> {
        let guard = self.rules.read().map_err(|e| PreauthError::ConfigError {
            reason: format!("rule set lock poisoned: {}", e),
        })?;
        Ok(Arc::clone(&guard))
    }

    /// Atomically swap in a new rule set.
    ///
    /// Evaluations already running finish against the snapshot they took.
    /// Returns the version that was replaced.
    pub fn reload(&self, rules: RuleSet) -> PreauthResult<String> {
        let mut guard = self.rules.write().map_err(|e| PreauthError::ConfigError {
            reason: format!("rule set lock poisoned: {}", e),
        })?;
        let previous = guard.version.clone();
        info!(from = %previous, to = %rules.version, "rule set reloaded");
        *guard = Arc::new(rules);
        Ok(previous)
    }

    /// Parse and swap in a rule set document. The active rules are left
    /// untouched if parsing fails.
    pub fn reload_from_toml_str(&self, s: &str) -> PreauthResult<String> {
        self.reload(parse_ruleset(s)?)
    }

    /// Service category for a description under the active rules.
    pub fn classify_service(&self, description: &str) -> PreauthResult<String> {
        Ok(self.snapshot()?.classify(description).to_string())
    }

    /// Human-readable explanation for a triggered rule id.
    pub fn explain_rule(&self, rule_id: &str) -> PreauthResult<String> {
        Ok(self.snapshot()?.explain(rule_id))
    }
}

fn parse_ruleset(s: &str) -> PreauthResult<RuleSet> {
    toml::from_str(s).map_err(|e| PreauthError::ConfigError {
        reason: format!("failed to parse rule set TOML: {}", e),
    })
}

fn deny(mut outcome: RuleOutcome, rules: &RuleSet, step: &str) -> RuleOutcome {
    info!(
        step = %step,
        rules = %outcome.triggered_rules.join(","),
        "rules engine denied request"
    );
    outcome.auto_decision = Some(DecisionKind::Denied);
    outcome.confidence = rules.confidence.deny;
    outcome
}

fn has_coverage(request: &ClinicalRequest) -> bool {
    match request.coverage_id.as_deref().map(str::trim) {
        None | Some("") => false,
        Some(id) => !id.eq_ignore_ascii_case("unknown"),
    }
}

impl RuleEngine for TomlRuleEngine {
    fn evaluate(&self, request: &ClinicalRequest) -> PreauthResult<RuleOutcome> {
        let rules = self.snapshot()?;
        let mut outcome = RuleOutcome::uncertain(rules.version.clone());
        let total = request.effective_total();

        debug!(
            request_id = %request.request_id,
            version = %rules.version,
            total = %total,
            "evaluating rules"
        );

        let categorized: Vec<(&str, f64, String)> = request
            .services
            .iter()
            .map(|line| (rules.classify(&line.description), line.amount(), line.description.to_lowercase()))
            .collect();

        // ── Step 1: auto-deny ────────────────────────────────────────────────
        for (category, _, _) in &categorized {
            if rules.excluded_categories.iter().any(|c| c == category) {
                outcome.trigger(format!("excluded_service_{category}"));
                outcome.reasons.push(format!("Service {category} is not covered"));
            }
        }
        for dx in &request.diagnoses {
            let display = dx.display.to_lowercase();
            if rules
                .excluded_diagnosis_keywords
                .iter()
                .any(|k| display.contains(k.as_str()))
            {
                outcome.trigger("excluded_diagnosis");
                outcome.reasons.push(format!("Diagnosis {} not covered", dx.code));
            }
        }
        if !outcome.reasons.is_empty() {
            return Ok(deny(outcome, &rules, "auto_deny"));
        }

        // ── Step 2: coverage ─────────────────────────────────────────────────
        if !has_coverage(request) {
            outcome.trigger("no_valid_coverage");
            outcome.reasons.push(rules.explain("no_valid_coverage"));
            return Ok(deny(outcome, &rules, "coverage"));
        }

        // ── Step 3: service checks ───────────────────────────────────────────
        for (category, amount, _) in &categorized {
            if rules.prior_auth_categories.iter().any(|c| c == category) {
                outcome.trigger(format!("preauth_required_{category}"));
            }
            if let Some(ceiling) = rules.cost_ceilings.get(*category) {
                if amount > ceiling {
                    outcome.trigger(format!("cost_limit_exceeded_{category}"));
                }
            }
        }

        // ── Step 4: age ──────────────────────────────────────────────────────
        match request.patient_age {
            Some(age) => {
                outcome.age_category = Some(age_category(age));
                let mut terminal_hit = false;
                for rule in &rules.age_rules {
                    let violated = categorized
                        .iter()
                        .any(|(category, _, _)| rule.applies_to(category) && !rule.permits(age));
                    if !violated {
                        continue;
                    }
                    let label = format!("age_restriction_{}", rule.id);
                    debug!(rule_id = %rule.id, age = %age, terminal = %rule.terminal, "age restriction violated");
                    if rule.terminal {
                        terminal_hit = true;
                        let reason = rule.reason.clone().unwrap_or_else(|| rules.explain(&label));
                        outcome.reasons.push(reason);
                    }
                    outcome.trigger(label);
                }
                if terminal_hit {
                    return Ok(deny(outcome, &rules, "age_restrictions"));
                }
            }
            None => debug!(request_id = %request.request_id, "patient age unknown, age rules skipped"),
        }

        // ── Step 5: frequency limits ─────────────────────────────────────────
        let mut requested: BTreeMap<&str, u32> = BTreeMap::new();
        for (category, _, _) in &categorized {
            *requested.entry(*category).or_insert(0) += 1;
        }
        for (category, count) in requested {
            let Some(max) = rules.frequency_limits.get(category) else {
                continue;
            };
            match self.utilization.services_used(&request.patient_id, category)? {
                Some(used) if used.saturating_add(count) > *max => {
                    outcome.trigger("frequency_limit_exceeded");
                    outcome.reasons.push(format!(
                        "{}: {} {} services used of {} per year",
                        rules.explain("frequency_limit_exceeded"),
                        used,
                        category,
                        max
                    ));
                }
                Some(_) => {}
                None => debug!(category = %category, "utilization unknown, frequency limit passes"),
            }
        }
        if outcome.triggered_rules.iter().any(|r| r == "frequency_limit_exceeded") {
            return Ok(deny(outcome, &rules, "frequency"));
        }

        // ── Step 6: cost thresholds ──────────────────────────────────────────
        if total > rules.thresholds.auto_approve_max {
            let level = if total <= rules.thresholds.require_medical_review_min {
                "medical_review"
            } else {
                "senior_review"
            };
            debug!(total = %total, level = %level, "cost above auto-approve ceiling");
            outcome.raise("high_cost_service");
        }

        // ── Step 7: medical-necessity triggers ───────────────────────────────
        for (_, _, description) in &categorized {
            if rules
                .experimental_keywords
                .iter()
                .any(|k| description.contains(k.as_str()))
            {
                outcome.raise("experimental_procedure");
            }
        }
        if total > rules.thresholds.necessity_review_total {
            outcome.raise("high_cost_service");
        }
        if rules.requires_document("clinical_notes") && !request.has_clinical_notes() {
            outcome.raise("missing_clinical_notes");
        }

        // ── Step 8: auto-approve ─────────────────────────────────────────────
        let approve = &rules.auto_approve;
        let eligible_line = categorized
            .iter()
            .any(|(category, _, _)| approve.categories.iter().any(|c| c == category));
        if outcome.risk_flags.is_empty() && total > 0.0 && total <= approve.max_total && eligible_line {
            outcome.trigger(approve.id.clone());
            outcome.reasons.push(approve.reason.clone());
            outcome.auto_decision = Some(DecisionKind::Approved);
            outcome.confidence = rules.confidence.approve;
            info!(request_id = %request.request_id, rule_id = %approve.id, "rules engine approved request");
            return Ok(outcome);
        }

        debug!(
            request_id = %request.request_id,
            risk_flags = %outcome.risk_flags.join(","),
            "rules engine uncertain"
        );
        Ok(outcome)
    }
}
