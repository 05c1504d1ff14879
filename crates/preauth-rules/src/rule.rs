//! Rule set schema.
//!
//! A `RuleSet` is deserialized from the `[ruleset]` table of the engine
//! configuration. Every key is optional; anything left out takes the value
//! from `RuleSet::default()`.
//!
//! Example:
//! ```toml
//! [ruleset]
//! version = "2024.2"
//! excluded_categories = ["cosmetic_surgery"]
//! prior_auth_categories = ["surgery", "diagnostics"]
//!
//! [[ruleset.categories]]
//! name = "cosmetic_surgery"
//! keywords = ["cosmetic", "aesthetic"]
//!
//! [ruleset.cost_ceilings]
//! diagnostics = 15000.0
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use preauth_contracts::rules::AgeCategory;

/// Category assigned to a service line that matches no keyword.
pub const OTHER_CATEGORY: &str = "other";

/// A service category and the description keywords that select it.
///
/// Categories are tried in declaration order; the first one with a keyword
/// contained in the lower-cased description wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCategory {
    pub name: String,
    pub keywords: Vec<String>,
}

impl ServiceCategory {
    fn new(name: &str, keywords: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    /// `description` must already be lower-cased.
    pub fn matches(&self, description: &str) -> bool {
        self.keywords.iter().any(|k| description.contains(k.as_str()))
    }
}

/// An age restriction on one service category.
///
/// Violations are recorded as triggered rules. Only a `terminal` restriction
/// denies the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgeRule {
    pub id: String,
    /// Service category the restriction applies to; `None` applies to all.
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub min_age: Option<u32>,
    #[serde(default)]
    pub max_age: Option<u32>,
    #[serde(default)]
    pub terminal: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

impl AgeRule {
    pub fn applies_to(&self, category: &str) -> bool {
        self.category.as_deref().map_or(true, |c| c == category)
    }

    pub fn permits(&self, age: u32) -> bool {
        self.min_age.map_or(true, |min| age >= min) && self.max_age.map_or(true, |max| age <= max)
    }
}

/// Total-cost bands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostThresholds {
    /// Totals above this raise the `high_cost_service` risk flag.
    pub auto_approve_max: f64,
    /// Totals above this need senior rather than routine medical review.
    pub require_medical_review_min: f64,
    /// Totals above this are a medical-necessity review trigger.
    pub necessity_review_total: f64,
}

impl Default for CostThresholds {
    fn default() -> Self {
        Self {
            auto_approve_max: 5_000.0,
            require_medical_review_min: 50_000.0,
            necessity_review_total: 50_000.0,
        }
    }
}

/// Conditions under which a request is approved without further layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoApproveRule {
    pub id: String,
    pub max_total: f64,
    pub categories: Vec<String>,
    pub reason: String,
}

impl Default for AutoApproveRule {
    fn default() -> Self {
        Self {
            id: "low_cost_consultation".to_string(),
            max_total: 500.0,
            categories: vec!["consultation".to_string()],
            reason: "Low-cost consultation under auto-approve threshold".to_string(),
        }
    }
}

/// Confidence attached to decisive rule verdicts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConfidence {
    pub approve: f64,
    pub deny: f64,
}

impl Default for RuleConfidence {
    fn default() -> Self {
        Self {
            approve: 0.90,
            deny: 0.95,
        }
    }
}

/// The versioned rule configuration evaluated by `TomlRuleEngine`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSet {
    pub version: String,
    /// Keyword classification table, first match wins.
    pub categories: Vec<ServiceCategory>,
    /// Service categories that are never covered.
    pub excluded_categories: Vec<String>,
    /// Diagnosis display keywords that are never covered.
    pub excluded_diagnosis_keywords: Vec<String>,
    pub prior_auth_categories: Vec<String>,
    /// Per-line maximum cost by service category.
    pub cost_ceilings: BTreeMap<String, f64>,
    pub age_rules: Vec<AgeRule>,
    /// Maximum services per year by service category.
    pub frequency_limits: BTreeMap<String, u32>,
    pub thresholds: CostThresholds,
    pub experimental_keywords: Vec<String>,
    /// Documents a request must carry; only `"clinical_notes"` is checked.
    pub required_documentation: Vec<String>,
    pub auto_approve: AutoApproveRule,
    pub confidence: RuleConfidence,
    /// Human-readable text for triggered rule ids.
    pub explanations: BTreeMap<String, String>,
}

impl Default for RuleSet {
    fn default() -> Self {
        let explanations = [
            ("excluded_service_cosmetic_surgery", "Cosmetic surgery is not covered under the policy"),
            ("excluded_service_fertility_treatment", "Fertility treatments require special coverage"),
            ("excluded_diagnosis", "Diagnosis is excluded from coverage"),
            ("no_valid_coverage", "No active insurance coverage found"),
            ("frequency_limit_exceeded", "Service frequency limit has been exceeded"),
            ("cost_limit_exceeded", "Service cost exceeds policy maximum"),
            ("preauth_required", "This service requires prior authorization"),
            ("age_restriction", "Service is restricted for the patient's age"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            version: "default".to_string(),
            categories: vec![
                ServiceCategory::new("consultation", &["consult", "visit", "exam"]),
                ServiceCategory::new("surgery", &["surgery", "operation"]),
                ServiceCategory::new("diagnostics", &["mri", "ct", "scan", "xray", "x-ray"]),
                ServiceCategory::new("therapy", &["therapy", "rehabilitation"]),
                ServiceCategory::new("pharmacy", &["medication", "drug", "prescription"]),
            ],
            excluded_categories: Vec::new(),
            excluded_diagnosis_keywords: vec![
                "cosmetic".to_string(),
                "fertility".to_string(),
                "experimental".to_string(),
            ],
            prior_auth_categories: Vec::new(),
            cost_ceilings: BTreeMap::new(),
            age_rules: Vec::new(),
            frequency_limits: BTreeMap::new(),
            thresholds: CostThresholds::default(),
            experimental_keywords: vec!["experimental".to_string()],
            required_documentation: Vec::new(),
            auto_approve: AutoApproveRule::default(),
            confidence: RuleConfidence::default(),
            explanations,
        }
    }
}

impl RuleSet {
    /// Keyword-classify a service description.
    pub fn classify(&self, description: &str) -> &str {
        let description = description.to_lowercase();
        self.categories
            .iter()
            .find(|c| c.matches(&description))
            .map_or(OTHER_CATEGORY, |c| c.name.as_str())
    }

    /// Human-readable explanation for a triggered rule id.
    ///
    /// Exact ids are looked up first, then the longest configured id that
    /// prefixes `rule_id` (so `cost_limit_exceeded_surgery` explains as
    /// `cost_limit_exceeded`).
    pub fn explain(&self, rule_id: &str) -> String {
        if let Some(text) = self.explanations.get(rule_id) {
            return text.clone();
        }
        self.explanations
            .iter()
            .filter(|(k, _)| rule_id.starts_with(k.as_str()))
            .max_by_key(|(k, _)| k.len())
            .map(|(_, v)| v.clone())
            .unwrap_or_else(|| format!("Rule {rule_id} was triggered"))
    }

    pub fn requires_document(&self, document: &str) -> bool {
        self.required_documentation.iter().any(|d| d == document)
    }
}

/// Age band for a patient age.
pub fn age_category(age: u32) -> AgeCategory {
    match age {
        0..=14 => AgeCategory::Pediatric,
        15..=59 => AgeCategory::Adult,
        _ => AgeCategory::Elderly,
    }
}
