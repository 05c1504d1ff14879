//! HD-required condition table.

use std::collections::HashMap;

use preauth_contracts::screening::{HdCondition, Severity};

/// Conditions that must be declared at policy inception.
pub fn builtin_conditions() -> Vec<HdCondition> {
    let row = |code: &str, name: &str, category: &str, severity: Severity, days: i64| HdCondition {
        code: code.to_string(),
        name: name.to_string(),
        category: category.to_string(),
        severity,
        waiting_period_days: Some(days),
    };

    vec![
        row("E11", "Type 2 Diabetes Mellitus", "chronic_metabolic", Severity::High, 180),
        row("E10", "Type 1 Diabetes Mellitus", "chronic_metabolic", Severity::High, 180),
        row("I25", "Chronic Ischemic Heart Disease", "cardiovascular", Severity::Critical, 365),
        row("I10", "Essential Hypertension", "cardiovascular", Severity::Medium, 90),
        row("I50", "Heart Failure", "cardiovascular", Severity::Critical, 365),
        row("J45", "Asthma", "respiratory", Severity::Medium, 180),
        row("J44", "Chronic Obstructive Pulmonary Disease", "respiratory", Severity::High, 365),
        row("N18", "Chronic Kidney Disease", "renal", Severity::Critical, 365),
        row("K70", "Alcoholic Liver Disease", "hepatic", Severity::High, 365),
        row("C", "Cancer/Malignant Neoplasms", "oncology", Severity::Critical, 730),
        row("M05", "Rheumatoid Arthritis", "autoimmune", Severity::Medium, 180),
        row("G40", "Epilepsy", "neurological", Severity::High, 180),
        row("F20", "Schizophrenia", "psychiatric", Severity::High, 365),
        row("F31", "Bipolar Disorder", "psychiatric", Severity::High, 180),
    ]
}

/// Code-indexed view of the condition table.
#[derive(Debug, Clone)]
pub struct ConditionTable {
    by_code: HashMap<String, HdCondition>,
}

impl ConditionTable {
    /// Later rows with the same code replace earlier ones.
    pub fn new(conditions: Vec<HdCondition>) -> Self {
        let by_code = conditions
            .into_iter()
            .map(|c| (normalize(&c.code), c))
            .collect();
        Self { by_code }
    }

    pub fn builtin() -> Self {
        Self::new(builtin_conditions())
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }

    /// Match a diagnosis code: exact, then 3-character prefix, then
    /// 1-character category.
    pub fn lookup(&self, icd10_code: &str) -> Option<&HdCondition> {
        let code = normalize(icd10_code);
        if code.is_empty() {
            return None;
        }
        self.by_code
            .get(&code)
            .or_else(|| self.by_code.get(&prefix(&code, 3)))
            .or_else(|| self.by_code.get(&prefix(&code, 1)))
    }
}

fn normalize(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

fn prefix(code: &str, n: usize) -> String {
    code.chars().take(n).collect()
}
