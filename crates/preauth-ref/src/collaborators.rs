//! Mock external collaborators.
//!
//! - `KeywordPolicyRetriever` scores the mock policy corpus by keyword
//!   overlap with the request.
//! - `GuidelineReasoner` is a deterministic stand-in for the clinical
//!   reasoning service.
//! - `UnavailableRetriever` / `UnavailableReasoner` always fail, for outage
//!   drills.
//!
//! Each mock counts its calls in a shared `CallCounter` so callers can
//! confirm a collaborator was never reached.

use std::sync::{Arc, Mutex};

use tracing::debug;

use preauth_contracts::{
    claim::{ClinicalRequest, ServiceLine},
    decision::{DecisionKind, ServiceLineDecision},
    error::{PreauthError, PreauthResult},
    policy::PolicyHit,
    rules::RuleOutcome,
};
use preauth_core::traits::{ClinicalReasoner, PolicyRetriever};

use crate::mock_data::{policy_corpus, PolicyPassage};

/// Shared invocation count.
pub type CallCounter = Arc<Mutex<usize>>;

fn bump(counter: &CallCounter) {
    if let Ok(mut n) = counter.lock() {
        *n += 1;
    }
}

/// Read a call count. A poisoned counter reads as zero.
pub fn calls(counter: &CallCounter) -> usize {
    counter.lock().map(|n| *n).unwrap_or(0)
}

// ── Policy retrieval ─────────────────────────────────────────────────────────

pub struct KeywordPolicyRetriever {
    corpus: Vec<PolicyPassage>,
    calls: CallCounter,
}

impl Default for KeywordPolicyRetriever {
    fn default() -> Self {
        Self::new(policy_corpus())
    }
}

impl KeywordPolicyRetriever {
    pub fn new(corpus: Vec<PolicyPassage>) -> Self {
        Self {
            corpus,
            calls: CallCounter::default(),
        }
    }

    pub fn counter(&self) -> CallCounter {
        Arc::clone(&self.calls)
    }

    /// Relevance is 0.55 for a single keyword and rises to 1.0 when every
    /// keyword of the passage matches.
    fn score(passage: &PolicyPassage, text: &str) -> Option<f64> {
        let matched = passage.keywords.iter().filter(|k| text.contains(**k)).count();
        if matched == 0 || passage.keywords.is_empty() {
            return None;
        }
        Some(0.55 + 0.45 * matched as f64 / passage.keywords.len() as f64)
    }
}

/// Lower-cased searchable text of a request.
fn search_text(request: &ClinicalRequest) -> String {
    request
        .services
        .iter()
        .map(|s| s.description.as_str())
        .chain(request.diagnoses.iter().map(|d| d.display.as_str()))
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

impl PolicyRetriever for KeywordPolicyRetriever {
    fn retrieve(
        &self,
        request: &ClinicalRequest,
        top_k: usize,
        min_relevance: f64,
    ) -> PreauthResult<Vec<PolicyHit>> {
        bump(&self.calls);
        let text = search_text(request);

        let mut hits: Vec<PolicyHit> = self
            .corpus
            .iter()
            .filter_map(|p| {
                Self::score(p, &text).map(|relevance| PolicyHit {
                    content: p.content.to_string(),
                    relevance_score: relevance,
                    source: p.source.to_string(),
                    can_override_llm: p.authoritative,
                })
            })
            .filter(|h| h.relevance_score >= min_relevance)
            .collect();
        hits.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
        hits.truncate(top_k);

        debug!(request_id = %request.request_id, hits = hits.len(), "policy corpus searched");
        Ok(hits)
    }
}

// ── Clinical reasoning ───────────────────────────────────────────────────────

/// Deterministic per-line verdicts from policy hits and rule flags.
///
/// In order, for each line:
/// 1. an authoritative hit that names the service and says "not covered"
///    denies it
/// 2. experimental wording leaves it pending
/// 3. missing clinical notes leave it pending
/// 4. an authoritative hit that names the service approves it
/// 5. low-cost lines are approved at moderate confidence
/// 6. anything else is pending medical review
pub struct GuidelineReasoner {
    experimental_keywords: Vec<String>,
    relevance_threshold: f64,
    low_cost: f64,
    calls: CallCounter,
}

impl Default for GuidelineReasoner {
    fn default() -> Self {
        Self {
            experimental_keywords: ["experimental", "investigational", "unproven"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            relevance_threshold: 0.75,
            low_cost: 5_000.0,
            calls: CallCounter::default(),
        }
    }
}

impl GuidelineReasoner {
    pub fn counter(&self) -> CallCounter {
        Arc::clone(&self.calls)
    }

    /// Authoritative hits whose text names this service.
    fn applicable<'a>(&self, line: &ServiceLine, hits: &'a [PolicyHit]) -> Vec<&'a PolicyHit> {
        let description = line.description.to_lowercase();
        let terms: Vec<&str> = description
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() >= 5)
            .collect();
        hits.iter()
            .filter(|h| h.can_override_llm && h.relevance_score >= self.relevance_threshold)
            .filter(|h| {
                let content = h.content.to_lowercase();
                terms.iter().any(|t| content.contains(*t))
            })
            .collect()
    }

    fn decide(&self, line: &ServiceLine, rules: &RuleOutcome, hits: &[PolicyHit]) -> ServiceLineDecision {
        let description = line.description.to_lowercase();
        let applicable = self.applicable(line, hits);
        let excluded = applicable
            .iter()
            .find(|h| h.content.to_lowercase().contains("not covered"));

        let (kind, confidence, explanation, rationale) = if let Some(hit) = excluded {
            (
                DecisionKind::Denied,
                0.85,
                "Service is excluded by policy".to_string(),
                format!("Excluded under {}", hit.source),
            )
        } else if self.experimental_keywords.iter().any(|k| description.contains(k.as_str())) {
            (
                DecisionKind::Pending,
                0.45,
                "Experimental or investigational service".to_string(),
                "Evidence base needs medical director review".to_string(),
            )
        } else if rules.risk_flags.iter().any(|f| f == "missing_clinical_notes") {
            (
                DecisionKind::Pending,
                0.5,
                "Clinical documentation missing".to_string(),
                "Cannot assess necessity without clinical notes".to_string(),
            )
        } else if let Some(hit) = applicable.first() {
            (
                DecisionKind::Approved,
                0.85,
                "Covered per policy guidance".to_string(),
                format!("Meets coverage criteria in {}", hit.source),
            )
        } else if line.amount() < self.low_cost {
            (
                DecisionKind::Approved,
                0.75,
                "Low-cost service with no risk flags identified".to_string(),
                "Standard coverage guidelines applied".to_string(),
            )
        } else {
            (
                DecisionKind::Pending,
                0.5,
                "Requires medical review for cost and medical necessity".to_string(),
                "No policy passage addresses this service".to_string(),
            )
        };

        let mut d = ServiceLineDecision::for_line(line, kind, confidence, explanation);
        d.clinical_rationale = Some(rationale);
        d.rules_applied = rules.triggered_rules.clone();
        d
    }
}

impl ClinicalReasoner for GuidelineReasoner {
    fn reason(
        &self,
        request: &ClinicalRequest,
        rules: &RuleOutcome,
        hits: &[PolicyHit],
    ) -> PreauthResult<Vec<ServiceLineDecision>> {
        bump(&self.calls);
        Ok(request
            .services
            .iter()
            .map(|line| self.decide(line, rules, hits))
            .collect())
    }
}

// ── Outage doubles ───────────────────────────────────────────────────────────

#[derive(Default)]
pub struct UnavailableRetriever {
    calls: CallCounter,
}

impl UnavailableRetriever {
    pub fn counter(&self) -> CallCounter {
        Arc::clone(&self.calls)
    }
}

impl PolicyRetriever for UnavailableRetriever {
    fn retrieve(&self, _request: &ClinicalRequest, _top_k: usize, _min: f64) -> PreauthResult<Vec<PolicyHit>> {
        bump(&self.calls);
        Err(PreauthError::unavailable("policy-retrieval", "search index timed out"))
    }
}

#[derive(Default)]
pub struct UnavailableReasoner {
    calls: CallCounter,
}

impl UnavailableReasoner {
    pub fn counter(&self) -> CallCounter {
        Arc::clone(&self.calls)
    }
}

impl ClinicalReasoner for UnavailableReasoner {
    fn reason(
        &self,
        _request: &ClinicalRequest,
        _rules: &RuleOutcome,
        _hits: &[PolicyHit],
    ) -> PreauthResult<Vec<ServiceLineDecision>> {
        bump(&self.calls);
        Err(PreauthError::unavailable("clinical-reasoning", "model endpoint returned 503"))
    }
}
