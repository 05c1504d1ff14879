//! Confidence blending between rule, policy, and clinical-reasoning output.
//!
//! Three entry points, one per orchestration path:
//!
//! - `stamp_rule_decision`: the rule evaluator was decisive
//! - `blend`:               reasoning output merged with policy relevance
//! - `fallback_all`:        a collaborator failed; every line goes to review

use std::collections::HashMap;

use preauth_contracts::{
    claim::{ClinicalRequest, ServiceLine},
    config::BlendConfig,
    decision::{DecisionKind, ServiceLineDecision},
    policy::PolicyHit,
    rules::RuleOutcome,
};

/// Explanation prefix for lines whose confidence was policy-adjusted.
pub const POLICY_GUIDED_PREFIX: &str = "[Policy-Guided] ";

/// Review reason stamped on fallback lines.
pub const FALLBACK_REVIEW_REASON: &str = "Automated adjudication unavailable";

/// Result of merging reasoning output with policy relevance.
#[derive(Debug, Clone)]
pub struct BlendOutcome {
    /// One decision per request line, in request order.
    pub decisions: Vec<ServiceLineDecision>,
    /// Mean relevance of the high-relevance hits, if any qualified.
    pub rag_confidence: Option<f64>,
    /// Sequences the reasoner did not cover, now fallback lines.
    pub filled: Vec<u32>,
}

impl BlendOutcome {
    pub fn policy_guided(&self) -> bool {
        self.rag_confidence.is_some()
    }
}

/// Hits strong enough to steer the reasoning verdict, best first.
pub fn high_relevance_hits<'a>(hits: &'a [PolicyHit], cfg: &BlendConfig) -> Vec<&'a PolicyHit> {
    let mut strong: Vec<&PolicyHit> = hits
        .iter()
        .filter(|h| h.can_override_llm && h.relevance_score >= cfg.relevance_threshold)
        .collect();
    strong.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
    strong
}

/// Mean relevance of the high-relevance hits, or `None` when none qualify.
pub fn rag_confidence(hits: &[PolicyHit], cfg: &BlendConfig) -> Option<f64> {
    let strong = high_relevance_hits(hits, cfg);
    if strong.is_empty() {
        return None;
    }
    let sum: f64 = strong.iter().map(|h| h.relevance_score).sum();
    Some(sum / strong.len() as f64)
}

/// Weighted mix of the two confidences.
///
/// Weights are normalized first, so the result always lies between the two
/// inputs.
pub fn blend_confidence(original: f64, rag: f64, cfg: &BlendConfig) -> f64 {
    let (w_reasoning, w_policy) = cfg.normalized_weights();
    (w_reasoning * original + w_policy * rag).clamp(0.0, 1.0)
}

/// Stamp every line with a decisive rule verdict.
pub fn stamp_rule_decision(request: &ClinicalRequest, outcome: &RuleOutcome) -> Vec<ServiceLineDecision> {
    let Some(kind) = outcome.auto_decision else {
        return Vec::new();
    };
    let explanation = if outcome.reasons.is_empty() {
        format!("Rules engine decision: {}", kind.label())
    } else {
        outcome.reasons.join("; ")
    };

    request
        .services
        .iter()
        .map(|line| {
            let mut d = ServiceLineDecision::for_line(line, kind, outcome.confidence, explanation.clone());
            d.rules_applied = outcome.triggered_rules.clone();
            d
        })
        .collect()
}

/// A low-confidence Pending decision that always goes to review.
pub fn fallback_line(line: &ServiceLine, confidence: f64, cause: &str) -> ServiceLineDecision {
    let mut d = ServiceLineDecision::for_line(
        line,
        DecisionKind::Pending,
        confidence,
        format!("Automated adjudication unavailable: {cause}"),
    );
    d.flag_for_review(FALLBACK_REVIEW_REASON);
    d
}

pub fn fallback_all(request: &ClinicalRequest, confidence: f64, cause: &str) -> Vec<ServiceLineDecision> {
    request
        .services
        .iter()
        .map(|line| fallback_line(line, confidence, cause))
        .collect()
}

/// Merge reasoning output with policy relevance.
///
/// Reasoning lines are matched to request lines by sequence; lines for
/// unknown sequences are dropped and uncovered request lines become fallback
/// decisions at `fallback_confidence`. When high-relevance hits exist, each
/// covered line's confidence is blended toward their mean relevance, its
/// explanation is marked policy-guided, and the best hits are attached as
/// policy references.
pub fn blend(
    request: &ClinicalRequest,
    reasoning: Vec<ServiceLineDecision>,
    hits: &[PolicyHit],
    cfg: &BlendConfig,
    fallback_confidence: f64,
) -> BlendOutcome {
    let rag = rag_confidence(hits, cfg);
    let references: Vec<String> = high_relevance_hits(hits, cfg)
        .into_iter()
        .take(cfg.max_policy_references)
        .map(|h| h.excerpt(cfg.excerpt_chars))
        .collect();

    let mut by_sequence: HashMap<u32, ServiceLineDecision> = HashMap::new();
    for d in reasoning {
        by_sequence.entry(d.sequence).or_insert(d);
    }

    let mut decisions = Vec::with_capacity(request.services.len());
    let mut filled = Vec::new();

    for line in &request.services {
        match by_sequence.remove(&line.sequence) {
            Some(mut d) => {
                if let Some(rag) = rag {
                    d.set_confidence(blend_confidence(d.confidence, rag, cfg));
                    d.explanation = format!("{POLICY_GUIDED_PREFIX}{}", d.explanation);
                    d.policy_references = references.clone();
                }
                decisions.push(d);
            }
            None => {
                filled.push(line.sequence);
                decisions.push(fallback_line(
                    line,
                    fallback_confidence,
                    "clinical reasoning returned no decision for this line",
                ));
            }
        }
    }

    BlendOutcome {
        decisions,
        rag_confidence: rag,
        filled,
    }
}

/// Arithmetic mean of line confidences; 0.0 for an empty set.
pub fn mean_confidence(decisions: &[ServiceLineDecision]) -> f64 {
    if decisions.is_empty() {
        return 0.0;
    }
    decisions.iter().map(|d| d.confidence).sum::<f64>() / decisions.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use preauth_contracts::claim::Diagnosis;

    fn line(seq: u32) -> ServiceLine {
        ServiceLine {
            sequence: seq,
            code: "27447".to_string(),
            description: "Total knee arthroplasty".to_string(),
            requested_amount: Some(40_000.0),
            clinical_notes: None,
        }
    }

    fn request(lines: &[u32]) -> ClinicalRequest {
        ClinicalRequest {
            request_id: "REQ-B".to_string(),
            patient_id: "PAT-B".to_string(),
            provider_id: "PRV-B".to_string(),
            coverage_id: Some("COV".to_string()),
            patient_age: Some(67),
            patient_gender: None,
            diagnoses: vec![Diagnosis::new("M17.11", "Primary osteoarthritis, right knee")],
            procedures: Vec::new(),
            services: lines.iter().map(|s| line(*s)).collect(),
            total_cost: None,
            clinical_notes: None,
        }
    }

    fn hit(score: f64, can_override: bool, source: &str) -> PolicyHit {
        PolicyHit {
            content: format!("Knee arthroplasty is covered when conservative therapy fails ({source})"),
            relevance_score: score,
            source: source.to_string(),
            can_override_llm: can_override,
        }
    }

    fn reasoned(seq: u32, conf: f64) -> ServiceLineDecision {
        ServiceLineDecision::for_line(&line(seq), DecisionKind::Approved, conf, "Clinically indicated")
    }

    #[test]
    fn test_rag_confidence_ignores_weak_and_non_overriding_hits() {
        let cfg = BlendConfig::default();
        let hits = vec![hit(0.9, true, "a"), hit(0.8, true, "b"), hit(0.95, false, "c"), hit(0.6, true, "d")];
        let rag = rag_confidence(&hits, &cfg).unwrap();
        assert!((rag - 0.85).abs() < 1e-9, "mean of 0.9 and 0.8 expected, got {rag}");
        assert_eq!(rag_confidence(&[hit(0.7, true, "x")], &cfg), None);
    }

    #[test]
    fn test_policy_guided_blend_uses_weights_and_marks_lines() {
        let cfg = BlendConfig::default();
        let hits = vec![hit(0.9, true, "a"), hit(0.8, true, "b"), hit(0.85, true, "c")];
        let out = blend(&request(&[1]), vec![reasoned(1, 0.5)], &hits, &cfg, 0.3);

        assert!(out.policy_guided());
        let d = &out.decisions[0];
        let expected = 0.4 * 0.5 + 0.6 * 0.85;
        assert!((d.confidence - expected).abs() < 1e-9, "got {}", d.confidence);
        assert!(d.explanation.starts_with(POLICY_GUIDED_PREFIX));
        assert_eq!(d.policy_references.len(), 2, "only the top two hits are referenced");
        assert!(d.policy_references[0].contains("(a)"), "best hit first");
    }

    #[test]
    fn test_no_strong_hits_passes_reasoning_through() {
        let cfg = BlendConfig::default();
        let out = blend(&request(&[1]), vec![reasoned(1, 0.62)], &[hit(0.65, true, "a")], &cfg, 0.3);

        assert!(!out.policy_guided());
        assert_eq!(out.decisions[0].confidence, 0.62);
        assert_eq!(out.decisions[0].explanation, "Clinically indicated");
        assert!(out.decisions[0].policy_references.is_empty());
    }

    #[test]
    fn test_blended_confidence_stays_between_inputs() {
        let weights = [(0.4, 0.6), (1.0, 0.0), (0.0, 1.0), (3.0, 1.0), (0.25, 0.75)];
        let values = [0.0, 0.1, 0.35, 0.5, 0.77, 0.9, 1.0];
        for (wr, wp) in weights {
            let cfg = BlendConfig {
                reasoning_weight: wr,
                policy_weight: wp,
                ..BlendConfig::default()
            };
            for &orig in &values {
                for &rag in &values {
                    let b = blend_confidence(orig, rag, &cfg);
                    let lo = orig.min(rag) - 1e-12;
                    let hi = orig.max(rag) + 1e-12;
                    assert!(b >= lo && b <= hi, "blend({orig}, {rag}) with ({wr}, {wp}) = {b}");
                }
            }
        }
    }

    #[test]
    fn test_missing_reasoning_lines_are_filled_with_fallback() {
        let cfg = BlendConfig::default();
        let out = blend(&request(&[1, 2, 3]), vec![reasoned(2, 0.88), reasoned(9, 0.9)], &[], &cfg, 0.3);

        assert_eq!(out.filled, vec![1, 3]);
        assert_eq!(out.decisions.len(), 3);
        assert_eq!(out.decisions[1].decision, DecisionKind::Approved);
        for seq in [0, 2] {
            let d = &out.decisions[seq];
            assert_eq!(d.decision, DecisionKind::Pending);
            assert_eq!(d.confidence, 0.3);
            assert!(d.requires_human_review);
        }
    }

    #[test]
    fn test_stamped_rule_decision_copies_verdict_and_rules() {
        let mut outcome = RuleOutcome::uncertain("v1");
        outcome.auto_decision = Some(DecisionKind::Denied);
        outcome.confidence = 0.95;
        outcome.trigger("excluded_diagnosis");
        outcome.reasons.push("Diagnosis excluded from coverage".to_string());

        let ds = stamp_rule_decision(&request(&[1, 2]), &outcome);
        assert_eq!(ds.len(), 2);
        for d in &ds {
            assert_eq!(d.decision, DecisionKind::Denied);
            assert_eq!(d.confidence, 0.95);
            assert_eq!(d.approved_amount, Some(0.0));
            assert_eq!(d.rules_applied, vec!["excluded_diagnosis".to_string()]);
        }
    }

    #[test]
    fn test_mean_confidence_of_empty_set_is_zero() {
        assert_eq!(mean_confidence(&[]), 0.0);
    }
}
