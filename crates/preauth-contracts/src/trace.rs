//! Decision-trace types.
//!
//! `DecisionStep` is what a layer reports to the orchestrator. `TraceEntry`
//! wraps a step with its position and hash-chain links; `DecisionTrace` is
//! the sealed, ordered list attached to every `AdjudicationResult`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Every stage the orchestrator can record in the trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    HealthDeclaration,
    RulesEngine,
    PolicyRetrieval,
    ClinicalReasoning,
    MedicalNecessity,
    PatientHistory,
    FinancialRisk,
    FraudDetection,
    HitlReview,
}

impl Layer {
    pub fn name(self) -> &'static str {
        match self {
            Layer::HealthDeclaration => "Health Declaration (Pre-Screening)",
            Layer::RulesEngine => "Rules Engine",
            Layer::PolicyRetrieval => "Policy Retrieval",
            Layer::ClinicalReasoning => "Clinical Reasoning",
            Layer::MedicalNecessity => "Medical Necessity",
            Layer::PatientHistory => "Patient History",
            Layer::FinancialRisk => "Financial Risk",
            Layer::FraudDetection => "Fraud Detection",
            Layer::HitlReview => "HITL Review",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The layer whose verdict became the final, overriding decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecidingLayer {
    HealthDeclaration,
    RulesEngine,
    RagSystemGuidedLlm,
    LlmOnly,
}

impl DecidingLayer {
    pub fn as_str(self) -> &'static str {
        match self {
            DecidingLayer::HealthDeclaration => "health_declaration",
            DecidingLayer::RulesEngine => "rules_engine",
            DecidingLayer::RagSystemGuidedLlm => "rag_system_guided_llm",
            DecidingLayer::LlmOnly => "llm_only",
        }
    }
}

impl fmt::Display for DecidingLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only entry in the decision trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionStep {
    pub layer: Layer,
    /// Short upper-case verdict label, e.g. "APPROVED", "UNCERTAIN", "FLAGGED".
    pub verdict: String,
    pub confidence: f64,
    /// True for the single step whose verdict is the deciding one.
    #[serde(rename = "final")]
    pub is_final: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

impl DecisionStep {
    pub fn new(layer: Layer, verdict: impl Into<String>, confidence: f64) -> Self {
        Self {
            layer,
            verdict: verdict.into(),
            confidence,
            is_final: false,
            reason: None,
        }
    }

    pub fn deciding(mut self) -> Self {
        self.is_final = true;
        self
    }

    pub fn because(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// A step with its chain position and SHA-256 links.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    /// Position in the trace, starting at 0.
    pub sequence: u64,
    pub step: DecisionStep,
    /// Hash of the previous entry, or the genesis hash for entry 0.
    pub prev_hash: String,
    pub this_hash: String,
}

impl TraceEntry {
    /// The `prev_hash` of the first entry in every trace.
    pub const GENESIS_HASH: &'static str =
        "0000000000000000000000000000000000000000000000000000000000000000";
}

/// The sealed trace of one adjudication run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecisionTrace {
    pub adjudication_id: String,
    pub entries: Vec<TraceEntry>,
    /// `this_hash` of the last entry; empty when the trace is empty.
    pub terminal_hash: String,
}

impl DecisionTrace {
    pub fn steps(&self) -> impl Iterator<Item = &DecisionStep> {
        self.entries.iter().map(|e| &e.step)
    }

    /// Steps flagged as the deciding verdict.
    pub fn final_steps(&self) -> impl Iterator<Item = &DecisionStep> {
        self.steps().filter(|s| s.is_final)
    }

    /// True if any step was recorded for `layer`.
    pub fn visited(&self, layer: Layer) -> bool {
        self.steps().any(|s| s.layer == layer)
    }
}
