//! Policy-retrieval records supplied by the external search collaborator.

use serde::{Deserialize, Serialize};

/// One passage returned by policy retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyHit {
    pub content: String,
    /// Relevance in [0, 1].
    pub relevance_score: f64,
    /// Originating policy document.
    #[serde(default)]
    pub source: String,
    /// Whether the retriever considers this passage strong enough to steer
    /// the clinical-reasoning verdict.
    #[serde(default)]
    pub can_override_llm: bool,
}

impl PolicyHit {
    /// First `max_chars` characters of the passage, with an ellipsis when cut.
    pub fn excerpt(&self, max_chars: usize) -> String {
        if self.content.chars().count() <= max_chars {
            return self.content.clone();
        }
        let cut: String = self.content.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}
