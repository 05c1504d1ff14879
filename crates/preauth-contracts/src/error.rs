//! Error types for the adjudication pipeline.
//!
//! All fallible operations in the engine return `PreauthResult<T>`.
//! Variants carry enough context to be written straight into the decision
//! trace or an operator log line.

use thiserror::Error;

/// The unified error type for the adjudication engine.
#[derive(Debug, Error)]
pub enum PreauthError {
    /// The clinical request is malformed or incomplete.
    ///
    /// Raised before orchestration starts; the request is never retried.
    #[error("invalid clinical request: {reason}")]
    InvalidRequest { reason: String },

    /// An external collaborator (policy retrieval, clinical reasoning) failed
    /// or timed out.
    #[error("collaborator '{collaborator}' unavailable: {reason}")]
    CollaboratorUnavailable { collaborator: String, reason: String },

    /// A rule set, condition table, or tunable is missing or unparseable.
    ///
    /// Fatal at startup, never produced per request.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },

    /// A shared keyed store (HD records, history log, fraud counters) could
    /// not be read or appended.
    #[error("store error: {reason}")]
    StoreError { reason: String },

    /// The orchestrator reached a state it cannot continue from.
    #[error("state machine error: {reason}")]
    StateMachineError { reason: String },
}

impl PreauthError {
    /// Shorthand for a collaborator failure.
    pub fn unavailable(collaborator: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CollaboratorUnavailable {
            collaborator: collaborator.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a poisoned-lock or backend failure in a store.
    pub fn store(reason: impl Into<String>) -> Self {
        Self::StoreError { reason: reason.into() }
    }
}

/// Convenience alias used throughout the workspace.
pub type PreauthResult<T> = Result<T, PreauthError>;
