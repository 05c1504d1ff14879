//! # preauth-ref
//!
//! Reference runtime for the pre-authorization engine.
//!
//! Wires every production component to mock collaborators and simulated
//! member data so the full pipeline can be exercised end to end:
//!
//! - [`runtime`]: `Runtime` / `RuntimeBuilder`, plus the bundled TOML
//!   configuration (`config/adjudication.toml`)
//! - [`collaborators`]: keyword policy retrieval, a deterministic clinical
//!   reasoner, and always-failing doubles for outage drills
//! - [`mock_data`]: demo health declarations, the policy corpus, request
//!   builders
//! - [`scenarios`]: the demo catalog and its console report
//!
//! All data is fictional.

pub mod collaborators;
pub mod mock_data;
pub mod runtime;
pub mod scenarios;

pub use runtime::{default_config, Runtime, RuntimeBuilder, DEFAULT_CONFIG};
