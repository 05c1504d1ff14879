//! # preauth-core
//!
//! The layered adjudication runtime.
//!
//! This crate provides:
//! - The trait seams every layer plugs into (`HealthScreen`, `RuleEngine`,
//!   `PolicyRetriever`, `ClinicalReasoner`, `Validator`, `Reviewer`,
//!   `TraceWriter`, `HdRecordStore`)
//! - Confidence blending between rules, policy retrieval, and clinical
//!   reasoning
//! - The `Orchestrator` that drives a request through the layers in override
//!   order
//!
//! ## Usage
//!
//! ```rust,ignore
//! use preauth_core::{Orchestrator, OrchestratorParts, OrchestratorSettings};
//!
//! let orchestrator = Orchestrator::new(parts, OrchestratorSettings::default());
//! let result = orchestrator.adjudicate(&request, None)?;
//! ```

pub mod blend;
pub mod clock;
pub mod orchestrator;
pub mod traits;

pub use clock::{Clock, FixedClock, SystemClock};
pub use orchestrator::{Orchestrator, OrchestratorParts, OrchestratorSettings, Stage};
