//! # preauth-rules
//!
//! Deterministic rule evaluation for pre-authorization requests, plus the
//! loader for the full engine configuration document.
//!
//! ## Overview
//!
//! [`TomlRuleEngine`] implements the
//! [`RuleEngine`](preauth_core::traits::RuleEngine) trait. Its [`RuleSet`]
//! is declared in TOML and can be swapped at runtime with
//! [`TomlRuleEngine::reload`]; in-flight evaluations keep the snapshot they
//! started with.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::path::Path;
//! use preauth_rules::{EngineConfig, TomlRuleEngine};
//!
//! let config = EngineConfig::from_file(Path::new("config/adjudication.toml"))?;
//! let rules = TomlRuleEngine::new(config.ruleset.clone());
//! ```

pub mod config;
pub mod engine;
pub mod rule;

pub use config::EngineConfig;
pub use engine::{NoUtilization, TomlRuleEngine, UtilizationSource};
pub use rule::{AgeRule, AutoApproveRule, CostThresholds, RuleConfidence, RuleSet, ServiceCategory};

// ── Tests ─────────────────────────────────────────────────────────────────────
