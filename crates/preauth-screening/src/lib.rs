//! # preauth-screening
//!
//! Health-declaration (HD) pre-screening, the first and strongest layer of
//! the adjudication pipeline.
//!
//! [`HealthDeclarationValidator`] implements
//! [`HealthScreen`](preauth_core::traits::HealthScreen). It compares the
//! request's diagnoses with the HD-required [`ConditionTable`] and with what
//! the member declared in an [`HdRecordStore`](preauth_core::traits::HdRecordStore).
//! A non-proceeding outcome overrides every later layer.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use preauth_screening::{HealthDeclarationValidator, InMemoryHdStore};
//!
//! let screen = HealthDeclarationValidator::with_store(Arc::new(InMemoryHdStore::new()));
//! ```

pub mod store;
pub mod table;
pub mod validator;

pub use store::InMemoryHdStore;
pub use table::{builtin_conditions, ConditionTable};
pub use validator::{parse_date, HealthDeclarationValidator};

// ── Tests ─────────────────────────────────────────────────────────────────────
