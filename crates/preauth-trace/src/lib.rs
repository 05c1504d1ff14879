//! # preauth-trace
//!
//! Append-only, SHA-256 hash-chained decision trace.
//!
//! Every `DecisionStep` the orchestrator records is wrapped in a
//! `TraceEntry` linked to the previous entry by hash. Editing any recorded
//! step, reordering entries, or dropping one breaks the chain, which
//! `verify_trace` detects.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use preauth_trace::{InMemoryTraceWriter, verify_trace};
//! use preauth_core::traits::TraceWriter;
//!
//! let writer = InMemoryTraceWriter::new();
//! writer.append("adj-001", &step)?;
//! let trace = writer.seal("adj-001")?;
//! assert!(verify_trace(&trace));
//! ```

pub mod chain;
pub mod memory;

pub use chain::{hash_step, verify_entries, verify_trace};
pub use memory::InMemoryTraceWriter;

// ── Tests ─────────────────────────────────────────────────────────────────────
