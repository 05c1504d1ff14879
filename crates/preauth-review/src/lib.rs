//! # preauth-review
//!
//! Human-in-the-loop routing for adjudicated service lines.
//!
//! [`HitlReviewer`] implements [`preauth_core::traits::Reviewer`]. For each
//! line it runs the escalation rules (low confidence, cost, experimental
//! wording, case complexity, policy conflict, reasoning-only decisions,
//! validator flags), each of which can only raise the
//! [`ReviewPriority`](preauth_contracts::review::ReviewPriority). It then
//! picks the final action, a recommended reviewer, and an SLA.
//!
//! Lines decided by a health-declaration block skip the escalation rules:
//! an undeclared condition goes to the underwriter at High priority, and a
//! pre-existing denial stands without review.

pub mod reviewer;
pub mod routing;

pub use reviewer::{Escalation, HitlReviewer};
