//! # Reconciler
//!
//! CSR authorization and approval.
//!
//! ## Module Structure
//!
//! - `validation.rs` - Identity validation (pure)
//! - `authorization.rs` - Machine inventory authorization (pure)
//! - `approval.rs` - Condition inspection and the approval mutation
//! - `reconcile.rs` - Per-key orchestration, owns all I/O
//! - `client.rs` - Kubernetes implementations of the I/O seams
//! - `types.rs` - Decisions, outcomes, errors and seam traits

pub mod approval;
pub mod authorization;
pub mod client;
pub mod reconcile;
pub mod types;
pub mod validation;

// Re-export public API
pub use approval::{append_approval_condition, is_approved, terminal_condition};
pub use authorization::authorize_csr;
pub use client::KubeClusterApi;
pub use reconcile::{decide, Reconciler};
pub use types::{
    ClusterApi, CsrStore, Decision, Outcome, ReconcileError, RejectionReason, SkipReason,
};
pub use validation::validate_csr_contents;
