//! # Node CSR Approver
//!
//! A Kubernetes controller that approves kubelet serving certificate requests
//! after matching them against the machine inventory.
//!
//! ## Overview
//!
//! 1. **Watching CSRs** - Every CertificateSigningRequest is cached and its key queued on change
//! 2. **Identity validation** - Username, groups, usages, subject and organization must describe a node
//! 3. **Machine authorization** - Every requested SAN must be an address of the Machine backing the node
//! 4. **Approval** - An `Approved` condition is appended through the approval subresource
//!
//! When the machine inventory cannot be listed, identity-valid requests are still
//! approved with a `(no SAN validation)` message.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod runtime;
