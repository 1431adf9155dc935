//! # Custom Resource Definitions
//!
//! Resource types read by the controller that are not part of `k8s-openapi`.
//!
//! The controller never creates or modifies these resources. It only lists
//! them to build a machine inventory snapshot.

mod machine;

pub use machine::*;
