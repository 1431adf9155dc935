//! # Metrics Module
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Sub-modules
//!
//! - `registry` - Metrics registry setup, registration and rendering
//! - `controller_metrics` - Reconciliation, decision and work queue metrics

pub mod controller_metrics;
pub mod registry;

pub use controller_metrics::*;
pub use registry::*;
