//! # Controller
//!
//! CSR parsing, decision logic and the work queue machinery that drives it.

pub mod backoff;
pub mod keys;
pub mod parser;
pub mod queue;
pub mod reconciler;
pub mod server;
pub mod worker;
