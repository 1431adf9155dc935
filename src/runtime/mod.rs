//! # Runtime Module
//!
//! Runtime components for the Node CSR Approver, including initialization,
//! the watch loop and the retry policy.

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;

pub use error_policy::*;
pub use initialization::*;
pub use watch_loop::*;
