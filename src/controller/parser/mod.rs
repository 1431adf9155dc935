//! # Parser
//!
//! Certificate request payload parsing.

pub mod csr;
pub mod error;

pub use csr::{parse_certificate_request, parse_csr, ParsedCertificateRequest};
pub use error::CsrParseError;
