//! # Certificate Request Parse Errors
//!
//! Every variant is permanent: a payload that fails to parse will never parse.

use thiserror::Error;

/// Malformed certificate request payload
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CsrParseError {
    /// Payload is not PEM
    #[error("request is not PEM encoded: {0}")]
    InvalidPem(String),

    /// PEM block is something other than a certificate request
    #[error("PEM block type must be CERTIFICATE REQUEST, got {label}")]
    UnexpectedBlockType { label: String },

    /// DER content could not be decoded as PKCS#10
    #[error("failed to decode certificate request: {0}")]
    InvalidDer(String),

    /// A subject attribute is not a string type
    #[error("subject {attribute} is not a valid string: {message}")]
    InvalidSubject {
        attribute: &'static str,
        message: String,
    },

    /// Requested extensions could not be decoded
    #[error("failed to decode requested extensions: {0}")]
    InvalidExtension(String),

    /// SAN IP address of a length other than 4 or 16 bytes
    #[error("cannot parse IP address of length {length}")]
    InvalidIpAddress { length: usize },
}

impl CsrParseError {
    /// Short label used for metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            CsrParseError::InvalidPem(_) => "invalid_pem",
            CsrParseError::UnexpectedBlockType { .. } => "unexpected_block_type",
            CsrParseError::InvalidDer(_) => "invalid_der",
            CsrParseError::InvalidSubject { .. } => "invalid_subject",
            CsrParseError::InvalidExtension(_) => "invalid_extension",
            CsrParseError::InvalidIpAddress { .. } => "invalid_ip_address",
        }
    }
}
