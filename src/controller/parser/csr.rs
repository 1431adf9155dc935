//! # Certificate Request Parsing
//!
//! Decodes the PEM encoded PKCS#10 payload carried in `spec.request`.

use super::error::CsrParseError;
use k8s_openapi::api::certificates::v1::CertificateSigningRequest;
use std::net::IpAddr;
use x509_parser::pem::parse_x509_pem;
use x509_parser::prelude::*;

const PEM_LABEL_CERTIFICATE_REQUEST: &str = "CERTIFICATE REQUEST";

/// Read-only view of a decoded certificate request
///
/// Built fresh for every reconciliation and never cached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedCertificateRequest {
    /// Subject common name
    pub common_name: String,
    /// Subject organizations, in subject order
    pub organizations: Vec<String>,
    /// DNS subject alternative names, in request order
    pub dns_names: Vec<String>,
    /// IP subject alternative names, in request order
    pub ip_addresses: Vec<IpAddr>,
}

/// Parse the certificate request embedded in a CSR resource
pub fn parse_csr(
    csr: &CertificateSigningRequest,
) -> Result<ParsedCertificateRequest, CsrParseError> {
    parse_certificate_request(&csr.spec.request.0)
}

/// Parse a PEM encoded PKCS#10 certificate request
///
/// If the subject carries several common names, the last one is used.
pub fn parse_certificate_request(raw: &[u8]) -> Result<ParsedCertificateRequest, CsrParseError> {
    let (_, pem) = parse_x509_pem(raw).map_err(|e| CsrParseError::InvalidPem(e.to_string()))?;
    if pem.label != PEM_LABEL_CERTIFICATE_REQUEST {
        return Err(CsrParseError::UnexpectedBlockType { label: pem.label });
    }

    let (_, request) = X509CertificationRequest::from_der(&pem.contents)
        .map_err(|e| CsrParseError::InvalidDer(e.to_string()))?;
    let subject = &request.certification_request_info.subject;

    let common_name = subject
        .iter_common_name()
        .last()
        .map(|cn| {
            cn.as_str().map_err(|e| CsrParseError::InvalidSubject {
                attribute: "commonName",
                message: e.to_string(),
            })
        })
        .transpose()?
        .unwrap_or_default()
        .to_string();

    let organizations = subject
        .iter_organization()
        .map(|org| {
            org.as_str()
                .map(str::to_string)
                .map_err(|e| CsrParseError::InvalidSubject {
                    attribute: "organization",
                    message: e.to_string(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut dns_names = Vec::new();
    let mut ip_addresses = Vec::new();
    if let Some(extensions) = request.requested_extensions() {
        for extension in extensions {
            match extension {
                ParsedExtension::SubjectAlternativeName(san) => {
                    for name in &san.general_names {
                        match name {
                            GeneralName::DNSName(dns) => dns_names.push((*dns).to_string()),
                            GeneralName::IPAddress(bytes) => ip_addresses.push(parse_ip(bytes)?),
                            _ => {}
                        }
                    }
                }
                ParsedExtension::ParseError { error } => {
                    return Err(CsrParseError::InvalidExtension(error.to_string()));
                }
                _ => {}
            }
        }
    }

    Ok(ParsedCertificateRequest {
        common_name,
        organizations,
        dns_names,
        ip_addresses,
    })
}

/// Decode a SAN IP address, printing IPv4-mapped IPv6 addresses as IPv4
fn parse_ip(bytes: &[u8]) -> Result<IpAddr, CsrParseError> {
    if let Ok(octets) = <[u8; 4]>::try_from(bytes) {
        return Ok(IpAddr::from(octets));
    }
    if let Ok(octets) = <[u8; 16]>::try_from(bytes) {
        return Ok(IpAddr::from(octets).to_canonical());
    }
    Err(CsrParseError::InvalidIpAddress {
        length: bytes.len(),
    })
}
