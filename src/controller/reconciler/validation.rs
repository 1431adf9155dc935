//! # Identity Validation
//!
//! Checks that a CSR's claimed node identity is self-consistent: the API
//! identity (username, groups, usages) and the certificate subject must agree
//! and match the node serving certificate policy.

use super::types::RejectionReason;
use crate::constants::{
    AUTHENTICATED_GROUP, MIN_NODE_GROUPS, NODE_GROUP, NODE_USER_PREFIX, REQUIRED_USAGES,
};
use crate::controller::parser::ParsedCertificateRequest;
use k8s_openapi::api::certificates::v1::CertificateSigningRequest;
use std::collections::BTreeSet;

/// Validate the identity claimed by `csr` and return the node name
///
/// Checks run in order and stop at the first failure:
/// 1. username is `system:node:<nodeName>` with a non-empty node name
/// 2. groups include `system:nodes` and `system:authenticated`
/// 3. usages are exactly digital signature, key encipherment and server auth
/// 4. subject common name equals the username
/// 5. subject organizations include `system:nodes`
pub fn validate_csr_contents(
    csr: &CertificateSigningRequest,
    parsed: &ParsedCertificateRequest,
) -> Result<String, RejectionReason> {
    let username = csr.spec.username.as_deref().unwrap_or_default();

    let node_name = username.strip_prefix(NODE_USER_PREFIX).ok_or_else(|| {
        RejectionReason::UsernamePrefix {
            username: username.to_string(),
            prefix: NODE_USER_PREFIX,
        }
    })?;
    if node_name.is_empty() {
        return Err(RejectionReason::EmptyNodeName);
    }

    let groups = csr.spec.groups.as_deref().unwrap_or_default();
    if groups.len() < MIN_NODE_GROUPS {
        return Err(RejectionReason::TooFewGroups {
            count: groups.len(),
        });
    }
    for required in [NODE_GROUP, AUTHENTICATED_GROUP] {
        if !groups.iter().any(|group| group == required) {
            return Err(RejectionReason::MissingGroup { group: required });
        }
    }

    let usages = csr.spec.usages.as_deref().unwrap_or_default();
    if usages.len() != REQUIRED_USAGES.len() {
        return Err(RejectionReason::UsageCount {
            count: usages.len(),
        });
    }
    let requested: BTreeSet<&str> = usages.iter().map(String::as_str).collect();
    let required: BTreeSet<&str> = REQUIRED_USAGES.into_iter().collect();
    if requested != required {
        return Err(RejectionReason::UnexpectedUsages {
            usages: usages.to_vec(),
        });
    }

    if parsed.common_name != username {
        return Err(RejectionReason::CommonNameMismatch {
            common_name: parsed.common_name.clone(),
            username: username.to_string(),
        });
    }

    if !parsed.organizations.iter().any(|org| org == NODE_GROUP) {
        return Err(RejectionReason::MissingOrganization {
            organization: NODE_GROUP,
        });
    }

    Ok(node_name.to_string())
}
