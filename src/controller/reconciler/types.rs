//! # Reconciler Types
//!
//! Decision, outcome and error types shared by the validator, the authorizer
//! and the reconciler, plus the seams through which the reconciler performs I/O.

use crate::controller::parser::CsrParseError;
use crate::crd::Machine;
use async_trait::async_trait;
use k8s_openapi::api::certificates::v1::CertificateSigningRequest;
use std::sync::Arc;
use thiserror::Error;

/// Why a request was not authorized
///
/// Policy decisions, never retried. Each check has its own variant so the
/// log line names the exact field that did not match.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectionReason {
    #[error("username '{username}' doesn't match expected prefix '{prefix}'")]
    UsernamePrefix {
        username: String,
        prefix: &'static str,
    },

    #[error("empty node name in username")]
    EmptyNodeName,

    #[error("too few groups: {count}")]
    TooFewGroups { count: usize },

    #[error("not in group {group}")]
    MissingGroup { group: &'static str },

    #[error("unexpected number of usages: {count}")]
    UsageCount { count: usize },

    #[error("unexpected usages: {}", usages.join(", "))]
    UnexpectedUsages { usages: Vec<String> },

    #[error("mismatched CommonName {common_name} != {username}")]
    CommonNameMismatch {
        common_name: String,
        username: String,
    },

    #[error("organization doesn't include {organization}")]
    MissingOrganization { organization: &'static str },

    #[error("invalid request: machine inventory is empty")]
    EmptyInventory,

    #[error("no target machine for node {node_name}")]
    NoTargetMachine { node_name: String },

    #[error("DNS name '{san}' not in machine names: {}", addresses.join(" "))]
    DnsNameNotInMachine { san: String, addresses: Vec<String> },

    #[error("IP address '{san}' not in machine addresses: {}", addresses.join(" "))]
    IpAddressNotInMachine { san: String, addresses: Vec<String> },
}

impl RejectionReason {
    /// Short label used for metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::UsernamePrefix { .. } => "username_prefix",
            RejectionReason::EmptyNodeName => "empty_node_name",
            RejectionReason::TooFewGroups { .. } => "too_few_groups",
            RejectionReason::MissingGroup { .. } => "missing_group",
            RejectionReason::UsageCount { .. } => "usage_count",
            RejectionReason::UnexpectedUsages { .. } => "unexpected_usages",
            RejectionReason::CommonNameMismatch { .. } => "common_name_mismatch",
            RejectionReason::MissingOrganization { .. } => "missing_organization",
            RejectionReason::EmptyInventory => "empty_inventory",
            RejectionReason::NoTargetMachine { .. } => "no_target_machine",
            RejectionReason::DnsNameNotInMachine { .. } => "dns_name_mismatch",
            RejectionReason::IpAddressNotInMachine { .. } => "ip_address_mismatch",
        }
    }
}

/// Result of evaluating a parsed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Append an approval condition with this reason and message
    Approve {
        reason: &'static str,
        message: String,
    },
    /// Leave the request untouched
    Skip(SkipReason),
}

/// Why a reconciliation finished without approving
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Object is no longer in the cache (deleted or superseded)
    NotFound,
    /// A terminal condition of this type is already present
    AlreadyDecided(String),
    /// Certificate request payload could not be parsed
    Malformed(CsrParseError),
    /// Identity or machine authorization failed
    Rejected(RejectionReason),
    /// Object was deleted before the approval could be persisted
    Gone,
}

impl SkipReason {
    /// Short label used for metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NotFound => "not_found",
            SkipReason::AlreadyDecided(_) => "already_decided",
            SkipReason::Malformed(_) => "malformed",
            SkipReason::Rejected(_) => "rejected",
            SkipReason::Gone => "gone",
        }
    }

    /// Specific rejection or parse failure label, the reason label otherwise
    pub fn detail(&self) -> &'static str {
        match self {
            SkipReason::Malformed(e) => e.as_str(),
            SkipReason::Rejected(rejection) => rejection.as_str(),
            _ => self.as_str(),
        }
    }
}

/// Final state of one successful reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Approval condition persisted
    Approved {
        /// Approved without SAN validation because the inventory was unavailable
        degraded: bool,
    },
    /// Nothing to do, or a policy decision not to approve
    Skipped(SkipReason),
}

/// Transient failure, retried by the work queue
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("failed to persist approval for CSR {name}: {source}")]
    Approval {
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("failed to build approval condition: {0}")]
    Condition(#[from] serde_json::Error),
}

/// Read-only cache of CertificateSigningRequest objects
pub trait CsrStore: Send + Sync {
    /// Last known object for `key`, `None` if it is not (or no longer) cached
    fn lookup(&self, key: &str) -> Option<Arc<CertificateSigningRequest>>;
}

/// Cluster API calls made during reconciliation
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Persist the conditions of `csr` through the approval subresource
    async fn update_approval(
        &self,
        name: &str,
        csr: &CertificateSigningRequest,
    ) -> Result<(), kube::Error>;

    /// List the machines in `namespace`
    async fn list_machines(&self, namespace: &str) -> Result<Vec<Machine>, kube::Error>;
}
