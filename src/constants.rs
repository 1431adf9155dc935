//! # Constants
//!
//! Security policy values and controller defaults.
//!
//! The identity, group and usage values below define what a node serving
//! certificate request must look like before it can be approved. They are
//! kept together so the policy can be audited in one place.

// Node identity policy

/// Prefix every node username must carry (`system:node:<nodeName>`)
pub const NODE_USER_PREFIX: &str = "system:node:";

/// Group every node must belong to, both in the API identity and in the CSR organization
pub const NODE_GROUP: &str = "system:nodes";

/// Group every authenticated requester belongs to
pub const AUTHENTICATED_GROUP: &str = "system:authenticated";

/// Minimum number of groups attached to a node identity
pub const MIN_NODE_GROUPS: usize = 2;

/// Key usages a node serving certificate must request, no more and no less
pub const REQUIRED_USAGES: [&str; 3] = ["digital signature", "key encipherment", "server auth"];

// Approval condition

/// Condition type marking a CSR as approved
pub const CONDITION_APPROVED: &str = "Approved";

/// Condition type marking a CSR as denied
pub const CONDITION_DENIED: &str = "Denied";

/// Condition type marking a CSR as failed by the signer
pub const CONDITION_FAILED: &str = "Failed";

/// Reason recorded on the approval condition
pub const APPROVAL_REASON: &str = "NodeCSRApprove";

/// Message recorded on the approval condition
pub const APPROVAL_MESSAGE: &str = "This CSR was approved by the Node CSR Approver";

/// Suffix appended to the approval message when SANs could not be checked
pub const NO_SAN_VALIDATION_SUFFIX: &str = " (no SAN validation)";

/// Field manager / user agent name
pub const CONTROLLER_NAME: &str = "node-csr-approver";

// Machine inventory

/// Namespace holding Machine objects
pub const DEFAULT_MACHINE_NAMESPACE: &str = "openshift-machine-api";

// Work queue defaults

/// Default number of concurrent workers
pub const DEFAULT_WORKERS: usize = 1;

/// Consecutive failures tolerated before a key is dropped
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Base delay of the per-key exponential retry backoff (milliseconds)
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 5;

/// Cap of the per-key exponential retry backoff (seconds)
pub const DEFAULT_RETRY_MAX_DELAY_SECS: u64 = 1000;

// Server defaults

/// Default HTTP port for metrics and probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// How long to wait for the HTTP server to bind (seconds)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Poll interval while waiting for the HTTP server to bind (milliseconds)
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;
