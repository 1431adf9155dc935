//! # Reconcile
//!
//! Drives one CSR key through fetch, terminal check, parse, authorize and
//! approve. All I/O goes through [`CsrStore`] and [`ClusterApi`]; the decision
//! itself is the pure [`decide`] function.

use super::approval::{append_approval_condition, terminal_condition};
use super::authorization::authorize_csr;
use super::types::{ClusterApi, CsrStore, Decision, Outcome, ReconcileError, SkipReason};
use super::validation::validate_csr_contents;
use crate::constants::{APPROVAL_MESSAGE, APPROVAL_REASON, NO_SAN_VALIDATION_SUFFIX};
use crate::controller::keys::key_name;
use crate::controller::parser::{parse_csr, ParsedCertificateRequest};
use crate::crd::Machine;
use k8s_openapi::api::certificates::v1::CertificateSigningRequest;
use tracing::{debug, info, warn};

/// Decide whether to approve a parsed request
///
/// `inventory` is `None` when the machine inventory could not be listed. In
/// that case only the identity checks run and the approval message says so.
/// An inventory that was listed but is empty still goes through the machine
/// authorizer and is rejected.
pub fn decide(
    csr: &CertificateSigningRequest,
    parsed: &ParsedCertificateRequest,
    inventory: Option<&[Machine]>,
) -> Decision {
    let checked = match inventory {
        Some(machines) => {
            authorize_csr(machines, csr, parsed).map(|()| APPROVAL_MESSAGE.to_string())
        }
        None => validate_csr_contents(csr, parsed)
            .map(|_| format!("{APPROVAL_MESSAGE}{NO_SAN_VALIDATION_SUFFIX}")),
    };

    match checked {
        Ok(message) => Decision::Approve {
            reason: APPROVAL_REASON,
            message,
        },
        Err(reason) => Decision::Skip(SkipReason::Rejected(reason)),
    }
}

/// Reconciler context
#[derive(Debug)]
pub struct Reconciler<S, C> {
    store: S,
    cluster: C,
    machine_namespace: String,
}

impl<S: CsrStore, C: ClusterApi> Reconciler<S, C> {
    pub fn new(store: S, cluster: C, machine_namespace: impl Into<String>) -> Self {
        Self {
            store,
            cluster,
            machine_namespace: machine_namespace.into(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn cluster(&self) -> &C {
        &self.cluster
    }

    /// Reconcile the CSR identified by `key`
    ///
    /// Safe to call repeatedly for the same key. Policy rejections and
    /// malformed payloads are `Ok(Outcome::Skipped(..))`; only failures worth
    /// retrying are returned as `Err`.
    pub async fn reconcile(&self, key: &str) -> Result<Outcome, ReconcileError> {
        let Some(cached) = self.store.lookup(key) else {
            info!("CSR {} does not exist anymore", key);
            return Ok(Outcome::Skipped(SkipReason::NotFound));
        };

        // Work on an owned copy so the cached object is never mutated
        let mut csr = (*cached).clone();
        let name = csr
            .metadata
            .name
            .clone()
            .unwrap_or_else(|| key_name(key).to_string());
        debug!("CSR {} added", name);

        if let Some(condition) = terminal_condition(&csr) {
            info!("CSR {} is already {}", name, condition.to_lowercase());
            return Ok(Outcome::Skipped(SkipReason::AlreadyDecided(
                condition.to_string(),
            )));
        }

        let parsed = match parse_csr(&csr) {
            Ok(parsed) => parsed,
            Err(e) => {
                info!("error parsing request CSR {}: {}", name, e);
                return Ok(Outcome::Skipped(SkipReason::Malformed(e)));
            }
        };

        let inventory = match self.cluster.list_machines(&self.machine_namespace).await {
            Ok(machines) => Some(machines),
            Err(e) => {
                warn!(
                    "machine api not available in namespace {}: {}",
                    self.machine_namespace, e
                );
                None
            }
        };

        let (reason, message) = match decide(&csr, &parsed, inventory.as_deref()) {
            Decision::Approve { reason, message } => (reason, message),
            Decision::Skip(skip) => {
                if let SkipReason::Rejected(rejection) = &skip {
                    if inventory.is_some() {
                        info!("CSR {} not authorized: {}", name, rejection);
                    } else {
                        info!("CSR {} not valid: {}", name, rejection);
                    }
                }
                return Ok(Outcome::Skipped(skip));
            }
        };

        append_approval_condition(&mut csr, reason, message)?;

        match self.cluster.update_approval(&name, &csr).await {
            Ok(()) => {
                let degraded = inventory.is_none();
                if degraded {
                    info!("CSR {} approved without SAN validation", name);
                } else {
                    info!("CSR {} approved", name);
                }
                Ok(Outcome::Approved { degraded })
            }
            Err(kube::Error::Api(status)) if status.code == 404 => {
                info!("CSR {} was deleted before it could be approved", name);
                Ok(Outcome::Skipped(SkipReason::Gone))
            }
            Err(source) => Err(ReconcileError::Approval { name, source }),
        }
    }
}
