//! Shared fixtures for the integration tests
//!
//! - `NodeRequest` builds node serving CSRs backed by real PKCS#10 payloads
//! - `FakeStore` stands in for the CSR cache
//! - `FakeCluster` records approval updates and can fail on demand

#![allow(dead_code, reason = "each test binary uses a different subset")]

use async_trait::async_trait;
use k8s_openapi::api::certificates::v1::{
    CertificateSigningRequest, CertificateSigningRequestCondition,
    CertificateSigningRequestSpec, CertificateSigningRequestStatus,
};
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use node_csr_approver::controller::parser::{parse_csr, ParsedCertificateRequest};
use node_csr_approver::controller::reconciler::{ClusterApi, CsrStore};
use node_csr_approver::crd::{
    Machine, MachineAddress, MachineAddressType, MachineSpec, MachineStatus, NodeReference,
};
use rcgen::{string::Ia5String, CertificateParams, DnType, DnValue, KeyPair, SanType};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

pub const SERVING_USAGES: [&str; 3] = ["digital signature", "key encipherment", "server auth"];

/// Description of a CSR as a node would submit it
#[derive(Debug, Clone)]
pub struct NodeRequest {
    pub username: Option<String>,
    pub groups: Vec<String>,
    pub usages: Vec<String>,
    pub common_name: String,
    pub organization: Option<String>,
    pub dns_names: Vec<String>,
    pub ip_addresses: Vec<IpAddr>,
}

impl NodeRequest {
    /// A request from `node` that passes every identity check
    pub fn node(node: &str) -> Self {
        let username = format!("system:node:{node}");
        Self {
            username: Some(username.clone()),
            groups: vec![
                "system:nodes".to_string(),
                "system:authenticated".to_string(),
            ],
            usages: SERVING_USAGES.iter().map(ToString::to_string).collect(),
            common_name: username,
            organization: Some("system:nodes".to_string()),
            dns_names: Vec::new(),
            ip_addresses: Vec::new(),
        }
    }

    pub fn with_dns(mut self, name: &str) -> Self {
        self.dns_names.push(name.to_string());
        self
    }

    pub fn with_ip(mut self, ip: &str) -> Self {
        self.ip_addresses.push(ip.parse().unwrap());
        self
    }

    /// PEM encoded PKCS#10 request for the subject and SANs
    pub fn pem(&self) -> String {
        let key_pair = KeyPair::generate().unwrap();
        let mut params = CertificateParams::default();
        params.distinguished_name.push(
            DnType::CommonName,
            DnValue::Utf8String(self.common_name.clone()),
        );
        if let Some(org) = &self.organization {
            params
                .distinguished_name
                .push(DnType::OrganizationName, DnValue::Utf8String(org.clone()));
        }
        params.subject_alt_names = self
            .dns_names
            .iter()
            .map(|name| SanType::DnsName(Ia5String::try_from(name.as_str()).unwrap()))
            .chain(self.ip_addresses.iter().copied().map(SanType::IpAddress))
            .collect();
        params.serialize_request(&key_pair).unwrap().pem().unwrap()
    }

    /// CSR resource named `name` carrying a freshly generated request
    pub fn csr(&self, name: &str) -> CertificateSigningRequest {
        csr_with_payload(self, name, self.pem().into_bytes())
    }

    /// Parsed view of the request, without generating a key
    pub fn parsed(&self) -> ParsedCertificateRequest {
        ParsedCertificateRequest {
            common_name: self.common_name.clone(),
            organizations: self.organization.iter().cloned().collect(),
            dns_names: self.dns_names.clone(),
            ip_addresses: self.ip_addresses.clone(),
        }
    }

    /// CSR resource whose payload is left empty, for the pure decision functions
    pub fn resource(&self, name: &str) -> CertificateSigningRequest {
        csr_with_payload(self, name, Vec::new())
    }
}

pub fn csr_with_payload(
    request: &NodeRequest,
    name: &str,
    payload: Vec<u8>,
) -> CertificateSigningRequest {
    CertificateSigningRequest {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: CertificateSigningRequestSpec {
            request: ByteString(payload),
            signer_name: "kubernetes.io/kubelet-serving".to_string(),
            username: request.username.clone(),
            groups: Some(request.groups.clone()),
            usages: Some(request.usages.clone()),
            ..Default::default()
        },
        status: None,
    }
}

/// Mark `csr` with a terminal condition of type `condition_type`
pub fn with_condition(
    mut csr: CertificateSigningRequest,
    condition_type: &str,
) -> CertificateSigningRequest {
    csr.status = Some(CertificateSigningRequestStatus {
        conditions: Some(vec![CertificateSigningRequestCondition {
            type_: condition_type.to_string(),
            status: "True".to_string(),
            reason: Some("Manual".to_string()),
            message: Some("decided by an operator".to_string()),
            ..Default::default()
        }]),
        ..Default::default()
    });
    csr
}

/// Conditions carried by `csr`, empty when it has none
pub fn conditions(csr: &CertificateSigningRequest) -> Vec<CertificateSigningRequestCondition> {
    csr.status
        .as_ref()
        .and_then(|status| status.conditions.clone())
        .unwrap_or_default()
}

/// Sanity check that a generated payload round-trips through the parser
pub fn assert_parses(request: &NodeRequest, csr: &CertificateSigningRequest) {
    assert_eq!(parse_csr(csr).unwrap(), request.parsed());
}

/// Machine backing `node` with the given addresses
pub fn machine(name: &str, node: &str, addresses: &[(MachineAddressType, &str)]) -> Machine {
    let mut machine = Machine::new(name, MachineSpec::default());
    machine.metadata.namespace = Some("openshift-machine-api".to_string());
    machine.status = Some(MachineStatus {
        node_ref: Some(NodeReference {
            kind: Some("Node".to_string()),
            name: node.to_string(),
            uid: None,
        }),
        addresses: addresses
            .iter()
            .map(|(address_type, address)| MachineAddress::new(*address_type, *address))
            .collect(),
    });
    machine
}

/// Machine that has not been linked to a node yet
pub fn unlinked_machine(name: &str) -> Machine {
    Machine::new(name, MachineSpec::default())
}

/// The `worker-7` machine used across the scenarios
pub fn worker_7() -> Machine {
    machine(
        "cluster-worker-7",
        "worker-7",
        &[
            (MachineAddressType::InternalDns, "worker-7.cluster.local"),
            (MachineAddressType::Hostname, "worker-7"),
            (MachineAddressType::InternalIP, "10.0.0.7"),
        ],
    )
}

/// In-memory CSR cache keyed by queue key
#[derive(Debug, Default)]
pub struct FakeStore {
    objects: Mutex<HashMap<String, Arc<CertificateSigningRequest>>>,
}

impl FakeStore {
    pub fn with(csrs: impl IntoIterator<Item = CertificateSigningRequest>) -> Self {
        let store = Self::default();
        for csr in csrs {
            store.insert(csr);
        }
        store
    }

    pub fn insert(&self, csr: CertificateSigningRequest) {
        let key = csr.metadata.name.clone().unwrap();
        self.objects.lock().unwrap().insert(key, Arc::new(csr));
    }

    pub fn remove(&self, key: &str) {
        self.objects.lock().unwrap().remove(key);
    }
}

impl CsrStore for FakeStore {
    fn lookup(&self, key: &str) -> Option<Arc<CertificateSigningRequest>> {
        self.objects.lock().unwrap().get(key).cloned()
    }
}

/// Cluster API double
///
/// Records every approval update. `fail_listing` makes machine listing fail;
/// `fail_next_updates` makes the next N approval updates fail.
#[derive(Debug, Default)]
pub struct FakeCluster {
    machines: Vec<Machine>,
    list_fails: AtomicBool,
    update_failures_left: AtomicU32,
    update_not_found: AtomicBool,
    updates: Mutex<Vec<(String, CertificateSigningRequest)>>,
    update_calls: AtomicU32,
    list_calls: AtomicU32,
}

impl FakeCluster {
    pub fn with_machines(machines: Vec<Machine>) -> Self {
        Self {
            machines,
            ..Default::default()
        }
    }

    /// Inventory that cannot be listed
    pub fn unreachable_inventory() -> Self {
        let cluster = Self::default();
        cluster.list_fails.store(true, Ordering::SeqCst);
        cluster
    }

    pub fn fail_next_updates(&self, count: u32) {
        self.update_failures_left.store(count, Ordering::SeqCst);
    }

    pub fn fail_updates_with_not_found(&self) {
        self.update_not_found.store(true, Ordering::SeqCst);
    }

    /// Approval updates that went through, in order
    pub fn updates(&self) -> Vec<(String, CertificateSigningRequest)> {
        self.updates.lock().unwrap().clone()
    }

    /// Approval update attempts, failed ones included
    pub fn update_calls(&self) -> u32 {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> u32 {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn update_approval(
        &self,
        name: &str,
        csr: &CertificateSigningRequest,
    ) -> Result<(), kube::Error> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if self.update_not_found.load(Ordering::SeqCst) {
            return Err(not_found(name));
        }
        let remaining = self.update_failures_left.load(Ordering::SeqCst);
        if remaining > 0 {
            self.update_failures_left.store(remaining - 1, Ordering::SeqCst);
            return Err(kube::Error::Service("connection reset by peer".into()));
        }
        self.updates
            .lock()
            .unwrap()
            .push((name.to_string(), csr.clone()));
        Ok(())
    }

    async fn list_machines(&self, _namespace: &str) -> Result<Vec<Machine>, kube::Error> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.list_fails.load(Ordering::SeqCst) {
            return Err(kube::Error::Service("machine api unavailable".into()));
        }
        Ok(self.machines.clone())
    }
}

fn not_found(name: &str) -> kube::Error {
    kube::Error::Api(
        serde_json::from_value(serde_json::json!({
            "status": "Failure",
            "message": format!("certificatesigningrequests.certificates.k8s.io \"{name}\" not found"),
            "reason": "NotFound",
            "code": 404
        }))
        .unwrap(),
    )
}
