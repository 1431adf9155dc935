//! # Machine
//!
//! Machine API `Machine` resource, reduced to the fields the approver reads.
//!
//! Unknown fields (provider spec, lifecycle hooks, phase, ...) are ignored on
//! deserialization. Fields the Machine API leaves optional decode to empty
//! values so one sparse object never fails the whole inventory listing.

use kube::{CustomResource, Resource};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Machine Custom Resource
///
/// # Example
///
/// ```yaml
/// apiVersion: machine.openshift.io/v1beta1
/// kind: Machine
/// metadata:
///   name: cluster-worker-7
///   namespace: openshift-machine-api
/// status:
///   nodeRef:
///     kind: Node
///     name: worker-7
///   addresses:
///     - type: InternalDNS
///       address: worker-7.cluster.local
///     - type: InternalIP
///       address: 10.0.0.7
/// ```
#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "Machine",
    group = "machine.openshift.io",
    version = "v1beta1",
    namespaced,
    status = "MachineStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct MachineSpec {
    /// Cloud provider identifier of the backing instance
    #[serde(default, rename = "providerID", skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
}

/// Observed state of a Machine
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MachineStatus {
    /// Node backed by this machine, absent until the node has registered
    #[serde(default)]
    pub node_ref: Option<NodeReference>,
    /// Addresses reported by the infrastructure provider
    #[serde(default)]
    pub addresses: Vec<MachineAddress>,
}

/// Reference to the Node object backed by a Machine
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeReference {
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub uid: Option<String>,
}

/// A single address of a Machine
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct MachineAddress {
    #[serde(default, rename = "type")]
    pub address_type: MachineAddressType,
    #[serde(default)]
    pub address: String,
}

impl MachineAddress {
    pub fn new(address_type: MachineAddressType, address: impl Into<String>) -> Self {
        Self {
            address_type,
            address: address.into(),
        }
    }
}

/// Address type, using the Node address type names
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum MachineAddressType {
    Hostname,
    InternalIP,
    ExternalIP,
    #[serde(rename = "InternalDNS")]
    InternalDns,
    #[serde(rename = "ExternalDNS")]
    ExternalDns,
    /// Any type this controller does not compare against, or no type at all
    #[default]
    #[serde(other)]
    Unknown,
}

impl MachineAddressType {
    /// Whether addresses of this type can satisfy a DNS SAN
    pub fn is_dns(self) -> bool {
        matches!(
            self,
            MachineAddressType::InternalDns
                | MachineAddressType::ExternalDns
                | MachineAddressType::Hostname
        )
    }

    /// Whether addresses of this type can satisfy an IP SAN
    pub fn is_ip(self) -> bool {
        matches!(
            self,
            MachineAddressType::InternalIP | MachineAddressType::ExternalIP
        )
    }
}

impl Machine {
    /// Decode a Machine from its JSON form
    ///
    /// An object without `spec` decodes with an empty one, and list items
    /// without type information get the Machine `apiVersion` and `kind`.
    pub fn from_value(mut value: serde_json::Value) -> Result<Self, serde_json::Error> {
        if let Some(object) = value.as_object_mut() {
            object
                .entry("apiVersion")
                .or_insert_with(|| Machine::api_version(&()).into_owned().into());
            object
                .entry("kind")
                .or_insert_with(|| Machine::kind(&()).into_owned().into());
            object
                .entry("spec")
                .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
        }
        serde_json::from_value(value)
    }

    /// Name of the node this machine backs, if it has one
    ///
    /// A `nodeRef` without a name counts as unbound.
    pub fn node_name(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|status| status.node_ref.as_ref())
            .map(|node_ref| node_ref.name.as_str())
            .filter(|name| !name.is_empty())
    }

    /// Addresses reported in the machine status
    pub fn addresses(&self) -> &[MachineAddress] {
        self.status
            .as_ref()
            .map(|status| status.addresses.as_slice())
            .unwrap_or_default()
    }
}
