//! # Kubernetes Implementations
//!
//! [`CsrStore`] over the reflector cache and [`ClusterApi`] over a `kube::Client`.

use super::types::{ClusterApi, CsrStore};
use crate::constants::CONTROLLER_NAME;
use crate::controller::keys::csr_object_ref;
use crate::crd::Machine;
use async_trait::async_trait;
use k8s_openapi::api::certificates::v1::CertificateSigningRequest;
use kube::api::{Api, ApiResource, DynamicObject, ListParams, PostParams};
use kube::Client;
use kube_runtime::reflector::Store;
use std::sync::Arc;
use tracing::warn;

impl CsrStore for Store<CertificateSigningRequest> {
    fn lookup(&self, key: &str) -> Option<Arc<CertificateSigningRequest>> {
        self.get(&csr_object_ref(key))
    }
}

/// Cluster API access through the Kubernetes client
#[derive(Clone)]
pub struct KubeClusterApi {
    client: Client,
}

impl std::fmt::Debug for KubeClusterApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClusterApi").finish_non_exhaustive()
    }
}

impl KubeClusterApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn update_approval(
        &self,
        name: &str,
        csr: &CertificateSigningRequest,
    ) -> Result<(), kube::Error> {
        let api: Api<CertificateSigningRequest> = Api::all(self.client.clone());
        let body = serde_json::to_vec(csr).map_err(kube::Error::SerdeError)?;
        let params = PostParams {
            field_manager: Some(CONTROLLER_NAME.to_string()),
            ..PostParams::default()
        };
        api.replace_subresource("approval", name, &params, body)
            .await?;
        Ok(())
    }

    async fn list_machines(&self, namespace: &str) -> Result<Vec<Machine>, kube::Error> {
        // Listed untyped so a single undecodable object cannot fail the listing
        let resource = ApiResource::erase::<Machine>(&());
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &resource);
        let list = api.list(&ListParams::default()).await?;
        Ok(decode_machines(list.items))
    }
}

/// Decode listed objects into Machines, skipping the ones that do not decode
///
/// A skipped Machine cannot authorize anything, so its node's requests are
/// rejected rather than approved without SAN validation.
pub fn decode_machines(items: Vec<DynamicObject>) -> Vec<Machine> {
    items
        .into_iter()
        .filter_map(|object| {
            let name = object.metadata.name.clone().unwrap_or_default();
            match serde_json::to_value(object).and_then(Machine::from_value) {
                Ok(machine) => Some(machine),
                Err(e) => {
                    warn!("skipping Machine {} that failed to decode: {}", name, e);
                    None
                }
            }
        })
        .collect()
}
