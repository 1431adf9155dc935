//! # Object Keys
//!
//! Work queue keys in `namespace/name` form, or `name` for cluster scoped objects.

use k8s_openapi::api::certificates::v1::CertificateSigningRequest;
use kube::Resource;
use kube_runtime::reflector::ObjectRef;

/// Queue key of an object, `None` when it has no name
pub fn object_key<K: Resource>(obj: &K) -> Option<String> {
    let name = obj.meta().name.as_deref()?;
    Some(match obj.meta().namespace.as_deref() {
        Some(namespace) if !namespace.is_empty() => format!("{namespace}/{name}"),
        _ => name.to_string(),
    })
}

/// Name part of a queue key
pub fn key_name(key: &str) -> &str {
    key.split_once('/').map_or(key, |(_, name)| name)
}

/// Reflector store reference for a CSR queue key
pub fn csr_object_ref(key: &str) -> ObjectRef<CertificateSigningRequest> {
    match key.split_once('/') {
        Some((namespace, name)) => ObjectRef::new(name).within(namespace),
        None => ObjectRef::new(key),
    }
}
