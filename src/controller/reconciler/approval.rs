//! # Approval Condition
//!
//! Condition inspection and the single mutation this controller performs on a
//! CSR: appending an `Approved` condition.

use crate::constants::{CONDITION_APPROVED, CONDITION_DENIED, CONDITION_FAILED};
use chrono::{SecondsFormat, Utc};
use k8s_openapi::api::certificates::v1::{
    CertificateSigningRequest, CertificateSigningRequestCondition,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

/// Type of the first terminal condition on `csr`, if any
///
/// `Approved` requests are never re-processed. `Denied` and `Failed` requests
/// are also left alone since the API server refuses to approve them.
pub fn terminal_condition(csr: &CertificateSigningRequest) -> Option<&str> {
    csr.status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .into_iter()
        .flatten()
        .map(|condition| condition.type_.as_str())
        .find(|type_| [CONDITION_APPROVED, CONDITION_DENIED, CONDITION_FAILED].contains(type_))
}

/// Whether `csr` already carries an `Approved` condition
pub fn is_approved(csr: &CertificateSigningRequest) -> bool {
    csr.status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|condition| condition.type_ == CONDITION_APPROVED)
        })
}

/// Append an `Approved` condition stamped with the current time
///
/// Existing conditions and every other field are left as they are.
pub fn append_approval_condition(
    csr: &mut CertificateSigningRequest,
    reason: &str,
    message: String,
) -> Result<(), serde_json::Error> {
    let now = now_time()?;
    csr.status
        .get_or_insert_with(Default::default)
        .conditions
        .get_or_insert_with(Vec::new)
        .push(CertificateSigningRequestCondition {
            type_: CONDITION_APPROVED.to_string(),
            status: "True".to_string(),
            reason: Some(reason.to_string()),
            message: Some(message),
            last_update_time: Some(now.clone()),
            last_transition_time: Some(now),
        });
    Ok(())
}

/// Current time as a meta/v1 `Time`, going through its RFC3339 wire form
fn now_time() -> Result<Time, serde_json::Error> {
    serde_json::from_value(serde_json::Value::String(
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::certificates::v1::CertificateSigningRequestStatus;

    fn csr_with_conditions(types: &[&str]) -> CertificateSigningRequest {
        CertificateSigningRequest {
            status: Some(CertificateSigningRequestStatus {
                conditions: Some(
                    types
                        .iter()
                        .map(|type_| CertificateSigningRequestCondition {
                            type_: (*type_).to_string(),
                            status: "True".to_string(),
                            ..Default::default()
                        })
                        .collect(),
                ),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_no_status_is_not_terminal() {
        let csr = CertificateSigningRequest::default();
        assert_eq!(terminal_condition(&csr), None);
        assert!(!is_approved(&csr));
    }

    #[test]
    fn test_terminal_conditions() {
        assert_eq!(terminal_condition(&csr_with_conditions(&["Approved"])), Some("Approved"));
        assert_eq!(terminal_condition(&csr_with_conditions(&["Denied"])), Some("Denied"));
        assert_eq!(terminal_condition(&csr_with_conditions(&["Failed"])), Some("Failed"));
        assert_eq!(terminal_condition(&csr_with_conditions(&["Pending"])), None);
    }

    #[test]
    fn test_append_keeps_existing_conditions() {
        let mut csr = csr_with_conditions(&["Pending"]);
        append_approval_condition(&mut csr, "NodeCSRApprove", "approved".to_string()).unwrap();

        let conditions = csr.status.unwrap().conditions.unwrap();
        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[0].type_, "Pending");
        assert_eq!(conditions[1].type_, "Approved");
        assert_eq!(conditions[1].status, "True");
        assert_eq!(conditions[1].reason.as_deref(), Some("NodeCSRApprove"));
        assert_eq!(conditions[1].message.as_deref(), Some("approved"));
        assert!(conditions[1].last_update_time.is_some());
    }

    #[test]
    fn test_append_creates_status() {
        let mut csr = CertificateSigningRequest::default();
        append_approval_condition(&mut csr, "NodeCSRApprove", "approved".to_string()).unwrap();
        assert!(is_approved(&csr));
    }
}
