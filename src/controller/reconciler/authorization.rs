//! # Machine Authorization
//!
//! Ties a validated node identity to a Machine in the inventory and checks
//! that every SAN in the request is an address that machine actually owns.
//!
//! SANs are the attacker controlled part of a CSR. The addresses compared
//! against come from the machine inventory, never from the request.

use super::types::RejectionReason;
use super::validation::validate_csr_contents;
use crate::controller::parser::ParsedCertificateRequest;
use crate::crd::{Machine, MachineAddress, MachineAddressType};
use k8s_openapi::api::certificates::v1::CertificateSigningRequest;

/// Authorize `csr` against a machine inventory snapshot
///
/// An empty snapshot is a rejection, not a reason to skip SAN checks.
/// When several machines reference the same node, the first one wins.
pub fn authorize_csr(
    machines: &[Machine],
    csr: &CertificateSigningRequest,
    parsed: &ParsedCertificateRequest,
) -> Result<(), RejectionReason> {
    if machines.is_empty() {
        return Err(RejectionReason::EmptyInventory);
    }

    let node_name = validate_csr_contents(csr, parsed)?;

    let target = machines
        .iter()
        .find(|machine| machine.node_name() == Some(node_name.as_str()))
        .ok_or_else(|| RejectionReason::NoTargetMachine {
            node_name: node_name.clone(),
        })?;
    let addresses = target.addresses();

    for san in parsed.dns_names.iter().filter(|san| !san.is_empty()) {
        if let Err(attempted) = match_address(addresses, san, MachineAddressType::is_dns) {
            return Err(RejectionReason::DnsNameNotInMachine {
                san: san.clone(),
                addresses: attempted,
            });
        }
    }

    for ip in &parsed.ip_addresses {
        let san = ip.to_string();
        if let Err(attempted) = match_address(addresses, &san, MachineAddressType::is_ip) {
            return Err(RejectionReason::IpAddressNotInMachine {
                san,
                addresses: attempted,
            });
        }
    }

    Ok(())
}

/// Look for `san` among the addresses of an accepted type
///
/// On mismatch returns every address that was compared.
fn match_address(
    addresses: &[MachineAddress],
    san: &str,
    accepts: fn(MachineAddressType) -> bool,
) -> Result<(), Vec<String>> {
    let mut attempted = Vec::new();
    for addr in addresses.iter().filter(|addr| accepts(addr.address_type)) {
        if addr.address == san {
            return Ok(());
        }
        attempted.push(addr.address.clone());
    }
    Err(attempted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_address_ignores_other_types() {
        let addresses = vec![
            MachineAddress::new(MachineAddressType::InternalIP, "worker-7.cluster.local"),
            MachineAddress::new(MachineAddressType::InternalDns, "worker-7.internal"),
        ];
        assert_eq!(
            match_address(&addresses, "worker-7.cluster.local", MachineAddressType::is_dns),
            Err(vec!["worker-7.internal".to_string()])
        );
    }

    #[test]
    fn test_match_address_finds_hostname() {
        let addresses = vec![MachineAddress::new(MachineAddressType::Hostname, "worker-7")];
        assert_eq!(
            match_address(&addresses, "worker-7", MachineAddressType::is_dns),
            Ok(())
        );
    }
}
