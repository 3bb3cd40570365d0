//! Network declaration checks.
//!
//! Pods declare the addresses they send from and receive on through
//! annotations holding comma-separated IP lists. Every declared address must
//! fall within one of the policy's allowed ranges.

use crate::workload;
use kube_police_core::{cidr, CheckId, PolicySnapshot, Violation};
use kube_police_k8s_api::{TargetObject, Workload};

pub fn egress(target: &TargetObject, policy: &PolicySnapshot) -> Option<Violation> {
    let w = workload(target)?;
    let network = &policy.network;
    declared_addresses(
        w,
        CheckId::Egress,
        "egress",
        &network.egress_annotation,
        &network.egress_cidrs,
    )
}

pub fn ingress(target: &TargetObject, policy: &PolicySnapshot) -> Option<Violation> {
    let w = workload(target)?;
    let network = &policy.network;
    declared_addresses(
        w,
        CheckId::Ingress,
        "ingress",
        &network.ingress_annotation,
        &network.ingress_cidrs,
    )
}

pub fn host_network(target: &TargetObject, policy: &PolicySnapshot) -> Option<Violation> {
    let w = workload(target)?;
    if w.host_network == Some(true) && !policy.network.allow_host_network {
        return Some(Violation::deny(
            CheckId::HostNetwork,
            "host network is not allowed",
        ));
    }
    None
}

/// Denies every request while the policy's own egress and ingress ranges
/// are inconsistent.
pub fn policy_consistency(_target: &TargetObject, policy: &PolicySnapshot) -> Option<Violation> {
    let problems = cidr::find_inconsistencies(&policy.network);
    if problems.is_empty() {
        return None;
    }
    let details = problems.iter().map(ToString::to_string).collect::<Vec<_>>();
    Some(Violation::deny(
        CheckId::PolicyConsistency,
        format!("network policy is inconsistent: {}", details.join(", ")),
    ))
}

fn declared_addresses(
    w: &Workload,
    check: CheckId,
    direction: &str,
    annotation: &str,
    allowed: &[String],
) -> Option<Violation> {
    let Some(value) = w.annotations.get(annotation) else {
        return Some(
            Violation::deny(
                check,
                format!("missing {direction} annotation {annotation}"),
            )
            .with("annotation", annotation),
        );
    };

    let mut problems = Vec::new();
    let mut offending = Vec::new();
    for entry in value.split(',') {
        let entry = entry.trim();
        let addr = match cidr::parse_addr(entry) {
            Ok(addr) => addr,
            Err(error) => {
                problems.push(error.to_string());
                offending.push(entry.to_string());
                continue;
            }
        };
        match cidr::contains_addr(allowed, addr) {
            Ok(true) => {}
            Ok(false) => {
                problems.push(format!("{addr} is outside allowed {direction} ranges"));
                offending.push(entry.to_string());
            }
            Err(error) => {
                // A malformed policy range fails every address.
                return Some(
                    Violation::deny(check, format!("invalid {direction} policy: {error}"))
                        .with("annotation", annotation),
                );
            }
        }
    }

    if problems.is_empty() {
        return None;
    }
    Some(
        Violation::deny(
            check,
            format!("disallowed {direction} addresses: {}", problems.join(", ")),
        )
        .with("annotation", annotation)
        .with("addresses", offending.join(",")),
    )
}
