//! Resource declaration checks for regular and init containers.

use crate::{workload, Findings};
use kube_police_core::{policy::Bounds, CheckId, PolicySnapshot, Quantity, Violation};
use kube_police_k8s_api::{workload::Container, TargetObject};
use std::collections::BTreeMap;

/// Requires CPU and memory limits within the policy's closed bounds.
///
/// Enforcing limits also requires every container to declare requests. That
/// is reported here only while [`requests`] is not enforced.
pub fn limits(target: &TargetObject, policy: &PolicySnapshot) -> Option<Violation> {
    let w = workload(target)?;
    let resources = &policy.resources;
    if !resources.enforce_limits {
        return None;
    }

    let mut findings = Findings::new(
        CheckId::ResourceLimits,
        "resource limits violate policy",
        "containers",
    );
    for c in w.pod_containers() {
        if !resources.enforce_requests && declared(&c.resources.requests).is_none() {
            findings.push(&c.name, "missing resource requests");
        }
        let Some(limits) = declared(&c.resources.limits) else {
            findings.push(&c.name, "missing resource limits");
            continue;
        };
        for (resource, bounds) in [("cpu", &resources.cpu), ("memory", &resources.memory)] {
            if let Err(problem) = within(limits, resource, bounds) {
                findings.push(&c.name, format!("{resource} limit {problem}"));
            }
        }
    }
    findings.into_violation()
}

/// Requires CPU and memory requests to be declared.
pub fn requests(target: &TargetObject, policy: &PolicySnapshot) -> Option<Violation> {
    let w = workload(target)?;
    if !policy.resources.enforce_requests {
        return None;
    }

    let mut findings = Findings::new(
        CheckId::ResourceRequests,
        "resource requests violate policy",
        "containers",
    );
    for c in w.pod_containers() {
        let Some(requests) = declared(&c.resources.requests) else {
            findings.push(&c.name, "missing resource requests");
            continue;
        };
        for resource in ["cpu", "memory"] {
            if let Err(problem) = within(requests, resource, &Bounds::default()) {
                findings.push(&c.name, format!("{resource} request {problem}"));
            }
        }
        if let Some(problem) = exceeds_limits(c) {
            findings.push(&c.name, problem);
        }
    }
    findings.into_violation()
}

fn declared(map: &Option<BTreeMap<String, String>>) -> Option<&BTreeMap<String, String>> {
    map.as_ref().filter(|m| !m.is_empty())
}

fn within(
    declared: &BTreeMap<String, String>,
    resource: &str,
    bounds: &Bounds,
) -> Result<(), String> {
    let raw = declared
        .get(resource)
        .ok_or_else(|| "is missing".to_string())?;
    let quantity = raw
        .parse::<Quantity>()
        .map_err(|_| format!("{raw:?} is not a valid quantity"))?;
    if !bounds.contains(&quantity) {
        return Err(format!("{quantity} is outside {bounds}"));
    }
    Ok(())
}

fn exceeds_limits(c: &Container) -> Option<String> {
    let limits = c.resources.limits.as_ref()?;
    let requests = c.resources.requests.as_ref()?;
    for (resource, request) in requests {
        let (Ok(request), Some(Ok(limit))) = (
            request.parse::<Quantity>(),
            limits.get(resource).map(|l| l.parse::<Quantity>()),
        ) else {
            continue;
        };
        if request > limit {
            return Some(format!("{resource} request {request} exceeds limit {limit}"));
        }
    }
    None
}
