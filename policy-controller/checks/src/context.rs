//! Container security-context checks.
//!
//! A container that declares no security context at all is denied by
//! [`security_context`]; the remaining checks treat its fields as unset.
//! The presence, privilege and capability checks cover every container,
//! ephemeral debug containers included. The rest apply to regular and init
//! containers.

use crate::{workload, Findings};
use kube_police_core::{CheckId, PolicySnapshot, Violation};
use kube_police_k8s_api::TargetObject;

pub fn security_context(target: &TargetObject, _policy: &PolicySnapshot) -> Option<Violation> {
    let w = workload(target)?;
    let mut findings = Findings::new(
        CheckId::SecurityContext,
        "missing securityContext",
        "containers",
    );
    for c in &w.containers {
        if c.security_context.is_none() {
            findings.push(&c.name, "");
        }
    }
    findings.into_violation()
}

pub fn privileged(target: &TargetObject, _policy: &PolicySnapshot) -> Option<Violation> {
    let w = workload(target)?;
    let mut findings = Findings::new(CheckId::Privileged, "privileged container", "containers");
    for c in &w.containers {
        if c.security_context.as_ref().and_then(|sc| sc.privileged) == Some(true) {
            findings.push(&c.name, "");
        }
    }
    findings.into_violation()
}

/// Denies added capabilities that the policy disallows, or, when the policy
/// names allowed capabilities, any capability it does not name.
pub fn capabilities(target: &TargetObject, policy: &PolicySnapshot) -> Option<Violation> {
    let w = workload(target)?;
    let disallowed = normalize_all(&policy.capabilities.disallowed);
    let allowed = normalize_all(&policy.capabilities.allowed);

    let mut findings = Findings::new(
        CheckId::Capabilities,
        "disallowed capabilities",
        "containers",
    );
    for c in &w.containers {
        let Some(caps) = c.capabilities() else {
            continue;
        };
        let denied = caps
            .add
            .iter()
            .filter(|cap| {
                let cap = normalize_capability(cap);
                disallowed.contains(&cap) || (!allowed.is_empty() && !allowed.contains(&cap))
            })
            .map(String::as_str)
            .collect::<Vec<_>>();
        if !denied.is_empty() {
            findings.push(&c.name, format!("adds {}", denied.join(", ")));
        }
    }
    findings.into_violation()
}

/// Requires every container to drop the policy's required capabilities.
/// Dropping `ALL` satisfies any requirement.
pub fn required_drops(target: &TargetObject, policy: &PolicySnapshot) -> Option<Violation> {
    let w = workload(target)?;
    if policy.capabilities.required_drops.is_empty() {
        return None;
    }

    let mut findings = Findings::new(
        CheckId::RequiredDrops,
        "missing required capability drops",
        "containers",
    );
    for c in w.pod_containers() {
        let dropped = c
            .capabilities()
            .map(|caps| normalize_all(&caps.drop))
            .unwrap_or_default();
        if dropped.iter().any(|d| d == "ALL") {
            continue;
        }
        let missing = policy
            .capabilities
            .required_drops
            .iter()
            .filter(|r| !dropped.contains(&normalize_capability(r)))
            .map(String::as_str)
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            findings.push(&c.name, format!("must drop {}", missing.join(", ")));
        }
    }
    findings.into_violation()
}

/// Requires an explicit user and forbids an explicit opt-out of non-root
/// execution. Pod-level values apply to containers that leave them unset.
pub fn run_as_user(target: &TargetObject, _policy: &PolicySnapshot) -> Option<Violation> {
    let w = workload(target)?;
    let mut findings = Findings::new(CheckId::RunAsUser, "unsafe user settings", "containers");
    for c in w.pod_containers() {
        if c.run_as_user(&w.pod_security).is_none() {
            findings.push(&c.name, "runAsUser is unset");
        }
        if c.run_as_non_root(&w.pod_security) == Some(false) {
            findings.push(&c.name, "runAsNonRoot is false");
        }
    }
    findings.into_violation()
}

pub fn read_only_root_filesystem(
    target: &TargetObject,
    _policy: &PolicySnapshot,
) -> Option<Violation> {
    let w = workload(target)?;
    let mut findings = Findings::new(
        CheckId::ReadOnlyRootFilesystem,
        "writable root filesystem",
        "containers",
    );
    for c in w.pod_containers() {
        let read_only = c
            .security_context
            .as_ref()
            .and_then(|sc| sc.read_only_root_filesystem);
        if read_only != Some(true) {
            findings.push(&c.name, "");
        }
    }
    findings.into_violation()
}

/// Denies explicit container settings that contradict the policy's required
/// values.
pub fn pod_security_context(target: &TargetObject, policy: &PolicySnapshot) -> Option<Violation> {
    let w = workload(target)?;
    let required = &policy.pod_security_context;
    let mut findings = Findings::new(
        CheckId::PodSecurityContext,
        "security context contradicts policy",
        "containers",
    );
    for c in w.pod_containers() {
        let Some(sc) = c.security_context.as_ref() else {
            continue;
        };
        let fields = [
            (
                "allowPrivilegeEscalation",
                required.allow_privilege_escalation,
                sc.allow_privilege_escalation,
            ),
            (
                "runAsNonRoot",
                required.run_as_non_root,
                c.run_as_non_root(&w.pod_security),
            ),
            (
                "readOnlyRootFilesystem",
                required.read_only_root_filesystem,
                sc.read_only_root_filesystem,
            ),
        ];
        for (field, want, got) in fields {
            if let (Some(want), Some(got)) = (want, got) {
                if want != got {
                    findings.push(&c.name, format!("{field} must be {want}"));
                }
            }
        }
    }
    findings.into_violation()
}

/// Capability names are compared case-insensitively and without the
/// `CAP_` prefix, so `CAP_SYS_ADMIN` and `sys_admin` are the same.
pub fn normalize_capability(name: &str) -> String {
    let upper = name.trim().to_ascii_uppercase();
    match upper.strip_prefix("CAP_") {
        Some(stripped) => stripped.to_string(),
        None => upper,
    }
}

fn normalize_all(names: &[String]) -> Vec<String> {
    names.iter().map(|n| normalize_capability(n)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_capability_names() {
        assert_eq!(normalize_capability("CAP_SYS_ADMIN"), "SYS_ADMIN");
        assert_eq!(normalize_capability(" net_admin "), "NET_ADMIN");
        assert_eq!(normalize_capability("ALL"), "ALL");
    }
}
