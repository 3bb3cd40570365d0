//! RBAC grant checks for roles and bindings.

use kube_police_core::{CheckId, PolicySnapshot, Violation};
use kube_police_k8s_api::{rbac::Rule, BindingLike, RoleLike, TargetObject};

/// Denies bindings to restricted roles.
///
/// Namespaced bindings may reference a ClusterRole, in which case the
/// cluster role restrictions apply as well.
pub fn role_ref(target: &TargetObject, policy: &PolicySnapshot) -> Option<Violation> {
    let TargetObject::Binding(binding) = target else {
        return None;
    };
    let BindingLike { role_ref, .. } = binding;
    let rbac = &policy.rbac;

    let references_cluster_role = binding.cluster_scoped || role_ref.kind == "ClusterRole";
    let restricted = if references_cluster_role {
        rbac.restricted_cluster_roles.contains(&role_ref.name)
            || (!binding.cluster_scoped && rbac.restricted_roles.contains(&role_ref.name))
    } else {
        rbac.restricted_roles.contains(&role_ref.name)
    };
    if !restricted {
        return None;
    }

    Some(
        Violation::deny(
            CheckId::RoleRef,
            format!(
                "binding {} references restricted {} {}",
                binding.name, role_ref.kind, role_ref.name
            ),
        )
        .with("roleRef", role_ref.name.clone()),
    )
}

/// Denies rules that grant restricted verbs or resources. A `*` in a rule
/// grants every restricted entry.
pub fn role_permissions(target: &TargetObject, policy: &PolicySnapshot) -> Option<Violation> {
    let role = role(target)?;
    let rbac = &policy.rbac;

    let mut details = Vec::new();
    for (i, rule) in role.rules.iter().enumerate() {
        let verbs = granted(&rule.verbs, &rbac.restricted_verbs, |v| v);
        let resources = granted(&rule.resources, &rbac.restricted_resources, base_resource);
        if !verbs.is_empty() {
            details.push(format!("rule {i} grants verbs {}", verbs.join(", ")));
        }
        if !resources.is_empty() {
            details.push(format!("rule {i} grants resources {}", resources.join(", ")));
        }
    }
    if details.is_empty() {
        return None;
    }
    Some(
        Violation::deny(
            CheckId::RolePermissions,
            format!(
                "role {} grants restricted permissions: {}",
                role.name,
                details.join("; ")
            ),
        )
        .with("role", role.name.clone()),
    )
}

/// Denies rules that name a restricted namespace among their resource names.
pub fn role_scope(target: &TargetObject, policy: &PolicySnapshot) -> Option<Violation> {
    let role = role(target)?;
    let restricted = &policy.rbac.restricted_namespaces;

    let mut names = role
        .rules
        .iter()
        .flat_map(|r: &Rule| r.resource_names.iter())
        .filter(|n| restricted.contains(*n))
        .map(String::as_str)
        .collect::<Vec<_>>();
    names.sort_unstable();
    names.dedup();
    if names.is_empty() {
        return None;
    }
    Some(
        Violation::deny(
            CheckId::RoleScope,
            format!(
                "role {} is scoped to restricted namespaces {}",
                role.name,
                names.join(", ")
            ),
        )
        .with("namespaces", names.join(",")),
    )
}

fn role(target: &TargetObject) -> Option<&RoleLike> {
    match target {
        TargetObject::Role(role) => Some(role),
        _ => None,
    }
}

fn granted<'r>(
    rule: &'r [String],
    restricted: &'r [String],
    key: impl Fn(&str) -> &str,
) -> Vec<&'r str> {
    let mut hits = Vec::new();
    for entry in restricted {
        let hit = rule.iter().any(|g| g == "*" || key(g) == entry.as_str());
        if hit && !hits.contains(&entry.as_str()) {
            hits.push(entry.as_str());
        }
    }
    hits
}

/// `pods/exec` grants access to `pods`.
fn base_resource(resource: &str) -> &str {
    resource.split('/').next().unwrap_or(resource)
}
