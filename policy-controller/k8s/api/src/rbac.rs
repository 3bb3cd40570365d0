use crate::{object_name, ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use k8s_openapi::api::rbac::v1 as k8s;

/// A Role or ClusterRole.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RoleLike {
    pub name: String,
    pub namespace: Option<String>,
    pub cluster_scoped: bool,
    pub rules: Vec<Rule>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Rule {
    pub api_groups: Vec<String>,
    pub verbs: Vec<String>,
    pub resources: Vec<String>,
    pub resource_names: Vec<String>,
}

/// A RoleBinding or ClusterRoleBinding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BindingLike {
    pub name: String,
    pub namespace: Option<String>,
    pub cluster_scoped: bool,
    pub role_ref: RoleRef,
    pub subjects: Vec<Subject>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoleRef {
    pub kind: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subject {
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
}

// === impl RoleLike ===

impl From<Role> for RoleLike {
    fn from(role: Role) -> Self {
        Self {
            name: object_name(&role.metadata),
            namespace: role.metadata.namespace,
            cluster_scoped: false,
            rules: rules(role.rules),
        }
    }
}

impl From<ClusterRole> for RoleLike {
    fn from(role: ClusterRole) -> Self {
        Self {
            name: object_name(&role.metadata),
            namespace: None,
            cluster_scoped: true,
            rules: rules(role.rules),
        }
    }
}

fn rules(rules: Option<Vec<k8s::PolicyRule>>) -> Vec<Rule> {
    rules
        .into_iter()
        .flatten()
        .map(|r| Rule {
            api_groups: r.api_groups.unwrap_or_default(),
            verbs: r.verbs,
            resources: r.resources.unwrap_or_default(),
            resource_names: r.resource_names.unwrap_or_default(),
        })
        .collect()
}

// === impl BindingLike ===

impl From<RoleBinding> for BindingLike {
    fn from(binding: RoleBinding) -> Self {
        Self {
            name: object_name(&binding.metadata),
            namespace: binding.metadata.namespace,
            cluster_scoped: false,
            role_ref: binding.role_ref.into(),
            subjects: subjects(binding.subjects),
        }
    }
}

impl From<ClusterRoleBinding> for BindingLike {
    fn from(binding: ClusterRoleBinding) -> Self {
        Self {
            name: object_name(&binding.metadata),
            namespace: None,
            cluster_scoped: true,
            role_ref: binding.role_ref.into(),
            subjects: subjects(binding.subjects),
        }
    }
}

impl From<k8s::RoleRef> for RoleRef {
    fn from(r: k8s::RoleRef) -> Self {
        Self {
            kind: r.kind,
            name: r.name,
        }
    }
}

fn subjects(subjects: Option<Vec<k8s::Subject>>) -> Vec<Subject> {
    subjects
        .into_iter()
        .flatten()
        .map(|s| Subject {
            kind: s.kind,
            name: s.name,
            namespace: s.namespace,
        })
        .collect()
}
