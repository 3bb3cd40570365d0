use std::{fmt, str::FromStr};

const RBAC_GROUP: &str = "rbac.authorization.k8s.io";

/// The object kinds that admission requests may carry.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ExpectedKind {
    Pod,
    Role,
    ClusterRole,
    RoleBinding,
    ClusterRoleBinding,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unsupported kind: {0}")]
pub struct UnknownKind(pub String);

// === impl ExpectedKind ===

impl ExpectedKind {
    /// Resolves a request's group and kind, as carried in an admission
    /// request's `kind` field.
    pub fn from_group_kind(group: &str, kind: &str) -> Result<Self, UnknownKind> {
        let k = kind.parse::<Self>()?;
        if k.group() != group {
            return Err(UnknownKind(format!("{group}/{kind}")));
        }
        Ok(k)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pod => "Pod",
            Self::Role => "Role",
            Self::ClusterRole => "ClusterRole",
            Self::RoleBinding => "RoleBinding",
            Self::ClusterRoleBinding => "ClusterRoleBinding",
        }
    }

    pub fn group(&self) -> &'static str {
        match self {
            Self::Pod => "",
            _ => RBAC_GROUP,
        }
    }

    pub fn plural(&self) -> &'static str {
        match self {
            Self::Pod => "pods",
            Self::Role => "roles",
            Self::ClusterRole => "clusterroles",
            Self::RoleBinding => "rolebindings",
            Self::ClusterRoleBinding => "clusterrolebindings",
        }
    }

    pub fn is_namespaced(&self) -> bool {
        matches!(self, Self::Pod | Self::Role | Self::RoleBinding)
    }
}

impl FromStr for ExpectedKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pod" => Ok(Self::Pod),
            "Role" => Ok(Self::Role),
            "ClusterRole" => Ok(Self::ClusterRole),
            "RoleBinding" => Ok(Self::RoleBinding),
            "ClusterRoleBinding" => Ok(Self::ClusterRoleBinding),
            s => Err(UnknownKind(s.to_string())),
        }
    }
}

impl fmt::Display for ExpectedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}
