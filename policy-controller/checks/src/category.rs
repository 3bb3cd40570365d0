use kube_police_core::CheckId;
use kube_police_k8s_api::ExpectedKind;
use std::{fmt, str::FromStr};

/// A group of checks served by one admission endpoint.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    Context,
    Volumes,
    Network,
    Api,
    Image,
    Rbac,
    Resources,

    /// Applies the security baseline instead of running checks.
    Mutate,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("no admission category is served at {0}")]
pub struct RoutingError(pub String);

const CONTEXT: &[CheckId] = &[
    CheckId::SecurityContext,
    CheckId::Privileged,
    CheckId::Capabilities,
    CheckId::RequiredDrops,
    CheckId::RunAsUser,
    CheckId::ReadOnlyRootFilesystem,
    CheckId::PodSecurityContext,
];
const VOLUMES: &[CheckId] = &[CheckId::HostPath, CheckId::StorageClass];
const NETWORK: &[CheckId] = &[
    CheckId::Egress,
    CheckId::Ingress,
    CheckId::HostNetwork,
    CheckId::PolicyConsistency,
];
const API: &[CheckId] = &[CheckId::ServiceAccount, CheckId::ApiAccess];
const IMAGE: &[CheckId] = &[
    CheckId::ImageRegistry,
    CheckId::ImageTag,
    CheckId::ImageSignature,
];
const RBAC: &[CheckId] = &[CheckId::RoleRef, CheckId::RolePermissions, CheckId::RoleScope];
const RESOURCES: &[CheckId] = &[CheckId::ResourceLimits, CheckId::ResourceRequests];

// === impl Category ===

impl Category {
    pub const ALL: [Self; 8] = [
        Self::Context,
        Self::Volumes,
        Self::Network,
        Self::Api,
        Self::Image,
        Self::Rbac,
        Self::Resources,
        Self::Mutate,
    ];

    /// Resolves an endpoint path such as `/validate/image` or `/mutate/pod`.
    pub fn from_path(path: &str) -> Result<Self, RoutingError> {
        let unknown = || RoutingError(path.to_string());
        match path.trim_end_matches('/') {
            "/mutate/pod" | "/mutate" => Ok(Self::Mutate),
            p => match p.strip_prefix("/validate/") {
                Some(name) if name != "mutate" => name.parse().map_err(|_| unknown()),
                _ => Err(unknown()),
            },
        }
    }

    pub fn path(&self) -> String {
        match self {
            Self::Mutate => "/mutate/pod".to_string(),
            c => format!("/validate/{}", c.as_str()),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Context => "context",
            Self::Volumes => "volumes",
            Self::Network => "network",
            Self::Api => "api",
            Self::Image => "image",
            Self::Rbac => "rbac",
            Self::Resources => "resources",
            Self::Mutate => "mutate",
        }
    }

    pub fn checks(&self) -> &'static [CheckId] {
        match self {
            Self::Context => CONTEXT,
            Self::Volumes => VOLUMES,
            Self::Network => NETWORK,
            Self::Api => API,
            Self::Image => IMAGE,
            Self::Rbac => RBAC,
            Self::Resources => RESOURCES,
            Self::Mutate => &[],
        }
    }

    /// Whether objects of `kind` can be evaluated by this category.
    pub fn accepts(&self, kind: ExpectedKind) -> bool {
        match self {
            Self::Api => true,
            Self::Rbac => kind != ExpectedKind::Pod,
            _ => kind == ExpectedKind::Pod,
        }
    }
}

impl FromStr for Category {
    type Err = RoutingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "context" | "capabilities" => Ok(Self::Context),
            "volumes" => Ok(Self::Volumes),
            "network" => Ok(Self::Network),
            "api" => Ok(Self::Api),
            "image" => Ok(Self::Image),
            "rbac" => Ok(Self::Rbac),
            "resources" => Ok(Self::Resources),
            "mutate" => Ok(Self::Mutate),
            s => Err(RoutingError(s.to_string())),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_paths() {
        for category in Category::ALL {
            assert_eq!(Category::from_path(&category.path()), Ok(category));
        }
        assert_eq!(
            Category::from_path("/validate/capabilities"),
            Ok(Category::Context)
        );
        assert_eq!(Category::from_path("/validate/image/"), Ok(Category::Image));
    }

    #[test]
    fn rejects_unknown_paths() {
        for path in [
            "/",
            "/validate",
            "/validate/",
            "/validate/everything",
            "/validate/mutate",
            "/mutate/deployment",
            "/health",
        ] {
            assert_eq!(
                Category::from_path(path),
                Err(RoutingError(path.to_string())),
                "{path}"
            );
        }
    }

    #[test]
    fn every_check_has_one_category() {
        let mut seen = std::collections::HashSet::new();
        for category in Category::ALL {
            for check in category.checks() {
                assert!(seen.insert(*check), "{check} is listed twice");
            }
        }
        assert!(!seen.contains(&CheckId::Admission));
        assert_eq!(seen.len(), 23);
    }

    #[test]
    fn kinds() {
        assert!(Category::Context.accepts(ExpectedKind::Pod));
        assert!(!Category::Context.accepts(ExpectedKind::Role));
        assert!(Category::Rbac.accepts(ExpectedKind::ClusterRoleBinding));
        assert!(!Category::Rbac.accepts(ExpectedKind::Pod));
        assert!(Category::Api.accepts(ExpectedKind::RoleBinding));
        assert!(Category::Mutate.accepts(ExpectedKind::Pod));
    }
}
