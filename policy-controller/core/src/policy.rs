//! The declarative security policy.
//!
//! A [`PolicySnapshot`] is loaded from a YAML (or JSON) document and is
//! immutable afterwards; a reload produces a new snapshot. Every section and
//! list is optional. An absent allow-list allows nothing and an absent
//! disallow-list disallows nothing.

use crate::Quantity;
use regex::Regex;
use std::{fmt, path::PathBuf};

#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct PolicySnapshot {
    pub capabilities: CapabilityPolicy,
    pub pod_security_context: PodSecurityContextPolicy,
    pub image: ImagePolicy,
    pub resources: ResourcePolicy,
    pub network: NetworkPolicy,
    pub rbac: RbacPolicy,
    pub volumes: VolumePolicy,
    pub api: ApiPolicy,
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct CapabilityPolicy {
    pub allowed: Vec<String>,
    pub disallowed: Vec<String>,
    pub required_drops: Vec<String>,
}

/// Values that containers must not contradict. An unset field is not
/// enforced.
#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct PodSecurityContextPolicy {
    pub allow_privilege_escalation: Option<bool>,
    pub run_as_non_root: Option<bool>,
    pub read_only_root_filesystem: Option<bool>,
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct ImagePolicy {
    pub allowed_registries: Vec<String>,
    pub disallowed_tags: Vec<String>,
    pub require_image_signing: bool,
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct ResourcePolicy {
    pub enforce_limits: bool,
    pub enforce_requests: bool,
    pub cpu: Bounds,
    pub memory: Bounds,
}

/// A closed interval; either end may be open.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Bounds {
    pub min: Option<Quantity>,
    pub max: Option<Quantity>,
}

#[derive(Clone, Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct NetworkPolicy {
    pub allow_host_network: bool,

    /// CIDRs are held verbatim; malformed entries deny at evaluation time.
    pub egress_cidrs: Vec<String>,
    pub ingress_cidrs: Vec<String>,
    pub allowed_overlaps: Vec<AllowedOverlap>,

    /// Pod annotation holding the comma-separated egress IP list.
    pub egress_annotation: String,

    /// Pod annotation holding the comma-separated ingress IP list.
    pub ingress_annotation: String,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AllowedOverlap {
    pub egress: String,
    pub ingress: String,
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct RbacPolicy {
    pub restricted_cluster_roles: Vec<String>,
    pub restricted_roles: Vec<String>,
    pub restricted_verbs: Vec<String>,
    pub restricted_resources: Vec<String>,
    pub restricted_namespaces: Vec<String>,
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct VolumePolicy {
    pub disallowed_host_paths: Vec<String>,
    pub restricted_storage_classes: Vec<String>,
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct ApiPolicy {
    pub restricted_paths: Vec<ApiPathPattern>,
    pub restricted_service_accounts: Vec<String>,
}

/// An API path pattern in which `*` matches any run of characters. A
/// pattern matches any path that contains it.
#[derive(Clone, Debug, serde::Deserialize)]
#[serde(try_from = "String")]
pub struct ApiPathPattern {
    pattern: String,
    regex: Regex,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read policy from {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("policy document is empty")]
    Empty,

    #[error("failed to parse policy: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid policy: {0}")]
    Invalid(String),
}

pub const DEFAULT_EGRESS_ANNOTATION: &str = "egressIPs";
pub const DEFAULT_INGRESS_ANNOTATION: &str = "ingressIPs";

// === impl PolicySnapshot ===

impl PolicySnapshot {
    /// Reads and parses the policy document at `path`.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let policy = Self::from_yaml(&text)?;
        tracing::debug!(path = %path.display(), "Loaded policy");
        Ok(policy)
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Err(ConfigError::Empty);
        }
        let policy = serde_yaml::from_str::<Self>(text)?;
        policy.validate()?;
        Ok(policy)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.resources.cpu.validate("resources.cpu")?;
        self.resources.memory.validate("resources.memory")?;

        let network = &self.network;
        if network.egress_annotation.trim().is_empty()
            || network.ingress_annotation.trim().is_empty()
        {
            return Err(ConfigError::Invalid(
                "network annotation names must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

// === impl Bounds ===

impl Bounds {
    pub fn contains(&self, q: &Quantity) -> bool {
        self.min.as_ref().map_or(true, |min| q >= min)
            && self.max.as_ref().map_or(true, |max| q <= max)
    }

    pub fn is_unbounded(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    fn validate(&self, field: &str) -> Result<(), ConfigError> {
        if let (Some(min), Some(max)) = (&self.min, &self.max) {
            if min > max {
                return Err(ConfigError::Invalid(format!(
                    "{field}.min ({min}) exceeds {field}.max ({max})"
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.min, &self.max) {
            (Some(min), Some(max)) => write!(f, "[{min}, {max}]"),
            (Some(min), None) => write!(f, ">= {min}"),
            (None, Some(max)) => write!(f, "<= {max}"),
            (None, None) => "unbounded".fmt(f),
        }
    }
}

// === impl NetworkPolicy ===

impl Default for NetworkPolicy {
    fn default() -> Self {
        Self {
            allow_host_network: false,
            egress_cidrs: Vec::new(),
            ingress_cidrs: Vec::new(),
            allowed_overlaps: Vec::new(),
            egress_annotation: DEFAULT_EGRESS_ANNOTATION.to_string(),
            ingress_annotation: DEFAULT_INGRESS_ANNOTATION.to_string(),
        }
    }
}

// === impl AllowedOverlap ===

impl AllowedOverlap {
    /// Whitelist entries cover a pair in either orientation.
    pub fn covers(&self, egress: &str, ingress: &str) -> bool {
        (self.egress == egress && self.ingress == ingress)
            || (self.egress == ingress && self.ingress == egress)
    }
}

// === impl ApiPathPattern ===

impl ApiPathPattern {
    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }
}

impl TryFrom<String> for ApiPathPattern {
    type Error = regex::Error;

    fn try_from(pattern: String) -> Result<Self, Self::Error> {
        let expr = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex = Regex::new(&expr)?;
        Ok(Self { pattern, regex })
    }
}

impl std::str::FromStr for ApiPathPattern {
    type Err = regex::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s.to_string())
    }
}

impl fmt::Display for ApiPathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.pattern.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const FULL: &str = r#"
capabilities:
  allowed: [NET_BIND_SERVICE]
  disallowed: [SYS_ADMIN, NET_ADMIN]
  requiredDrops: [ALL]
podSecurityContext:
  allowPrivilegeEscalation: false
  runAsNonRoot: true
image:
  allowedRegistries: [myregistry.com]
  disallowedTags: [latest]
  requireImageSigning: true
resources:
  enforceLimits: true
  cpu: { min: 100m, max: 2 }
  memory: { min: 64Mi, max: 4Gi }
network:
  egressCidrs: [10.0.0.0/8]
  ingressCidrs: [10.1.0.0/16]
  allowedOverlaps:
    - { egress: 10.0.0.0/8, ingress: 10.1.0.0/16 }
rbac:
  restrictedClusterRoles: [cluster-admin]
  restrictedVerbs: ["*", escalate]
volumes:
  disallowedHostPaths: [/var/run/docker.sock, /etc]
api:
  restrictedPaths: ["/api/v1/namespaces/kube-system/*"]
  restrictedServiceAccounts: [default]
"#;

    #[test]
    fn parses_full_document() {
        let policy = PolicySnapshot::from_yaml(FULL).expect("policy must parse");
        assert_eq!(policy.capabilities.disallowed, vec!["SYS_ADMIN", "NET_ADMIN"]);
        assert_eq!(policy.pod_security_context.run_as_non_root, Some(true));
        assert_eq!(policy.pod_security_context.read_only_root_filesystem, None);
        assert!(policy.image.require_image_signing);
        assert!(policy.resources.enforce_limits);
        assert!(!policy.resources.enforce_requests);
        assert_eq!(
            policy.resources.cpu.max,
            Some("2000m".parse().expect("quantity must parse"))
        );
        assert_eq!(policy.network.egress_annotation, DEFAULT_EGRESS_ANNOTATION);
        assert_eq!(policy.network.allowed_overlaps.len(), 1);
        assert!(policy.api.restricted_paths[0].matches("/api/v1/namespaces/kube-system/pods/x"));
        assert!(!policy.api.restricted_paths[0].matches("/api/v1/namespaces/default/pods/x"));
    }

    #[test]
    fn omitted_sections_are_empty() {
        let policy = PolicySnapshot::from_yaml("image: {}\n").expect("policy must parse");
        assert!(policy.image.allowed_registries.is_empty());
        assert!(policy.image.disallowed_tags.is_empty());
        assert!(policy.capabilities.disallowed.is_empty());
        assert!(policy.volumes.disallowed_host_paths.is_empty());
        assert!(!policy.network.allow_host_network);
        assert!(policy.resources.cpu.is_unbounded());
    }

    #[test]
    fn accepts_json() {
        let policy = PolicySnapshot::from_yaml(r#"{"image": {"disallowedTags": ["latest"]}}"#)
            .expect("policy must parse");
        assert_eq!(policy.image.disallowed_tags, vec!["latest"]);
    }

    #[test]
    fn numeric_quantities() {
        let policy = PolicySnapshot::from_yaml("resources: { cpu: { min: 1, max: 2.5 } }\n")
            .expect("policy must parse");
        assert_eq!(policy.resources.cpu.min.map(|q| q.as_millis()), Some(1000));
        assert_eq!(policy.resources.cpu.max.map(|q| q.as_millis()), Some(2500));
    }

    #[test]
    fn rejects_invalid_documents() {
        assert!(matches!(
            PolicySnapshot::from_yaml("  \n"),
            Err(ConfigError::Empty)
        ));
        assert!(matches!(
            PolicySnapshot::from_yaml("image: { alowedRegistries: [x] }\n"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            PolicySnapshot::from_yaml("resources: { cpu: { min: lots } }\n"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            PolicySnapshot::from_yaml("resources: { memory: { min: 2Gi, max: 1Gi } }\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            PolicySnapshot::from_yaml("network: { egressAnnotation: '' }\n"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = PolicySnapshot::load("/nonexistent/security-policies.yaml")
            .expect_err("load must fail");
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(err.to_string().contains("/nonexistent/security-policies.yaml"));
    }

    #[test]
    fn bounds_are_closed() {
        let bounds = Bounds {
            min: "100m".parse().ok(),
            max: "2".parse().ok(),
        };
        assert!(bounds.contains(&"100m".parse().expect("quantity")));
        assert!(bounds.contains(&"2".parse().expect("quantity")));
        assert!(!bounds.contains(&"99m".parse().expect("quantity")));
        assert!(!bounds.contains(&"2001m".parse().expect("quantity")));
    }

    #[test]
    fn overlap_entries_cover_both_orientations() {
        let overlap = AllowedOverlap {
            egress: "10.0.0.0/8".to_string(),
            ingress: "10.1.0.0/16".to_string(),
        };
        assert!(overlap.covers("10.0.0.0/8", "10.1.0.0/16"));
        assert!(overlap.covers("10.1.0.0/16", "10.0.0.0/8"));
        assert!(!overlap.covers("10.0.0.0/8", "10.2.0.0/16"));
    }

    #[test]
    fn shipped_policy_loads() {
        let policy =
            PolicySnapshot::from_yaml(include_str!("../../../configs/security-policies.yaml"))
                .expect("shipped policy must parse");
        assert!(crate::cidr::check_consistency(&policy));
        assert_eq!(policy.rbac.restricted_cluster_roles, vec!["cluster-admin"]);
        assert!(policy.resources.cpu.min.is_some());
    }
}
