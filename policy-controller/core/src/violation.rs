use std::{collections::BTreeMap, fmt};

/// Identifies an individual admission check.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CheckId {
    SecurityContext,
    Privileged,
    Capabilities,
    RequiredDrops,
    RunAsUser,
    ReadOnlyRootFilesystem,
    PodSecurityContext,
    ImageRegistry,
    ImageTag,
    ImageSignature,
    Egress,
    Ingress,
    HostNetwork,
    PolicyConsistency,
    ResourceLimits,
    ResourceRequests,
    RoleRef,
    RolePermissions,
    RoleScope,
    HostPath,
    StorageClass,
    ServiceAccount,
    ApiAccess,

    /// Not a policy check: the request could not be evaluated at all.
    Admission,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Severity {
    Deny,
    Warn,
}

/// The outcome of a failed check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    pub check: CheckId,
    pub severity: Severity,
    pub message: String,
    pub context: BTreeMap<String, String>,
}

// === impl CheckId ===

impl CheckId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SecurityContext => "security-context",
            Self::Privileged => "privileged",
            Self::Capabilities => "capabilities",
            Self::RequiredDrops => "required-drops",
            Self::RunAsUser => "run-as-user",
            Self::ReadOnlyRootFilesystem => "read-only-root-filesystem",
            Self::PodSecurityContext => "pod-security-context",
            Self::ImageRegistry => "image-registry",
            Self::ImageTag => "image-tag",
            Self::ImageSignature => "image-signature",
            Self::Egress => "egress",
            Self::Ingress => "ingress",
            Self::HostNetwork => "host-network",
            Self::PolicyConsistency => "policy-consistency",
            Self::ResourceLimits => "resource-limits",
            Self::ResourceRequests => "resource-requests",
            Self::RoleRef => "role-ref",
            Self::RolePermissions => "role-permissions",
            Self::RoleScope => "role-scope",
            Self::HostPath => "host-path",
            Self::StorageClass => "storage-class",
            Self::ServiceAccount => "service-account",
            Self::ApiAccess => "api-access",
            Self::Admission => "admission",
        }
    }
}

impl fmt::Display for CheckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

// === impl Severity ===

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deny => "deny".fmt(f),
            Self::Warn => "warn".fmt(f),
        }
    }
}

// === impl Violation ===

impl Violation {
    pub fn deny(check: CheckId, message: impl Into<String>) -> Self {
        Self {
            check,
            severity: Severity::Deny,
            message: message.into(),
            context: BTreeMap::new(),
        }
    }

    pub fn warn(check: CheckId, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warn,
            ..Self::deny(check, message)
        }
    }

    /// Attaches a structured context value, e.g. the offending container name.
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }

    pub fn is_deny(&self) -> bool {
        self.severity == Severity::Deny
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.check, self.message)
    }
}
