use crate::PolicySnapshot;
use std::sync::Arc;

/// Supplies the policy snapshot that a request is evaluated against.
///
/// Callers take one snapshot at the start of an evaluation and use it
/// throughout, so a concurrent reload never yields a mixed decision.
pub trait PolicyProvider: Send + Sync {
    fn current(&self) -> Result<Arc<PolicySnapshot>, PolicyUnavailable>;
}

/// Indicates that no usable policy is loaded, e.g. because the most recent
/// reload failed.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("policy unavailable: {0}")]
pub struct PolicyUnavailable(pub String);

/// A provider that always returns the same snapshot.
#[derive(Clone, Debug, Default)]
pub struct StaticPolicy(Arc<PolicySnapshot>);

// === impl StaticPolicy ===

impl StaticPolicy {
    pub fn new(policy: PolicySnapshot) -> Self {
        Self(Arc::new(policy))
    }
}

impl PolicyProvider for StaticPolicy {
    fn current(&self) -> Result<Arc<PolicySnapshot>, PolicyUnavailable> {
        Ok(self.0.clone())
    }
}
