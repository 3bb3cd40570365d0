use crate::{CheckId, Violation};

/// The terminal result of evaluating a single admission request.
///
/// A decision is allowed iff none of its violations has deny severity, and
/// only an allowed decision may carry a patch.
#[derive(Clone, Debug, PartialEq)]
pub struct Decision {
    allowed: bool,
    violations: Vec<Violation>,
    patch: Option<json_patch::Patch>,
}

// === impl Decision ===

impl Decision {
    pub fn allow() -> Self {
        Self::from_violations(Vec::new())
    }

    pub fn from_violations(violations: Vec<Violation>) -> Self {
        let allowed = !violations.iter().any(Violation::is_deny);
        Self {
            allowed,
            violations,
            patch: None,
        }
    }

    /// Denies a request that could not be evaluated.
    pub fn error(message: impl Into<String>) -> Self {
        Self::from_violations(vec![Violation::deny(CheckId::Admission, message)])
    }

    /// Attaches a mutation patch. Denied decisions and empty patches are left
    /// without a patch.
    pub fn with_patch(mut self, patch: json_patch::Patch) -> Self {
        if self.allowed && !patch.0.is_empty() {
            self.patch = Some(patch);
        }
        self
    }

    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn patch(&self) -> Option<&json_patch::Patch> {
        self.patch.as_ref()
    }

    pub fn denials(&self) -> impl Iterator<Item = &Violation> + '_ {
        self.violations.iter().filter(|v| v.is_deny())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Violation> + '_ {
        self.violations.iter().filter(|v| !v.is_deny())
    }

    /// Describes every denying violation, naming each violated control.
    pub fn status_message(&self) -> Option<String> {
        if self.allowed {
            return None;
        }
        let reasons = self.denials().map(ToString::to_string).collect::<Vec<_>>();
        Some(reasons.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patch() -> json_patch::Patch {
        serde_json::from_value(serde_json::json!([
            { "op": "add", "path": "/metadata/labels", "value": {} }
        ]))
        .expect("patch must parse")
    }

    #[test]
    fn allowed_iff_no_deny() {
        assert!(Decision::allow().is_allowed());

        let warn = Decision::from_violations(vec![Violation::warn(CheckId::ImageTag, "old")]);
        assert!(warn.is_allowed());
        assert_eq!(warn.warnings().count(), 1);
        assert_eq!(warn.status_message(), None);

        let deny = Decision::from_violations(vec![
            Violation::warn(CheckId::ImageTag, "old"),
            Violation::deny(CheckId::Privileged, "privileged container app"),
            Violation::deny(CheckId::HostNetwork, "host network is not allowed"),
        ]);
        assert!(!deny.is_allowed());
        assert_eq!(
            deny.status_message().as_deref(),
            Some("privileged: privileged container app; host-network: host network is not allowed")
        );
    }

    #[test]
    fn patch_only_when_allowed() {
        let allowed = Decision::allow().with_patch(patch());
        assert!(allowed.patch().is_some());

        let denied = Decision::error("decode failed").with_patch(patch());
        assert!(denied.patch().is_none());

        let empty = Decision::allow().with_patch(json_patch::Patch(vec![]));
        assert!(empty.patch().is_none());
    }
}
