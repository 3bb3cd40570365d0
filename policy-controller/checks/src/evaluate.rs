use crate::{api, context, image, mutate, network, rbac, resources, volumes, Category, Verifier};
use kube_police_core::{CheckId, Decision, PolicySnapshot, Violation};
use kube_police_k8s_api::{self as k8s, ExpectedKind, TargetObject};
use std::sync::Arc;
use tracing::{debug, info};

/// Evaluates admission targets against a policy snapshot.
///
/// An evaluator holds only its collaborators; it retains nothing between
/// calls and may be shared across concurrent requests.
#[derive(Clone)]
pub struct Evaluator {
    verifier: Arc<dyn Verifier>,
}

// === impl Evaluator ===

impl Evaluator {
    pub fn new(verifier: Arc<dyn Verifier>) -> Self {
        Self { verifier }
    }

    /// Decodes a raw admission object and decides it under `category`.
    ///
    /// Decoding failures and kind mismatches deny; nothing here fails open.
    pub async fn admit(
        &self,
        raw: &serde_json::Value,
        kind: ExpectedKind,
        namespace: Option<&str>,
        policy: &PolicySnapshot,
        category: Category,
    ) -> Decision {
        if !category.accepts(kind) {
            return Decision::error(format!(
                "{category} admission does not handle {kind} objects"
            ));
        }

        let target = match k8s::decode(raw, kind) {
            Ok(target) => target.with_default_namespace(namespace),
            Err(error) => {
                info!(%error, %kind, "Failed to decode admission object");
                return Decision::error(error.to_string());
            }
        };

        if category == Category::Mutate {
            return match mutate::apply_baseline(raw) {
                Ok(baseline) => Decision::allow().with_patch(baseline.patch),
                Err(error) => Decision::error(error.to_string()),
            };
        }

        self.evaluate(&target, policy, category).await
    }

    /// Runs every check registered for `category` and collects all
    /// violations.
    pub async fn evaluate(
        &self,
        target: &TargetObject,
        policy: &PolicySnapshot,
        category: Category,
    ) -> Decision {
        let mut violations = Vec::new();
        for check in category.checks() {
            if let Some(violation) = self.check(*check, target, policy).await {
                debug!(%category, %check, message = %violation.message, "Check failed");
                violations.push(violation);
            }
        }
        Decision::from_violations(violations)
    }

    async fn check(
        &self,
        check: CheckId,
        target: &TargetObject,
        policy: &PolicySnapshot,
    ) -> Option<Violation> {
        match check {
            CheckId::SecurityContext => context::security_context(target, policy),
            CheckId::Privileged => context::privileged(target, policy),
            CheckId::Capabilities => context::capabilities(target, policy),
            CheckId::RequiredDrops => context::required_drops(target, policy),
            CheckId::RunAsUser => context::run_as_user(target, policy),
            CheckId::ReadOnlyRootFilesystem => context::read_only_root_filesystem(target, policy),
            CheckId::PodSecurityContext => context::pod_security_context(target, policy),
            CheckId::ImageRegistry => image::registry(target, policy),
            CheckId::ImageTag => image::tag(target, policy),
            CheckId::ImageSignature => image::signature(target, policy, &*self.verifier).await,
            CheckId::Egress => network::egress(target, policy),
            CheckId::Ingress => network::ingress(target, policy),
            CheckId::HostNetwork => network::host_network(target, policy),
            CheckId::PolicyConsistency => network::policy_consistency(target, policy),
            CheckId::ResourceLimits => resources::limits(target, policy),
            CheckId::ResourceRequests => resources::requests(target, policy),
            CheckId::RoleRef => rbac::role_ref(target, policy),
            CheckId::RolePermissions => rbac::role_permissions(target, policy),
            CheckId::RoleScope => rbac::role_scope(target, policy),
            CheckId::HostPath => volumes::host_path(target, policy),
            CheckId::StorageClass => volumes::storage_class(target, policy),
            CheckId::ServiceAccount => api::service_account(target, policy),
            CheckId::ApiAccess => api::api_access(target, policy),
            CheckId::Admission => None,
        }
    }
}

impl std::fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Evaluator").finish_non_exhaustive()
    }
}
