//! API access checks.

use crate::workload;
use kube_police_core::{CheckId, PolicySnapshot, Violation};
use kube_police_k8s_api::TargetObject;

const DEFAULT_SERVICE_ACCOUNT: &str = "default";

/// Denies pods that run as a restricted service account. Pods that name no
/// service account run as `default`.
pub fn service_account(target: &TargetObject, policy: &PolicySnapshot) -> Option<Violation> {
    let w = workload(target)?;
    let account = w
        .service_account
        .as_deref()
        .filter(|sa| !sa.is_empty())
        .unwrap_or(DEFAULT_SERVICE_ACCOUNT);
    if !policy
        .api
        .restricted_service_accounts
        .iter()
        .any(|sa| sa == account)
    {
        return None;
    }
    Some(
        Violation::deny(
            CheckId::ServiceAccount,
            format!("restricted service account {account}"),
        )
        .with("serviceAccount", account),
    )
}

/// Denies objects served at a restricted API path.
pub fn api_access(target: &TargetObject, policy: &PolicySnapshot) -> Option<Violation> {
    let path = target.api_path();
    let pattern = policy
        .api
        .restricted_paths
        .iter()
        .find(|p| p.matches(&path))?;
    Some(
        Violation::deny(
            CheckId::ApiAccess,
            format!("restricted API path {path} (matches {pattern})"),
        )
        .with("path", path),
    )
}
