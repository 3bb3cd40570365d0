//! Volume source checks.

use crate::{workload, Findings};
use kube_police_core::{CheckId, PolicySnapshot, Violation};
use kube_police_k8s_api::{workload::VolumeSource, TargetObject};
use std::path::{Component, Path};

/// Denies host paths equal to or nested below a disallowed path.
pub fn host_path(target: &TargetObject, policy: &PolicySnapshot) -> Option<Violation> {
    let w = workload(target)?;
    let disallowed = &policy.volumes.disallowed_host_paths;
    let mut findings = Findings::new(CheckId::HostPath, "disallowed host path", "volumes");
    for v in &w.volumes {
        let VolumeSource::HostPath(path) = &v.source else {
            continue;
        };
        if let Some(entry) = disallowed.iter().find(|d| is_below(path, d)) {
            findings.push(&v.name, format!("{path} is under {entry}"));
        }
    }
    findings.into_violation()
}

/// Denies generic ephemeral volumes that provision from a restricted
/// storage class.
pub fn storage_class(target: &TargetObject, policy: &PolicySnapshot) -> Option<Violation> {
    let w = workload(target)?;
    let restricted = &policy.volumes.restricted_storage_classes;
    let mut findings = Findings::new(
        CheckId::StorageClass,
        "restricted storage class",
        "volumes",
    );
    for v in &w.volumes {
        if let VolumeSource::Ephemeral {
            storage_class: Some(class),
        } = &v.source
        {
            if restricted.contains(class) {
                findings.push(&v.name, class);
            }
        }
    }
    findings.into_violation()
}

/// Compares normalized path components, so `/etc/` covers `/etc//ssl` but
/// not `/etcd`. `..` components are not resolved; a path containing one is
/// treated as nested below every entry.
fn is_below(path: &str, entry: &str) -> bool {
    if entry.trim().is_empty() {
        return false;
    }
    let path = Path::new(path);
    if path.components().any(|c| c == Component::ParentDir) {
        return true;
    }
    path.starts_with(Path::new(entry))
}
