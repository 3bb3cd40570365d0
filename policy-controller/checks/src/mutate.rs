//! The security baseline applied by the mutating endpoint.
//!
//! The baseline is applied to the raw object so that fields the decoder
//! does not model survive unchanged, and the patch is the JSON diff between
//! the original and hardened objects. Applying the baseline to its own
//! output yields an empty patch.

use crate::context::normalize_capability;
use serde_json::{json, Map, Value};

/// Capabilities appended to every container's drop list.
pub const BASELINE_DROPS: [&str; 2] = ["SYS_ADMIN", "NET_ADMIN"];

const CONTAINER_LISTS: [&str; 2] = ["containers", "initContainers"];

#[derive(Clone, Debug, PartialEq)]
pub struct Baseline {
    pub object: Value,
    pub patch: json_patch::Patch,
}

#[derive(Debug, thiserror::Error)]
pub enum MutateError {
    #[error("pod has no containers")]
    NoContainers,

    #[error("{0} is not an object")]
    NotAnObject(String),

    #[error("{0} is not a list")]
    NotAList(String),
}

/// Forces, on every container and init container, `runAsNonRoot: true`,
/// `readOnlyRootFilesystem: true`, `allowPrivilegeEscalation: false`, and
/// the [`BASELINE_DROPS`]. A missing security context is created. Existing
/// drops are kept.
pub fn apply_baseline(pod: &Value) -> Result<Baseline, MutateError> {
    let mut object = pod.clone();
    let spec = object
        .get_mut("spec")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| MutateError::NotAnObject("spec".to_string()))?;

    let mut hardened = 0;
    for list in CONTAINER_LISTS {
        let Some(containers) = spec.get_mut(list) else {
            continue;
        };
        if containers.is_null() {
            continue;
        }
        let containers = containers
            .as_array_mut()
            .ok_or_else(|| MutateError::NotAList(format!("spec.{list}")))?;
        for (i, container) in containers.iter_mut().enumerate() {
            let at = format!("spec.{list}[{i}]");
            let container = container
                .as_object_mut()
                .ok_or_else(|| MutateError::NotAnObject(at.clone()))?;
            harden(container, &at)?;
            hardened += 1;
        }
    }
    if hardened == 0 {
        return Err(MutateError::NoContainers);
    }

    let patch = json_patch::diff(pod, &object);
    Ok(Baseline { object, patch })
}

fn harden(container: &mut Map<String, Value>, at: &str) -> Result<(), MutateError> {
    let sc = object_entry(container, "securityContext", at)?;
    sc.insert("runAsNonRoot".to_string(), Value::Bool(true));
    sc.insert("readOnlyRootFilesystem".to_string(), Value::Bool(true));
    sc.insert("allowPrivilegeEscalation".to_string(), Value::Bool(false));

    let at = format!("{at}.securityContext");
    let caps = object_entry(sc, "capabilities", &at)?;
    let drops = caps.entry("drop").or_insert_with(|| json!([]));
    if drops.is_null() {
        *drops = json!([]);
    }
    let drops = drops
        .as_array_mut()
        .ok_or_else(|| MutateError::NotAList(format!("{at}.capabilities.drop")))?;

    let present = drops
        .iter()
        .filter_map(Value::as_str)
        .map(normalize_capability)
        .collect::<Vec<_>>();
    if present.iter().any(|p| p == "ALL") {
        return Ok(());
    }
    for cap in BASELINE_DROPS {
        if !present.iter().any(|p| p == cap) {
            drops.push(json!(cap));
        }
    }
    Ok(())
}

fn object_entry<'m>(
    map: &'m mut Map<String, Value>,
    key: &str,
    at: &str,
) -> Result<&'m mut Map<String, Value>, MutateError> {
    let value = map.entry(key).or_insert_with(|| json!({}));
    if value.is_null() {
        *value = json!({});
    }
    value
        .as_object_mut()
        .ok_or_else(|| MutateError::NotAnObject(format!("{at}.{key}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pod(containers: Value) -> Value {
        json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": { "name": "web", "annotations": { "team": "shop" } },
            "spec": { "containers": containers }
        })
    }

    #[test]
    fn creates_missing_security_context() {
        let original = pod(json!([{ "name": "app", "image": "nginx" }]));
        let baseline = apply_baseline(&original).expect("baseline must apply");

        assert_eq!(
            baseline.object["spec"]["containers"][0]["securityContext"],
            json!({
                "runAsNonRoot": true,
                "readOnlyRootFilesystem": true,
                "allowPrivilegeEscalation": false,
                "capabilities": { "drop": ["SYS_ADMIN", "NET_ADMIN"] }
            })
        );
        assert_eq!(
            serde_json::to_value(&baseline.patch).expect("patch must serialize"),
            json!([{
                "op": "add",
                "path": "/spec/containers/0/securityContext",
                "value": {
                    "allowPrivilegeEscalation": false,
                    "capabilities": { "drop": ["SYS_ADMIN", "NET_ADMIN"] },
                    "readOnlyRootFilesystem": true,
                    "runAsNonRoot": true
                }
            }])
        );

        let mut patched = original.clone();
        json_patch::patch(&mut patched, &baseline.patch.0).expect("patch must apply");
        assert_eq!(patched, baseline.object);
    }

    #[test]
    fn keeps_existing_settings() {
        let original = pod(json!([{
            "name": "app",
            "image": "nginx",
            "securityContext": {
                "runAsUser": 1000,
                "runAsNonRoot": false,
                "capabilities": { "add": ["NET_BIND_SERVICE"], "drop": ["NET_RAW", "CAP_SYS_ADMIN"] }
            }
        }]));
        let baseline = apply_baseline(&original).expect("baseline must apply");
        let sc = &baseline.object["spec"]["containers"][0]["securityContext"];

        assert_eq!(sc["runAsUser"], json!(1000));
        assert_eq!(sc["runAsNonRoot"], json!(true));
        assert_eq!(sc["capabilities"]["add"], json!(["NET_BIND_SERVICE"]));
        assert_eq!(
            sc["capabilities"]["drop"],
            json!(["NET_RAW", "CAP_SYS_ADMIN", "NET_ADMIN"])
        );
        assert_eq!(baseline.object["metadata"], original["metadata"]);
    }

    #[test]
    fn drop_all_is_left_alone() {
        let original = pod(json!([{
            "name": "app",
            "image": "nginx",
            "securityContext": { "capabilities": { "drop": ["ALL"] } }
        }]));
        let baseline = apply_baseline(&original).expect("baseline must apply");
        assert_eq!(
            baseline.object["spec"]["containers"][0]["securityContext"]["capabilities"]["drop"],
            json!(["ALL"])
        );
    }

    #[test]
    fn idempotent() {
        let original = pod(json!([
            { "name": "app", "image": "nginx", "securityContext": null },
            { "name": "sidecar", "image": "envoy", "securityContext": { "privileged": false } }
        ]));
        let first = apply_baseline(&original).expect("baseline must apply");
        assert!(!first.patch.0.is_empty());

        let second = apply_baseline(&first.object).expect("baseline must apply");
        assert!(second.patch.0.is_empty(), "{:?}", second.patch);
        assert_eq!(second.object, first.object);
    }

    #[test]
    fn hardens_init_containers() {
        let mut original = pod(json!([{ "name": "app", "image": "nginx" }]));
        original["spec"]["initContainers"] = json!([{ "name": "setup", "image": "busybox" }]);
        let baseline = apply_baseline(&original).expect("baseline must apply");
        assert_eq!(
            baseline.object["spec"]["initContainers"][0]["securityContext"]["readOnlyRootFilesystem"],
            json!(true)
        );
    }

    #[test]
    fn rejects_malformed_pods() {
        assert!(matches!(
            apply_baseline(&json!({ "metadata": {} })),
            Err(MutateError::NotAnObject(_))
        ));
        assert!(matches!(
            apply_baseline(&json!({ "spec": {} })),
            Err(MutateError::NoContainers)
        ));
        assert!(matches!(
            apply_baseline(&json!({ "spec": { "containers": {} } })),
            Err(MutateError::NotAList(_))
        ));
        assert!(matches!(
            apply_baseline(&json!({ "spec": { "containers": ["app"] } })),
            Err(MutateError::NotAnObject(_))
        ));
    }
}
