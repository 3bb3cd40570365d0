#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Decodes raw admission payloads into the typed objects that checks inspect.

mod kind;
pub mod rbac;
pub mod workload;

pub use self::{
    kind::{ExpectedKind, UnknownKind},
    rbac::{BindingLike, RoleLike},
    workload::Workload,
};
pub use k8s_openapi::api::{
    core::v1::Pod,
    rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding},
};
pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// A decoded admission target, owned by a single request's evaluation.
#[derive(Clone, Debug, PartialEq)]
pub enum TargetObject {
    Workload(Workload),
    Role(RoleLike),
    Binding(BindingLike),
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("expected a {expected} object but the payload is a {found}")]
    KindMismatch { expected: ExpectedKind, found: String },

    #[error("malformed {kind} object: {source}")]
    Malformed {
        kind: ExpectedKind,
        #[source]
        source: serde_json::Error,
    },

    #[error("{kind} object is missing required field `{field}`")]
    MissingField {
        kind: ExpectedKind,
        field: &'static str,
    },
}

/// Decodes `raw` as an object of the `expected` kind.
///
/// A payload must name its `kind`, and one that names a different kind or
/// omits a required field is rejected rather than coerced.
pub fn decode(raw: &serde_json::Value, expected: ExpectedKind) -> Result<TargetObject, DecodeError> {
    let found = raw.get("kind").ok_or(DecodeError::MissingField {
        kind: expected,
        field: "kind",
    })?;
    if found.as_str() != Some(expected.as_str()) {
        return Err(DecodeError::KindMismatch {
            expected,
            found: found.as_str().map_or_else(|| found.to_string(), ToString::to_string),
        });
    }
    require_fields(raw, expected)?;

    let malformed = |source| DecodeError::Malformed {
        kind: expected,
        source,
    };
    let target = match expected {
        ExpectedKind::Pod => {
            let pod = serde_json::from_value::<Pod>(raw.clone()).map_err(malformed)?;
            TargetObject::Workload(Workload::from_pod(pod)?)
        }
        ExpectedKind::Role => {
            let role = serde_json::from_value::<Role>(raw.clone()).map_err(malformed)?;
            TargetObject::Role(role.into())
        }
        ExpectedKind::ClusterRole => {
            let role = serde_json::from_value::<ClusterRole>(raw.clone()).map_err(malformed)?;
            TargetObject::Role(role.into())
        }
        ExpectedKind::RoleBinding => {
            let binding = serde_json::from_value::<RoleBinding>(raw.clone()).map_err(malformed)?;
            TargetObject::Binding(binding.into())
        }
        ExpectedKind::ClusterRoleBinding => {
            let binding =
                serde_json::from_value::<ClusterRoleBinding>(raw.clone()).map_err(malformed)?;
            TargetObject::Binding(binding.into())
        }
    };
    Ok(target)
}

// === impl TargetObject ===

impl TargetObject {
    pub fn kind(&self) -> ExpectedKind {
        match self {
            Self::Workload(_) => ExpectedKind::Pod,
            Self::Role(role) if role.cluster_scoped => ExpectedKind::ClusterRole,
            Self::Role(_) => ExpectedKind::Role,
            Self::Binding(binding) if binding.cluster_scoped => ExpectedKind::ClusterRoleBinding,
            Self::Binding(_) => ExpectedKind::RoleBinding,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Workload(w) => &w.name,
            Self::Role(r) => &r.name,
            Self::Binding(b) => &b.name,
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        match self {
            Self::Workload(w) => w.namespace.as_deref(),
            Self::Role(r) => r.namespace.as_deref(),
            Self::Binding(b) => b.namespace.as_deref(),
        }
    }

    /// Admission payloads for namespaced objects may omit the namespace; it
    /// is then taken from the request.
    pub fn with_default_namespace(mut self, namespace: Option<&str>) -> Self {
        let slot = match &mut self {
            Self::Workload(w) => Some(&mut w.namespace),
            Self::Role(r) if !r.cluster_scoped => Some(&mut r.namespace),
            Self::Binding(b) if !b.cluster_scoped => Some(&mut b.namespace),
            _ => None,
        };
        if let Some(slot) = slot.filter(|s| s.is_none()) {
            *slot = namespace.map(ToString::to_string);
        }
        self
    }

    /// The REST path at which the object is served.
    pub fn api_path(&self) -> String {
        let kind = self.kind();
        let prefix = match kind {
            ExpectedKind::Pod => "/api/v1".to_string(),
            _ => format!("/apis/{}/v1", kind.group()),
        };
        match self.namespace().filter(|_| kind.is_namespaced()) {
            Some(ns) => format!("{prefix}/namespaces/{ns}/{}/{}", kind.plural(), self.name()),
            None => format!("{prefix}/{}/{}", kind.plural(), self.name()),
        }
    }
}

/// k8s-openapi fills absent required fields with empty values, so they are
/// checked on the raw payload before it is deserialized.
fn require_fields(raw: &serde_json::Value, kind: ExpectedKind) -> Result<(), DecodeError> {
    let missing = |field| DecodeError::MissingField { kind, field };
    match kind {
        ExpectedKind::Pod => {
            let spec = raw.get("spec").ok_or(missing("spec"))?;
            for (list, field) in [
                ("containers", "containers[].name"),
                ("initContainers", "initContainers[].name"),
                ("ephemeralContainers", "ephemeralContainers[].name"),
            ] {
                let containers = spec.get(list).and_then(serde_json::Value::as_array);
                if containers
                    .into_iter()
                    .flatten()
                    .any(|c| !non_empty(c, "name"))
                {
                    return Err(missing(field));
                }
            }
        }
        ExpectedKind::Role | ExpectedKind::ClusterRole => {
            let rules = raw.get("rules").and_then(serde_json::Value::as_array);
            if rules
                .into_iter()
                .flatten()
                .any(|r| r.get("verbs").map_or(true, serde_json::Value::is_null))
            {
                return Err(missing("rules[].verbs"));
            }
        }
        ExpectedKind::RoleBinding | ExpectedKind::ClusterRoleBinding => {
            let role_ref = raw.get("roleRef").ok_or(missing("roleRef"))?;
            if !non_empty(role_ref, "kind") {
                return Err(missing("roleRef.kind"));
            }
            if !non_empty(role_ref, "name") {
                return Err(missing("roleRef.name"));
            }
        }
    }
    Ok(())
}

fn non_empty(v: &serde_json::Value, key: &str) -> bool {
    v.get(key)
        .and_then(serde_json::Value::as_str)
        .is_some_and(|s| !s.is_empty())
}

fn object_name(meta: &ObjectMeta) -> String {
    meta.name
        .clone()
        .or_else(|| meta.generate_name.clone())
        .unwrap_or_default()
}
