use crate::{object_name, DecodeError, ExpectedKind, Pod};
use k8s_openapi::api::core::v1 as k8s;
use std::collections::BTreeMap;

/// The security-relevant view of a pod.
///
/// Optional booleans keep the distinction between a field that is explicitly
/// false and one that is unset, since policy treats the two differently.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Workload {
    pub name: String,
    pub namespace: Option<String>,
    pub annotations: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    pub host_network: Option<bool>,
    pub service_account: Option<String>,
    pub pod_security: PodSecurity,
    pub containers: Vec<Container>,
    pub volumes: Vec<Volume>,
}

/// Pod-level defaults that apply to containers that leave a field unset.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PodSecurity {
    pub run_as_user: Option<i64>,
    pub run_as_non_root: Option<bool>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Container {
    pub name: String,
    pub kind: ContainerKind,
    pub image: String,
    pub security_context: Option<SecurityContext>,
    pub resources: Resources,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    Regular,
    Init,
    Ephemeral,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SecurityContext {
    pub privileged: Option<bool>,
    pub run_as_user: Option<i64>,
    pub run_as_non_root: Option<bool>,
    pub read_only_root_filesystem: Option<bool>,
    pub allow_privilege_escalation: Option<bool>,
    pub capabilities: Option<Capabilities>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub add: Vec<String>,
    pub drop: Vec<String>,
}

/// Resource quantities, by resource name, held as written. `None` means the
/// container declares no map at all.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Resources {
    pub limits: Option<BTreeMap<String, String>>,
    pub requests: Option<BTreeMap<String, String>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Volume {
    pub name: String,
    pub source: VolumeSource,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VolumeSource {
    HostPath(String),

    /// A generic ephemeral volume and the storage class of its claim template.
    Ephemeral { storage_class: Option<String> },

    PersistentVolumeClaim { claim_name: String },

    Other,
}

// === impl Workload ===

impl Workload {
    pub fn from_pod(pod: Pod) -> Result<Self, DecodeError> {
        let Pod { metadata, spec, .. } = pod;
        let spec = spec.ok_or(DecodeError::MissingField {
            kind: ExpectedKind::Pod,
            field: "spec",
        })?;

        let mut containers = Vec::with_capacity(spec.containers.len());
        for c in spec.containers {
            containers.push(Container::new(
                ContainerKind::Regular,
                c.name,
                c.image,
                c.security_context,
                c.resources,
            )?);
        }
        for c in spec.init_containers.into_iter().flatten() {
            containers.push(Container::new(
                ContainerKind::Init,
                c.name,
                c.image,
                c.security_context,
                c.resources,
            )?);
        }
        for c in spec.ephemeral_containers.into_iter().flatten() {
            containers.push(Container::new(
                ContainerKind::Ephemeral,
                c.name,
                c.image,
                c.security_context,
                c.resources,
            )?);
        }

        let volumes = spec
            .volumes
            .into_iter()
            .flatten()
            .map(Volume::from)
            .collect();

        let pod_security = spec
            .security_context
            .map(|sc| PodSecurity {
                run_as_user: sc.run_as_user,
                run_as_non_root: sc.run_as_non_root,
            })
            .unwrap_or_default();

        Ok(Self {
            name: object_name(&metadata),
            namespace: metadata.namespace,
            annotations: metadata.annotations.unwrap_or_default(),
            labels: metadata.labels.unwrap_or_default(),
            host_network: spec.host_network,
            service_account: spec.service_account_name,
            pod_security,
            containers,
            volumes,
        })
    }

    /// Containers that run as part of the pod's steady state or startup,
    /// i.e. excluding ephemeral debug containers.
    pub fn pod_containers(&self) -> impl Iterator<Item = &Container> + '_ {
        self.containers
            .iter()
            .filter(|c| c.kind != ContainerKind::Ephemeral)
    }
}

// === impl Container ===

impl Container {
    fn new(
        kind: ContainerKind,
        name: String,
        image: Option<String>,
        security_context: Option<k8s::SecurityContext>,
        resources: Option<k8s::ResourceRequirements>,
    ) -> Result<Self, DecodeError> {
        let image = image.filter(|i| !i.is_empty()).ok_or(DecodeError::MissingField {
            kind: ExpectedKind::Pod,
            field: "image",
        })?;

        let resources = resources
            .map(|r| Resources {
                limits: r.limits.map(quantities),
                requests: r.requests.map(quantities),
            })
            .unwrap_or_default();

        Ok(Self {
            name,
            kind,
            image,
            security_context: security_context.map(SecurityContext::from),
            resources,
        })
    }

    /// `runAsUser`, falling back to the pod-level value.
    pub fn run_as_user(&self, pod: &PodSecurity) -> Option<i64> {
        self.security_context
            .as_ref()
            .and_then(|sc| sc.run_as_user)
            .or(pod.run_as_user)
    }

    /// `runAsNonRoot`, falling back to the pod-level value.
    pub fn run_as_non_root(&self, pod: &PodSecurity) -> Option<bool> {
        self.security_context
            .as_ref()
            .and_then(|sc| sc.run_as_non_root)
            .or(pod.run_as_non_root)
    }

    pub fn capabilities(&self) -> Option<&Capabilities> {
        self.security_context.as_ref()?.capabilities.as_ref()
    }
}

fn quantities(
    map: BTreeMap<String, k8s_openapi::apimachinery::pkg::api::resource::Quantity>,
) -> BTreeMap<String, String> {
    map.into_iter().map(|(k, q)| (k, q.0)).collect()
}

impl From<k8s::SecurityContext> for SecurityContext {
    fn from(sc: k8s::SecurityContext) -> Self {
        Self {
            privileged: sc.privileged,
            run_as_user: sc.run_as_user,
            run_as_non_root: sc.run_as_non_root,
            read_only_root_filesystem: sc.read_only_root_filesystem,
            allow_privilege_escalation: sc.allow_privilege_escalation,
            capabilities: sc.capabilities.map(|caps| Capabilities {
                add: caps.add.unwrap_or_default(),
                drop: caps.drop.unwrap_or_default(),
            }),
        }
    }
}

// === impl Volume ===

impl From<k8s::Volume> for Volume {
    fn from(v: k8s::Volume) -> Self {
        let source = if let Some(host) = v.host_path {
            VolumeSource::HostPath(host.path)
        } else if let Some(ephemeral) = v.ephemeral {
            VolumeSource::Ephemeral {
                storage_class: ephemeral
                    .volume_claim_template
                    .and_then(|t| t.spec.storage_class_name),
            }
        } else if let Some(pvc) = v.persistent_volume_claim {
            VolumeSource::PersistentVolumeClaim {
                claim_name: pvc.claim_name,
            }
        } else {
            VolumeSource::Other
        };
        Self {
            name: v.name,
            source,
        }
    }
}

impl std::fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Regular => "container".fmt(f),
            Self::Init => "init container".fmt(f),
            Self::Ephemeral => "ephemeral container".fmt(f),
        }
    }
}
