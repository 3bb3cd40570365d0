//! Image provenance checks. These apply to every container, including init
//! and ephemeral containers.

use crate::{workload, Findings, Verifier};
use futures::future;
use kube_police_core::{
    image::{self, ImageTag},
    CheckId, PolicySnapshot, Violation,
};
use kube_police_k8s_api::TargetObject;
use tracing::{debug, warn};

pub fn registry(target: &TargetObject, policy: &PolicySnapshot) -> Option<Violation> {
    let w = workload(target)?;
    let allowed = &policy.image.allowed_registries;
    let mut findings = Findings::new(CheckId::ImageRegistry, "disallowed registry", "containers");
    for c in &w.containers {
        if !allowed.iter().any(|a| image::is_from(&c.image, a)) {
            findings.push(
                &c.name,
                format!("{} from {}", c.image, image::registry(&c.image)),
            );
        }
    }
    findings.into_violation()
}

/// Denies disallowed tags. Digest references carry no tag and always pass.
pub fn tag(target: &TargetObject, policy: &PolicySnapshot) -> Option<Violation> {
    let w = workload(target)?;
    let disallowed = &policy.image.disallowed_tags;
    let mut findings = Findings::new(CheckId::ImageTag, "disallowed image tag", "containers");
    for c in &w.containers {
        if let ImageTag::Tag(tag) = image::tag(&c.image) {
            if disallowed.iter().any(|d| d == tag) {
                findings.push(&c.name, format!("{} uses tag {tag}", c.image));
            }
        }
    }
    findings.into_violation()
}

/// Verifies the signature of every distinct image when the policy requires
/// signing. Any verifier failure denies.
pub async fn signature(
    target: &TargetObject,
    policy: &PolicySnapshot,
    verifier: &dyn Verifier,
) -> Option<Violation> {
    let w = workload(target)?;
    if !policy.image.require_image_signing {
        return None;
    }

    let mut images = w.containers.iter().map(|c| c.image.as_str()).collect::<Vec<_>>();
    images.sort_unstable();
    images.dedup();

    let results = future::join_all(images.iter().map(|image| verifier.verify(image))).await;

    let mut findings = Findings::new(
        CheckId::ImageSignature,
        "image signature verification failed",
        "images",
    );
    for (image, result) in images.into_iter().zip(results) {
        match result {
            Ok(()) => debug!(%image, "Verified image signature"),
            Err(error) => {
                warn!(%image, %error, "Image signature verification failed");
                findings.push(image, error);
            }
        }
    }
    findings.into_violation()
}
