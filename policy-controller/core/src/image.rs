//! Container image reference parsing.
//!
//! References are interpreted the way container runtimes resolve them: a
//! reference without an explicit registry host resolves against Docker Hub,
//! and a reference without a tag or digest resolves to `latest`. All
//! functions here are total; any string yields a registry and a tag.

use std::fmt;

pub const DEFAULT_REGISTRY: &str = "docker.io";
pub const DEFAULT_TAG: &str = "latest";
const DEFAULT_NAMESPACE: &str = "library";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ImageTag<'i> {
    Tag(&'i str),

    /// The image is pinned by content digest and has no meaningful tag.
    Digest,
}

/// Returns the registry host (including any port) that serves `image`.
pub fn registry(image: &str) -> &str {
    match split_host(image) {
        (Some(host), _) => host,
        (None, _) => DEFAULT_REGISTRY,
    }
}

/// Returns the fully-qualified repository of `image`, without tag or digest.
///
/// `nginx` becomes `docker.io/library/nginx`; `team/app:1` becomes
/// `docker.io/team/app`.
pub fn repository(image: &str) -> String {
    let name = strip_reference(image);
    match split_host(name) {
        (Some(host), path) => format!("{host}/{path}"),
        (None, path) if path.contains('/') => format!("{DEFAULT_REGISTRY}/{path}"),
        (None, path) => format!("{DEFAULT_REGISTRY}/{DEFAULT_NAMESPACE}/{path}"),
    }
}

pub fn tag(image: &str) -> ImageTag<'_> {
    if image.contains('@') {
        return ImageTag::Digest;
    }

    // A colon before the last slash belongs to a registry port.
    let last = image.rsplit('/').next().unwrap_or(image);
    match last.rsplit_once(':') {
        Some((_, tag)) if !tag.is_empty() => ImageTag::Tag(tag),
        _ => ImageTag::Tag(DEFAULT_TAG),
    }
}

/// Tests whether `image` is served from a location named by `allowed`.
///
/// An entry may name a registry host (`myregistry.com`, `localhost:5000`) or
/// a repository prefix (`docker.io/library`). Matching is a prefix match on
/// the fully-qualified repository that stops only at a path or port
/// boundary, so `myregistry.com` does not match `myregistry.com.evil.io`.
pub fn is_from(image: &str, allowed: &str) -> bool {
    let allowed = allowed.trim().trim_end_matches('/');
    if allowed.is_empty() {
        return false;
    }

    // An entry without a port covers every port on that host.
    match repository(image).strip_prefix(allowed) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || rest.starts_with(':'),
        None => false,
    }
}

fn strip_reference(image: &str) -> &str {
    let image = image.split('@').next().unwrap_or(image);
    match image.rfind(':') {
        Some(colon) if !image[colon..].contains('/') => &image[..colon],
        _ => image,
    }
}

fn split_host(image: &str) -> (Option<&str>, &str) {
    match image.split_once('/') {
        Some((first, rest)) if is_host(first) => (Some(first), rest),
        _ => (None, image),
    }
}

fn is_host(segment: &str) -> bool {
    segment.contains('.') || segment.contains(':') || segment == "localhost"
}

impl fmt::Display for ImageTag<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tag(tag) => tag.fmt(f),
            Self::Digest => "digest".fmt(f),
        }
    }
}
