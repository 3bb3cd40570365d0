#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Admission checks and the evaluation of a request against a policy.
//!
//! Each check is a function of a decoded target and a policy snapshot that
//! returns at most one [`Violation`], describing every offending item. Checks
//! are grouped into [`Category`]s, and an [`Evaluator`] runs every check of a
//! category and aggregates the results into a [`Decision`].

pub mod api;
mod category;
pub mod context;
mod evaluate;
pub mod image;
pub mod mutate;
pub mod network;
pub mod rbac;
pub mod resources;
mod verify;
pub mod volumes;

pub use self::{
    category::{Category, RoutingError},
    evaluate::Evaluator,
    verify::{CosignVerifier, Verifier, VerifyError},
};
pub use kube_police_core::{CheckId, Decision, PolicySnapshot, Severity, Violation};
pub use kube_police_k8s_api::{ExpectedKind, TargetObject};

use kube_police_k8s_api::Workload;
use std::fmt;

fn workload(target: &TargetObject) -> Option<&Workload> {
    match target {
        TargetObject::Workload(w) => Some(w),
        _ => None,
    }
}

/// Accumulates the offending items found by a single check.
struct Findings {
    check: CheckId,
    summary: &'static str,
    key: &'static str,
    subjects: Vec<String>,
    details: Vec<String>,
}

// === impl Findings ===

impl Findings {
    fn new(check: CheckId, summary: &'static str, key: &'static str) -> Self {
        Self {
            check,
            summary,
            key,
            subjects: Vec::new(),
            details: Vec::new(),
        }
    }

    fn push(&mut self, subject: &str, detail: impl fmt::Display) {
        let detail = detail.to_string();
        if detail.is_empty() {
            self.details.push(subject.to_string());
        } else {
            self.details.push(format!("{subject} ({detail})"));
        }
        if !self.subjects.iter().any(|s| s == subject) {
            self.subjects.push(subject.to_string());
        }
    }

    fn into_violation(self) -> Option<Violation> {
        if self.details.is_empty() {
            return None;
        }
        let message = format!("{}: {}", self.summary, self.details.join(", "));
        Some(Violation::deny(self.check, message).with(self.key, self.subjects.join(",")))
    }
}
