#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use kube_police_checks as checks;
pub use kube_police_core as core;
pub use kube_police_k8s_api as k8s;

mod admission;
mod args;
mod metrics;
pub mod policy;

pub use self::{admission::Admission, args::Args, metrics::AdmissionMetrics};
