use crate::checks::{Category, Decision};
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};

#[derive(Clone, Debug)]
pub struct AdmissionMetrics {
    requests: Family<RequestLabels, Counter>,
    violations: Family<ViolationLabels, Counter>,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct RequestLabels {
    category: &'static str,
    result: &'static str,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct ViolationLabels {
    category: &'static str,
    check: &'static str,
}

// === impl AdmissionMetrics ===

impl AdmissionMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let requests = Family::<RequestLabels, Counter>::default();
        reg.register(
            "requests",
            "Total number of admission requests decided, by category and result",
            requests.clone(),
        );

        let violations = Family::<ViolationLabels, Counter>::default();
        reg.register(
            "violations",
            "Total number of check violations, by category and check",
            violations.clone(),
        );

        Self {
            requests,
            violations,
        }
    }

    pub(crate) fn record(&self, category: Category, decision: &Decision) {
        let result = match (decision.is_allowed(), decision.patch().is_some()) {
            (false, _) => "denied",
            (true, true) => "patched",
            (true, false) => "allowed",
        };
        self.requests
            .get_or_create(&RequestLabels {
                category: category.as_str(),
                result,
            })
            .inc();

        for violation in decision.violations() {
            self.violations
                .get_or_create(&ViolationLabels {
                    category: category.as_str(),
                    check: violation.check.as_str(),
                })
                .inc();
        }
    }
}
