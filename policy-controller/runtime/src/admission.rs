use crate::{
    checks::{Category, Decision, Evaluator},
    core::PolicyProvider,
    k8s::ExpectedKind,
    AdmissionMetrics,
};
use futures::future;
use http_body_util::BodyExt;
use hyper::{http, Request, Response};
use kube::core::{admission::Operation, DynamicObject};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, info, info_span, trace, warn, Instrument};

/// Serves admission reviews for every category endpoint.
#[derive(Clone)]
pub struct Admission {
    evaluator: Evaluator,
    policy: Arc<dyn PolicyProvider>,
    metrics: AdmissionMetrics,
    timeout: Duration,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read request body: {0}")]
    Request(#[source] BoxError),

    #[error("failed to encode json response: {0}")]
    Json(#[from] serde_json::Error),
}

type BoxError = Box<dyn std::error::Error + Send + Sync>;
type AdmissionRequest = kube::core::admission::AdmissionRequest<DynamicObject>;
type AdmissionResponse = kube::core::admission::AdmissionResponse;
type AdmissionReview = kube::core::admission::AdmissionReview<DynamicObject>;

type Body = http_body_util::Full<bytes::Bytes>;

// === impl Admission ===

impl<B> tower::Service<Request<B>> for Admission
where
    B: hyper::body::Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<BoxError>,
{
    type Response = Response<Body>;
    type Error = Error;
    type Future = future::BoxFuture<'static, Result<Response<Body>, Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::result::Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        trace!(method = %req.method(), path = %req.uri().path());
        if req.method() != http::Method::POST {
            return Box::pin(future::ok(not_found()));
        }
        let category = match Category::from_path(req.uri().path()) {
            Ok(category) => category,
            Err(error) => {
                debug!(%error);
                return Box::pin(future::ok(not_found()));
            }
        };

        let admission = self.clone();
        Box::pin(async move {
            use bytes::Buf;
            let bytes = req
                .into_body()
                .collect()
                .await
                .map_err(|e| Error::Request(e.into()))?
                .to_bytes();
            let review: AdmissionReview = match serde_json::from_reader(bytes.reader()) {
                Ok(review) => review,
                Err(error) => {
                    warn!(%error, "Failed to parse request body");
                    return json_response(AdmissionResponse::invalid(error).into_review());
                }
            };
            trace!(?review);

            let rsp = match review.try_into() {
                Ok(req) => admission.admit(category, req).await,
                Err(error) => {
                    warn!(%error, "Invalid admission request");
                    AdmissionResponse::invalid(error)
                }
            };
            debug!(?rsp);
            json_response(rsp.into_review())
        })
    }
}

impl Admission {
    pub fn new(
        evaluator: Evaluator,
        policy: Arc<dyn PolicyProvider>,
        metrics: AdmissionMetrics,
        timeout: Duration,
    ) -> Self {
        Self {
            evaluator,
            policy,
            metrics,
            timeout,
        }
    }

    async fn admit(self, category: Category, req: AdmissionRequest) -> AdmissionResponse {
        let rsp = AdmissionResponse::from(&req);
        let span = info_span!(
            "admit",
            %category,
            uid = %req.uid,
            kind = %req.kind.kind,
            ns = req.namespace.as_deref().unwrap_or_default(),
            name = %req.name,
        );
        let decision = self.decide(category, &req).instrument(span).await;
        self.metrics.record(category, &decision);

        if let Some(reason) = decision.status_message() {
            info!(%category, uid = %req.uid, name = %req.name, %reason, "Denied");
        }
        respond(rsp, &decision)
    }

    /// Produces a decision for any request, denying whenever the request
    /// cannot be evaluated.
    async fn decide(&self, category: Category, req: &AdmissionRequest) -> Decision {
        if matches!(req.operation, Operation::Delete | Operation::Connect) {
            debug!(operation = ?req.operation, "Nothing to evaluate");
            return Decision::allow();
        }

        let kind = match ExpectedKind::from_group_kind(&req.kind.group, &req.kind.kind) {
            Ok(kind) => kind,
            Err(error) => return Decision::error(error.to_string()),
        };
        let Some(obj) = req.object.as_ref() else {
            return Decision::error("admission request missing 'object'");
        };
        let raw = match serde_json::to_value(obj) {
            Ok(raw) => raw,
            Err(error) => return Decision::error(format!("failed to read object: {error}")),
        };

        // The snapshot is held for the whole evaluation.
        let policy = match self.policy.current() {
            Ok(policy) => policy,
            Err(error) => {
                warn!(%error, "No policy to evaluate against");
                return Decision::error(error.to_string());
            }
        };

        let evaluation =
            self.evaluator
                .admit(&raw, kind, req.namespace.as_deref(), &policy, category);
        match tokio::time::timeout(self.timeout, evaluation).await {
            Ok(decision) => decision,
            Err(_) => {
                warn!(timeout = ?self.timeout, "Evaluation timed out");
                Decision::error(format!("evaluation timed out after {:?}", self.timeout))
            }
        }
    }
}

fn respond(mut rsp: AdmissionResponse, decision: &Decision) -> AdmissionResponse {
    let warnings = decision
        .warnings()
        .map(ToString::to_string)
        .collect::<Vec<_>>();
    if !warnings.is_empty() {
        rsp.warnings = Some(warnings);
    }

    if let Some(reason) = decision.status_message() {
        return rsp.deny(reason);
    }

    let Some(patch) = decision.patch() else {
        return rsp;
    };
    match rsp.clone().with_patch(patch.clone()) {
        Ok(rsp) => rsp,
        Err(error) => {
            warn!(%error, "Failed to encode patch");
            rsp.deny(format!("failed to encode patch: {error}"))
        }
    }
}

fn not_found() -> Response<Body> {
    Response::builder()
        .status(http::StatusCode::NOT_FOUND)
        .body(Body::default())
        .expect("not found response must be valid")
}

fn json_response(rsp: AdmissionReview) -> Result<Response<Body>, Error> {
    let bytes = serde_json::to_vec(&rsp)?;
    Ok(Response::builder()
        .status(http::StatusCode::OK)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(bytes))
        .expect("admission review response must be valid"))
}
