//! Assertion middleware
//!
//! Guards protected routes: the body is buffered, the assertion is verified,
//! and the request is passed on with a fresh copy of the same body.

use std::sync::Arc;

use appattest_core::requestid::{self, GeneratorSlot};
use appattest_core::{AssertionAdapter, AssertionRequest, ErrorKind};
use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tracing::Instrument;

use crate::config::AssertionConfig;
use crate::error::BoundaryError;

/// HTTP boundary of the assertion phase.
pub struct AssertionMiddleware {
    adapter: Arc<dyn AssertionAdapter>,
    config: AssertionConfig,
    request_ids: Arc<GeneratorSlot>,
}

impl AssertionMiddleware {
    pub fn new(adapter: Arc<dyn AssertionAdapter>, config: AssertionConfig) -> Self {
        Self {
            adapter,
            config,
            request_ids: requestid::global(),
        }
    }

    pub fn with_request_ids(mut self, request_ids: Arc<GeneratorSlot>) -> Self {
        self.request_ids = request_ids;
        self
    }

    pub fn config(&self) -> &AssertionConfig {
        &self.config
    }

    /// Verify the assertion on `request` and forward it to `next` on success.
    pub async fn handle(&self, request: Request, next: Next) -> Response {
        let (request, id) = match self.request_ids.ensure(request) {
            Ok(assigned) => assigned,
            Err(e) => return BoundaryError::from(e).into_response(),
        };

        let span = tracing::info_span!("assertion", request_id = %id);
        async move {
            let limit = self.config.body_limit();
            let (parts, body) = request.into_parts();

            // One byte past the limit tells an oversized body apart from one
            // that fits exactly.
            let body = match to_bytes(body, limit.saturating_add(1)).await {
                Ok(body) if body.len() > limit => {
                    return BoundaryError::bad_request(format!(
                        "request body exceeds {limit} bytes"
                    ))
                    .into_response();
                }
                Ok(body) => body,
                Err(e) => {
                    return BoundaryError::bad_request(format!("failed to read request body: {e}"))
                        .into_response();
                }
            };

            let request = AssertionRequest::new(parts, body);
            let outcome = self.adapter.verify(&request).await;
            match outcome {
                Ok(()) => {
                    tracing::debug!("Assertion accepted");
                    next.run(request.into_request::<Body>()).await
                }
                Err(err) => match err.kind() {
                    ErrorKind::AttestationRequired => {
                        let location = redirect_target(&self.config.attestation_url, None);
                        tracing::info!(location, "Attestation required, redirecting");
                        Redirect::to(location).into_response()
                    }
                    ErrorKind::NewChallengeNeeded => {
                        let location =
                            redirect_target(&self.config.new_challenge_url, referer(&request.parts));
                        tracing::info!(location, "New challenge needed, redirecting");
                        Redirect::to(location).into_response()
                    }
                    ErrorKind::BadRequest | ErrorKind::Internal => {
                        BoundaryError::from(err).into_response()
                    }
                },
            }
        }
        .instrument(span)
        .await
    }
}

fn referer(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::REFERER)
        .and_then(|value| value.to_str().ok())
}

/// The configured URL, else the fallback, else `/`.
fn redirect_target<'a>(configured: &'a str, fallback: Option<&'a str>) -> &'a str {
    if !configured.is_empty() {
        return configured;
    }
    match fallback {
        Some(fallback) if !fallback.is_empty() => fallback,
        _ => "/",
    }
}

/// Middleware function for `axum::middleware::from_fn_with_state`.
pub async fn verify_assertion(
    State(middleware): State<Arc<AssertionMiddleware>>,
    request: Request,
    next: Next,
) -> Response {
    middleware.handle(request, next).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use appattest_core::requestid::Generator;
    use appattest_core::{AdapterError, BoxError};
    use async_trait::async_trait;
    use axum::{
        http::StatusCode,
        middleware::from_fn_with_state,
        routing::post,
        Router,
    };
    use bytes::Bytes;
    use futures::stream;
    use tower::ServiceExt;

    #[derive(Clone, Copy)]
    enum Outcome {
        Ok,
        AttestationRequired,
        NewChallenge,
        BadRequest,
        Internal,
    }

    struct MockAdapter {
        outcome: Outcome,
        bodies: Mutex<Vec<Bytes>>,
    }

    impl MockAdapter {
        fn new(outcome: Outcome) -> Arc<Self> {
            Arc::new(Self {
                outcome,
                bodies: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl AssertionAdapter for MockAdapter {
        async fn verify(&self, request: &AssertionRequest) -> appattest_core::Result<()> {
            self.bodies.lock().unwrap().push(request.body.clone());
            match self.outcome {
                Outcome::Ok => Ok(()),
                Outcome::AttestationRequired => Err(AdapterError::AttestationRequired),
                Outcome::NewChallenge => Err(AdapterError::NewChallengeNeeded),
                Outcome::BadRequest => Err(AdapterError::bad_request("signature mismatch")),
                Outcome::Internal => Err(AdapterError::internal("db down")),
            }
        }
    }

    struct FixedGenerator;

    impl Generator for FixedGenerator {
        fn next_id(&self) -> Result<String, BoxError> {
            Ok("generated-id".to_string())
        }
    }

    fn config(body_limit: usize) -> AssertionConfig {
        AssertionConfig {
            attestation_url: "/attest".to_string(),
            new_challenge_url: "/challenge".to_string(),
            body_limit,
        }
    }

    /// Echoes the body it receives and the request's correlation id.
    async fn echo(request: Request) -> Response {
        let id = requestid::from_extensions(request.extensions()).to_string();
        let body = to_bytes(request.into_body(), usize::MAX).await.unwrap();
        ([("x-seen-request-id", id)], body).into_response()
    }

    fn app(adapter: Arc<MockAdapter>, config: AssertionConfig) -> Router {
        let slot = Arc::new(GeneratorSlot::new());
        slot.set(FixedGenerator);
        let middleware = AssertionMiddleware::new(adapter, config).with_request_ids(slot);

        Router::new()
            .route("/protected", post(echo))
            .layer(from_fn_with_state(Arc::new(middleware), verify_assertion))
    }

    fn post_body(body: impl Into<Body>) -> Request {
        Request::builder()
            .method("POST")
            .uri("/protected")
            .body(body.into())
            .unwrap()
    }

    #[tokio::test]
    async fn test_success_forwards_same_body() {
        let adapter = MockAdapter::new(Outcome::Ok);
        let response = app(adapter.clone(), config(0))
            .oneshot(post_body("signed payload"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-seen-request-id"], "generated-id");
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"signed payload");
        assert_eq!(adapter.bodies.lock().unwrap().as_slice(), &[Bytes::from_static(b"signed payload")]);
    }

    #[tokio::test]
    async fn test_body_at_limit_is_accepted() {
        let adapter = MockAdapter::new(Outcome::Ok);
        let response = app(adapter, config(8))
            .oneshot(post_body("12345678"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_body_over_limit_is_rejected() {
        let adapter = MockAdapter::new(Outcome::Ok);
        let response = app(adapter.clone(), config(8))
            .oneshot(post_body("123456789"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(adapter.bodies.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_body_read_error_is_bad_request() {
        let adapter = MockAdapter::new(Outcome::Ok);
        let failing = Body::from_stream(stream::once(async {
            Err::<Bytes, std::io::Error>(std::io::Error::other("connection reset"))
        }));

        let response = app(adapter.clone(), config(0))
            .oneshot(post_body(failing))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(adapter.bodies.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_attestation_required_redirects() {
        let response = app(MockAdapter::new(Outcome::AttestationRequired), config(0))
            .oneshot(post_body(""))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/attest");
    }

    #[tokio::test]
    async fn test_new_challenge_redirect_targets() {
        // Configured URL wins over the referer.
        let request = Request::builder()
            .method("POST")
            .uri("/protected")
            .header(header::REFERER, "/from")
            .body(Body::empty())
            .unwrap();
        let response = app(MockAdapter::new(Outcome::NewChallenge), config(0))
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/challenge");

        let unset = AssertionConfig {
            new_challenge_url: String::new(),
            ..config(0)
        };

        let request = Request::builder()
            .method("POST")
            .uri("/protected")
            .header(header::REFERER, "/from")
            .body(Body::empty())
            .unwrap();
        let response = app(MockAdapter::new(Outcome::NewChallenge), unset.clone())
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/from");

        let response = app(MockAdapter::new(Outcome::NewChallenge), unset)
            .oneshot(post_body(""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/");
    }

    #[tokio::test]
    async fn test_failures_map_to_status() {
        let cases = [
            (Outcome::BadRequest, StatusCode::BAD_REQUEST),
            (Outcome::Internal, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (outcome, status) in cases {
            let response = app(MockAdapter::new(outcome), config(0))
                .oneshot(post_body("payload"))
                .await
                .unwrap();
            assert_eq!(response.status(), status);
        }
    }

    #[tokio::test]
    async fn test_uninitialized_generator_is_internal() {
        let adapter = MockAdapter::new(Outcome::Ok);
        let middleware = AssertionMiddleware::new(adapter.clone(), config(0))
            .with_request_ids(Arc::new(GeneratorSlot::new()));
        let app = Router::new()
            .route("/protected", post(echo))
            .layer(from_fn_with_state(Arc::new(middleware), verify_assertion));

        let response = app.oneshot(post_body("payload")).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(adapter.bodies.lock().unwrap().is_empty());
    }

    #[test]
    fn test_redirect_target() {
        assert_eq!(redirect_target("/configured", Some("/referer")), "/configured");
        assert_eq!(redirect_target("", Some("/referer")), "/referer");
        assert_eq!(redirect_target("", Some("")), "/");
        assert_eq!(redirect_target("", None), "/");
    }
}
