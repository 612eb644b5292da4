//! Attestation boundary
//!
//! Serves the challenge and verification endpoints of the attestation phase.
//! Every response is produced by a hook, so adopters can replace the default
//! status mapping without wrapping the handler.

use std::sync::Arc;

use appattest_core::requestid::{self, GeneratorSlot};
use appattest_core::{AdapterError, AttestationAdapter, AttestationRequest, ErrorKind};
use axum::{
    body::to_bytes,
    extract::{Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::Instrument;

use crate::config::DEFAULT_BODY_LIMIT;
use crate::error::BoundaryError;

/// Runs before the adapter; may annotate the request.
pub type SetupHook = Arc<dyn Fn(&mut AttestationRequest) + Send + Sync>;
/// Builds the response for a verified attestation.
pub type VerifySuccessHook = Arc<dyn Fn(&AttestationRequest) -> Response + Send + Sync>;
/// Builds the response carrying a freshly minted challenge.
pub type ChallengeSuccessHook = Arc<dyn Fn(&AttestationRequest, String) -> Response + Send + Sync>;
/// Builds the response for a failed adapter call.
pub type FailedHook = Arc<dyn Fn(&AttestationRequest, &AdapterError) -> Response + Send + Sync>;

fn noop_setup() -> SetupHook {
    Arc::new(|_: &mut AttestationRequest| {})
}

fn default_failed() -> FailedHook {
    Arc::new(|_: &AttestationRequest, err: &AdapterError| BoundaryError::from_adapter(err).into_response())
}

/// Hooks for the verification endpoint.
#[derive(Clone)]
pub struct VerifyHooks {
    pub setup: SetupHook,
    pub success: VerifySuccessHook,
    pub failed: FailedHook,
}

impl Default for VerifyHooks {
    fn default() -> Self {
        Self {
            setup: noop_setup(),
            success: Arc::new(|_: &AttestationRequest| StatusCode::OK.into_response()),
            failed: default_failed(),
        }
    }
}

/// Hooks for the challenge endpoint. Also used when verification re-enters
/// challenge issuance.
#[derive(Clone)]
pub struct ChallengeHooks {
    pub setup: SetupHook,
    pub success: ChallengeSuccessHook,
    pub failed: FailedHook,
}

impl Default for ChallengeHooks {
    fn default() -> Self {
        Self {
            setup: noop_setup(),
            success: Arc::new(|_: &AttestationRequest, challenge: String| {
                (
                    StatusCode::OK,
                    [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                    challenge,
                )
                    .into_response()
            }),
            failed: default_failed(),
        }
    }
}

/// HTTP boundary of the attestation phase.
pub struct AttestationHandler {
    adapter: Arc<dyn AttestationAdapter>,
    request_ids: Arc<GeneratorSlot>,
    body_limit: usize,
    verify_hooks: VerifyHooks,
    challenge_hooks: ChallengeHooks,
}

impl AttestationHandler {
    /// Handler using the process-wide id generator and default hooks.
    pub fn new(adapter: Arc<dyn AttestationAdapter>) -> Self {
        Self {
            adapter,
            request_ids: requestid::global(),
            body_limit: DEFAULT_BODY_LIMIT,
            verify_hooks: VerifyHooks::default(),
            challenge_hooks: ChallengeHooks::default(),
        }
    }

    pub fn with_request_ids(mut self, request_ids: Arc<GeneratorSlot>) -> Self {
        self.request_ids = request_ids;
        self
    }

    /// Maximum attestation body size in bytes. `0` keeps the default.
    pub fn with_body_limit(mut self, body_limit: usize) -> Self {
        if body_limit > 0 {
            self.body_limit = body_limit;
        }
        self
    }

    pub fn with_verify_hooks(mut self, hooks: VerifyHooks) -> Self {
        self.verify_hooks = hooks;
        self
    }

    pub fn with_challenge_hooks(mut self, hooks: ChallengeHooks) -> Self {
        self.challenge_hooks = hooks;
        self
    }

    /// Verify the attestation carried by `request`.
    ///
    /// When the session has no challenge yet, a new one is issued in the same
    /// response through the challenge hooks.
    pub async fn verify(&self, request: Request) -> Response {
        let (request, id) = match self.request_ids.ensure(request) {
            Ok(assigned) => assigned,
            Err(e) => return BoundaryError::from(e).into_response(),
        };

        let span = tracing::info_span!("attestation_verify", request_id = %id);
        async move {
            let mut request = match self.buffer(request).await {
                Ok(request) => request,
                Err(response) => return response,
            };

            (self.verify_hooks.setup)(&mut request);

            match self.adapter.verify(&mut request).await {
                Ok(()) => {
                    tracing::info!("Attestation accepted");
                    (self.verify_hooks.success)(&request)
                }
                Err(err) => match err.kind() {
                    ErrorKind::NewChallengeNeeded => {
                        tracing::info!("No challenge assigned, issuing one");
                        self.issue(request).await
                    }
                    ErrorKind::BadRequest | ErrorKind::Internal | ErrorKind::AttestationRequired => {
                        (self.verify_hooks.failed)(&request, &err)
                    }
                },
            }
        }
        .instrument(span)
        .await
    }

    /// Issue a new challenge.
    pub async fn new_challenge(&self, request: Request) -> Response {
        let (request, id) = match self.request_ids.ensure(request) {
            Ok(assigned) => assigned,
            Err(e) => return BoundaryError::from(e).into_response(),
        };

        let span = tracing::info_span!("attestation_challenge", request_id = %id);
        async move {
            match self.buffer(request).await {
                Ok(request) => self.issue(request).await,
                Err(response) => response,
            }
        }
        .instrument(span)
        .await
    }

    async fn issue(&self, mut request: AttestationRequest) -> Response {
        (self.challenge_hooks.setup)(&mut request);

        match self.adapter.new_challenge(&request).await {
            Ok(challenge) => {
                tracing::debug!("Challenge issued");
                (self.challenge_hooks.success)(&request, challenge)
            }
            Err(err) => (self.challenge_hooks.failed)(&request, &err),
        }
    }

    async fn buffer(&self, request: Request) -> Result<AttestationRequest, Response> {
        let (parts, body) = request.into_parts();
        let body = to_bytes(body, self.body_limit).await.map_err(|e| {
            BoundaryError::bad_request(format!("failed to read attestation body: {e}")).into_response()
        })?;
        Ok(AttestationRequest::new(parts, body))
    }
}

/// `POST /attest/verify`
pub async fn verify_attestation(
    State(handler): State<Arc<AttestationHandler>>,
    request: Request,
) -> Response {
    handler.verify(request).await
}

/// `POST /attest/challenge`
pub async fn issue_challenge(
    State(handler): State<Arc<AttestationHandler>>,
    request: Request,
) -> Response {
    handler.new_challenge(request).await
}
