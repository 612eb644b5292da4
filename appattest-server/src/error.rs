//! Boundary error handling
//!
//! Maps verification and correlation failures onto HTTP responses. Causes are
//! logged with their full detail; response bodies only ever carry the
//! canonical reason phrase of the status.

use appattest_core::{AdapterError, ErrorKind, RequestIdError};
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Error surfaced by the attestation handler and the assertion middleware.
#[derive(Debug, Error)]
pub enum BoundaryError {
    /// Malformed input or a payload that failed verification
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Server-side failure, including a missing id generator
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BoundaryError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Classify an adapter outcome.
    ///
    /// Only `BadRequest` is the client's fault. The challenge and attestation
    /// signals are handled by the boundaries before reaching this point, so if
    /// one leaks through it is a server-side error.
    pub fn from_adapter(err: &AdapterError) -> Self {
        match err.kind() {
            ErrorKind::BadRequest => Self::BadRequest(err.to_string()),
            ErrorKind::Internal | ErrorKind::NewChallengeNeeded | ErrorKind::AttestationRequired => {
                Self::Internal(err.to_string())
            }
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_category(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<AdapterError> for BoundaryError {
    fn from(err: AdapterError) -> Self {
        Self::from_adapter(&err)
    }
}

impl From<RequestIdError> for BoundaryError {
    fn from(err: RequestIdError) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Plain-text response whose body is the status's reason phrase.
pub(crate) fn status_response(status: StatusCode) -> Response {
    let reason = status.canonical_reason().unwrap_or_default();
    (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        reason,
    )
        .into_response()
}

impl IntoResponse for BoundaryError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let category = self.error_category();

        match &self {
            Self::BadRequest(message) => {
                tracing::warn!(status = %status, category, error = %message, "Client error");
            }
            Self::Internal(message) => {
                tracing::error!(status = %status, category, error = %message, "Server error");
            }
        }

        status_response(status)
    }
}
