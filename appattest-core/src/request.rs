//! Per-call request values handed to plugins.
//!
//! Both types are created by a boundary for a single request and dropped when
//! that request completes. The correlation id travels in `parts.extensions`.

use bytes::Bytes;
use http::request::Parts;
use http::Request;

use crate::object::AttestationResult;
use crate::requestid;

/// Attestation call: the transport request plus a slot for the verified result.
#[derive(Debug)]
pub struct AttestationRequest {
    /// Method, URI, headers and extensions of the inbound request.
    pub parts: Parts,
    /// Buffered request body.
    pub body: Bytes,
    /// Set by the attestation flow after the service accepts the object and
    /// before `store_result` runs.
    pub result: Option<AttestationResult>,
}

impl AttestationRequest {
    pub fn new(parts: Parts, body: Bytes) -> Self {
        Self {
            parts,
            body,
            result: None,
        }
    }

    /// Correlation id of the request, or `""`.
    pub fn request_id(&self) -> &str {
        requestid::from_extensions(&self.parts.extensions)
    }
}

/// Assertion call: the transport request plus the raw body the client signed.
#[derive(Debug)]
pub struct AssertionRequest {
    pub parts: Parts,
    /// Raw body bytes; passed to the assertion service as client data.
    pub body: Bytes,
}

impl AssertionRequest {
    pub fn new(parts: Parts, body: Bytes) -> Self {
        Self { parts, body }
    }

    /// Correlation id of the request, or `""`.
    pub fn request_id(&self) -> &str {
        requestid::from_extensions(&self.parts.extensions)
    }

    /// Rebuild the transport request for downstream handlers.
    ///
    /// The body is a fresh reader over the same buffer, so it can be consumed
    /// again from the start.
    pub fn into_request<B: From<Bytes>>(self) -> Request<B> {
        Request::from_parts(self.parts, B::from(self.body))
    }
}
