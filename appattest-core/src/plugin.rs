//! Application-specific operations the verification flows rely on.
//!
//! Plugins own request parsing, session handling and the persistence of
//! challenges, keys and counters.
//! Errors are returned as [`BoxError`] and mapped by the adapters into the
//! closed [`AdapterError`](crate::AdapterError) set.

use async_trait::async_trait;

use crate::error::BoxError;
use crate::object::{AssertionObject, AttestationObject, PublicKey};
use crate::request::{AssertionRequest, AttestationRequest};

/// Fields extracted from an attestation request.
#[derive(Debug, Clone)]
pub struct AttestationData {
    pub object: AttestationObject,
    /// SHA-256 of the client data the app attested with.
    pub client_data_hash: Vec<u8>,
    /// Key identifier returned by `generateKey`.
    pub key_id: Vec<u8>,
}

/// Fields extracted from an assertion request.
#[derive(Debug, Clone)]
pub struct AssertionData {
    pub object: AssertionObject,
    /// Challenge the client embedded in its signed payload.
    pub challenge: String,
}

/// Hooks used by the attestation flow.
#[async_trait]
pub trait AttestationPlugin: Send + Sync {
    /// Parse the attestation object, client data hash and key id.
    async fn extract_data(&self, request: &AttestationRequest) -> Result<AttestationData, BoxError>;

    /// Whether a challenge is currently assigned to the request's session.
    async fn is_challenge_assigned(&self, request: &AttestationRequest) -> Result<bool, BoxError>;

    /// Create and persist a new challenge for the client.
    async fn new_challenge(&self, request: &AttestationRequest) -> Result<String, BoxError>;

    /// Persist `request.result` after a successful verification.
    async fn store_result(&self, request: &AttestationRequest) -> Result<(), BoxError>;
}

/// Hooks used by the assertion flow.
#[async_trait]
pub trait AssertionPlugin: Send + Sync {
    /// Parse the assertion object and the client-side challenge.
    async fn parse_request(&self, request: &AssertionRequest) -> Result<AssertionData, BoxError>;

    /// Stored public key and counter for the device.
    ///
    /// `None` means the device never completed attestation.
    async fn public_key_and_counter(
        &self,
        request: &AssertionRequest,
    ) -> Result<(Option<PublicKey>, u32), BoxError>;

    /// Challenge assigned to the session, or an empty string if none.
    async fn assigned_challenge(&self, request: &AssertionRequest) -> Result<String, BoxError>;

    /// Persist the counter returned by a successful verification.
    async fn update_counter(&self, request: &AssertionRequest, counter: u32) -> Result<(), BoxError>;
}
