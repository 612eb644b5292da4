//! Verification service contracts.
//!
//! The cryptographic checks (certificate chain, nonce, signature, counter
//! monotonicity) live behind these traits and are supplied by the adopter.

use std::sync::Arc;

use crate::error::BoxError;
use crate::object::{AssertionObject, AttestationObject, AttestationResult, PublicKey};

/// Verifies a one-time attestation.
pub trait AttestationService: Send + Sync {
    fn verify(
        &self,
        object: &AttestationObject,
        client_data_hash: &[u8],
        key_id: &[u8],
    ) -> Result<AttestationResult, BoxError>;
}

/// Verifies a single assertion against stored key material.
///
/// Returns the new counter on success. Rejecting a counter that did not
/// increase is the service's job.
pub trait AssertionService: Send {
    fn verify(
        &self,
        object: &AssertionObject,
        challenge: &str,
        client_data: &[u8],
    ) -> Result<u32, BoxError>;
}

/// Per-call state an [`AssertionService`] is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionContext {
    /// Challenge the server assigned to the session.
    pub challenge: String,
    pub public_key: PublicKey,
    /// Counter stored after the previous assertion.
    pub counter: u32,
}

/// Builds an [`AssertionService`] for one verification.
pub type AssertionServiceFactory =
    Arc<dyn Fn(AssertionContext) -> Box<dyn AssertionService> + Send + Sync>;
