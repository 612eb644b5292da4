//! Verification adapters.
//!
//! An adapter drives one protocol phase: it calls the plugin and the
//! verification service in a fixed order and folds every collaborator failure
//! into an [`AdapterError`]. Boundaries depend on the traits below so that
//! they can be exercised with fakes.
//!
//! - [`AttestationFlow`]: extract → challenge assigned? → verify → store
//! - [`AssertionFlow`]: parse → key and counter → assigned challenge → verify → update counter

mod assertion;
mod attestation;

pub use assertion::AssertionFlow;
pub use attestation::AttestationFlow;

use async_trait::async_trait;

use crate::error::Result;
use crate::request::{AssertionRequest, AttestationRequest};

/// Attestation phase as seen by the HTTP boundary.
#[async_trait]
pub trait AttestationAdapter: Send + Sync {
    /// Mint a new challenge for the client.
    async fn new_challenge(&self, request: &AttestationRequest) -> Result<String>;

    /// Verify the attestation carried by `request`.
    ///
    /// On success `request.result` holds the verified result.
    async fn verify(&self, request: &mut AttestationRequest) -> Result<()>;
}

/// Assertion phase as seen by the HTTP middleware.
#[async_trait]
pub trait AssertionAdapter: Send + Sync {
    /// Verify the assertion carried by `request`.
    async fn verify(&self, request: &AssertionRequest) -> Result<()>;
}
