use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, instrument};

use super::AssertionAdapter;
use crate::error::{AdapterError, Result};
use crate::plugin::AssertionPlugin;
use crate::request::AssertionRequest;
use crate::service::{AssertionContext, AssertionServiceFactory};

/// Per-request assertion flow.
///
/// The assertion service is built for every call from the session's assigned
/// challenge and the device's stored key and counter.
#[derive(Clone)]
pub struct AssertionFlow {
    plugin: Arc<dyn AssertionPlugin>,
    new_service: AssertionServiceFactory,
}

impl AssertionFlow {
    pub fn new(plugin: Arc<dyn AssertionPlugin>, new_service: AssertionServiceFactory) -> Self {
        Self {
            plugin,
            new_service,
        }
    }

    /// Replace the factory used to build assertion services.
    pub fn with_service_factory(mut self, new_service: AssertionServiceFactory) -> Self {
        self.new_service = new_service;
        self
    }
}

#[async_trait]
impl AssertionAdapter for AssertionFlow {
    #[instrument(level = "debug", skip_all, fields(request_id = %request.request_id()))]
    async fn verify(&self, request: &AssertionRequest) -> Result<()> {
        debug!("Starting assertion verification");

        let data = self.plugin.parse_request(request).await.map_err(|e| {
            error!(error = %e, "Failed to parse request");
            AdapterError::bad_request(format!("failed to parse request: {e}"))
        })?;

        let (public_key, counter) = self.plugin.public_key_and_counter(request).await.map_err(|e| {
            error!(error = %e, "Failed to get public key and counter");
            AdapterError::internal(format!("failed to get public key and counter: {e}"))
        })?;
        // Checked before the challenge so a never-attested device is sent to
        // attestation rather than asked for a new challenge.
        let Some(public_key) = public_key else {
            info!("No public key stored, attestation required");
            return Err(AdapterError::AttestationRequired);
        };

        let assigned = self.plugin.assigned_challenge(request).await.map_err(|e| {
            error!(error = %e, "Failed to get assigned challenge");
            AdapterError::internal(format!("failed to get assigned challenge: {e}"))
        })?;
        if assigned.is_empty() {
            info!("No challenge assigned, new challenge needed");
            return Err(AdapterError::NewChallengeNeeded);
        }

        let new_counter = {
            let service = (self.new_service)(AssertionContext {
                challenge: assigned,
                public_key,
                counter,
            });
            service
                .verify(&data.object, &data.challenge, &request.body)
                .map_err(|e| {
                    error!(error = %e, "Failed to verify assertion");
                    AdapterError::bad_request(format!("failed to verify assertion: {e}"))
                })?
        };
        debug!(counter, new_counter, "Assertion verified");

        self.plugin
            .update_counter(request, new_counter)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to store new counter");
                AdapterError::internal(format!("failed to store new counter: {e}"))
            })?;

        Ok(())
    }
}
