use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use tracing::{debug, error, info, instrument};

use super::AttestationAdapter;
use crate::error::{AdapterError, Result};
use crate::plugin::AttestationPlugin;
use crate::request::AttestationRequest;
use crate::service::AttestationService;

/// One-time attestation flow backed by a plugin and a verification service.
#[derive(Clone)]
pub struct AttestationFlow {
    plugin: Arc<dyn AttestationPlugin>,
    service: Arc<dyn AttestationService>,
}

impl AttestationFlow {
    pub fn new(plugin: Arc<dyn AttestationPlugin>, service: Arc<dyn AttestationService>) -> Self {
        Self { plugin, service }
    }
}

#[async_trait]
impl AttestationAdapter for AttestationFlow {
    #[instrument(level = "debug", skip_all, fields(request_id = %request.request_id()))]
    async fn new_challenge(&self, request: &AttestationRequest) -> Result<String> {
        debug!("Requesting new challenge");

        self.plugin.new_challenge(request).await.map_err(|e| {
            error!(error = %e, "Failed to generate new challenge");
            AdapterError::internal(format!("failed to generate new challenge: {e}"))
        })
    }

    #[instrument(level = "debug", skip_all, fields(request_id = %request.request_id()))]
    async fn verify(&self, request: &mut AttestationRequest) -> Result<()> {
        debug!("Starting attestation verification");

        let data = self.plugin.extract_data(request).await.map_err(|e| {
            error!(error = %e, "Failed to parse request");
            AdapterError::bad_request(format!("failed to parse request: {e}"))
        })?;

        let assigned = self.plugin.is_challenge_assigned(request).await.map_err(|e| {
            error!(error = %e, "Failed to check challenge assignment");
            AdapterError::internal(format!("failed to check challenge: {e}"))
        })?;
        if !assigned {
            info!("No challenge assigned, new challenge needed");
            return Err(AdapterError::NewChallengeNeeded);
        }

        let key_id = BASE64.encode(&data.key_id);
        let result = self
            .service
            .verify(&data.object, &data.client_data_hash, &data.key_id)
            .map_err(|e| {
                error!(key_id = %key_id, error = %e, "Failed to verify attestation");
                AdapterError::bad_request(format!("failed to verify attestation: {e}"))
            })?;
        request.result = Some(result);
        debug!(key_id = %key_id, "Attestation verified");

        self.plugin.store_result(request).await.map_err(|e| {
            error!(error = %e, "Failed to store attestation result");
            AdapterError::internal(format!("failed to store result: {e}"))
        })?;
        info!(key_id = %key_id, "Attestation result stored");

        Ok(())
    }
}
