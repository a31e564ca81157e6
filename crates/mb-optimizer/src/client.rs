//! Transport to the optimizer service.

use async_trait::async_trait;
use mb_types::{config_error, protocol_error, Endpoint, MboError, MboResult, WorkflowId};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::config::OptimizerServiceConfig;
use crate::protocol::{InitialDesignUpdate, InitiateRequest, ModelUpdate, RunRequest};

/// A remote optimizer reachable through JSON POST requests.
///
/// Implementors only provide [`OptimizerService::post`]; the per-endpoint
/// methods serialize the matching request body and return the raw response
/// for the driver to interpret.
#[async_trait]
pub trait OptimizerService: Send + Sync {
    /// POST `body` to `endpoint` and return the parsed JSON response.
    ///
    /// Transport failures must surface as [`MboError::Connection`].
    async fn post(&self, endpoint: Endpoint, body: &Value) -> MboResult<Value>;

    async fn initiate(&self, request: &InitiateRequest) -> MboResult<Value> {
        let body = serde_json::to_value(request)?;
        self.post(Endpoint::Initiate, &body).await
    }

    async fn update_initial_design(&self, update: &InitialDesignUpdate) -> MboResult<Value> {
        let body = serde_json::to_value(update)?;
        self.post(Endpoint::UpdateInitialDesign, &body).await
    }

    async fn create_artifacts(&self, id: WorkflowId) -> MboResult<Value> {
        let body = serde_json::to_value(RunRequest { id })?;
        self.post(Endpoint::CreateArtifacts, &body).await
    }

    async fn get_proposed_point(&self, id: WorkflowId) -> MboResult<Value> {
        let body = serde_json::to_value(RunRequest { id })?;
        self.post(Endpoint::GetProposedPoint, &body).await
    }

    async fn update_model(&self, update: &ModelUpdate) -> MboResult<Value> {
        let body = serde_json::to_value(update)?;
        self.post(Endpoint::UpdateModel, &body).await
    }

    async fn finalize(&self, id: WorkflowId) -> MboResult<Value> {
        let body = serde_json::to_value(RunRequest { id })?;
        self.post(Endpoint::Finalize, &body).await
    }
}

/// [`OptimizerService`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpOptimizerClient {
    config: OptimizerServiceConfig,
    client: reqwest::Client,
}

impl HttpOptimizerClient {
    pub fn new(config: OptimizerServiceConfig) -> MboResult<Self> {
        config.validate()?;

        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| config_error!("failed to build HTTP client: {e}"))?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &OptimizerServiceConfig {
        &self.config
    }
}

#[async_trait]
impl OptimizerService for HttpOptimizerClient {
    async fn post(&self, endpoint: Endpoint, body: &Value) -> MboResult<Value> {
        let url = self.config.endpoint_url(endpoint);
        debug!(%url, "posting to optimizer service");

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| MboError::Connection {
                endpoint,
                message: format!("HTTP request failed: {e}"),
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| MboError::Connection {
            endpoint,
            message: format!("failed to read response body: {e}"),
        })?;

        debug!(%url, %status, bytes = text.len(), "optimizer service replied");

        serde_json::from_str(&text).map_err(|e| {
            protocol_error!(endpoint, "response is not valid JSON (HTTP {status}): {e}")
        })
    }
}
