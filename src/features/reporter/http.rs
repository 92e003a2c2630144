use crate::shared::config::AgentConfig;
use crate::shared::error::{ConfigError, DeliveryError};
use crate::shared::traits::Reporter;
use async_trait::async_trait;
use log::debug;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::time::Duration;

/// POSTs snapshots to the collector. One request per call, no retries.
pub struct HttpReporter {
    client: Client,
    endpoint: String,
}

impl HttpReporter {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::Invalid(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn from_config(config: &AgentConfig) -> Result<Self, ConfigError> {
        Self::new(config.endpoint.clone(), config.request_timeout())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Reporter for HttpReporter {
    async fn report(&self, payload: Vec<u8>) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Rejected(status));
        }
        debug!("Collector accepted snapshot with status {}", status);
        Ok(())
    }
}
