//! HTTP synthesis backend implementation.

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::config::SynthesisConfig;

use super::{SynthesisError, SynthesisRequest, Synthesizer};

/// Wire payload for the synthesis endpoint.
#[derive(Debug, Serialize)]
struct SynthesisPayload<'a> {
    text: &'a str,
    backend: &'a str,
    emotion: &'a str,
}

/// Speech synthesizer talking to an HTTP service.
///
/// Posts one JSON request per line and expects the raw audio bytes back in
/// the response body.
pub struct HttpSynthesizer {
    client: Client,
    config: SynthesisConfig,
}

impl HttpSynthesizer {
    /// Create a new HttpSynthesizer with the given configuration.
    pub fn new(config: SynthesisConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self { client, config }
    }

    /// The liveness endpoint, derived from the synthesis URL.
    fn health_url(&self) -> Result<Url, SynthesisError> {
        let mut url = Url::parse(&self.config.url)
            .map_err(|e| SynthesisError::InvalidUrl(e.to_string()))?;
        url.set_path("/health");
        url.set_query(None);
        Ok(url)
    }

    fn map_request_error(&self, e: reqwest::Error) -> SynthesisError {
        if e.is_timeout() {
            SynthesisError::Timeout {
                timeout_secs: self.config.timeout_secs,
            }
        } else if e.is_connect() {
            SynthesisError::ConnectionFailed(e.to_string())
        } else {
            SynthesisError::InvalidResponse(e.to_string())
        }
    }
}

#[async_trait]
impl Synthesizer for HttpSynthesizer {
    fn name(&self) -> &str {
        "http"
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>, SynthesisError> {
        let payload = SynthesisPayload {
            text: &request.text,
            backend: &request.backend,
            emotion: request.emotion.as_str(),
        };

        debug!(
            backend = %request.backend,
            emotion = %request.emotion,
            chars = request.text.len(),
            "Requesting synthesis"
        );

        let response = self
            .client
            .post(&self.config.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SynthesisError::ApiError {
                status,
                body: body.chars().take(200).collect(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.map_request_error(e))?;

        if bytes.is_empty() {
            return Err(SynthesisError::InvalidResponse(
                "synthesis returned no audio".to_string(),
            ));
        }

        debug!(bytes = bytes.len(), "Synthesis complete");
        Ok(bytes.to_vec())
    }

    async fn check_health(&self) -> Result<(), SynthesisError> {
        let url = self.health_url()?;
        debug!(url = %url, "Probing synthesis service");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SynthesisError::ApiError {
                status,
                body: body.chars().take(200).collect(),
            });
        }

        Ok(())
    }
}
