//! Mock synthesizer for testing.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::synth::{SynthesisError, SynthesisRequest, Synthesizer};

/// Mock implementation of the Synthesizer trait.
///
/// Provides controllable behavior for testing:
/// - Track synthesis requests for assertions
/// - Simulate one-shot or persistent failures
/// - Control the produced audio bytes
/// - Simulate synthesis latency
///
/// By default every request succeeds and yields a small valid mono WAV, so
/// the real post-processing path can run against it.
///
/// # Example
///
/// ```rust,ignore
/// use hibiki_core::testing::MockSynthesizer;
///
/// let synth = MockSynthesizer::new();
/// synth.fail_text("broken line").await;
///
/// // ... drive the engine ...
///
/// let requests = synth.recorded_requests().await;
/// assert_eq!(requests[0].backend, "default");
/// ```
#[derive(Debug)]
pub struct MockSynthesizer {
    /// Recorded requests in call order.
    requests: Arc<RwLock<Vec<SynthesisRequest>>>,
    /// If set, the next call fails with this error.
    next_error: Arc<RwLock<Option<SynthesisError>>>,
    /// Texts that always fail.
    failing_texts: Arc<RwLock<HashSet<String>>>,
    /// Whether every call fails.
    always_fail: Arc<RwLock<bool>>,
    /// Simulated synthesis latency in milliseconds.
    latency_ms: Arc<RwLock<u64>>,
    /// Audio returned on success.
    audio: Arc<RwLock<Vec<u8>>>,
    /// Whether the health probe succeeds.
    healthy: Arc<RwLock<bool>>,
}

impl Default for MockSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSynthesizer {
    /// Create a new mock synthesizer producing a short valid WAV.
    pub fn new() -> Self {
        Self {
            requests: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
            failing_texts: Arc::new(RwLock::new(HashSet::new())),
            always_fail: Arc::new(RwLock::new(false)),
            latency_ms: Arc::new(RwLock::new(0)),
            audio: Arc::new(RwLock::new(super::fixture_wav(22050, 2205))),
            healthy: Arc::new(RwLock::new(true)),
        }
    }

    /// Get all recorded requests.
    pub async fn recorded_requests(&self) -> Vec<SynthesisRequest> {
        self.requests.read().await.clone()
    }

    /// Get the number of synthesis calls made.
    pub async fn request_count(&self) -> usize {
        self.requests.read().await.len()
    }

    /// Configure the next call to fail with the given error.
    pub async fn set_next_error(&self, error: SynthesisError) {
        *self.next_error.write().await = Some(error);
    }

    /// Make every request for this exact text fail.
    pub async fn fail_text(&self, text: impl Into<String>) {
        self.failing_texts.write().await.insert(text.into());
    }

    /// Make every request fail until disabled.
    pub async fn set_always_fail(&self, fail: bool) {
        *self.always_fail.write().await = fail;
    }

    /// Set the simulated synthesis latency.
    pub async fn set_latency(&self, latency: Duration) {
        *self.latency_ms.write().await = latency.as_millis() as u64;
    }

    /// Set the audio bytes returned on success.
    pub async fn set_audio(&self, audio: Vec<u8>) {
        *self.audio.write().await = audio;
    }

    /// Configure the health probe result.
    pub async fn set_healthy(&self, healthy: bool) {
        *self.healthy.write().await = healthy;
    }

    async fn take_error(&self) -> Option<SynthesisError> {
        self.next_error.write().await.take()
    }
}

#[async_trait]
impl Synthesizer for MockSynthesizer {
    fn name(&self) -> &str {
        "mock"
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>, SynthesisError> {
        self.requests.write().await.push(request.clone());

        let latency = *self.latency_ms.read().await;
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if let Some(err) = self.take_error().await {
            return Err(err);
        }
        if *self.always_fail.read().await {
            return Err(SynthesisError::ConnectionFailed(
                "mock outage".to_string(),
            ));
        }
        if self.failing_texts.read().await.contains(&request.text) {
            return Err(SynthesisError::ApiError {
                status: 500,
                body: "mock failure".to_string(),
            });
        }

        Ok(self.audio.read().await.clone())
    }

    async fn check_health(&self) -> Result<(), SynthesisError> {
        if *self.healthy.read().await {
            Ok(())
        } else {
            Err(SynthesisError::ConnectionFailed(
                "mock service down".to_string(),
            ))
        }
    }
}
