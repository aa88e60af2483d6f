//! Trait definitions for the synthesis module.

use async_trait::async_trait;

use super::error::SynthesisError;
use crate::emotion::Emotion;

/// One synthesis request: the line to speak and how to speak it.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    pub text: String,
    pub backend: String,
    pub emotion: Emotion,
}

impl SynthesisRequest {
    pub fn new(text: impl Into<String>, backend: impl Into<String>, emotion: Emotion) -> Self {
        Self {
            text: text.into(),
            backend: backend.into(),
            emotion,
        }
    }
}

/// A speech synthesizer producing raw audio bytes for a text line.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Returns the name of this synthesizer implementation.
    fn name(&self) -> &str;

    /// Synthesizes one request into raw audio bytes.
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<Vec<u8>, SynthesisError>;

    /// Checks that the synthesis service is reachable and ready.
    async fn check_health(&self) -> Result<(), SynthesisError>;
}
