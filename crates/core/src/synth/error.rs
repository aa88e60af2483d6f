//! Error types for the synthesis module.

use thiserror::Error;

/// Errors that can occur while talking to the synthesis service.
#[derive(Debug, Error)]
pub enum SynthesisError {
    /// Could not reach the synthesis service.
    #[error("Failed to connect to synthesis service: {0}")]
    ConnectionFailed(String),

    /// The request timed out.
    #[error("Synthesis timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// The service answered with a non-success status.
    #[error("Synthesis service returned HTTP {status}: {body}")]
    ApiError { status: u16, body: String },

    /// The service answered but the payload is unusable.
    #[error("Invalid synthesis response: {0}")]
    InvalidResponse(String),

    /// The configured endpoint URL cannot be parsed.
    #[error("Invalid synthesis URL: {0}")]
    InvalidUrl(String),
}

impl SynthesisError {
    /// Whether a retry has a chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::ConnectionFailed(_))
    }
}
