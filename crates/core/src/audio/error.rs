//! Error types for the audio module.

use thiserror::Error;

/// Errors that can occur while post-processing audio.
#[derive(Debug, Error)]
pub enum AudioError {
    /// The received bytes are not decodable audio.
    #[error("Failed to decode audio: {0}")]
    DecodeFailed(String),

    /// The audio decodes but uses a sample layout we do not handle.
    #[error("Unsupported sample format: {bits}-bit {format}")]
    UnsupportedFormat { bits: u16, format: String },

    /// The audio decodes to zero samples.
    #[error("Audio contains no samples")]
    Empty,

    /// Failed to probe an artifact on disk.
    #[error("Failed to probe artifact: {0}")]
    ProbeFailed(String),

    /// The background codec task was cancelled or panicked.
    #[error("Audio task failed: {0}")]
    TaskFailed(String),

    /// I/O error while writing the artifact.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
