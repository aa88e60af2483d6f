//! Trait definitions for the audio module.

use async_trait::async_trait;
use std::path::Path;

use super::error::AudioError;

/// Metadata of a finished artifact on disk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArtifactInfo {
    pub duration_secs: f64,
    pub size_bytes: u64,
}

/// Turns raw synthesis output into the final artifact for a job.
#[async_trait]
pub trait AudioProcessor: Send + Sync {
    /// Returns the name of this processor implementation.
    fn name(&self) -> &str;

    /// Processes raw audio bytes and writes the artifact to `dest`.
    async fn process(&self, audio: Vec<u8>, dest: &Path) -> Result<ArtifactInfo, AudioError>;

    /// Probes an existing artifact for its metadata.
    async fn probe(&self, path: &Path) -> Result<ArtifactInfo, AudioError>;
}
