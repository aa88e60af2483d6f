//! Mock audio processor for testing.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::audio::{ArtifactInfo, AudioError, AudioProcessor};

/// A recorded processing call for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedProcess {
    /// Destination the artifact was written to.
    pub dest: PathBuf,
    /// Size of the raw input in bytes.
    pub input_bytes: usize,
    /// Whether processing succeeded.
    pub success: bool,
}

/// Mock implementation of the AudioProcessor trait.
///
/// Writes the raw input straight to the destination so artifact-existence
/// semantics (sync, regenerate) behave like the real processor, and probes
/// against the actual filesystem.
#[derive(Debug)]
pub struct MockProcessor {
    /// Recorded processing calls.
    calls: Arc<RwLock<Vec<RecordedProcess>>>,
    /// If set, the next operation fails with this error.
    next_error: Arc<RwLock<Option<AudioError>>>,
    /// Duration reported for artifacts.
    duration_secs: Arc<RwLock<f64>>,
}

impl Default for MockProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProcessor {
    /// Create a new mock processor.
    pub fn new() -> Self {
        Self {
            calls: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
            duration_secs: Arc::new(RwLock::new(1.0)),
        }
    }

    /// Get all recorded processing calls.
    pub async fn recorded_calls(&self) -> Vec<RecordedProcess> {
        self.calls.read().await.clone()
    }

    /// Get the number of processing calls made.
    pub async fn process_count(&self) -> usize {
        self.calls.read().await.len()
    }

    /// Configure the next operation to fail with the given error.
    pub async fn set_next_error(&self, error: AudioError) {
        *self.next_error.write().await = Some(error);
    }

    /// Set the duration reported for artifacts.
    pub async fn set_duration(&self, duration_secs: f64) {
        *self.duration_secs.write().await = duration_secs;
    }

    async fn take_error(&self) -> Option<AudioError> {
        self.next_error.write().await.take()
    }
}

#[async_trait]
impl AudioProcessor for MockProcessor {
    fn name(&self) -> &str {
        "mock"
    }

    async fn process(&self, audio: Vec<u8>, dest: &Path) -> Result<ArtifactInfo, AudioError> {
        if let Some(err) = self.take_error().await {
            self.calls.write().await.push(RecordedProcess {
                dest: dest.to_path_buf(),
                input_bytes: audio.len(),
                success: false,
            });
            return Err(err);
        }

        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(dest, &audio).await?;

        self.calls.write().await.push(RecordedProcess {
            dest: dest.to_path_buf(),
            input_bytes: audio.len(),
            success: true,
        });

        Ok(ArtifactInfo {
            duration_secs: *self.duration_secs.read().await,
            size_bytes: audio.len() as u64,
        })
    }

    async fn probe(&self, path: &Path) -> Result<ArtifactInfo, AudioError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }

        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| AudioError::ProbeFailed(e.to_string()))?;

        Ok(ArtifactInfo {
            duration_secs: *self.duration_secs.read().await,
            size_bytes: meta.len(),
        })
    }
}
