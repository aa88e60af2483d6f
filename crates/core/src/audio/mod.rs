//! Audio post-processing.
//!
//! Everything between the synthesis service's raw bytes and the finished
//! artifact on disk: decoding, mono downmix, resampling, peak normalization
//! and the 16-bit PCM write. The engine sees only the `AudioProcessor`
//! trait.

mod error;
mod traits;
mod wav;

pub use error::AudioError;
pub use traits::{ArtifactInfo, AudioProcessor};
pub use wav::WavProcessor;
