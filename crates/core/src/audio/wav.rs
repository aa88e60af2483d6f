//! WAV post-processing implementation.
//!
//! Decodes whatever WAV layout the synthesis service produced, downmixes to
//! mono, resamples to the configured rate, peak-normalizes and writes the
//! artifact as 16-bit PCM. Codec work is CPU-bound, so it runs on the
//! blocking pool.

use async_trait::async_trait;
use std::fs;
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

use crate::config::AudioConfig;

use super::error::AudioError;
use super::traits::{ArtifactInfo, AudioProcessor};

/// Normalization target, leaving a little headroom below full scale.
const PEAK_TARGET: f32 = 0.95;

/// WAV-based audio processor.
pub struct WavProcessor {
    config: AudioConfig,
}

impl WavProcessor {
    /// Creates a new WAV processor with the given configuration.
    pub fn new(config: AudioConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl AudioProcessor for WavProcessor {
    fn name(&self) -> &str {
        "wav"
    }

    async fn process(&self, audio: Vec<u8>, dest: &Path) -> Result<ArtifactInfo, AudioError> {
        let sample_rate = self.config.sample_rate;
        let dest = dest.to_path_buf();

        tokio::task::spawn_blocking(move || process_blocking(&audio, &dest, sample_rate))
            .await
            .map_err(|e| AudioError::TaskFailed(e.to_string()))?
    }

    async fn probe(&self, path: &Path) -> Result<ArtifactInfo, AudioError> {
        let path = path.to_path_buf();

        tokio::task::spawn_blocking(move || probe_blocking(&path))
            .await
            .map_err(|e| AudioError::TaskFailed(e.to_string()))?
    }
}

fn process_blocking(
    audio: &[u8],
    dest: &Path,
    sample_rate: u32,
) -> Result<ArtifactInfo, AudioError> {
    let (samples, source_rate, channels) = decode(audio)?;

    let mono = downmix(&samples, channels);
    let resampled = resample(&mono, source_rate, sample_rate);
    let normalized = normalize(resampled);

    if let Some(parent) = dest.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer =
        hound::WavWriter::create(dest, spec).map_err(|e| AudioError::DecodeFailed(e.to_string()))?;
    for sample in &normalized {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer
            .write_sample(value)
            .map_err(|e| AudioError::DecodeFailed(e.to_string()))?;
    }
    writer
        .finalize()
        .map_err(|e| AudioError::DecodeFailed(e.to_string()))?;

    let size_bytes = fs::metadata(dest)?.len();
    let duration_secs = normalized.len() as f64 / sample_rate as f64;

    debug!(
        path = %dest.display(),
        duration_secs,
        size_bytes,
        "Artifact written"
    );

    Ok(ArtifactInfo {
        duration_secs,
        size_bytes,
    })
}

fn probe_blocking(path: &Path) -> Result<ArtifactInfo, AudioError> {
    let reader =
        hound::WavReader::open(path).map_err(|e| AudioError::ProbeFailed(e.to_string()))?;
    let spec = reader.spec();
    // duration() is per-channel sample count.
    let duration_secs = reader.duration() as f64 / spec.sample_rate as f64;
    let size_bytes = fs::metadata(path)?.len();

    Ok(ArtifactInfo {
        duration_secs,
        size_bytes,
    })
}

/// Decode WAV bytes into interleaved f32 samples in [-1, 1].
fn decode(audio: &[u8]) -> Result<(Vec<f32>, u32, u16), AudioError> {
    let reader = hound::WavReader::new(Cursor::new(audio))
        .map_err(|e| AudioError::DecodeFailed(e.to_string()))?;
    let spec = reader.spec();

    let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Float, 32) => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| AudioError::DecodeFailed(e.to_string()))?,
        (hound::SampleFormat::Int, 16) => reader
            .into_samples::<i16>()
            .map(|s| s.map(|v| v as f32 / -(i16::MIN as f32)))
            .collect::<Result<_, _>>()
            .map_err(|e| AudioError::DecodeFailed(e.to_string()))?,
        (hound::SampleFormat::Int, bits @ (24 | 32)) => {
            let scale = (1i64 << (bits - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .map_err(|e| AudioError::DecodeFailed(e.to_string()))?
        }
        (format, bits) => {
            return Err(AudioError::UnsupportedFormat {
                bits,
                format: format!("{:?}", format).to_lowercase(),
            })
        }
    };

    if samples.is_empty() {
        return Err(AudioError::Empty);
    }

    Ok((samples, spec.sample_rate, spec.channels))
}

/// Average interleaved channels down to mono.
fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let channels = channels as usize;
    samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Linear-interpolation resample.
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((samples.len() as f64 / ratio).round() as usize).max(1);

    (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = pos as usize;
            let frac = (pos - idx as f64) as f32;
            let a = samples[idx.min(samples.len() - 1)];
            let b = samples[(idx + 1).min(samples.len() - 1)];
            a + (b - a) * frac
        })
        .collect()
}

/// Scale so the loudest sample sits at the peak target. Silence is left
/// untouched.
fn normalize(mut samples: Vec<f32>) -> Vec<f32> {
    let peak = samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
    if peak > f32::EPSILON {
        let gain = PEAK_TARGET / peak;
        for sample in &mut samples {
            *sample *= gain;
        }
    }
    samples
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn wav_bytes_i16(channels: u16, sample_rate: u32, samples: &[i16]) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    fn wav_bytes_f32(channels: u16, sample_rate: u32, samples: &[f32]) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[tokio::test]
    async fn test_process_writes_mono_16bit_artifact() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("out.wav");
        let processor = WavProcessor::new(AudioConfig { sample_rate: 22050 });

        // One second of stereo at 44.1k.
        let samples: Vec<i16> = (0..44100 * 2).map(|i| ((i % 100) * 50) as i16).collect();
        let audio = wav_bytes_i16(2, 44100, &samples);

        let info = processor.process(audio, &dest).await.unwrap();
        assert!(info.size_bytes > 0);
        assert!((info.duration_secs - 1.0).abs() < 0.01);

        let reader = hound::WavReader::open(&dest).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 22050);
        assert_eq!(spec.bits_per_sample, 16);
    }

    #[tokio::test]
    async fn test_process_creates_parent_directory() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("wavs").join("0001.wav");
        let processor = WavProcessor::new(AudioConfig { sample_rate: 22050 });

        let audio = wav_bytes_i16(1, 22050, &[100i16; 2205]);
        processor.process(audio, &dest).await.unwrap();
        assert!(dest.exists());
    }

    #[tokio::test]
    async fn test_process_normalizes_quiet_audio() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("out.wav");
        let processor = WavProcessor::new(AudioConfig { sample_rate: 8000 });

        // Very quiet signal, loudest sample 500.
        let samples: Vec<i16> = (0..8000).map(|i| if i == 100 { 500 } else { 50 }).collect();
        let audio = wav_bytes_i16(1, 8000, &samples);
        processor.process(audio, &dest).await.unwrap();

        let reader = hound::WavReader::open(&dest).unwrap();
        let peak = reader
            .into_samples::<i16>()
            .map(|s| s.unwrap().unsigned_abs())
            .max()
            .unwrap();
        let expected = (PEAK_TARGET * i16::MAX as f32) as u16;
        assert!(peak.abs_diff(expected) <= 2, "peak {peak} vs {expected}");
    }

    #[tokio::test]
    async fn test_process_accepts_float_input() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("out.wav");
        let processor = WavProcessor::new(AudioConfig { sample_rate: 16000 });

        let samples: Vec<f32> = (0..16000).map(|i| (i as f32 * 0.01).sin() * 0.4).collect();
        let audio = wav_bytes_f32(1, 16000, &samples);

        let info = processor.process(audio, &dest).await.unwrap();
        assert!((info.duration_secs - 1.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_process_rejects_garbage() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("out.wav");
        let processor = WavProcessor::new(AudioConfig::default());

        let err = processor
            .process(b"definitely not audio".to_vec(), &dest)
            .await
            .unwrap_err();
        assert!(matches!(err, AudioError::DecodeFailed(_)));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_probe_reports_duration_and_size() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("out.wav");
        let processor = WavProcessor::new(AudioConfig { sample_rate: 22050 });

        let audio = wav_bytes_i16(1, 22050, &[200i16; 22050]);
        let written = processor.process(audio, &dest).await.unwrap();

        let probed = processor.probe(&dest).await.unwrap();
        assert!((probed.duration_secs - 1.0).abs() < 0.01);
        assert_eq!(probed.size_bytes, written.size_bytes);
    }

    #[tokio::test]
    async fn test_probe_missing_file() {
        let processor = WavProcessor::new(AudioConfig::default());
        let err = processor
            .probe(Path::new("/nonexistent/file.wav"))
            .await
            .unwrap_err();
        assert!(matches!(err, AudioError::ProbeFailed(_)));
    }

    #[test]
    fn test_downmix_averages_stereo() {
        let mono = downmix(&[1.0, 0.0, 0.5, 0.5, -1.0, 1.0], 2);
        assert_eq!(mono, vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn test_downmix_mono_passthrough() {
        let mono = downmix(&[0.1, 0.2, 0.3], 1);
        assert_eq!(mono, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_resample_same_rate_is_identity() {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(resample(&samples, 22050, 22050), samples);
    }

    #[test]
    fn test_resample_halves_length() {
        let samples: Vec<f32> = (0..1000).map(|i| i as f32 / 1000.0).collect();
        let out = resample(&samples, 44100, 22050);
        assert!((out.len() as i64 - 500).abs() <= 1);
    }

    #[test]
    fn test_normalize_scales_to_peak_target() {
        let out = normalize(vec![0.1, -0.2, 0.05]);
        let peak = out.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
        assert!((peak - PEAK_TARGET).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_leaves_silence_alone() {
        let out = normalize(vec![0.0, 0.0, 0.0]);
        assert_eq!(out, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_decode_empty_wav_rejected() {
        let audio = wav_bytes_i16(1, 22050, &[]);
        assert!(matches!(decode(&audio), Err(AudioError::Empty)));
    }
}
