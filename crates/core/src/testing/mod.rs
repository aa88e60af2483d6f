//! Testing utilities and mock implementations for E2E tests.
//!
//! This module provides mock implementations of the engine's collaborator
//! traits, allowing full lifecycle testing without a real synthesis service.
//!
//! # Example
//!
//! ```rust,ignore
//! use hibiki_core::testing::{MockProcessor, MockSynthesizer};
//!
//! let synthesizer = MockSynthesizer::new();
//! let processor = MockProcessor::new();
//!
//! // Configure mock behavior
//! synthesizer.fail_text("this line always fails").await;
//! processor.set_duration(2.5).await;
//!
//! // Wire into an Orchestrator...
//! ```

mod memory_store;
mod mock_processor;
mod mock_synthesizer;

pub use memory_store::MemoryLedgerStore;
pub use mock_processor::{MockProcessor, RecordedProcess};
pub use mock_synthesizer::MockSynthesizer;

use std::io::Cursor;

/// Build a valid in-memory mono 16-bit WAV with the given sample count.
pub fn fixture_wav(sample_rate: u32, samples: usize) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .expect("fixture wav spec is valid");
        for i in 0..samples {
            let value = ((i as f32 * 0.05).sin() * 8000.0) as i16;
            writer.write_sample(value).expect("fixture wav write");
        }
        writer.finalize().expect("fixture wav finalize");
    }
    cursor.into_inner()
}

/// A pipe-delimited source script of `lines` entries. Every fifth line is
/// exclaimed so it auto-detects as surprised; the rest detect as neutral.
pub fn fixture_source(lines: usize) -> String {
    (1..=lines)
        .map(|i| {
            if i % 5 == 0 {
                format!("{i:04}|What a twist!! Line {i} really lands!!")
            } else {
                format!("{i:04}|This is line number {i} of the script.")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
