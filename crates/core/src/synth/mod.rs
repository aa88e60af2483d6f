//! Speech synthesis backends.
//!
//! This module provides the `Synthesizer` trait and the HTTP implementation
//! that talks to an external text-to-speech service. The engine only ever
//! sees the trait, so tests swap in a scripted synthesizer.

mod error;
mod http;
mod traits;

pub use error::SynthesisError;
pub use http::HttpSynthesizer;
pub use traits::{SynthesisRequest, Synthesizer};
