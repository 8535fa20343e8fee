//! Audio output module.
//!
//! Provides WAV file writing for rendered audio.

pub mod wav;

pub use wav::{duration_to_samples, samples_to_duration, write_wav, CHANNELS, SAMPLE_RATE};
