//! WAV file writer for rendered audio.
//!
//! Writes interleaved-stereo 16-bit PCM using the hound crate.

use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};

/// Sample rate of preview renders.
pub const SAMPLE_RATE: u32 = 22050;

/// Number of audio channels (stereo).
pub const CHANNELS: u16 = 2;

fn spec(sample_rate: u32) -> WavSpec {
    WavSpec {
        channels: CHANNELS,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

fn to_pcm(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Writes mono samples to a stereo WAV file.
///
/// Samples are clamped to [-1.0, 1.0] and duplicated to both channels.
pub fn write_wav(samples: &[f32], path: &Path, sample_rate: u32) -> hound::Result<()> {
    let mut writer = WavWriter::create(path, spec(sample_rate))?;
    for sample in samples {
        let pcm = to_pcm(*sample);
        writer.write_sample(pcm)?;
        writer.write_sample(pcm)?;
    }
    writer.finalize()
}

/// Calculates the duration of audio in seconds from sample count.
pub fn samples_to_duration(sample_count: usize, sample_rate: u32) -> f32 {
    sample_count as f32 / sample_rate as f32
}

/// Number of mono samples needed for `duration_sec` seconds.
pub fn duration_to_samples(duration_sec: f32, sample_rate: u32) -> usize {
    (duration_sec.max(0.0) * sample_rate as f32).round() as usize
}
