//! Built-in preview backend.
//!
//! Renders a short seeded chord loop instead of running a diffusion model.
//! It has no weights to load, so it is useful for wiring up an editor client
//! and for exercising the scheduler end to end. The same seed and parameters
//! always produce the same samples.

use std::f32::consts::TAU;
use std::fs;
use std::path::{Path, PathBuf};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::audio::{duration_to_samples, samples_to_duration, write_wav, SAMPLE_RATE};
use crate::types::{GenerationOutput, GenerationParams, TrackMetas};

use super::backend::{GenerationError, Generator};

/// Tempo range used when the request does not pin one.
const MIN_PREVIEW_BPM: u32 = 70;
const MAX_PREVIEW_BPM: u32 = 90;

const KEYS: [(&str, f32); 6] = [
    ("C major", 261.63),
    ("D minor", 293.66),
    ("E minor", 329.63),
    ("F major", 349.23),
    ("G major", 392.00),
    ("A minor", 440.00),
];

/// Scale-degree offsets in semitones for a I-vi-IV-V style loop.
const PROGRESSIONS: [[i32; 4]; 3] = [[0, 9, 5, 7], [0, 5, 9, 7], [0, 7, 9, 5]];

/// Generator that writes seeded WAV previews to a directory.
#[derive(Debug, Clone)]
pub struct PreviewGenerator {
    output_dir: PathBuf,
}

impl PreviewGenerator {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

impl Generator for PreviewGenerator {
    fn kind(&self) -> &'static str {
        "preview"
    }

    fn generate(&self, params: &GenerationParams) -> Result<GenerationOutput, GenerationError> {
        fs::create_dir_all(&self.output_dir)?;

        let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
        let bpm = params
            .bpm
            .unwrap_or_else(|| rng.gen_range(MIN_PREVIEW_BPM..=MAX_PREVIEW_BPM));
        let (key_name, root_hz) = match &params.key_scale {
            Some(key) => (key.clone(), root_for_key(key)),
            None => {
                let (name, hz) = KEYS[rng.gen_range(0..KEYS.len())];
                (name.to_string(), hz)
            }
        };
        let progression = PROGRESSIONS[rng.gen_range(0..PROGRESSIONS.len())];

        let samples = render_loop(&mut rng, params.duration_sec, bpm, root_hz, &progression);

        let path = self.output_dir.join(format!(
            "lofi-{:016x}-{}.wav",
            params.seed,
            uuid::Uuid::new_v4().simple()
        ));
        write_wav(&samples, &path, SAMPLE_RATE)
            .map_err(|e| GenerationError::Failed(format!("failed to write WAV: {}", e)))?;

        Ok(GenerationOutput {
            audio_paths: vec![path.to_string_lossy().to_string()],
            metas: TrackMetas {
                bpm: Some(bpm),
                key_scale: Some(key_name),
                time_signature: Some(
                    params
                        .time_signature
                        .clone()
                        .unwrap_or_else(|| "4".to_string()),
                ),
                duration_sec: Some(samples_to_duration(samples.len(), SAMPLE_RATE)),
                genres: Some("lofi".to_string()),
            },
            seed: Some(params.seed),
            model: params.model.clone(),
            generation_info: Some(format!(
                "preview render: {} Hz, {} bpm, progression {:?}",
                SAMPLE_RATE, bpm, progression
            )),
        })
    }
}

/// Root frequency for a key name such as "F# minor". Unknown names fall
/// back to A.
fn root_for_key(key: &str) -> f32 {
    let note = key.split_whitespace().next().unwrap_or("A");
    let semitone = match note.to_ascii_uppercase().as_str() {
        "C" => -9,
        "C#" | "DB" => -8,
        "D" => -7,
        "D#" | "EB" => -6,
        "E" => -5,
        "F" => -4,
        "F#" | "GB" => -3,
        "G" => -2,
        "G#" | "AB" => -1,
        "A#" | "BB" => 1,
        "B" => 2,
        _ => 0,
    };
    440.0 * 2f32.powf(semitone as f32 / 12.0)
}

fn render_loop(
    rng: &mut ChaCha8Rng,
    duration_sec: f32,
    bpm: u32,
    root_hz: f32,
    progression: &[i32; 4],
) -> Vec<f32> {
    let total = duration_to_samples(duration_sec, SAMPLE_RATE);
    let sample_rate = SAMPLE_RATE as f32;
    // One chord per 4/4 bar.
    let bar_samples = ((60.0 / bpm.max(1) as f32) * 4.0 * sample_rate).max(1.0) as usize;

    let mut samples = Vec::with_capacity(total);
    for i in 0..total {
        let bar = i / bar_samples;
        let pos_in_bar = (i % bar_samples) as f32 / bar_samples as f32;
        let degree = progression[bar % progression.len()];
        // Drop an octave so the pad sits under a vocal.
        let chord_root = root_hz * 0.5 * 2f32.powf(degree as f32 / 12.0);
        let t = i as f32 / sample_rate;

        let mut pad = 0.0;
        for interval in [0, 4, 7] {
            let hz = chord_root * 2f32.powf(interval as f32 / 12.0);
            pad += (TAU * hz * t).sin();
        }
        let envelope = (1.0 - pos_in_bar).powf(0.5);
        let crackle = if rng.gen_bool(0.0005) {
            rng.gen_range(-0.3..0.3)
        } else {
            rng.gen_range(-0.01..0.01)
        };
        samples.push(pad / 3.0 * 0.4 * envelope + crackle);
    }
    samples
}
