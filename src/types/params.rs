//! Generation request parameters.
//!
//! A [`GenerationRequest`] is what a client sent, after alias normalization
//! at the transport boundary. [`GenerationDefaults::merge`] turns it into the
//! canonical [`GenerationParams`] that a job owns for its whole lifetime.

use serde::{Deserialize, Serialize};

use crate::error::{DaemonError, Result};

/// Maximum caption length in characters.
pub const MAX_CAPTION_CHARS: usize = 1000;

/// Maximum lyrics length in characters.
pub const MAX_LYRICS_CHARS: usize = 8192;

/// Supported audio duration range in seconds.
pub const MIN_DURATION_SEC: f32 = 5.0;
pub const MAX_DURATION_SEC: f32 = 600.0;

/// Supported diffusion step range.
pub const MAX_INFERENCE_STEPS: u32 = 200;

/// Supported classifier-free guidance range.
pub const MIN_GUIDANCE_SCALE: f32 = 1.0;
pub const MAX_GUIDANCE_SCALE: f32 = 20.0;

/// Supported tempo range in beats per minute.
pub const MIN_BPM: u32 = 30;
pub const MAX_BPM: u32 = 300;

/// A client request with every field optional.
///
/// Fields left unset fall back to [`GenerationDefaults`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub caption: Option<String>,
    pub lyrics: Option<String>,
    pub model: Option<String>,
    pub duration_sec: Option<f32>,
    pub bpm: Option<u32>,
    pub key_scale: Option<String>,
    pub time_signature: Option<String>,
    pub vocal_language: Option<String>,
    pub inference_steps: Option<u32>,
    pub guidance_scale: Option<f32>,
    pub seed: Option<u64>,
}

/// Canonical, immutable parameters for one generation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Text description of the music (style, instruments, mood).
    pub caption: String,

    /// Lyrics; empty for instrumentals.
    pub lyrics: String,

    /// Requested model name. `None` routes to the registry default.
    pub model: Option<String>,

    /// Target audio duration in seconds.
    pub duration_sec: f32,

    /// Target tempo, when the client pins one.
    pub bpm: Option<u32>,

    /// Musical key, e.g. "C major".
    pub key_scale: Option<String>,

    /// Time signature, e.g. "4".
    pub time_signature: Option<String>,

    /// Vocal language code.
    pub vocal_language: String,

    /// Number of diffusion steps.
    pub inference_steps: u32,

    /// Classifier-free guidance scale.
    pub guidance_scale: f32,

    /// Seed used for the render. Always resolved, never random at run time.
    pub seed: u64,
}

impl GenerationParams {
    /// Checks structural well-formedness.
    ///
    /// Semantic checks (is this caption musical, does the key exist) belong to
    /// the generation backend.
    pub fn validate(&self) -> Result<()> {
        if self.caption.trim().is_empty() && self.lyrics.trim().is_empty() {
            return Err(DaemonError::invalid_params(
                "Either caption or lyrics must be provided",
            ));
        }

        let caption_chars = self.caption.chars().count();
        if caption_chars > MAX_CAPTION_CHARS {
            return Err(DaemonError::invalid_params(format!(
                "Caption too long: {} characters (max {})",
                caption_chars, MAX_CAPTION_CHARS
            )));
        }

        let lyrics_chars = self.lyrics.chars().count();
        if lyrics_chars > MAX_LYRICS_CHARS {
            return Err(DaemonError::invalid_params(format!(
                "Lyrics too long: {} characters (max {})",
                lyrics_chars, MAX_LYRICS_CHARS
            )));
        }

        if let Some(model) = &self.model {
            if model.trim().is_empty() {
                return Err(DaemonError::invalid_params("Model name cannot be blank"));
            }
        }

        if !self.duration_sec.is_finite()
            || !(MIN_DURATION_SEC..=MAX_DURATION_SEC).contains(&self.duration_sec)
        {
            return Err(DaemonError::invalid_params(format!(
                "Invalid duration: {} seconds (must be between {} and {})",
                self.duration_sec, MIN_DURATION_SEC, MAX_DURATION_SEC
            )));
        }

        if let Some(bpm) = self.bpm {
            if !(MIN_BPM..=MAX_BPM).contains(&bpm) {
                return Err(DaemonError::invalid_params(format!(
                    "Invalid bpm: {} (must be between {} and {})",
                    bpm, MIN_BPM, MAX_BPM
                )));
            }
        }

        if self.inference_steps == 0 || self.inference_steps > MAX_INFERENCE_STEPS {
            return Err(DaemonError::invalid_params(format!(
                "Invalid inference_steps: {} (must be between 1 and {})",
                self.inference_steps, MAX_INFERENCE_STEPS
            )));
        }

        if !self.guidance_scale.is_finite()
            || !(MIN_GUIDANCE_SCALE..=MAX_GUIDANCE_SCALE).contains(&self.guidance_scale)
        {
            return Err(DaemonError::invalid_params(format!(
                "Invalid guidance_scale: {} (must be between {} and {})",
                self.guidance_scale, MIN_GUIDANCE_SCALE, MAX_GUIDANCE_SCALE
            )));
        }

        Ok(())
    }
}

/// Server-side defaults applied to every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationDefaults {
    pub duration_sec: f32,
    pub inference_steps: u32,
    pub guidance_scale: f32,
    pub vocal_language: String,
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self {
            duration_sec: 30.0,
            inference_steps: 8,
            guidance_scale: 7.0,
            vocal_language: "en".to_string(),
        }
    }
}

impl GenerationDefaults {
    /// Builds canonical params from a request. Request fields win over defaults.
    ///
    /// Blank strings count as unset, and an unset seed is drawn at random here
    /// so the job records the seed it will actually run with.
    pub fn merge(&self, request: GenerationRequest) -> GenerationParams {
        GenerationParams {
            caption: request.caption.unwrap_or_default(),
            lyrics: request.lyrics.unwrap_or_default(),
            model: non_blank(request.model),
            duration_sec: request.duration_sec.unwrap_or(self.duration_sec),
            bpm: request.bpm,
            key_scale: non_blank(request.key_scale),
            time_signature: non_blank(request.time_signature),
            vocal_language: non_blank(request.vocal_language)
                .unwrap_or_else(|| self.vocal_language.clone()),
            inference_steps: request.inference_steps.unwrap_or(self.inference_steps),
            guidance_scale: request.guidance_scale.unwrap_or(self.guidance_scale),
            seed: request.seed.unwrap_or_else(rand::random),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(caption: &str) -> GenerationRequest {
        GenerationRequest {
            caption: Some(caption.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn merge_uses_defaults_for_unset_fields() {
        let defaults = GenerationDefaults::default();
        let params = defaults.merge(request("lofi piano"));
        assert_eq!(params.caption, "lofi piano");
        assert_eq!(params.duration_sec, 30.0);
        assert_eq!(params.inference_steps, 8);
        assert_eq!(params.guidance_scale, 7.0);
        assert_eq!(params.vocal_language, "en");
        assert!(params.model.is_none());
    }

    #[test]
    fn merge_request_fields_win() {
        let defaults = GenerationDefaults::default();
        let params = defaults.merge(GenerationRequest {
            caption: Some("jazz".to_string()),
            model: Some("acestep-v15-base".to_string()),
            duration_sec: Some(90.0),
            inference_steps: Some(50),
            guidance_scale: Some(12.0),
            vocal_language: Some("ja".to_string()),
            seed: Some(7),
            ..Default::default()
        });
        assert_eq!(params.model.as_deref(), Some("acestep-v15-base"));
        assert_eq!(params.duration_sec, 90.0);
        assert_eq!(params.inference_steps, 50);
        assert_eq!(params.guidance_scale, 12.0);
        assert_eq!(params.vocal_language, "ja");
        assert_eq!(params.seed, 7);
    }

    #[test]
    fn merge_treats_blank_model_as_default() {
        let params = GenerationDefaults::default().merge(GenerationRequest {
            caption: Some("ambient".to_string()),
            model: Some("   ".to_string()),
            ..Default::default()
        });
        assert!(params.model.is_none());
    }

    #[test]
    fn validate_accepts_defaults() {
        let params = GenerationDefaults::default().merge(request("lofi hip hop"));
        assert!(params.validate().is_ok());
    }

    #[test]
    fn validate_accepts_lyrics_without_caption() {
        let params = GenerationDefaults::default().merge(GenerationRequest {
            lyrics: Some("[verse]\nla la la".to_string()),
            ..Default::default()
        });
        assert!(params.validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_request() {
        let params = GenerationDefaults::default().merge(GenerationRequest::default());
        let err = params.validate().unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::InvalidParams);
    }

    #[test]
    fn validate_rejects_out_of_range_values() {
        let defaults = GenerationDefaults::default();

        let mut params = defaults.merge(request("x"));
        params.duration_sec = 1.0;
        assert!(params.validate().is_err());

        let mut params = defaults.merge(request("x"));
        params.duration_sec = f32::NAN;
        assert!(params.validate().is_err());

        let mut params = defaults.merge(request("x"));
        params.inference_steps = 0;
        assert!(params.validate().is_err());

        let mut params = defaults.merge(request("x"));
        params.guidance_scale = 50.0;
        assert!(params.validate().is_err());

        let mut params = defaults.merge(request("x"));
        params.bpm = Some(10);
        assert!(params.validate().is_err());

        let params = defaults.merge(request(&"x".repeat(MAX_CAPTION_CHARS + 1)));
        assert!(params.validate().is_err());
    }
}
