//! Results returned by generation backends.

use serde::{Deserialize, Serialize};

/// Metadata detected or used for a finished render.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackMetas {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bpm: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_scale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_sec: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genres: Option<String>,
}

/// Output of one successful generation.
///
/// The scheduler stores this as-is and passes it through unchanged;
/// `audio_paths` are opaque references owned by the backend's storage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOutput {
    /// References to the generated audio artifacts.
    #[serde(default)]
    pub audio_paths: Vec<String>,

    /// Detected musical metadata.
    #[serde(default)]
    pub metas: TrackMetas,

    /// Seed the backend actually used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Name of the model that produced the output. Filled in by the worker
    /// when the backend leaves it unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Free-form backend notes (timings, sampler settings).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_info: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_parses_minimal_json() {
        let output: GenerationOutput =
            serde_json::from_str(r#"{"audio_paths":["/tmp/a.wav"]}"#).unwrap();
        assert_eq!(output.audio_paths, vec!["/tmp/a.wav".to_string()]);
        assert_eq!(output.metas, TrackMetas::default());
        assert!(output.model.is_none());
    }

    #[test]
    fn output_skips_unset_metas() {
        let output = GenerationOutput {
            audio_paths: vec!["a.wav".to_string()],
            metas: TrackMetas {
                bpm: Some(90),
                ..Default::default()
            },
            ..Default::default()
        };
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["metas"]["bpm"], 90);
        assert!(json["metas"].get("key_scale").is_none());
        assert!(json.get("seed").is_none());
    }
}
