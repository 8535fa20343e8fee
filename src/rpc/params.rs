//! Request parameter normalization.
//!
//! Clients send generation parameters under several spellings (`caption` or
//! `prompt`, `keyScale` or `key_scale`, ...) and sometimes as strings
//! (`"120"`, `"true"`). This module folds all of them into one canonical
//! [`GenerationRequest`] before the scheduler sees the request.
//!
//! Values are looked up in three places, first match wins: the top-level
//! params object, a nested `param_obj` object, then a nested metadata object
//! (`metas`, `meta`, `metadata`, `user_metadata`, `userMetadata`). Nested
//! objects may also arrive as JSON-encoded strings.

use serde_json::{Map, Value};

use crate::error::{DaemonError, Result};
use crate::types::{GenerationRequest, JobId};

/// Canonical name -> accepted spellings.
const PARAM_ALIASES: &[(&str, &[&str])] = &[
    ("caption", &["caption", "prompt"]),
    ("lyrics", &["lyrics"]),
    (
        "model",
        &["model", "model_name", "modelName", "dit_model", "ditModel"],
    ),
    ("key_scale", &["key_scale", "keyscale", "keyScale", "key"]),
    (
        "time_signature",
        &["time_signature", "timesignature", "timeSignature"],
    ),
    (
        "audio_duration",
        &[
            "audio_duration",
            "duration",
            "audioDuration",
            "target_duration",
            "targetDuration",
            "duration_sec",
        ],
    ),
    (
        "vocal_language",
        &["vocal_language", "vocalLanguage", "language"],
    ),
    ("bpm", &["bpm"]),
    ("inference_steps", &["inference_steps", "inferenceSteps", "steps"]),
    ("guidance_scale", &["guidance_scale", "guidanceScale"]),
    ("use_random_seed", &["use_random_seed", "useRandomSeed"]),
    ("seed", &["seed"]),
];

const METAS_KEYS: [&str; 5] = ["metas", "meta", "metadata", "user_metadata", "userMetadata"];

fn aliases(name: &str) -> &'static [&'static str] {
    PARAM_ALIASES
        .iter()
        .find(|(canonical, _)| *canonical == name)
        .map(|(_, spellings)| *spellings)
        .unwrap_or(&[])
}

/// Parses an object-or-JSON-string into an object. Anything else is empty.
fn parse_object(value: Option<&Value>) -> Map<String, Value> {
    match value {
        Some(Value::Object(map)) => map.clone(),
        Some(Value::String(s)) if !s.trim().is_empty() => {
            match serde_json::from_str::<Value>(s) {
                Ok(Value::Object(map)) => map,
                _ => Map::new(),
            }
        }
        _ => Map::new(),
    }
}

/// Looks up canonical parameters across the raw params and nested objects.
#[derive(Debug)]
pub struct RequestParser {
    sources: [Map<String, Value>; 3],
}

impl RequestParser {
    /// Builds a parser from the JSON-RPC `params` value.
    ///
    /// `null` is treated as an empty object; any other non-object is rejected.
    pub fn new(params: &Value) -> Result<Self> {
        let raw = match params {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            other => {
                return Err(DaemonError::invalid_params(format!(
                    "params must be an object, got {}",
                    type_name(other)
                )))
            }
        };
        let param_obj = parse_object(raw.get("param_obj"));
        let metas = METAS_KEYS
            .iter()
            .filter_map(|key| raw.get(*key))
            .find(|v| is_present(v))
            .map(|v| parse_object(Some(v)))
            .unwrap_or_default();

        Ok(Self {
            sources: [raw, param_obj, metas],
        })
    }

    /// First non-null value for a canonical name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        let spellings = aliases(name);
        self.sources.iter().find_map(|source| {
            spellings
                .iter()
                .find_map(|alias| source.get(*alias).filter(|v| !v.is_null()))
        })
    }

    /// String value; numbers and booleans are stringified.
    pub fn string(&self, name: &str) -> Option<String> {
        match self.get(name)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Integer value. Accepts JSON integers, integral floats and numeric
    /// strings; a blank string counts as absent.
    pub fn int(&self, name: &str) -> Result<Option<i64>> {
        let Some(value) = self.get(name) else {
            return Ok(None);
        };
        let parsed = match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
            Value::String(s) if s.trim().is_empty() => return Ok(None),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        parsed
            .map(Some)
            .ok_or_else(|| invalid_type(name, "an integer", value))
    }

    /// Seed value over the full `u64` range. Negative seeds come back as
    /// `None`, which means "pick one at random".
    pub fn seed(&self) -> Result<Option<u64>> {
        let Some(value) = self.get("seed") else {
            return Ok(None);
        };
        let parsed = match value {
            Value::Number(n) => n.as_u64().map(Some).or_else(|| {
                n.as_i64()
                    .map(|_| None)
                    .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(float_seed))
            }),
            Value::String(s) if s.trim().is_empty() => return Ok(None),
            Value::String(s) => {
                let s = s.trim();
                s.parse::<u64>()
                    .map(Some)
                    .ok()
                    .or_else(|| s.parse::<i64>().ok().map(|_| None))
            }
            _ => None,
        };
        parsed.ok_or_else(|| invalid_type("seed", "an integer", value))
    }

    /// Float value. Accepts JSON numbers and numeric strings; a blank string
    /// counts as absent.
    pub fn float(&self, name: &str) -> Result<Option<f64>> {
        let Some(value) = self.get(name) else {
            return Ok(None);
        };
        let parsed = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) if s.trim().is_empty() => return Ok(None),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        parsed
            .filter(|f| f.is_finite())
            .map(Some)
            .ok_or_else(|| invalid_type(name, "a number", value))
    }

    /// Boolean value. `1`, `true`, `yes`, `y` and `on` (any case) are true;
    /// other present values are false.
    pub fn bool(&self, name: &str) -> bool {
        match self.get(name) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
            Some(Value::String(s)) => matches!(
                s.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "y" | "on"
            ),
            _ => false,
        }
    }

    /// Folds the parsed values into a canonical request.
    pub fn into_request(self) -> Result<GenerationRequest> {
        let bpm = self
            .int("bpm")?
            .map(|v| to_u32("bpm", v))
            .transpose()?;
        let inference_steps = self
            .int("inference_steps")?
            .map(|v| to_u32("inference_steps", v))
            .transpose()?;

        // A negative seed or `use_random_seed` asks for a random one.
        let seed = if self.bool("use_random_seed") {
            None
        } else {
            self.seed()?
        };

        Ok(GenerationRequest {
            caption: self.string("caption"),
            lyrics: self.string("lyrics"),
            model: self.string("model"),
            duration_sec: self.float("audio_duration")?.map(|v| v as f32),
            bpm,
            key_scale: self.string("key_scale"),
            time_signature: self.string("time_signature"),
            vocal_language: self.string("vocal_language"),
            inference_steps,
            guidance_scale: self.float("guidance_scale")?.map(|v| v as f32),
            seed,
        })
    }
}

/// Normalizes JSON-RPC `params` into a [`GenerationRequest`].
pub fn parse_generation_request(params: &Value) -> Result<GenerationRequest> {
    RequestParser::new(params)?.into_request()
}

/// Extracts job ids from `job_id` / `task_id` or a `job_ids` / `task_id_list`
/// list. The list may be a JSON array or a JSON-encoded string.
///
/// Returns the ids and whether the caller asked for a list.
pub fn parse_job_ids(params: &Value) -> Result<(Vec<JobId>, bool)> {
    let Value::Object(map) = params else {
        return Err(DaemonError::invalid_params("params must be an object"));
    };

    if let Some(single) = ["job_id", "task_id", "jobId", "taskId"]
        .iter()
        .find_map(|k| map.get(*k).filter(|v| !v.is_null()))
    {
        return Ok((vec![parse_job_id(single)?], false));
    }

    let list = ["job_ids", "task_id_list", "jobIds", "taskIdList"]
        .iter()
        .find_map(|k| map.get(*k).filter(|v| !v.is_null()))
        .ok_or_else(|| DaemonError::invalid_params("job_id or job_ids is required"))?;

    let items = match list {
        Value::Array(items) => items.clone(),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Array(items)) => items,
            _ => {
                return Err(DaemonError::invalid_params(
                    "job_ids must be a list of job ids",
                ))
            }
        },
        _ => {
            return Err(DaemonError::invalid_params(
                "job_ids must be a list of job ids",
            ))
        }
    };

    let ids = items.iter().map(parse_job_id).collect::<Result<Vec<_>>>()?;
    Ok((ids, true))
}

fn parse_job_id(value: &Value) -> Result<JobId> {
    let text = value
        .as_str()
        .ok_or_else(|| DaemonError::invalid_params("job id must be a string"))?;
    text.parse::<JobId>()
        .map_err(|_| DaemonError::invalid_params(format!("Malformed job id: {}", text)))
}

fn float_seed(value: f64) -> Option<u64> {
    (value >= 0.0).then_some(value as u64)
}

fn to_u32(name: &str, value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| {
        DaemonError::invalid_params(format!("{} out of range: {}", name, value))
    })
}

fn invalid_type(name: &str, expected: &str, value: &Value) -> DaemonError {
    DaemonError::invalid_params(format!(
        "{} must be {}, got {}",
        name, expected, value
    ))
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Object(m) => !m.is_empty(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
