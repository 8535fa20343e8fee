//! Scheduler configuration module.
//!
//! Contains the immutable runtime configuration for the scheduler: queue
//! capacity, worker count, ETA tuning, job retention, request defaults and the
//! model slots to load.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::scheduler::eta::{DEFAULT_AVG_WINDOW, DEFAULT_INITIAL_AVG_SECONDS};
use crate::types::params::{
    MAX_DURATION_SEC, MAX_GUIDANCE_SCALE, MAX_INFERENCE_STEPS, MIN_DURATION_SEC,
    MIN_GUIDANCE_SCALE,
};
use crate::types::GenerationDefaults;

/// Default maximum number of pending jobs.
pub const DEFAULT_QUEUE_CAPACITY: usize = 200;

/// Default number of worker threads.
pub const DEFAULT_WORKERS: usize = 1;

/// Upper bound on worker threads.
pub const MAX_WORKERS: usize = 64;

/// Default age after which finished jobs are evicted.
pub const DEFAULT_JOB_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Default interval between retention sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Environment variables naming the primary, secondary and tertiary model slots.
pub const MODEL_SLOT_VARS: [&str; 3] = ["LOFI_MODEL", "LOFI_MODEL2", "LOFI_MODEL3"];

/// How long finished jobs stay queryable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Terminal jobs older than this are evicted.
    pub max_age: Duration,
    /// How often the sweeper runs.
    pub sweep_interval: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_age: DEFAULT_JOB_MAX_AGE,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// Runtime configuration for the scheduler.
///
/// Built once at startup, from defaults, environment variables and CLI
/// flags, then handed to `Scheduler::new` by value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum number of jobs waiting in the queue.
    pub queue_capacity: usize,

    /// Number of worker threads, i.e. jobs that may run at once.
    pub workers: usize,

    /// Average job duration assumed before any job has finished.
    pub initial_avg_job_seconds: f64,

    /// Number of recent job durations averaged for ETAs.
    pub avg_window: usize,

    /// Finished-job retention.
    pub retention: RetentionPolicy,

    /// Defaults merged into every request.
    pub defaults: GenerationDefaults,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            workers: DEFAULT_WORKERS,
            initial_avg_job_seconds: DEFAULT_INITIAL_AVG_SECONDS,
            avg_window: DEFAULT_AVG_WINDOW,
            retention: RetentionPolicy::default(),
            defaults: GenerationDefaults::default(),
        }
    }
}

impl SchedulerConfig {
    /// Creates a SchedulerConfig with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a SchedulerConfig from environment variables.
    ///
    /// Reads the following environment variables:
    /// - `LOFI_QUEUE_MAXSIZE` - Maximum pending jobs
    /// - `LOFI_QUEUE_WORKERS` - Number of worker threads
    /// - `LOFI_AVG_JOB_SECONDS` - Initial average job duration
    /// - `LOFI_AVG_WINDOW` - Number of durations in the ETA average
    /// - `LOFI_JOB_MAX_AGE_SECS` - Retention age for finished jobs
    /// - `LOFI_JOB_SWEEP_SECS` - Retention sweep interval
    /// - `LOFI_DEFAULT_DURATION` - Default audio duration in seconds
    /// - `LOFI_DEFAULT_STEPS` - Default inference steps
    /// - `LOFI_DEFAULT_GUIDANCE` - Default guidance scale
    ///
    /// Unset or invalid values keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reads values through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(capacity) = parse_var::<usize>(&lookup, "LOFI_QUEUE_MAXSIZE") {
            if capacity > 0 {
                config.queue_capacity = capacity;
            }
        }

        if let Some(workers) = parse_var::<usize>(&lookup, "LOFI_QUEUE_WORKERS") {
            if (1..=MAX_WORKERS).contains(&workers) {
                config.workers = workers;
            }
        }

        if let Some(avg) = parse_var::<f64>(&lookup, "LOFI_AVG_JOB_SECONDS") {
            if avg.is_finite() && avg >= 0.0 {
                config.initial_avg_job_seconds = avg;
            }
        }

        if let Some(window) = parse_var::<usize>(&lookup, "LOFI_AVG_WINDOW") {
            if window > 0 {
                config.avg_window = window;
            }
        }

        if let Some(secs) = parse_var::<u64>(&lookup, "LOFI_JOB_MAX_AGE_SECS") {
            config.retention.max_age = Duration::from_secs(secs);
        }

        if let Some(secs) = parse_var::<u64>(&lookup, "LOFI_JOB_SWEEP_SECS") {
            if secs > 0 {
                config.retention.sweep_interval = Duration::from_secs(secs);
            }
        }

        if let Some(duration) = parse_var::<f32>(&lookup, "LOFI_DEFAULT_DURATION") {
            if (MIN_DURATION_SEC..=MAX_DURATION_SEC).contains(&duration) {
                config.defaults.duration_sec = duration;
            }
        }

        if let Some(steps) = parse_var::<u32>(&lookup, "LOFI_DEFAULT_STEPS") {
            if steps > 0 && steps <= MAX_INFERENCE_STEPS {
                config.defaults.inference_steps = steps;
            }
        }

        if let Some(guidance) = parse_var::<f32>(&lookup, "LOFI_DEFAULT_GUIDANCE") {
            if (MIN_GUIDANCE_SCALE..=MAX_GUIDANCE_SCALE).contains(&guidance) {
                config.defaults.guidance_scale = guidance;
            }
        }

        config
    }

    /// Validates the configuration.
    ///
    /// Returns an error message if validation fails, None otherwise.
    pub fn validate(&self) -> Option<String> {
        if self.queue_capacity == 0 {
            return Some("queue_capacity must be > 0".to_string());
        }
        if self.workers == 0 {
            return Some("workers must be > 0".to_string());
        }
        if self.workers > MAX_WORKERS {
            return Some(format!(
                "workers too high: {} (max {})",
                self.workers, MAX_WORKERS
            ));
        }
        if self.avg_window == 0 {
            return Some("avg_window must be > 0".to_string());
        }
        if !self.initial_avg_job_seconds.is_finite() || self.initial_avg_job_seconds < 0.0 {
            return Some(format!(
                "initial_avg_job_seconds must be a non-negative number, got {}",
                self.initial_avg_job_seconds
            ));
        }
        if self.retention.sweep_interval.is_zero() {
            return Some("retention sweep_interval must be > 0".to_string());
        }
        if !(MIN_DURATION_SEC..=MAX_DURATION_SEC).contains(&self.defaults.duration_sec) {
            return Some(format!(
                "default duration {} outside {}..={}",
                self.defaults.duration_sec, MIN_DURATION_SEC, MAX_DURATION_SEC
            ));
        }
        if self.defaults.inference_steps == 0 || self.defaults.inference_steps > MAX_INFERENCE_STEPS
        {
            return Some(format!(
                "default inference_steps {} outside 1..={}",
                self.defaults.inference_steps, MAX_INFERENCE_STEPS
            ));
        }
        if !(MIN_GUIDANCE_SCALE..=MAX_GUIDANCE_SCALE).contains(&self.defaults.guidance_scale) {
            return Some(format!(
                "default guidance_scale {} outside {}..={}",
                self.defaults.guidance_scale, MIN_GUIDANCE_SCALE, MAX_GUIDANCE_SCALE
            ));
        }

        None
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse::<T>().ok())
}

/// Which generator backs a model slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum BackendSpec {
    /// Built-in seeded WAV renderer.
    Preview,
    /// External program, given as a whitespace-separated command line.
    Command { command_line: String },
}

/// One configured model slot.
///
/// Written as `NAME` for a preview backend or `NAME=COMMAND LINE` for an
/// external program, e.g. `acestep-v15-base=python render.py --fp16`.
/// A `NAME` that looks like a path is shortened to its last component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSlot {
    pub name: String,
    pub backend: BackendSpec,
}

impl FromStr for ModelSlot {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, command) = match s.split_once('=') {
            Some((name, command)) => (name, Some(command.trim())),
            None => (s, None),
        };

        let name = crate::models::model_name_from_path(name);
        if name.is_empty() {
            return Err(format!("model slot '{}' has no name", s));
        }

        let backend = match command {
            None => BackendSpec::Preview,
            Some("") => return Err(format!("model slot '{}' has an empty command", s)),
            Some(cmd) if cmd.eq_ignore_ascii_case("preview") => BackendSpec::Preview,
            Some(cmd) => BackendSpec::Command {
                command_line: cmd.to_string(),
            },
        };

        Ok(Self { name, backend })
    }
}

/// Reads model slots from `LOFI_MODEL`, `LOFI_MODEL2` and `LOFI_MODEL3`.
///
/// Unset or blank variables are skipped; malformed ones are reported.
pub fn model_slots_from_env() -> Result<Vec<ModelSlot>, String> {
    model_slots_from_lookup(|key| std::env::var(key).ok())
}

/// Same as [`model_slots_from_env`] but reads values through `lookup`.
pub fn model_slots_from_lookup(
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Vec<ModelSlot>, String> {
    MODEL_SLOT_VARS
        .iter()
        .filter_map(|key| lookup(key).filter(|v| !v.trim().is_empty()))
        .map(|value| value.parse::<ModelSlot>())
        .collect()
}

/// Returns the platform-specific default directory for preview renders.
///
/// Uses the `directories` crate to find appropriate locations:
/// - macOS: ~/Library/Caches/lofi.nvim/previews
/// - Linux: ~/.cache/lofi.nvim/previews
/// - Windows: C:\Users\<user>\AppData\Local\lofi.nvim\cache\previews
pub fn default_output_dir() -> PathBuf {
    if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "lofi.nvim") {
        proj_dirs.cache_dir().join("previews")
    } else {
        // Fallback to current directory
        PathBuf::from("./previews")
    }
}
