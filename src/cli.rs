//! Command-line interface.
//!
//! Every flag is optional and overrides the matching environment variable
//! read by [`SchedulerConfig::from_env`].

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::config::{
    default_output_dir, model_slots_from_env, ModelSlot, SchedulerConfig, MAX_WORKERS,
    MODEL_SLOT_VARS,
};

/// Model slot used when neither `--model` nor `LOFI_MODEL*` names one.
pub const FALLBACK_MODEL: &str = "lofi-preview";

/// lofi-scheduler: bounded job queue for music generation backends
#[derive(Parser, Debug)]
#[command(name = "lofi-scheduler")]
#[command(about = "Queues music generation jobs and serves JSON-RPC over stdio")]
#[command(version)]
pub struct Cli {
    /// Maximum number of pending jobs [env: LOFI_QUEUE_MAXSIZE]
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub queue_capacity: Option<u64>,

    /// Number of worker threads [env: LOFI_QUEUE_WORKERS]
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..=MAX_WORKERS as u64))]
    pub workers: Option<u64>,

    /// Average job duration assumed before any job finishes [env: LOFI_AVG_JOB_SECONDS]
    #[arg(long)]
    pub avg_job_seconds: Option<f64>,

    /// Number of recent durations in the ETA average [env: LOFI_AVG_WINDOW]
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub avg_window: Option<u64>,

    /// Seconds a finished job stays queryable [env: LOFI_JOB_MAX_AGE_SECS]
    #[arg(long)]
    pub job_max_age_secs: Option<u64>,

    /// Seconds between retention sweeps [env: LOFI_JOB_SWEEP_SECS]
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub sweep_secs: Option<u64>,

    /// Model slot, NAME or NAME=COMMAND LINE; repeat for up to three. The
    /// first is the default [env: LOFI_MODEL, LOFI_MODEL2, LOFI_MODEL3]
    #[arg(short, long = "model", value_name = "SLOT")]
    pub models: Vec<ModelSlot>,

    /// Directory for preview renders
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Log filter, e.g. "info" or "lofi_scheduler=debug" [env: LOFI_LOG]
    #[arg(long)]
    pub log: Option<String>,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Environment config with CLI flags applied on top.
    pub fn scheduler_config(&self) -> SchedulerConfig {
        let mut config = SchedulerConfig::from_env();
        self.apply(&mut config);
        config
    }

    /// Overrides `config` with every flag that was given.
    pub fn apply(&self, config: &mut SchedulerConfig) {
        if let Some(capacity) = self.queue_capacity {
            config.queue_capacity = capacity as usize;
        }
        if let Some(workers) = self.workers {
            config.workers = workers as usize;
        }
        if let Some(avg) = self.avg_job_seconds {
            config.initial_avg_job_seconds = avg;
        }
        if let Some(window) = self.avg_window {
            config.avg_window = window as usize;
        }
        if let Some(secs) = self.job_max_age_secs {
            config.retention.max_age = Duration::from_secs(secs);
        }
        if let Some(secs) = self.sweep_secs {
            config.retention.sweep_interval = Duration::from_secs(secs);
        }
    }

    /// Model slots from `--model`, else from the environment, else a single
    /// preview slot. At most three slots may be given.
    pub fn model_slots(&self) -> Result<Vec<ModelSlot>, String> {
        self.resolve_model_slots(model_slots_from_env)
    }

    fn resolve_model_slots(
        &self,
        env_slots: impl FnOnce() -> Result<Vec<ModelSlot>, String>,
    ) -> Result<Vec<ModelSlot>, String> {
        if self.models.len() > MODEL_SLOT_VARS.len() {
            return Err(format!(
                "too many --model slots: {} (max {})",
                self.models.len(),
                MODEL_SLOT_VARS.len()
            ));
        }
        if !self.models.is_empty() {
            return Ok(self.models.clone());
        }
        let slots = env_slots()?;
        if !slots.is_empty() {
            return Ok(slots);
        }
        Ok(vec![FALLBACK_MODEL.parse()?])
    }

    /// Returns the effective preview output directory.
    ///
    /// Defaults to the platform cache location if not specified.
    pub fn output_directory(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(default_output_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendSpec;

    fn try_parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("lofi-scheduler").chain(args.iter().copied()))
    }

    fn parse(args: &[&str]) -> Cli {
        try_parse(args).unwrap()
    }

    #[test]
    fn no_flags_keep_config() {
        let cli = parse(&[]);
        let mut config = SchedulerConfig::default();
        cli.apply(&mut config);
        assert_eq!(config, SchedulerConfig::default());
    }

    #[test]
    fn flags_override_config() {
        let cli = parse(&[
            "--queue-capacity",
            "2",
            "--workers",
            "3",
            "--avg-job-seconds",
            "12.5",
            "--avg-window",
            "10",
            "--job-max-age-secs",
            "60",
            "--sweep-secs",
            "5",
        ]);
        let mut config = SchedulerConfig::default();
        cli.apply(&mut config);
        assert_eq!(config.queue_capacity, 2);
        assert_eq!(config.workers, 3);
        assert_eq!(config.initial_avg_job_seconds, 12.5);
        assert_eq!(config.avg_window, 10);
        assert_eq!(config.retention.max_age, Duration::from_secs(60));
        assert_eq!(config.retention.sweep_interval, Duration::from_secs(5));
        assert!(config.validate().is_none());
    }

    #[test]
    fn rejects_out_of_range_flags() {
        assert!(try_parse(&["--queue-capacity", "0"]).is_err());
        assert!(try_parse(&["--workers", "0"]).is_err());
        assert!(try_parse(&["--workers", "65"]).is_err());
        assert!(try_parse(&["--model", "=cmd"]).is_err());
    }

    #[test]
    fn repeated_model_flags_keep_order() {
        let cli = parse(&["-m", "turbo", "--model", "base=python render.py"]);
        let slots = cli.resolve_model_slots(|| Ok(Vec::new())).unwrap();
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].name, "turbo");
        assert_eq!(slots[0].backend, BackendSpec::Preview);
        assert_eq!(
            slots[1].backend,
            BackendSpec::Command {
                command_line: "python render.py".to_string()
            }
        );
    }

    #[test]
    fn at_most_three_model_flags() {
        let cli = parse(&["-m", "turbo", "-m", "base", "-m", "sft"]);
        assert_eq!(cli.resolve_model_slots(|| Ok(Vec::new())).unwrap().len(), 3);

        let cli = parse(&["-m", "turbo", "-m", "base", "-m", "sft", "-m", "xl"]);
        let err = cli.resolve_model_slots(|| Ok(Vec::new())).unwrap_err();
        assert!(err.contains("max 3"), "{}", err);
    }

    #[test]
    fn model_flags_win_over_env() {
        let cli = parse(&["--model", "turbo"]);
        let slots = cli
            .resolve_model_slots(|| Err("env should not be read".to_string()))
            .unwrap();
        assert_eq!(slots[0].name, "turbo");
    }

    #[test]
    fn env_slots_used_without_flags() {
        let cli = parse(&[]);
        let slots = cli
            .resolve_model_slots(|| Ok(vec!["base".parse().unwrap()]))
            .unwrap();
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].name, "base");
    }

    #[test]
    fn falls_back_to_preview_slot() {
        let cli = parse(&[]);
        let slots = cli.resolve_model_slots(|| Ok(Vec::new())).unwrap();
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].name, FALLBACK_MODEL);
        assert_eq!(slots[0].backend, BackendSpec::Preview);
    }

    #[test]
    fn output_directory_default() {
        let cli = parse(&[]);
        assert!(!cli.output_directory().as_os_str().is_empty());

        let cli = parse(&["--output-dir", "/tmp/renders"]);
        assert_eq!(cli.output_directory(), PathBuf::from("/tmp/renders"));
    }
}
