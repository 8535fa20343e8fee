//! Error types for the lofi-scheduler.
//!
//! Defines the error codes shared by the scheduler core, the JSON-RPC
//! transport, and the failure causes recorded on jobs.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Error codes returned by the scheduler and recorded on failed jobs.
///
/// These codes are used in JSON-RPC error responses and in the `error`
/// field of failed job snapshots so clients can branch on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Request is malformed or fails structural validation.
    /// Trigger: empty caption, out-of-range duration, unparsable field.
    InvalidParams,

    /// Pending queue is at capacity.
    /// Trigger: `queue_capacity` jobs already waiting.
    QueueFull,

    /// Requested model name is not registered.
    /// Trigger: explicit `model` that matches no registry slot.
    ModelNotFound,

    /// The generation backend reported a failure.
    /// Trigger: backend error, crashed external process, bad output.
    GenerationFailed,

    /// The generation backend panicked while running a job.
    /// Trigger: bug or fault inside an in-process backend.
    GenerationPanicked,

    /// No job with the given id is known to this scheduler.
    /// Trigger: never issued, evicted by retention, or another instance.
    JobNotFound,

    /// A job state change that the state machine does not allow.
    /// Trigger: finishing a job that is not running, restarting a job.
    InvalidTransition,

    /// The scheduler is shutting down and no longer accepts work.
    /// Trigger: submit after shutdown was requested.
    ShuttingDown,

    /// Startup configuration is inconsistent.
    /// Trigger: zero workers, zero capacity, bad model slots.
    InvalidConfig,
}

impl ErrorCode {
    /// Returns the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidParams => "INVALID_PARAMS",
            ErrorCode::QueueFull => "QUEUE_FULL",
            ErrorCode::ModelNotFound => "MODEL_NOT_FOUND",
            ErrorCode::GenerationFailed => "GENERATION_FAILED",
            ErrorCode::GenerationPanicked => "GENERATION_PANICKED",
            ErrorCode::JobNotFound => "JOB_NOT_FOUND",
            ErrorCode::InvalidTransition => "INVALID_TRANSITION",
            ErrorCode::ShuttingDown => "SHUTTING_DOWN",
            ErrorCode::InvalidConfig => "INVALID_CONFIG",
        }
    }

    /// Returns a human-readable description of the error.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCode::InvalidParams => "Generation request failed validation",
            ErrorCode::QueueFull => "Generation queue is at maximum capacity",
            ErrorCode::ModelNotFound => "Requested model is not registered",
            ErrorCode::GenerationFailed => "Generation backend reported a failure",
            ErrorCode::GenerationPanicked => "Generation backend panicked",
            ErrorCode::JobNotFound => "Job id is unknown to this scheduler",
            ErrorCode::InvalidTransition => "Job state change is not allowed",
            ErrorCode::ShuttingDown => "Scheduler is shutting down",
            ErrorCode::InvalidConfig => "Scheduler configuration is invalid",
        }
    }

    /// Returns a recovery hint suggesting how to resolve this error.
    pub fn recovery_hint(&self) -> &'static str {
        match self {
            ErrorCode::InvalidParams => {
                "Provide a non-empty caption or lyrics and keep control values in range"
            }
            ErrorCode::QueueFull => {
                "Retry later once pending generations have drained, \
                 or raise LOFI_QUEUE_MAXSIZE"
            }
            ErrorCode::ModelNotFound => {
                "Call list_models for the registered names, or omit `model` to use the default"
            }
            ErrorCode::GenerationFailed => {
                "Inspect the error message from the backend; the job is not retried automatically"
            }
            ErrorCode::GenerationPanicked => {
                "Report the backend fault; other jobs are unaffected and may be resubmitted"
            }
            ErrorCode::JobNotFound => {
                "Check the job id; finished jobs are evicted after LOFI_JOB_MAX_AGE_SECS"
            }
            ErrorCode::InvalidTransition => "This is a scheduler bug; please report it",
            ErrorCode::ShuttingDown => "Restart the scheduler and resubmit",
            ErrorCode::InvalidConfig => {
                "Use at least one worker, a non-zero queue capacity and exactly one default model"
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Main error type for scheduler operations.
#[derive(Debug)]
pub struct DaemonError {
    /// The error code identifying the type of error.
    pub code: ErrorCode,
    /// Human-readable error message with context.
    pub message: String,
    /// Optional underlying cause of the error.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl DaemonError {
    /// Creates a new DaemonError with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new DaemonError with an underlying cause.
    pub fn with_source(
        code: ErrorCode,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates an INVALID_PARAMS error.
    pub fn invalid_params(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParams, reason)
    }

    /// Creates a QUEUE_FULL error.
    pub fn queue_full(capacity: usize) -> Self {
        Self::new(
            ErrorCode::QueueFull,
            format!("Generation queue is full (maximum {} pending jobs)", capacity),
        )
    }

    /// Creates a MODEL_NOT_FOUND error.
    pub fn model_not_found(name: &str, available: &[&str]) -> Self {
        Self::new(
            ErrorCode::ModelNotFound,
            format!("Model '{}' not found (available: {})", name, available.join(", ")),
        )
    }

    /// Creates a JOB_NOT_FOUND error.
    pub fn job_not_found(job_id: impl fmt::Display) -> Self {
        Self::new(ErrorCode::JobNotFound, format!("Job not found: {}", job_id))
    }

    /// Creates an INVALID_TRANSITION error.
    pub fn invalid_transition(from: impl fmt::Display, to: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::InvalidTransition,
            format!("Cannot move job from {} to {}", from, to),
        )
    }

    /// Creates a SHUTTING_DOWN error.
    pub fn shutting_down() -> Self {
        Self::new(ErrorCode::ShuttingDown, "Scheduler is no longer accepting jobs")
    }

    /// Creates an INVALID_CONFIG error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidConfig, reason)
    }
}

impl fmt::Display for DaemonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}. Recovery: {}",
            self.code,
            self.message,
            self.code.recovery_hint()
        )
    }
}

impl std::error::Error for DaemonError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Result type alias using DaemonError.
pub type Result<T> = std::result::Result<T, DaemonError>;
