//! Job record and its state machine.
//!
//! A [`JobRecord`] tracks one generation request from submission to a
//! terminal state. Status only moves forward:
//!
//! ```text
//! Queued -> Running -> Succeeded | Failed
//! ```
//!
//! The start and finish data live in set-once cells. Once a cell is filled
//! and the status published, the data never changes again, so any number of
//! readers can take snapshots without locking.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant, SystemTime};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DaemonError, ErrorCode, Result};

use super::output::GenerationOutput;
use super::params::GenerationParams;

/// Opaque job identifier (UUID v4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Generates a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(JobId)
    }
}

/// Status of a generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum JobStatus {
    /// Waiting in the queue.
    Queued = 0,
    /// Picked up by a worker, generation in flight.
    Running = 1,
    /// Generation finished with a result.
    Succeeded = 2,
    /// Generation finished with an error.
    Failed = 3,
}

impl JobStatus {
    /// Returns the wire representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }

    /// Returns true if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => JobStatus::Queued,
            1 => JobStatus::Running,
            2 => JobStatus::Succeeded,
            _ => JobStatus::Failed,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structured failure cause stored on a failed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub code: ErrorCode,
    pub message: String,
}

impl JobError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<DaemonError> for JobError {
    fn from(err: DaemonError) -> Self {
        Self::new(err.code, err.message)
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

#[derive(Debug)]
struct Started {
    at: SystemTime,
    clock: Instant,
}

#[derive(Debug)]
struct Finished {
    at: SystemTime,
    outcome: std::result::Result<GenerationOutput, JobError>,
}

/// One generation job.
///
/// The queue owns the record while it is `Queued`, the worker that dequeued
/// it drives it through `Running` to a terminal state, and after that it is
/// read-only.
#[derive(Debug)]
pub struct JobRecord {
    id: JobId,
    params: Arc<GenerationParams>,
    created_at: SystemTime,
    status: AtomicU8,
    started: OnceLock<Started>,
    finished: OnceLock<Finished>,
}

impl JobRecord {
    /// Creates a new queued job with a fresh id.
    pub fn new(params: GenerationParams) -> Self {
        Self {
            id: JobId::new(),
            params: Arc::new(params),
            created_at: SystemTime::now(),
            status: AtomicU8::new(JobStatus::Queued as u8),
            started: OnceLock::new(),
            finished: OnceLock::new(),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn params(&self) -> &GenerationParams {
        &self.params
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// Current status.
    pub fn status(&self) -> JobStatus {
        JobStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// When a worker picked the job up.
    pub fn started_at(&self) -> Option<SystemTime> {
        self.started.get().map(|s| s.at)
    }

    /// When the job reached a terminal state.
    pub fn finished_at(&self) -> Option<SystemTime> {
        self.finished.get().map(|f| f.at)
    }

    /// Time spent since the job started running, or `None` if it has not.
    pub fn running_for(&self) -> Option<Duration> {
        self.started.get().map(|s| s.clock.elapsed())
    }

    /// `Queued -> Running`.
    pub fn mark_running(&self) -> Result<()> {
        let current = self.status();
        if current != JobStatus::Queued {
            return Err(DaemonError::invalid_transition(current, JobStatus::Running));
        }
        self.started
            .set(Started {
                at: SystemTime::now(),
                clock: Instant::now(),
            })
            .map_err(|_| DaemonError::invalid_transition(current, JobStatus::Running))?;
        self.status.store(JobStatus::Running as u8, Ordering::Release);
        Ok(())
    }

    /// `Running -> Succeeded`.
    pub fn succeed(&self, output: GenerationOutput) -> Result<()> {
        self.finish(Ok(output))
    }

    /// `Running -> Failed`.
    pub fn fail(&self, error: JobError) -> Result<()> {
        self.finish(Err(error))
    }

    fn finish(&self, outcome: std::result::Result<GenerationOutput, JobError>) -> Result<()> {
        let target = if outcome.is_ok() {
            JobStatus::Succeeded
        } else {
            JobStatus::Failed
        };
        let current = self.status();
        if current != JobStatus::Running {
            return Err(DaemonError::invalid_transition(current, target));
        }
        self.finished
            .set(Finished {
                at: SystemTime::now(),
                outcome,
            })
            .map_err(|_| DaemonError::invalid_transition(current, target))?;
        self.status.store(target as u8, Ordering::Release);
        Ok(())
    }

    /// Takes an immutable snapshot of the job.
    ///
    /// `queue_position` is supplied by the caller, which reads it from the
    /// queue. It is forced to 0 unless the snapshot observed `Queued`.
    pub fn snapshot(&self, queue_position: usize) -> JobSnapshot {
        let status = self.status();
        let started_at = if status >= JobStatus::Running {
            self.started_at()
        } else {
            None
        };
        let (finished_at, result, error) = match self.finished.get() {
            Some(finished) if status.is_terminal() => match &finished.outcome {
                Ok(output) => (Some(finished.at), Some(output.clone()), None),
                Err(err) => (Some(finished.at), None, Some(err.clone())),
            },
            _ => (None, None, None),
        };

        JobSnapshot {
            job_id: self.id,
            status,
            queue_position: if status == JobStatus::Queued {
                queue_position
            } else {
                0
            },
            params: (*self.params).clone(),
            created_at: self.created_at,
            started_at,
            finished_at,
            result,
            error,
        }
    }
}

/// Point-in-time, read-only view of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub status: JobStatus,
    pub queue_position: usize,
    pub params: GenerationParams,
    #[serde(with = "system_time_serde")]
    pub created_at: SystemTime,
    #[serde(with = "option_system_time_serde")]
    pub started_at: Option<SystemTime>,
    #[serde(with = "option_system_time_serde")]
    pub finished_at: Option<SystemTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<GenerationOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
}

/// Serializes SystemTime as fractional Unix seconds.
mod system_time_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    pub fn serialize<S>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let duration = time.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SystemTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Ok(UNIX_EPOCH + Duration::from_secs_f64(secs.max(0.0)))
    }
}

mod option_system_time_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    pub fn serialize<S>(time: &Option<SystemTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        time.map(|t| {
            t.duration_since(UNIX_EPOCH)
                .unwrap_or(Duration::ZERO)
                .as_secs_f64()
        })
        .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<SystemTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt = Option::<f64>::deserialize(deserializer)?;
        Ok(opt.map(|secs| UNIX_EPOCH + Duration::from_secs_f64(secs.max(0.0))))
    }
}
