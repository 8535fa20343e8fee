//! Job scheduling core.
//!
//! [`Scheduler`] wires together the bounded queue, the worker pool, the job
//! index, the ETA estimator and the model registry:
//!
//! ```text
//! submit -> BoundedJobQueue -> WorkerPool -> ModelRegistry -> Generator
//!              |                   |
//!           JobStore <-- query     EtaEstimator
//! ```
//!
//! All public operations are synchronous and safe to call from any thread.

pub mod eta;
pub mod queue;
pub mod stats;
pub mod store;
pub mod worker;

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::SchedulerConfig;
use crate::error::{DaemonError, ErrorCode, Result};
use crate::models::{ModelInfo, ModelRegistry};
use crate::types::{GenerationRequest, JobId, JobRecord, JobSnapshot, JobStatus};

pub use eta::EtaEstimator;
pub use queue::BoundedJobQueue;
pub use stats::{JobCounters, QueueStats};
pub use store::{JobStore, RetentionSweeper};
pub use worker::WorkerPool;

/// Returned by a successful submit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    pub job_id: JobId,
    pub status: JobStatus,
    pub queue_position: usize,
}

/// A job snapshot plus wait estimates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    #[serde(flatten)]
    pub job: JobSnapshot,
    pub eta_seconds: f64,
    pub avg_job_seconds: f64,
}

#[derive(Debug)]
struct Background {
    pool: WorkerPool,
    sweeper: RetentionSweeper,
}

/// The scheduler: one per process.
#[derive(Debug)]
pub struct Scheduler {
    config: SchedulerConfig,
    queue: Arc<BoundedJobQueue>,
    store: Arc<JobStore>,
    registry: Arc<ModelRegistry>,
    estimator: Arc<EtaEstimator>,
    counters: Arc<JobCounters>,
    background: Mutex<Option<Background>>,
}

impl Scheduler {
    /// Validates `config`, starts the worker threads and the retention
    /// sweeper.
    pub fn new(config: SchedulerConfig, registry: ModelRegistry) -> Result<Self> {
        if let Some(reason) = config.validate() {
            return Err(DaemonError::invalid_config(reason));
        }

        let queue = Arc::new(BoundedJobQueue::new(config.queue_capacity));
        let store = Arc::new(JobStore::new());
        let registry = Arc::new(registry);
        let estimator = Arc::new(EtaEstimator::new(
            config.initial_avg_job_seconds,
            config.avg_window,
            config.workers,
        ));
        let counters = Arc::new(JobCounters::new());

        let pool = WorkerPool::spawn(
            config.workers,
            Arc::clone(&queue),
            Arc::clone(&registry),
            Arc::clone(&estimator),
            Arc::clone(&counters),
        )
        .map_err(|e| {
            DaemonError::with_source(ErrorCode::InvalidConfig, "cannot start worker threads", e)
        })?;
        let sweeper = RetentionSweeper::spawn(Arc::clone(&store), config.retention)
            .map_err(|e| {
                DaemonError::with_source(
                    ErrorCode::InvalidConfig,
                    "cannot start retention sweeper",
                    e,
                )
            })?;

        info!(
            capacity = config.queue_capacity,
            workers = config.workers,
            models = ?registry.names(),
            default_model = %registry.default_entry().name,
            "Scheduler started"
        );

        Ok(Self {
            config,
            queue,
            store,
            registry,
            estimator,
            counters,
            background: Mutex::new(Some(Background { pool, sweeper })),
        })
    }

    /// Admits a job.
    ///
    /// Fails with `INVALID_PARAMS` if the merged parameters are malformed,
    /// `QUEUE_FULL` at capacity and `SHUTTING_DOWN` after shutdown. A
    /// rejected request never creates a job record. The model name is not
    /// checked here; an unknown model fails the job when it runs.
    pub fn submit(&self, request: GenerationRequest) -> Result<SubmitReceipt> {
        let params = self.config.defaults.merge(request);
        params.validate()?;

        let job = Arc::new(JobRecord::new(params));
        let job_id = job.id();
        let queue_position = match self.queue.enqueue(Arc::clone(&job)) {
            Ok(position) => position,
            Err(e) => {
                self.counters.job_rejected();
                debug!(code = %e.code, "Job rejected");
                return Err(e);
            }
        };
        self.store.insert(job);
        self.counters.job_submitted();

        debug!(job_id = %job_id, queue_position, "Job queued");
        Ok(SubmitReceipt {
            job_id,
            status: JobStatus::Queued,
            queue_position,
        })
    }

    /// Returns the current state of a job with its ETA.
    pub fn query(&self, id: JobId) -> Result<QueryResult> {
        let record = self
            .store
            .get(id)
            .ok_or_else(|| DaemonError::job_not_found(id))?;

        // Position first: if the job leaves the queue in between, the snapshot
        // sees Running and zeroes the position.
        let position = self.queue.position_of(id).unwrap_or(0);
        let job = record.snapshot(position);
        let eta_seconds = self.estimator.estimate_wait(job.queue_position, job.status);

        Ok(QueryResult {
            job,
            eta_seconds,
            avg_job_seconds: self.estimator.average_seconds(),
        })
    }

    /// Lists the registered models in slot order.
    pub fn list_models(&self) -> Vec<ModelInfo> {
        self.registry.list()
    }

    /// Current queue metrics.
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            capacity: self.queue.capacity(),
            current_size: self.queue.len(),
            workers: self.config.workers,
            avg_job_seconds: self.estimator.average_seconds(),
            submitted: self.counters.submitted(),
            rejected: self.counters.rejected(),
            succeeded: self.counters.succeeded(),
            failed: self.counters.failed(),
            running: self.counters.running(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Stops accepting jobs, waits for running jobs to finish and stops the
    /// background threads. Jobs still queued are never run but stay
    /// queryable. Calling it again is a no-op.
    pub fn shutdown(&self) {
        self.queue.close();
        let background = self
            .background
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(mut background) = background {
            info!(pending = self.queue.len(), "Scheduler shutting down");
            background.pool.shutdown();
            background.sweeper.stop();
            info!("Scheduler stopped");
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.queue.is_closed()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
