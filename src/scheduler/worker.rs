//! Worker threads that drain the job queue.
//!
//! Each worker runs one job at a time: dequeue, route to a model, call the
//! generator, record the outcome. A panicking generator fails only the job in
//! flight; the worker keeps serving the queue.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::error::ErrorCode;
use crate::models::ModelRegistry;
use crate::types::{GenerationOutput, JobError, JobRecord};

use super::eta::EtaEstimator;
use super::queue::BoundedJobQueue;
use super::stats::JobCounters;

/// Shared state handed to every worker thread.
#[derive(Debug, Clone)]
struct WorkerContext {
    queue: Arc<BoundedJobQueue>,
    registry: Arc<ModelRegistry>,
    estimator: Arc<EtaEstimator>,
    counters: Arc<JobCounters>,
}

/// A fixed set of worker threads.
#[derive(Debug)]
pub struct WorkerPool {
    queue: Arc<BoundedJobQueue>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Starts `workers` threads named `lofi-worker-{i}`.
    ///
    /// At least one thread is started. If a thread cannot be spawned the
    /// queue is closed, already started threads are joined and the error is
    /// returned.
    pub fn spawn(
        workers: usize,
        queue: Arc<BoundedJobQueue>,
        registry: Arc<ModelRegistry>,
        estimator: Arc<EtaEstimator>,
        counters: Arc<JobCounters>,
    ) -> std::io::Result<Self> {
        let ctx = WorkerContext {
            queue: Arc::clone(&queue),
            registry,
            estimator,
            counters,
        };

        let mut pool = Self {
            queue,
            handles: Vec::with_capacity(workers.max(1)),
        };
        for index in 0..workers.max(1) {
            let ctx = ctx.clone();
            let spawned = thread::Builder::new()
                .name(format!("lofi-worker-{}", index))
                .spawn(move || worker_loop(index, ctx));
            match spawned {
                Ok(handle) => pool.handles.push(handle),
                Err(e) => {
                    pool.shutdown();
                    return Err(e);
                }
            }
        }
        Ok(pool)
    }

    /// Number of running worker threads.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Closes the queue and waits for every worker to finish its current job.
    pub fn shutdown(&mut self) {
        self.queue.close();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                warn!("Worker thread exited with a panic");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(index: usize, ctx: WorkerContext) {
    info!(worker = index, "Worker started");
    while let Some(job) = ctx.queue.dequeue() {
        ctx.counters.job_started();
        let clock = Instant::now();

        let outcome = run_job(index, &ctx.registry, &job);
        let elapsed = clock.elapsed().as_secs_f64();
        // Stats are updated before the outcome becomes visible to queries.
        ctx.estimator.record_completion(elapsed);
        ctx.counters.job_finished(outcome.is_ok());

        let recorded = match outcome {
            Ok(output) => {
                info!(
                    worker = index,
                    job_id = %job.id(),
                    model = output.model.as_deref().unwrap_or(""),
                    elapsed_secs = elapsed,
                    "Job succeeded"
                );
                job.succeed(output)
            }
            Err(err) => {
                warn!(
                    worker = index,
                    job_id = %job.id(),
                    code = %err.code,
                    elapsed_secs = elapsed,
                    "Job failed: {}",
                    err.message
                );
                job.fail(err)
            }
        };
        if let Err(e) = recorded {
            error!(worker = index, job_id = %job.id(), error = %e, "Could not record job outcome");
        }
    }
    info!(worker = index, "Worker stopped");
}

/// Routes and runs one job. Never panics.
fn run_job(
    index: usize,
    registry: &ModelRegistry,
    job: &JobRecord,
) -> Result<GenerationOutput, JobError> {
    let params = job.params();
    let entry = registry.resolve(params.model.as_deref())?;

    debug!(
        worker = index,
        job_id = %job.id(),
        model = %entry.name,
        backend = entry.loaded.kind(),
        "Running job"
    );

    let generator = Arc::clone(&entry.loaded);
    let result = panic::catch_unwind(AssertUnwindSafe(|| generator.generate(params)));

    match result {
        Ok(Ok(mut output)) => {
            if output.model.is_none() {
                output.model = Some(entry.name.clone());
            }
            Ok(output)
        }
        Ok(Err(e)) => Err(JobError::new(ErrorCode::GenerationFailed, e.to_string())),
        Err(payload) => Err(JobError::new(
            ErrorCode::GenerationPanicked,
            format!("Generator panicked: {}", panic_message(payload.as_ref())),
        )),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
