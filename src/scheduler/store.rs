//! Job index and retention.
//!
//! Every admitted job is registered here so `query` can find it in any state.
//! The scheduler core never removes records; [`RetentionSweeper`] evicts old
//! terminal records on a timer.

use std::collections::HashMap;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};
use std::time::SystemTime;

use tracing::{debug, info, warn};

use crate::config::RetentionPolicy;
use crate::types::{JobId, JobRecord};

/// id -> record index.
#[derive(Debug, Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<JobId, Arc<JobRecord>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, job: Arc<JobRecord>) {
        self.jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(job.id(), job);
    }

    pub fn get(&self, id: JobId) -> Option<Arc<JobRecord>> {
        self.jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops terminal records that finished before `cutoff`.
    ///
    /// Queued and running records are never touched. Returns the number of
    /// records removed.
    pub fn remove_finished_before(&self, cutoff: SystemTime) -> usize {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        let before = jobs.len();
        jobs.retain(|_, job| {
            !(job.status().is_terminal() && job.finished_at().is_some_and(|t| t < cutoff))
        });
        before - jobs.len()
    }
}

/// Background thread that applies a [`RetentionPolicy`] to a [`JobStore`].
#[derive(Debug)]
pub struct RetentionSweeper {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl RetentionSweeper {
    /// Starts sweeping every `policy.sweep_interval`.
    pub fn spawn(store: Arc<JobStore>, policy: RetentionPolicy) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name("lofi-retention".to_string())
            .spawn(move || {
                debug!(
                    max_age_secs = policy.max_age.as_secs(),
                    interval_secs = policy.sweep_interval.as_secs(),
                    "Retention sweeper started"
                );
                loop {
                    match stop_rx.recv_timeout(policy.sweep_interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    let Some(cutoff) = SystemTime::now().checked_sub(policy.max_age) else {
                        continue;
                    };
                    let removed = store.remove_finished_before(cutoff);
                    if removed > 0 {
                        info!(removed, remaining = store.len(), "Evicted finished jobs");
                    }
                }
                debug!("Retention sweeper stopped");
            })?;

        Ok(Self {
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Stops the sweeper and waits for its thread.
    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            stop.send(()).ok();
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Retention sweeper thread panicked");
            }
        }
    }
}

impl Drop for RetentionSweeper {
    fn drop(&mut self) {
        self.stop();
    }
}
