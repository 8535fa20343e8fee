//! Wait-time estimation.
//!
//! Keeps a sliding window of recent job durations and turns a queue position
//! into an expected wait.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::types::JobStatus;

/// Default average used before any job has completed.
pub const DEFAULT_INITIAL_AVG_SECONDS: f64 = 5.0;

/// Default number of recent durations that feed the average.
pub const DEFAULT_AVG_WINDOW: usize = 50;

#[derive(Debug)]
struct Window {
    durations: VecDeque<f64>,
    sum: f64,
}

/// Running average of job duration.
#[derive(Debug)]
pub struct EtaEstimator {
    initial_avg: f64,
    window: usize,
    workers: usize,
    state: Mutex<Window>,
}

impl EtaEstimator {
    /// Creates an estimator for `workers` parallel workers.
    ///
    /// `window` and `workers` are raised to at least 1.
    pub fn new(initial_avg: f64, window: usize, workers: usize) -> Self {
        let window = window.max(1);
        Self {
            initial_avg: sanitize(initial_avg),
            window,
            workers: workers.max(1),
            state: Mutex::new(Window {
                durations: VecDeque::with_capacity(window),
                sum: 0.0,
            }),
        }
    }

    /// Records the wall-clock duration of a finished job.
    ///
    /// Negative and non-finite durations count as 0.
    pub fn record_completion(&self, secs: f64) {
        let secs = sanitize(secs);
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.durations.len() == self.window {
            state.durations.pop_front();
        }
        state.durations.push_back(secs);
        state.sum = state.durations.iter().sum();
    }

    /// Average duration over the window, or the initial value when nothing
    /// has completed yet.
    pub fn average_seconds(&self) -> f64 {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.durations.is_empty() {
            self.initial_avg
        } else {
            state.sum / state.durations.len() as f64
        }
    }

    /// Number of completions currently in the window.
    pub fn samples(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .durations
            .len()
    }

    /// Expected seconds until a job at `position` finishes waiting.
    ///
    /// The head of the queue still waits one average job; running and
    /// terminal jobs wait nothing.
    pub fn estimate_wait(&self, position: usize, status: JobStatus) -> f64 {
        if status != JobStatus::Queued {
            return 0.0;
        }
        let avg = self.average_seconds();
        if position == 0 {
            avg
        } else {
            position as f64 * avg / self.workers as f64
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

fn sanitize(secs: f64) -> f64 {
    if secs.is_finite() && secs > 0.0 {
        secs
    } else {
        0.0
    }
}
