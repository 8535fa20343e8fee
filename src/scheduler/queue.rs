//! Bounded FIFO of pending jobs.
//!
//! Producers (`Scheduler::submit`) never block: a full queue rejects the job
//! immediately. Consumers (worker threads) block in [`BoundedJobQueue::dequeue`]
//! until a job arrives or the queue is closed.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use tracing::warn;

use crate::error::{DaemonError, Result};
use crate::types::{JobId, JobRecord};

#[derive(Debug)]
struct QueueState {
    jobs: VecDeque<Arc<JobRecord>>,
    closed: bool,
}

impl QueueState {
    fn position_of(&self, id: JobId) -> Option<usize> {
        self.jobs.iter().position(|j| j.id() == id)
    }
}

/// Fixed-capacity FIFO shared between the scheduler and its workers.
#[derive(Debug)]
pub struct BoundedJobQueue {
    capacity: usize,
    state: Mutex<QueueState>,
    available: Condvar,
}

impl BoundedJobQueue {
    /// Creates an empty queue that holds at most `capacity` jobs.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(QueueState {
                jobs: VecDeque::with_capacity(capacity.min(1024)),
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // A panic while holding the lock cannot leave the deque half-updated,
        // so a poisoned lock is still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Appends a job to the tail.
    ///
    /// Returns the job's 0-based position, `QueueFull` if the queue is at
    /// capacity, or `ShuttingDown` once the queue is closed.
    pub fn enqueue(&self, job: Arc<JobRecord>) -> Result<usize> {
        let mut state = self.lock();
        if state.closed {
            return Err(DaemonError::shutting_down());
        }
        if state.jobs.len() >= self.capacity {
            return Err(DaemonError::queue_full(self.capacity));
        }
        let position = state.jobs.len();
        state.jobs.push_back(job);
        drop(state);

        self.available.notify_one();
        Ok(position)
    }

    /// Removes the head job, waiting for one if the queue is empty.
    ///
    /// The job is marked running before the lock is released. Returns `None`
    /// once the queue is closed.
    pub fn dequeue(&self) -> Option<Arc<JobRecord>> {
        let mut state = self.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(job) = state.jobs.pop_front() {
                if let Err(e) = job.mark_running() {
                    // Only queued records are ever enqueued.
                    warn!(job_id = %job.id(), error = %e, "Skipping job that is not queued");
                    continue;
                }
                return Some(job);
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// 0-based position of a queued job, or `None` if it is not in the queue.
    pub fn position_of(&self, id: JobId) -> Option<usize> {
        self.lock().position_of(id)
    }

    /// Number of queued jobs.
    pub fn len(&self) -> usize {
        self.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().jobs.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.lock().jobs.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Stops the queue. Blocked and future `dequeue` calls return `None`;
    /// jobs still queued stay in place but are never handed out.
    pub fn close(&self) {
        self.lock().closed = true;
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::types::{GenerationDefaults, GenerationRequest, JobStatus};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    fn create_test_job() -> Arc<JobRecord> {
        let params = GenerationDefaults::default().merge(GenerationRequest {
            caption: Some("test prompt".to_string()),
            seed: Some(42),
            ..Default::default()
        });
        Arc::new(JobRecord::new(params))
    }

    #[test]
    fn queue_new_is_empty() {
        let queue = BoundedJobQueue::new(10);
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
        assert!(!queue.is_full());
        assert!(!queue.is_closed());
        assert_eq!(queue.capacity(), 10);
    }

    #[test]
    fn enqueue_returns_tail_position() {
        let queue = BoundedJobQueue::new(10);
        let a = create_test_job();
        let b = create_test_job();

        assert_eq!(queue.enqueue(Arc::clone(&a)).unwrap(), 0);
        assert_eq!(queue.enqueue(Arc::clone(&b)).unwrap(), 1);
        assert_eq!(queue.position_of(a.id()), Some(0));
        assert_eq!(queue.position_of(b.id()), Some(1));
    }

    #[test]
    fn dequeue_is_fifo_and_marks_running() {
        let queue = BoundedJobQueue::new(10);
        let jobs: Vec<_> = (0..3).map(|_| create_test_job()).collect();
        for job in &jobs {
            queue.enqueue(Arc::clone(job)).unwrap();
        }

        for expected in &jobs {
            let job = queue.dequeue().unwrap();
            assert_eq!(job.id(), expected.id());
            assert_eq!(job.status(), JobStatus::Running);
            assert_eq!(queue.position_of(job.id()), None);
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn positions_update_after_dequeue() {
        let queue = BoundedJobQueue::new(10);
        let jobs: Vec<_> = (0..3).map(|_| create_test_job()).collect();
        for job in &jobs {
            queue.enqueue(Arc::clone(job)).unwrap();
        }

        queue.dequeue().unwrap();
        assert_eq!(queue.position_of(jobs[1].id()), Some(0));
        assert_eq!(queue.position_of(jobs[2].id()), Some(1));
    }

    #[test]
    fn full_queue_rejects() {
        let queue = BoundedJobQueue::new(2);
        queue.enqueue(create_test_job()).unwrap();
        queue.enqueue(create_test_job()).unwrap();
        assert!(queue.is_full());

        let rejected = create_test_job();
        let err = queue.enqueue(Arc::clone(&rejected)).unwrap_err();
        assert_eq!(err.code, ErrorCode::QueueFull);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.position_of(rejected.id()), None);
        assert_eq!(rejected.status(), JobStatus::Queued);
    }

    #[test]
    fn zero_capacity_rejects_everything() {
        let queue = BoundedJobQueue::new(0);
        assert!(queue.is_full());
        let err = queue.enqueue(create_test_job()).unwrap_err();
        assert_eq!(err.code, ErrorCode::QueueFull);
    }

    #[test]
    fn close_releases_blocked_dequeuers() {
        let queue = Arc::new(BoundedJobQueue::new(4));
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || queue.dequeue())
            })
            .collect();

        thread::sleep(Duration::from_millis(50));
        queue.close();

        for handle in handles {
            assert!(handle.join().unwrap().is_none());
        }
    }

    #[test]
    fn closed_queue_keeps_jobs_but_hands_none_out() {
        let queue = BoundedJobQueue::new(4);
        let job = create_test_job();
        queue.enqueue(Arc::clone(&job)).unwrap();
        queue.close();

        assert!(queue.dequeue().is_none());
        assert_eq!(queue.position_of(job.id()), Some(0));
        assert_eq!(job.status(), JobStatus::Queued);

        let err = queue.enqueue(create_test_job()).unwrap_err();
        assert_eq!(err.code, ErrorCode::ShuttingDown);
    }

    #[test]
    fn blocked_dequeuer_wakes_on_enqueue() {
        let queue = Arc::new(BoundedJobQueue::new(4));
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.dequeue().map(|j| j.id()))
        };

        thread::sleep(Duration::from_millis(20));
        let job = create_test_job();
        queue.enqueue(Arc::clone(&job)).unwrap();

        assert_eq!(consumer.join().unwrap(), Some(job.id()));
    }

    #[test]
    fn positions_stay_dense_under_concurrent_traffic() {
        const SUBMITTERS: usize = 4;
        const JOBS_EACH: usize = 150;

        let queue = Arc::new(BoundedJobQueue::new(16));
        let submitted: Arc<Mutex<Vec<Arc<JobRecord>>>> = Arc::new(Mutex::new(Vec::new()));
        let done = Arc::new(AtomicBool::new(false));

        let submitters: Vec<_> = (0..SUBMITTERS)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let submitted = Arc::clone(&submitted);
                thread::spawn(move || {
                    for _ in 0..JOBS_EACH {
                        let job = create_test_job();
                        submitted.lock().unwrap().push(Arc::clone(&job));
                        while queue.enqueue(Arc::clone(&job)).is_err() {
                            thread::yield_now();
                        }
                    }
                })
            })
            .collect();

        let workers: Vec<_> = (0..2)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    let mut taken = Vec::new();
                    while let Some(job) = queue.dequeue() {
                        assert_eq!(job.status(), JobStatus::Running);
                        taken.push(job.id());
                    }
                    taken
                })
            })
            .collect();

        let reader = {
            let queue = Arc::clone(&queue);
            let submitted = Arc::clone(&submitted);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut snapshots = 0;
                while !done.load(Ordering::SeqCst) {
                    // Holding `submitted` stops new jobs from appearing, so
                    // every queued job is among the known ones.
                    let known = submitted.lock().unwrap();
                    let state = queue.lock();
                    let mut positions: Vec<usize> = known
                        .iter()
                        .filter_map(|j| state.position_of(j.id()))
                        .collect();
                    let len = state.jobs.len();
                    drop(state);
                    drop(known);

                    positions.sort_unstable();
                    assert_eq!(positions, (0..len).collect::<Vec<_>>());
                    snapshots += 1;
                }
                snapshots
            })
        };

        for handle in submitters {
            handle.join().unwrap();
        }
        // Every job is enqueued; wait for the workers to drain the queue.
        while !queue.is_empty() {
            thread::sleep(Duration::from_millis(1));
        }
        done.store(true, Ordering::SeqCst);
        let snapshots = reader.join().unwrap();
        queue.close();

        let mut taken = HashSet::new();
        for handle in workers {
            for id in handle.join().unwrap() {
                assert!(taken.insert(id), "job handed out twice");
            }
        }
        assert_eq!(taken.len(), SUBMITTERS * JOBS_EACH);
        assert!(snapshots > 0);

        let known = submitted.lock().unwrap();
        let state = queue.lock();
        assert!(known.iter().all(|j| state.position_of(j.id()).is_none()));
    }

    #[test]
    fn snapshot_positions_form_contiguous_range() {
        let queue = BoundedJobQueue::new(8);
        let jobs: Vec<_> = (0..6).map(|_| create_test_job()).collect();
        for job in &jobs {
            queue.enqueue(Arc::clone(job)).unwrap();
        }
        queue.dequeue().unwrap();
        queue.dequeue().unwrap();

        let state = queue.lock();
        let mut positions: Vec<usize> = jobs
            .iter()
            .filter_map(|j| state.position_of(j.id()))
            .collect();
        positions.sort_unstable();
        assert_eq!(positions, (0..state.jobs.len()).collect::<Vec<_>>());
    }
}
