//! In-memory queue service.
//!
//! Records enqueues and cancels so tests can assert on them; doubles as the
//! queue backend for single-process embedded deployments where the worker
//! polls the store directly.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use flowline_core::queue::QueueService;
use flowline_types::error::QueueError;
use flowline_types::execution::{QueueJob, QueueJobStatus};

/// In-memory implementation of `QueueService`.
#[derive(Default)]
pub struct InMemoryQueueService {
    /// job_id -> (queue name, status, job payload)
    jobs: DashMap<String, (String, QueueJobStatus, QueueJob)>,
    counter: AtomicU64,
}

impl InMemoryQueueService {
    /// Create an empty queue service.
    pub fn new() -> Self {
        Self::default()
    }

    /// IDs of jobs currently in `Cancelled` status, for test assertions.
    pub fn cancelled_jobs(&self) -> Vec<String> {
        self.jobs
            .iter()
            .filter(|entry| entry.value().1 == QueueJobStatus::Cancelled)
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Total jobs ever enqueued.
    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }
}

impl QueueService for InMemoryQueueService {
    async fn enqueue(&self, queue: &str, job: &QueueJob) -> Result<String, QueueError> {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let job_id = format!("{queue}-{n}");
        self.jobs.insert(
            job_id.clone(),
            (queue.to_string(), QueueJobStatus::Waiting, job.clone()),
        );
        tracing::debug!(queue, job_id = job_id.as_str(), "job enqueued");
        Ok(job_id)
    }

    async fn cancel_job(&self, queue: &str, job_id: &str) -> Result<(), QueueError> {
        match self.jobs.get_mut(job_id) {
            Some(mut entry) => {
                entry.value_mut().1 = QueueJobStatus::Cancelled;
                tracing::debug!(queue, job_id, "job cancelled");
            }
            // Unknown or already-gone jobs are tolerated.
            None => tracing::debug!(queue, job_id, "cancel for unknown job ignored"),
        }
        Ok(())
    }

    async fn job_status(&self, _queue: &str, job_id: &str) -> Result<QueueJobStatus, QueueError> {
        Ok(self
            .jobs
            .get(job_id)
            .map(|entry| entry.value().1)
            .unwrap_or(QueueJobStatus::Unknown))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
