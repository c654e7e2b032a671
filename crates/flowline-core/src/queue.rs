//! Queue-service port.
//!
//! The queue backend is an external collaborator; this core only needs a
//! narrow contract from it. The state manager calls `cancel_job` on pause and
//! cancel (best-effort); the orchestrator uses `enqueue` and associates the
//! returned job ID via `set_queue_job`; `job_status` exists for higher layers
//! that poll queue health.

use flowline_types::error::QueueError;
use flowline_types::execution::{QueueJob, QueueJobStatus};

/// Narrow contract against the external job queue.
///
/// Uses native async fn in traits (no async_trait macro); implementations
/// live in flowline-infra or in the embedding application.
pub trait QueueService: Send + Sync {
    /// Enqueue a job and return its queue-assigned ID.
    fn enqueue(
        &self,
        queue: &str,
        job: &QueueJob,
    ) -> impl std::future::Future<Output = Result<String, QueueError>> + Send;

    /// Cancel a job. Must tolerate jobs that already finished or were never
    /// known -- cancellation is best-effort and idempotent.
    fn cancel_job(
        &self,
        queue: &str,
        job_id: &str,
    ) -> impl std::future::Future<Output = Result<(), QueueError>> + Send;

    /// Report a job's status. Unknown jobs report `QueueJobStatus::Unknown`
    /// rather than erroring.
    fn job_status(
        &self,
        queue: &str,
        job_id: &str,
    ) -> impl std::future::Future<Output = Result<QueueJobStatus, QueueError>> + Send;
}
