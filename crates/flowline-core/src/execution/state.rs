//! Execution state manager: the lifecycle state machine for workflow
//! executions.
//!
//! Owns every mutation of a `WorkflowExecution` record -- creation, status
//! transitions, progress merges, retry eligibility, pause/resume/cancel,
//! stuck-job detection and bulk cleanup. All writes travel as
//! `ExecutionPatch`es through the repository port, which applies them
//! atomically per record; the manager itself performs no concurrent work and
//! is safe to call from many workers at once.
//!
//! Queue interaction is deliberately best-effort: pause and cancel attempt to
//! cancel the associated queue job, but a failing cancel never blocks the
//! state transition. The execution record is the source of truth; the queue
//! is a disposable execution substrate.

use std::collections::HashMap;

use chrono::{Duration, Utc};
use flowline_types::error::RepositoryError;
use flowline_types::execution::{
    ExecutionMetrics, ExecutionProgress, ExecutionStatus, StepResult, WorkflowExecution,
};
use serde_json::{Value, json};
use uuid::Uuid;

use super::retry::{RetryPolicy, is_transient};
use crate::queue::QueueService;
use crate::repository::SortOrder;
use crate::repository::execution::{ExecutionFilter, ExecutionPatch, ExecutionRepository};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Size of the `recent_executions` sample in metrics.
pub const RECENT_SAMPLE_LIMIT: u32 = 10;

/// Fallback ceiling on automatic attempts when the caller supplies none.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Parameters for creating a new execution.
#[derive(Debug, Clone)]
pub struct NewExecution {
    pub workflow_id: Uuid,
    pub user_id: String,
    pub total_steps: u32,
    /// Ceiling on automatic attempts; defaults to the manager's configured
    /// value when absent.
    pub max_attempts: Option<u32>,
    /// Opaque metadata stored on the record.
    pub metadata: HashMap<String, Value>,
}

/// Progress fields a worker reports alongside a status update.
#[derive(Debug, Clone, Default)]
pub struct ProgressUpdate {
    pub current_step: Option<u32>,
    pub completed_steps: Option<u32>,
    pub failed_steps: Option<u32>,
    /// One step's result, merged into the record's result map.
    pub step_result: Option<(String, StepResult)>,
    /// Error classification string to record (usually on failure).
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from state-manager operations. These indicate programmer or
/// integration mistakes (unknown IDs, illegal transitions), not business
/// failures -- execution IDs are always created by `create_execution` first.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("execution not found: {0}")]
    NotFound(Uuid),

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: ExecutionStatus,
        to: ExecutionStatus,
    },

    #[error("execution {0} has exhausted its attempts ({1})")]
    AttemptsExhausted(Uuid, u32),

    #[error("execution {0} is not retryable")]
    NotRetryable(Uuid),

    #[error("invalid progress update: {0}")]
    InvalidProgress(String),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

// ---------------------------------------------------------------------------
// ExecutionStateManager
// ---------------------------------------------------------------------------

/// Synchronous-per-call façade over the execution repository and the queue
/// collaborator. Generic over both ports for storage/queue flexibility.
pub struct ExecutionStateManager<R: ExecutionRepository, Q: QueueService> {
    repo: R,
    queue: Q,
    policy: RetryPolicy,
    default_max_attempts: u32,
}

impl<R: ExecutionRepository, Q: QueueService> ExecutionStateManager<R, Q> {
    /// Create a manager with the default retry policy.
    pub fn new(repo: R, queue: Q) -> Self {
        Self {
            repo,
            queue,
            policy: RetryPolicy::default(),
            default_max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Create a manager configured from [`CoreConfig`].
    ///
    /// [`CoreConfig`]: flowline_types::config::CoreConfig
    pub fn from_config(repo: R, queue: Q, config: &flowline_types::config::CoreConfig) -> Self {
        Self {
            repo,
            queue,
            policy: RetryPolicy::from_settings(&config.retry),
            default_max_attempts: config.retry.max_attempts,
        }
    }

    /// Access the underlying repository.
    pub fn repo(&self) -> &R {
        &self.repo
    }

    /// Access the queue collaborator.
    pub fn queue(&self) -> &Q {
        &self.queue
    }

    // -----------------------------------------------------------------------
    // Creation / lookup
    // -----------------------------------------------------------------------

    /// Create a new execution in `Pending` with `attempt_count = 0`.
    pub async fn create_execution(
        &self,
        new: NewExecution,
    ) -> Result<WorkflowExecution, StateError> {
        let now = Utc::now();
        let execution = WorkflowExecution {
            id: Uuid::now_v7(),
            workflow_id: new.workflow_id,
            user_id: new.user_id,
            status: ExecutionStatus::Pending,
            total_steps: new.total_steps,
            current_step: 0,
            completed_steps: 0,
            failed_steps: 0,
            step_results: HashMap::new(),
            attempt_count: 0,
            max_attempts: new.max_attempts.unwrap_or(self.default_max_attempts),
            retry_after: None,
            error: None,
            paused_at: None,
            paused_by: None,
            resumed_at: None,
            resumed_by: None,
            queue_job_id: None,
            queue_name: None,
            started_at: None,
            completed_at: None,
            execution_time_ms: None,
            result: None,
            metadata: new.metadata,
            created_at: now,
            updated_at: now,
        };

        self.repo.create(&execution).await?;

        tracing::info!(
            execution_id = %execution.id,
            workflow_id = %execution.workflow_id,
            total_steps = execution.total_steps,
            "execution created"
        );

        Ok(execution)
    }

    /// Fetch an execution by ID.
    pub async fn get_execution(
        &self,
        id: &Uuid,
    ) -> Result<Option<WorkflowExecution>, StateError> {
        Ok(self.repo.find_by_id(id).await?)
    }

    // -----------------------------------------------------------------------
    // Status transitions
    // -----------------------------------------------------------------------

    /// Transition an execution to a new status, optionally merging progress
    /// fields the worker reported with it.
    ///
    /// - `Running` stamps `started_at` on first entry.
    /// - `Retrying` increments `attempt_count` and stamps `retry_after`
    ///   from the backoff policy.
    /// - Terminal statuses stamp `completed_at` and compute
    ///   `execution_time_ms` when the execution ever started.
    pub async fn update_status(
        &self,
        id: &Uuid,
        status: ExecutionStatus,
        progress: Option<ProgressUpdate>,
    ) -> Result<WorkflowExecution, StateError> {
        let current = self.require(id).await?;

        if !current.status.can_transition_to(status) {
            return Err(StateError::InvalidTransition {
                from: current.status,
                to: status,
            });
        }

        let mut patch = ExecutionPatch::status(status);
        if let Some(progress) = &progress {
            merge_progress(&current, progress, &mut patch)?;
        }

        let now = Utc::now();
        match status {
            ExecutionStatus::Running => {
                if current.started_at.is_none() {
                    patch.started_at = Some(Some(now));
                }
            }
            ExecutionStatus::Retrying => {
                if current.attempt_count >= current.max_attempts {
                    return Err(StateError::AttemptsExhausted(*id, current.max_attempts));
                }
                let next_attempt = current.attempt_count + 1;
                let backoff = self.policy.delay_for_attempt(next_attempt);
                patch.attempt_delta = 1;
                patch.retry_after = Some(Some(
                    now + Duration::from_std(backoff).unwrap_or_else(|_| Duration::zero()),
                ));
            }
            ExecutionStatus::Completed
            | ExecutionStatus::Failed
            | ExecutionStatus::Cancelled => {
                patch.completed_at = Some(Some(now));
                if let Some(started_at) = current.started_at {
                    patch.execution_time_ms = Some(Some((now - started_at).num_milliseconds()));
                }
            }
            _ => {}
        }

        let updated = self.repo.update(id, &patch).await?;

        tracing::debug!(
            execution_id = %id,
            from = %current.status,
            to = %status,
            attempt_count = updated.attempt_count,
            "execution status updated"
        );

        Ok(updated)
    }

    /// Merge worker-reported progress without changing status.
    pub async fn update_progress(
        &self,
        id: &Uuid,
        progress: ProgressUpdate,
    ) -> Result<WorkflowExecution, StateError> {
        let current = self.require(id).await?;
        let mut patch = ExecutionPatch::default();
        merge_progress(&current, &progress, &mut patch)?;
        Ok(self.repo.update(id, &patch).await?)
    }

    // -----------------------------------------------------------------------
    // Pause / resume / cancel
    // -----------------------------------------------------------------------

    /// Pause an execution, cancelling its queue job when one is associated.
    /// Tolerates the absence of a job.
    pub async fn pause_execution(
        &self,
        id: &Uuid,
        by: &str,
    ) -> Result<WorkflowExecution, StateError> {
        let current = self.require(id).await?;

        if !current.status.can_transition_to(ExecutionStatus::Paused) {
            return Err(StateError::InvalidTransition {
                from: current.status,
                to: ExecutionStatus::Paused,
            });
        }

        self.cancel_queue_job_best_effort(&current, "pause").await;

        let mut patch = ExecutionPatch::status(ExecutionStatus::Paused);
        patch.paused_at = Some(Some(Utc::now()));
        patch.paused_by = Some(Some(by.to_string()));
        patch.queue_job = Some(None);

        let updated = self.repo.update(id, &patch).await?;
        tracing::info!(execution_id = %id, by, "execution paused");
        Ok(updated)
    }

    /// Resume a paused execution back to `Pending`. The caller is
    /// responsible for re-enqueuing it.
    pub async fn resume_execution(
        &self,
        id: &Uuid,
        by: &str,
    ) -> Result<WorkflowExecution, StateError> {
        let current = self.require(id).await?;

        if current.status != ExecutionStatus::Paused {
            return Err(StateError::InvalidTransition {
                from: current.status,
                to: ExecutionStatus::Pending,
            });
        }

        let mut patch = ExecutionPatch::status(ExecutionStatus::Pending);
        patch.resumed_at = Some(Some(Utc::now()));
        patch.resumed_by = Some(Some(by.to_string()));

        let updated = self.repo.update(id, &patch).await?;
        tracing::info!(execution_id = %id, by, "execution resumed");
        Ok(updated)
    }

    /// Cancel a non-terminal execution. Idempotent at the state layer: the
    /// transition is recorded even when the queue cancel fails or the job
    /// already finished.
    pub async fn cancel_execution(
        &self,
        id: &Uuid,
        by: &str,
    ) -> Result<WorkflowExecution, StateError> {
        let current = self.require(id).await?;

        if !current.status.can_transition_to(ExecutionStatus::Cancelled) {
            return Err(StateError::InvalidTransition {
                from: current.status,
                to: ExecutionStatus::Cancelled,
            });
        }

        self.cancel_queue_job_best_effort(&current, "cancel").await;

        let now = Utc::now();
        let mut patch = ExecutionPatch::status(ExecutionStatus::Cancelled);
        patch.completed_at = Some(Some(now));
        if let Some(started_at) = current.started_at {
            patch.execution_time_ms = Some(Some((now - started_at).num_milliseconds()));
        }
        patch.result = Some(Some(json!({
            "cancelled": true,
            "cancelled_by": by,
            "cancelled_at": now.to_rfc3339(),
        })));
        patch.queue_job = Some(None);

        let updated = self.repo.update(id, &patch).await?;
        tracing::info!(execution_id = %id, by, "execution cancelled");
        Ok(updated)
    }

    // -----------------------------------------------------------------------
    // Retry
    // -----------------------------------------------------------------------

    /// Administrative restart-from-scratch: wipes all progress and puts a
    /// retryable `Failed` execution back in `Pending`.
    ///
    /// Distinct from the `Retrying` bookkeeping lane: nothing in this
    /// library calls it automatically, and `attempt_count` is preserved.
    pub async fn reset_for_retry(&self, id: &Uuid) -> Result<WorkflowExecution, StateError> {
        let current = self.require(id).await?;

        if current.status != ExecutionStatus::Failed {
            return Err(StateError::InvalidTransition {
                from: current.status,
                to: ExecutionStatus::Pending,
            });
        }
        if !record_is_retryable(&current, true) {
            return Err(StateError::NotRetryable(*id));
        }

        let patch = ExecutionPatch {
            status: Some(ExecutionStatus::Pending),
            current_step: Some(0),
            completed_steps: Some(0),
            failed_steps: Some(0),
            clear_step_results: true,
            error: Some(None),
            result: Some(None),
            retry_after: Some(None),
            started_at: Some(None),
            completed_at: Some(None),
            execution_time_ms: Some(None),
            ..Default::default()
        };

        let updated = self.repo.update(id, &patch).await?;
        tracing::info!(execution_id = %id, "execution reset for retry");
        Ok(updated)
    }

    /// Whether an execution is currently eligible for an automatic retry:
    /// attempts remain, the last error classifies transient, and any
    /// scheduled `retry_after` has elapsed.
    pub async fn should_retry(&self, id: &Uuid) -> Result<bool, StateError> {
        let current = self.require(id).await?;
        Ok(record_is_retryable(&current, false))
    }

    /// All `Failed` executions eligible for automatic retry. Permanent-error
    /// records are filtered out even when their `retry_after` has elapsed.
    pub async fn retryable_executions(&self) -> Result<Vec<WorkflowExecution>, StateError> {
        let failed = self
            .repo
            .find_many(&ExecutionFilter::with_statuses(vec![
                ExecutionStatus::Failed,
            ]))
            .await?;

        Ok(failed
            .into_iter()
            .filter(|execution| record_is_retryable(execution, false))
            .collect())
    }

    // -----------------------------------------------------------------------
    // Liveness / projections
    // -----------------------------------------------------------------------

    /// `Running` executions whose `started_at` is older than the threshold:
    /// their worker likely died without reporting. Handling (force-fail,
    /// re-enqueue) belongs to an external supervisor.
    pub async fn stuck_executions(
        &self,
        threshold_minutes: u32,
    ) -> Result<Vec<WorkflowExecution>, StateError> {
        let cutoff = Utc::now() - Duration::minutes(i64::from(threshold_minutes));
        let filter = ExecutionFilter {
            statuses: vec![ExecutionStatus::Running],
            started_before: Some(cutoff),
            ..Default::default()
        };
        Ok(self.repo.find_many(&filter).await?)
    }

    /// Point-in-time progress projection; `None` when the ID is unknown.
    pub async fn execution_progress(
        &self,
        id: &Uuid,
    ) -> Result<Option<ExecutionProgress>, StateError> {
        let Some(execution) = self.repo.find_by_id(id).await? else {
            return Ok(None);
        };

        let progress = if execution.total_steps == 0 {
            0
        } else {
            ((f64::from(execution.completed_steps) / f64::from(execution.total_steps)) * 100.0)
                .round() as u32
        };

        let remaining = execution
            .total_steps
            .saturating_sub(execution.completed_steps + execution.failed_steps);

        let estimated_time_remaining_ms = if execution.completed_steps == 0 {
            0
        } else {
            let elapsed_ms = execution
                .started_at
                .map(|started_at| (Utc::now() - started_at).num_milliseconds())
                .unwrap_or(0)
                .max(0);
            elapsed_ms / i64::from(execution.completed_steps) * i64::from(remaining)
        };

        Ok(Some(ExecutionProgress {
            current_step: execution.current_step,
            total_steps: execution.total_steps,
            completed_steps: execution.completed_steps,
            failed_steps: execution.failed_steps,
            progress,
            estimated_time_remaining_ms,
        }))
    }

    /// Aggregate metrics across the whole store, with a bounded sample of
    /// the most recent executions.
    pub async fn execution_metrics(&self) -> Result<ExecutionMetrics, StateError> {
        let total = self.repo.count(&ExecutionFilter::default()).await?;
        let successful = self
            .repo
            .count(&ExecutionFilter::with_statuses(vec![
                ExecutionStatus::Completed,
            ]))
            .await?;
        let failed = self
            .repo
            .count(&ExecutionFilter::with_statuses(vec![
                ExecutionStatus::Failed,
            ]))
            .await?;

        let success_rate = if total == 0 {
            0.0
        } else {
            successful as f64 / total as f64 * 100.0
        };

        let completed_records = self
            .repo
            .find_many(&ExecutionFilter::with_statuses(vec![
                ExecutionStatus::Completed,
            ]))
            .await?;
        let times: Vec<i64> = completed_records
            .iter()
            .filter_map(|execution| execution.execution_time_ms)
            .collect();
        let average_execution_time_ms = if times.is_empty() {
            0.0
        } else {
            times.iter().sum::<i64>() as f64 / times.len() as f64
        };

        let recent_executions = self
            .repo
            .find_many(&ExecutionFilter {
                limit: Some(RECENT_SAMPLE_LIMIT),
                order: SortOrder::Desc,
                ..Default::default()
            })
            .await?;

        Ok(ExecutionMetrics {
            total_executions: total,
            successful_executions: successful,
            failed_executions: failed,
            success_rate,
            average_execution_time_ms,
            recent_executions,
        })
    }

    // -----------------------------------------------------------------------
    // Queue linkage
    // -----------------------------------------------------------------------

    /// Associate an in-flight queue job with an execution. Status unchanged.
    pub async fn set_queue_job(
        &self,
        id: &Uuid,
        job_id: &str,
        queue_name: &str,
    ) -> Result<WorkflowExecution, StateError> {
        self.require(id).await?;
        let patch = ExecutionPatch {
            queue_job: Some(Some((job_id.to_string(), queue_name.to_string()))),
            ..Default::default()
        };
        Ok(self.repo.update(id, &patch).await?)
    }

    // -----------------------------------------------------------------------
    // Cleanup
    // -----------------------------------------------------------------------

    /// Delete terminal executions older than the retention window. Never
    /// touches non-terminal records regardless of age. Returns the count
    /// deleted.
    pub async fn cleanup_old_executions(&self, retention_days: u32) -> Result<u64, StateError> {
        let cutoff = Utc::now() - Duration::days(i64::from(retention_days));
        let filter = ExecutionFilter {
            statuses: vec![
                ExecutionStatus::Completed,
                ExecutionStatus::Failed,
                ExecutionStatus::Cancelled,
            ],
            created_before: Some(cutoff),
            ..Default::default()
        };

        let deleted = self.repo.delete_many(&filter).await?;
        if deleted > 0 {
            tracing::info!(deleted, retention_days, "cleaned up old executions");
        }
        Ok(deleted)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn require(&self, id: &Uuid) -> Result<WorkflowExecution, StateError> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or(StateError::NotFound(*id))
    }

    /// Cancel the associated queue job, if any. Failures are logged and
    /// swallowed: the queue is disposable, the record is the truth.
    async fn cancel_queue_job_best_effort(&self, execution: &WorkflowExecution, reason: &str) {
        let (Some(job_id), Some(queue_name)) =
            (&execution.queue_job_id, &execution.queue_name)
        else {
            return;
        };

        if let Err(err) = self.queue.cancel_job(queue_name, job_id).await {
            tracing::warn!(
                execution_id = %execution.id,
                queue = queue_name.as_str(),
                job_id = job_id.as_str(),
                reason,
                error = %err,
                "queue cancel failed; state transition proceeds"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Predicates / merge helpers
// ---------------------------------------------------------------------------

/// The retry-eligibility predicate. `ignore_backoff` is used by the
/// administrative reset, which does not wait out `retry_after`.
fn record_is_retryable(execution: &WorkflowExecution, ignore_backoff: bool) -> bool {
    if execution.attempt_count >= execution.max_attempts {
        return false;
    }
    if let Some(error) = &execution.error
        && !is_transient(error)
    {
        return false;
    }
    if !ignore_backoff
        && let Some(retry_after) = execution.retry_after
        && retry_after > Utc::now()
    {
        return false;
    }
    true
}

/// Fold a `ProgressUpdate` into a patch, enforcing the step-count invariant
/// against the resulting record.
fn merge_progress(
    current: &WorkflowExecution,
    progress: &ProgressUpdate,
    patch: &mut ExecutionPatch,
) -> Result<(), StateError> {
    let completed = progress.completed_steps.unwrap_or(current.completed_steps);
    let failed = progress.failed_steps.unwrap_or(current.failed_steps);
    if completed + failed > current.total_steps {
        return Err(StateError::InvalidProgress(format!(
            "completed ({completed}) + failed ({failed}) exceeds total steps ({})",
            current.total_steps
        )));
    }

    patch.current_step = progress.current_step;
    patch.completed_steps = progress.completed_steps;
    patch.failed_steps = progress.failed_steps;
    patch.step_result = progress.step_result.clone();
    if let Some(error) = &progress.error {
        patch.error = Some(Some(error.clone()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
