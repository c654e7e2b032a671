//! Execution repository port: patch-based atomic updates over an opaque
//! transactional record store.
//!
//! Every mutation of a `WorkflowExecution` travels as an [`ExecutionPatch`]
//! applied by the adapter in one atomic unit (a dashmap entry lock in memory,
//! a single serialized transaction in SQLite). This is what prevents a pause
//! request and a worker's progress report from losing updates when they race
//! on the same record.

use chrono::{DateTime, Utc};
use flowline_types::error::RepositoryError;
use flowline_types::execution::{ExecutionStatus, StepResult, WorkflowExecution};
use serde_json::Value;
use uuid::Uuid;

use super::SortOrder;

// ---------------------------------------------------------------------------
// ExecutionRepository
// ---------------------------------------------------------------------------

/// Storage port for execution records.
///
/// Uses native async fn in traits (no async_trait macro). Adapters must apply
/// `update` atomically per record: read, apply the whole patch, write, with
/// no interleaved writer.
pub trait ExecutionRepository: Send + Sync {
    /// Persist a new execution record.
    fn create(
        &self,
        execution: &WorkflowExecution,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Atomically apply a patch and return the updated record.
    ///
    /// Errors with `RepositoryError::NotFound` when the ID is unknown.
    fn update(
        &self,
        id: &Uuid,
        patch: &ExecutionPatch,
    ) -> impl std::future::Future<Output = Result<WorkflowExecution, RepositoryError>> + Send;

    /// Fetch a single execution by ID.
    fn find_by_id(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<WorkflowExecution>, RepositoryError>> + Send;

    /// Fetch all executions matching a filter, ordered by creation time.
    fn find_many(
        &self,
        filter: &ExecutionFilter,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowExecution>, RepositoryError>> + Send;

    /// Delete all executions matching a filter; returns the count deleted.
    fn delete_many(
        &self,
        filter: &ExecutionFilter,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;

    /// Count executions matching a filter.
    fn count(
        &self,
        filter: &ExecutionFilter,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;
}

// ---------------------------------------------------------------------------
// ExecutionPatch
// ---------------------------------------------------------------------------

/// Partial update of an execution record.
///
/// Plain fields use `Option` (None = leave untouched). Nullable fields use
/// the double-`Option` convention: `None` leaves the field untouched,
/// `Some(None)` clears it, `Some(Some(v))` sets it. Counters additionally
/// support increment-style deltas so concurrent reporters compose.
#[derive(Debug, Clone, Default)]
pub struct ExecutionPatch {
    pub status: Option<ExecutionStatus>,
    pub current_step: Option<u32>,
    pub completed_steps: Option<u32>,
    pub failed_steps: Option<u32>,
    /// Added to `attempt_count` (increment-style delta).
    pub attempt_delta: u32,
    /// Merged into the `step_results` map.
    pub step_result: Option<(String, StepResult)>,
    /// Empties the `step_results` map (applied before `step_result`).
    pub clear_step_results: bool,
    pub error: Option<Option<String>>,
    pub result: Option<Option<Value>>,
    pub retry_after: Option<Option<DateTime<Utc>>>,
    pub started_at: Option<Option<DateTime<Utc>>>,
    pub completed_at: Option<Option<DateTime<Utc>>>,
    pub execution_time_ms: Option<Option<i64>>,
    pub paused_at: Option<Option<DateTime<Utc>>>,
    pub paused_by: Option<Option<String>>,
    pub resumed_at: Option<Option<DateTime<Utc>>>,
    pub resumed_by: Option<Option<String>>,
    /// Queue linkage as one unit: `Some(None)` clears both fields,
    /// `Some(Some((job_id, queue_name)))` sets both.
    pub queue_job: Option<Option<(String, String)>>,
}

impl ExecutionPatch {
    /// A patch that only changes the status.
    pub fn status(status: ExecutionStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Apply this patch to a record in place, bumping `updated_at`.
    ///
    /// Shared by the adapters so that in-memory and SQLite semantics cannot
    /// drift apart.
    pub fn apply(&self, execution: &mut WorkflowExecution) {
        if let Some(status) = self.status {
            execution.status = status;
        }
        if let Some(step) = self.current_step {
            execution.current_step = step;
        }
        if let Some(completed) = self.completed_steps {
            execution.completed_steps = completed;
        }
        if let Some(failed) = self.failed_steps {
            execution.failed_steps = failed;
        }
        execution.attempt_count += self.attempt_delta;

        if self.clear_step_results {
            execution.step_results.clear();
        }
        if let Some((step_id, result)) = &self.step_result {
            execution
                .step_results
                .insert(step_id.clone(), result.clone());
        }

        if let Some(error) = &self.error {
            execution.error = error.clone();
        }
        if let Some(result) = &self.result {
            execution.result = result.clone();
        }
        if let Some(retry_after) = self.retry_after {
            execution.retry_after = retry_after;
        }
        if let Some(started_at) = self.started_at {
            execution.started_at = started_at;
        }
        if let Some(completed_at) = self.completed_at {
            execution.completed_at = completed_at;
        }
        if let Some(execution_time) = self.execution_time_ms {
            execution.execution_time_ms = execution_time;
        }
        if let Some(paused_at) = self.paused_at {
            execution.paused_at = paused_at;
        }
        if let Some(paused_by) = &self.paused_by {
            execution.paused_by = paused_by.clone();
        }
        if let Some(resumed_at) = self.resumed_at {
            execution.resumed_at = resumed_at;
        }
        if let Some(resumed_by) = &self.resumed_by {
            execution.resumed_by = resumed_by.clone();
        }
        if let Some(queue_job) = &self.queue_job {
            match queue_job {
                Some((job_id, queue_name)) => {
                    execution.queue_job_id = Some(job_id.clone());
                    execution.queue_name = Some(queue_name.clone());
                }
                None => {
                    execution.queue_job_id = None;
                    execution.queue_name = None;
                }
            }
        }

        execution.updated_at = Utc::now();
    }
}

// ---------------------------------------------------------------------------
// ExecutionFilter
// ---------------------------------------------------------------------------

/// Predicate for `find_many` / `delete_many` / `count`.
#[derive(Debug, Clone, Default)]
pub struct ExecutionFilter {
    /// Match any of these statuses; empty matches all statuses.
    pub statuses: Vec<ExecutionStatus>,
    pub workflow_id: Option<Uuid>,
    pub user_id: Option<String>,
    /// Only records created strictly before this instant.
    pub created_before: Option<DateTime<Utc>>,
    /// Only records started strictly before this instant (records that never
    /// started do not match).
    pub started_before: Option<DateTime<Utc>>,
    /// Cap on the number of records returned by `find_many`.
    pub limit: Option<u32>,
    /// Ordering by `created_at`.
    pub order: SortOrder,
}

impl ExecutionFilter {
    /// Filter on a status set.
    pub fn with_statuses(statuses: impl Into<Vec<ExecutionStatus>>) -> Self {
        Self {
            statuses: statuses.into(),
            ..Self::default()
        }
    }

    /// Whether a record matches this filter (limit and order excluded).
    ///
    /// Shared by the in-memory adapter; the SQLite adapter compiles the same
    /// predicate to a WHERE clause.
    pub fn matches(&self, execution: &WorkflowExecution) -> bool {
        if !self.statuses.is_empty() && !self.statuses.contains(&execution.status) {
            return false;
        }
        if let Some(workflow_id) = &self.workflow_id
            && execution.workflow_id != *workflow_id
        {
            return false;
        }
        if let Some(user_id) = &self.user_id
            && execution.user_id != *user_id
        {
            return false;
        }
        if let Some(created_before) = self.created_before
            && execution.created_at >= created_before
        {
            return false;
        }
        if let Some(started_before) = self.started_before {
            match execution.started_at {
                Some(started_at) if started_at < started_before => {}
                _ => return false,
            }
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
