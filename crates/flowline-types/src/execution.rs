//! Execution domain types for Flowline.
//!
//! Defines the lifecycle record for a workflow execution (`WorkflowExecution`),
//! the per-step outcome type (`StepResult`), the per-attempt audit record
//! (`ExecutionLogEntry`), and the derived progress/metrics projections the
//! state manager computes on demand.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Execution status
// ---------------------------------------------------------------------------

/// Lifecycle status of a workflow execution.
///
/// Transitions are one-directional except the two deliberate cycles:
/// `Failed -> Pending` (administrative reset) and `Paused -> Pending`
/// (resume). Nothing leaves `Completed` or `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Paused,
    Retrying,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    /// Whether this status is terminal (no further transitions).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }

    /// Whether the state machine permits a transition from `self` to `to`.
    ///
    /// Re-asserting the current status is allowed for non-terminal states so
    /// that progress merges on an already-`Running` execution are idempotent.
    /// `Failed` is terminal for automatic purposes but admits the
    /// reset-for-retry cycle back to `Pending`.
    pub fn can_transition_to(self, to: ExecutionStatus) -> bool {
        use ExecutionStatus::*;

        if self == to {
            return !matches!(self, Completed | Cancelled);
        }

        match (self, to) {
            (Pending, Running | Paused | Cancelled | Failed) => true,
            (Running, Completed | Failed | Paused | Retrying | Cancelled) => true,
            (Retrying, Running | Failed | Paused | Cancelled) => true,
            (Paused, Pending | Cancelled) => true,
            (Failed, Pending) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Paused => "paused",
            ExecutionStatus::Retrying => "retrying",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Step result
// ---------------------------------------------------------------------------

/// Outcome of a single step invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// Whether the step succeeded.
    pub success: bool,
    /// Opaque result payload (empty object for side-effect-only steps).
    #[serde(default)]
    pub data: Value,
    /// Error message; present iff `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock duration of the execute call, in milliseconds.
    pub duration_ms: u64,
    /// Attempts made within this single invocation (0 = first try stuck).
    /// Distinct from the execution-level `attempt_count`.
    #[serde(default)]
    pub retry_count: u32,
}

impl StepResult {
    /// A successful result with the given payload.
    pub fn succeeded(data: Value, duration_ms: u64) -> Self {
        Self {
            success: true,
            data,
            error: None,
            duration_ms,
            retry_count: 0,
        }
    }

    /// A failed result with the given error message.
    pub fn failed(error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: false,
            data: Value::Null,
            error: Some(error.into()),
            duration_ms,
            retry_count: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowExecution
// ---------------------------------------------------------------------------

/// The unit of lifecycle tracking: one run of a workflow.
///
/// Created in `Pending` by the state manager at submission time and mutated
/// exclusively through the state manager's named operations. Deleted only by
/// the bulk cleanup operation, and only once terminal and older than the
/// retention window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    /// UUIDv7 execution ID.
    pub id: Uuid,
    /// ID of the workflow definition being executed.
    pub workflow_id: Uuid,
    /// Owner of the execution (opaque to this core).
    pub user_id: String,
    /// Current lifecycle status.
    pub status: ExecutionStatus,

    /// Total number of steps in the workflow.
    pub total_steps: u32,
    /// Index of the step the worker last reported working on.
    pub current_step: u32,
    /// Number of steps that completed successfully.
    pub completed_steps: u32,
    /// Number of steps that failed.
    pub failed_steps: u32,
    /// Per-step results keyed by step ID. Insertion order is irrelevant.
    #[serde(default)]
    pub step_results: HashMap<String, StepResult>,

    /// Execution-level attempts consumed so far.
    pub attempt_count: u32,
    /// Ceiling on automatic attempts.
    pub max_attempts: u32,
    /// Earliest instant the next automatic attempt may start. Set when a
    /// retryable failure schedules one; otherwise null.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<DateTime<Utc>>,
    /// Last error classification string (e.g. "TIMEOUT: upstream ...").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// When the execution was paused (if ever).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_at: Option<DateTime<Utc>>,
    /// Who requested the pause.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_by: Option<String>,
    /// When the execution was resumed (if ever).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resumed_at: Option<DateTime<Utc>>,
    /// Who requested the resume.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resumed_by: Option<String>,

    /// ID of the queue job currently carrying this execution, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_job_id: Option<String>,
    /// Name of the queue that job lives on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_name: Option<String>,

    /// When the first worker picked the execution up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the execution reached a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Total wall-clock duration in milliseconds, stamped on terminal states.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<i64>,

    /// Terminal result payload (cancellation stamps who/when here).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Opaque key/value bag supplied at creation.
    #[serde(default)]
    pub metadata: HashMap<String, Value>,

    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the record was last mutated.
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Execution log entry
// ---------------------------------------------------------------------------

/// Audit record for one step attempt. One entry is written per attempt
/// regardless of outcome; writes are best-effort and never block a step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLogEntry {
    /// UUIDv7 log entry ID.
    pub id: Uuid,
    /// Parent execution ID.
    pub execution_id: Uuid,
    /// Step ID matching `Step::id`.
    pub step_id: String,
    /// Step name (denormalized for display).
    pub step_name: String,
    /// Attempt number within the invocation (1-based).
    pub attempt: u32,
    /// Whether the attempt succeeded.
    pub success: bool,
    /// Result payload of the attempt, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Error message if the attempt failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Duration of the attempt in milliseconds.
    pub duration_ms: u64,
    /// When the entry was recorded.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Queue linkage
// ---------------------------------------------------------------------------

/// Payload handed to the queue service when enqueuing an execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueJob {
    /// Execution this job carries.
    pub execution_id: Uuid,
    /// Workflow being executed (denormalized for worker routing).
    pub workflow_id: Uuid,
    /// Opaque job payload for the worker.
    #[serde(default)]
    pub payload: Value,
}

/// Status of a queue job as reported by the queue backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueJobStatus {
    Waiting,
    Active,
    Completed,
    Failed,
    Cancelled,
    /// The queue no longer knows the job (expired or never existed).
    Unknown,
}

// ---------------------------------------------------------------------------
// Derived projections
// ---------------------------------------------------------------------------

/// Point-in-time progress snapshot, derived rather than stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionProgress {
    pub current_step: u32,
    pub total_steps: u32,
    pub completed_steps: u32,
    pub failed_steps: u32,
    /// Rounded percentage of completed steps.
    pub progress: u32,
    /// Extrapolated remaining wall-clock time in milliseconds. 0 until the
    /// first step completes.
    pub estimated_time_remaining_ms: i64,
}

/// Aggregate execution metrics across the whole store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    pub total_executions: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
    /// Percentage of successful executions; 0 when nothing has run yet.
    pub success_rate: f64,
    /// Mean `execution_time_ms` over completed records that have one.
    pub average_execution_time_ms: f64,
    /// Bounded sample of the most recent executions, newest first.
    pub recent_executions: Vec<WorkflowExecution>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
