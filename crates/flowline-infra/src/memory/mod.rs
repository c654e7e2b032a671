//! In-memory adapters: execution repository, queue service and log sink.
//!
//! Used as test doubles and as the storage backend for single-process
//! embedded deployments. Semantics deliberately match the SQLite adapters
//! (both apply `ExecutionPatch` via its shared `apply`).

pub mod execution;
pub mod log;
pub mod queue;

pub use execution::InMemoryExecutionRepository;
pub use log::InMemoryLogSink;
pub use queue::InMemoryQueueService;

// ---------------------------------------------------------------------------
// Lifecycle tests over the real adapters
// ---------------------------------------------------------------------------

#[cfg(test)]
mod lifecycle_tests {
    use super::*;
    use flowline_core::execution::state::{ExecutionStateManager, NewExecution, ProgressUpdate};
    use flowline_core::queue::QueueService;
    use flowline_types::execution::{ExecutionStatus, QueueJob, QueueJobStatus, StepResult};
    use serde_json::json;
    use std::collections::HashMap;
    use uuid::Uuid;

    type Manager = ExecutionStateManager<InMemoryExecutionRepository, InMemoryQueueService>;

    fn manager() -> Manager {
        ExecutionStateManager::new(
            InMemoryExecutionRepository::new(),
            InMemoryQueueService::new(),
        )
    }

    /// The full happy path an orchestrator and worker drive together:
    /// create, enqueue, associate, run, report progress, complete.
    #[tokio::test]
    async fn test_submission_to_completion() {
        let manager = manager();
        let queue = InMemoryQueueService::new();

        let execution = manager
            .create_execution(NewExecution {
                workflow_id: Uuid::now_v7(),
                user_id: "user-1".to_string(),
                total_steps: 2,
                max_attempts: None,
                metadata: HashMap::new(),
            })
            .await
            .unwrap();

        let job_id = queue
            .enqueue(
                "workflow-executions",
                &QueueJob {
                    execution_id: execution.id,
                    workflow_id: execution.workflow_id,
                    payload: json!({}),
                },
            )
            .await
            .unwrap();
        manager
            .set_queue_job(&execution.id, &job_id, "workflow-executions")
            .await
            .unwrap();

        manager
            .update_status(&execution.id, ExecutionStatus::Running, None)
            .await
            .unwrap();
        for (index, step_id) in ["fetch", "store"].iter().enumerate() {
            manager
                .update_progress(
                    &execution.id,
                    ProgressUpdate {
                        current_step: Some(index as u32 + 1),
                        completed_steps: Some(index as u32 + 1),
                        step_result: Some((
                            step_id.to_string(),
                            StepResult::succeeded(json!({ "step": step_id }), 5),
                        )),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
        }
        let done = manager
            .update_status(&execution.id, ExecutionStatus::Completed, None)
            .await
            .unwrap();

        assert_eq!(done.status, ExecutionStatus::Completed);
        assert_eq!(done.completed_steps, 2);
        assert_eq!(done.step_results.len(), 2);
        assert!(done.execution_time_ms.is_some());

        let progress = manager
            .execution_progress(&execution.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(progress.progress, 100);
    }

    /// Pausing through the manager cancels the associated job on the real
    /// queue adapter and clears the linkage.
    #[tokio::test]
    async fn test_pause_cancels_real_queue_job() {
        let repo = InMemoryExecutionRepository::new();
        let queue = InMemoryQueueService::new();
        let job_id = queue
            .enqueue(
                "workflow-executions",
                &QueueJob {
                    execution_id: Uuid::now_v7(),
                    workflow_id: Uuid::now_v7(),
                    payload: json!({}),
                },
            )
            .await
            .unwrap();

        let manager = ExecutionStateManager::new(repo, queue);
        let execution = manager
            .create_execution(NewExecution {
                workflow_id: Uuid::now_v7(),
                user_id: "user-1".to_string(),
                total_steps: 1,
                max_attempts: None,
                metadata: HashMap::new(),
            })
            .await
            .unwrap();
        manager
            .set_queue_job(&execution.id, &job_id, "workflow-executions")
            .await
            .unwrap();

        let paused = manager
            .pause_execution(&execution.id, "operator")
            .await
            .unwrap();
        assert_eq!(paused.status, ExecutionStatus::Paused);
        assert!(paused.queue_job_id.is_none());

        // Verify against the queue itself, not just the record.
        assert_eq!(
            manager
                .queue()
                .job_status("workflow-executions", &job_id)
                .await
                .unwrap(),
            QueueJobStatus::Cancelled
        );
    }

    /// Failed-with-transient-error executions surface through
    /// `retryable_executions`, and the reset lane restores a clean slate.
    #[tokio::test]
    async fn test_failure_retry_and_reset_lane() {
        let manager = manager();
        let execution = manager
            .create_execution(NewExecution {
                workflow_id: Uuid::now_v7(),
                user_id: "user-1".to_string(),
                total_steps: 3,
                max_attempts: Some(3),
                metadata: HashMap::new(),
            })
            .await
            .unwrap();

        manager
            .update_status(&execution.id, ExecutionStatus::Running, None)
            .await
            .unwrap();
        manager
            .update_status(
                &execution.id,
                ExecutionStatus::Failed,
                Some(ProgressUpdate {
                    completed_steps: Some(1),
                    failed_steps: Some(1),
                    error: Some("SERVICE_UNAVAILABLE: upstream 503".to_string()),
                    ..Default::default()
                }),
            )
            .await
            .unwrap();

        assert!(manager.should_retry(&execution.id).await.unwrap());
        assert_eq!(manager.retryable_executions().await.unwrap().len(), 1);

        let reset = manager.reset_for_retry(&execution.id).await.unwrap();
        assert_eq!(reset.status, ExecutionStatus::Pending);
        assert_eq!(reset.completed_steps, 0);
        assert!(reset.error.is_none());
    }

    #[tokio::test]
    async fn test_queue_status_lifecycle() {
        let queue = InMemoryQueueService::new();
        let job_id = queue
            .enqueue(
                "workflow-executions",
                &QueueJob {
                    execution_id: Uuid::now_v7(),
                    workflow_id: Uuid::now_v7(),
                    payload: json!({}),
                },
            )
            .await
            .unwrap();

        assert_eq!(
            queue.job_status("workflow-executions", &job_id).await.unwrap(),
            QueueJobStatus::Waiting
        );
        queue.cancel_job("workflow-executions", &job_id).await.unwrap();
        assert_eq!(
            queue.job_status("workflow-executions", &job_id).await.unwrap(),
            QueueJobStatus::Cancelled
        );
    }
}
