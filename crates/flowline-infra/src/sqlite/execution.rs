//! SQLite execution repository and log sink.
//!
//! Execution records are stored as JSON blobs alongside the columns list
//! queries filter on (status, timestamps, workflow). `update` re-reads the
//! blob, applies the shared `ExecutionPatch::apply`, and writes it back
//! inside one transaction on the single-connection writer pool -- writes
//! serialize there, which is the atomicity the core contract requires.

use chrono::{DateTime, SecondsFormat, Utc};
use flowline_core::repository::SortOrder;
use flowline_core::repository::execution::{ExecutionFilter, ExecutionPatch, ExecutionRepository};
use flowline_core::repository::log::ExecutionLogSink;
use flowline_types::error::RepositoryError;
use flowline_types::execution::{ExecutionLogEntry, WorkflowExecution};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;

// ---------------------------------------------------------------------------
// SqliteExecutionRepository
// ---------------------------------------------------------------------------

/// SQLite-backed implementation of `ExecutionRepository`.
pub struct SqliteExecutionRepository {
    pool: DatabasePool,
}

impl SqliteExecutionRepository {
    /// Create a repository backed by the given pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

impl ExecutionRepository for SqliteExecutionRepository {
    async fn create(&self, execution: &WorkflowExecution) -> Result<(), RepositoryError> {
        let record = encode_record(execution)?;
        sqlx::query(
            "INSERT INTO executions (id, workflow_id, user_id, status, created_at, started_at, record) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(execution.id.to_string())
        .bind(execution.workflow_id.to_string())
        .bind(&execution.user_id)
        .bind(execution.status.to_string())
        .bind(fmt_ts(&execution.created_at))
        .bind(execution.started_at.as_ref().map(fmt_ts))
        .bind(record)
        .execute(&self.pool.writer)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn update(
        &self,
        id: &Uuid,
        patch: &ExecutionPatch,
    ) -> Result<WorkflowExecution, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(db_err)?;

        let row = sqlx::query("SELECT record FROM executions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;
        let Some(row) = row else {
            return Err(RepositoryError::NotFound);
        };

        let mut execution = decode_record(row.try_get("record").map_err(db_err)?)?;
        patch.apply(&mut execution);

        sqlx::query(
            "UPDATE executions SET status = ?, started_at = ?, record = ? WHERE id = ?",
        )
        .bind(execution.status.to_string())
        .bind(execution.started_at.as_ref().map(fmt_ts))
        .bind(encode_record(&execution)?)
        .bind(id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(execution)
    }

    async fn find_by_id(&self, id: &Uuid) -> Result<Option<WorkflowExecution>, RepositoryError> {
        let row = sqlx::query("SELECT record FROM executions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(db_err)?;

        row.map(|row| decode_record(row.try_get("record").map_err(db_err)?))
            .transpose()
    }

    async fn find_many(
        &self,
        filter: &ExecutionFilter,
    ) -> Result<Vec<WorkflowExecution>, RepositoryError> {
        let (clause, binds) = build_predicate(filter);
        let order = match filter.order {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };
        let mut sql = format!("SELECT record FROM executions{clause} ORDER BY created_at {order}");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = query.bind(bind);
        }

        let rows = query.fetch_all(&self.pool.reader).await.map_err(db_err)?;
        rows.into_iter()
            .map(|row| decode_record(row.try_get("record").map_err(db_err)?))
            .collect()
    }

    async fn delete_many(&self, filter: &ExecutionFilter) -> Result<u64, RepositoryError> {
        let (clause, binds) = build_predicate(filter);
        let sql = format!("DELETE FROM executions{clause}");

        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = query.bind(bind);
        }

        let result = query.execute(&self.pool.writer).await.map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn count(&self, filter: &ExecutionFilter) -> Result<u64, RepositoryError> {
        let (clause, binds) = build_predicate(filter);
        let sql = format!("SELECT COUNT(*) AS n FROM executions{clause}");

        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = query.bind(bind);
        }

        let row = query.fetch_one(&self.pool.reader).await.map_err(db_err)?;
        let n: i64 = row.try_get("n").map_err(db_err)?;
        Ok(n as u64)
    }
}

// ---------------------------------------------------------------------------
// SqliteLogSink
// ---------------------------------------------------------------------------

/// SQLite-backed implementation of `ExecutionLogSink`.
pub struct SqliteLogSink {
    pool: DatabasePool,
}

impl SqliteLogSink {
    /// Create a sink backed by the given pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// All log entries for one execution, oldest first. Used by layers that
    /// render attempt history; not part of the core port.
    pub async fn list_entries(
        &self,
        execution_id: &Uuid,
    ) -> Result<Vec<ExecutionLogEntry>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, execution_id, step_id, step_name, attempt, success, output, error, \
                    duration_ms, created_at \
             FROM execution_logs WHERE execution_id = ? ORDER BY created_at ASC",
        )
        .bind(execution_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(db_err)?;

        rows.iter().map(decode_log_row).collect()
    }
}

impl ExecutionLogSink for SqliteLogSink {
    async fn record(&self, entry: &ExecutionLogEntry) -> Result<(), RepositoryError> {
        let output = entry
            .output
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| RepositoryError::Query(format!("invalid log output JSON: {e}")))?;

        sqlx::query(
            "INSERT INTO execution_logs \
                (id, execution_id, step_id, step_name, attempt, success, output, error, \
                 duration_ms, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.id.to_string())
        .bind(entry.execution_id.to_string())
        .bind(&entry.step_id)
        .bind(&entry.step_name)
        .bind(entry.attempt as i64)
        .bind(entry.success)
        .bind(output)
        .bind(&entry.error)
        .bind(entry.duration_ms as i64)
        .bind(fmt_ts(&entry.created_at))
        .execute(&self.pool.writer)
        .await
        .map_err(db_err)?;

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Row / predicate helpers
// ---------------------------------------------------------------------------

fn build_predicate(filter: &ExecutionFilter) -> (String, Vec<String>) {
    let mut clauses: Vec<String> = Vec::new();
    let mut binds: Vec<String> = Vec::new();

    if !filter.statuses.is_empty() {
        let placeholders = vec!["?"; filter.statuses.len()].join(", ");
        clauses.push(format!("status IN ({placeholders})"));
        binds.extend(filter.statuses.iter().map(|status| status.to_string()));
    }
    if let Some(workflow_id) = &filter.workflow_id {
        clauses.push("workflow_id = ?".to_string());
        binds.push(workflow_id.to_string());
    }
    if let Some(user_id) = &filter.user_id {
        clauses.push("user_id = ?".to_string());
        binds.push(user_id.clone());
    }
    if let Some(created_before) = &filter.created_before {
        clauses.push("created_at < ?".to_string());
        binds.push(fmt_ts(created_before));
    }
    if let Some(started_before) = &filter.started_before {
        clauses.push("(started_at IS NOT NULL AND started_at < ?)".to_string());
        binds.push(fmt_ts(started_before));
    }

    let clause = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    (clause, binds)
}

/// Fixed-width RFC 3339 (millisecond precision, `Z` suffix) so lexicographic
/// comparison in SQL matches chronological order.
fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid timestamp '{raw}': {e}")))
}

fn encode_record(execution: &WorkflowExecution) -> Result<String, RepositoryError> {
    serde_json::to_string(execution)
        .map_err(|e| RepositoryError::Query(format!("failed to encode execution record: {e}")))
}

fn decode_record(record: String) -> Result<WorkflowExecution, RepositoryError> {
    serde_json::from_str(&record)
        .map_err(|e| RepositoryError::Query(format!("invalid execution record JSON: {e}")))
}

fn decode_log_row(row: &sqlx::sqlite::SqliteRow) -> Result<ExecutionLogEntry, RepositoryError> {
    let id: String = row.try_get("id").map_err(db_err)?;
    let execution_id: String = row.try_get("execution_id").map_err(db_err)?;
    let output: Option<String> = row.try_get("output").map_err(db_err)?;
    let created_at: String = row.try_get("created_at").map_err(db_err)?;

    let output = output
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(|e| RepositoryError::Query(format!("invalid log output JSON: {e}")))?;

    Ok(ExecutionLogEntry {
        id: parse_uuid(&id)?,
        execution_id: parse_uuid(&execution_id)?,
        step_id: row.try_get("step_id").map_err(db_err)?,
        step_name: row.try_get("step_name").map_err(db_err)?,
        attempt: row.try_get::<i64, _>("attempt").map_err(db_err)? as u32,
        success: row.try_get("success").map_err(db_err)?,
        output,
        error: row.try_get("error").map_err(db_err)?,
        duration_ms: row.try_get::<i64, _>("duration_ms").map_err(db_err)? as u64,
        created_at: parse_ts(&created_at)?,
    })
}

fn parse_uuid(raw: &str) -> Result<Uuid, RepositoryError> {
    Uuid::parse_str(raw).map_err(|e| RepositoryError::Query(format!("invalid UUID '{raw}': {e}")))
}

fn db_err(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Query(e.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use flowline_types::execution::{ExecutionStatus, StepResult};
    use serde_json::json;
    use std::collections::HashMap;

    async fn pool() -> (tempfile::TempDir, DatabasePool) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}/flowline.db", dir.path().display());
        let pool = DatabasePool::connect(&url).await.unwrap();
        (dir, pool)
    }

    fn sample(status: ExecutionStatus) -> WorkflowExecution {
        WorkflowExecution {
            id: Uuid::now_v7(),
            workflow_id: Uuid::now_v7(),
            user_id: "user-1".to_string(),
            status,
            total_steps: 3,
            current_step: 0,
            completed_steps: 0,
            failed_steps: 0,
            step_results: HashMap::new(),
            attempt_count: 0,
            max_attempts: 3,
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
            metadata: HashMap::from([("source".to_string(), json!("test"))]),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_and_find_roundtrip() {
        let (_dir, pool) = pool().await;
        let repo = SqliteExecutionRepository::new(pool);

        let execution = sample(ExecutionStatus::Pending);
        repo.create(&execution).await.unwrap();

        let found = repo.find_by_id(&execution.id).await.unwrap().unwrap();
        assert_eq!(found.id, execution.id);
        assert_eq!(found.status, ExecutionStatus::Pending);
        assert_eq!(found.metadata.get("source"), Some(&json!("test")));
        assert!(repo.find_by_id(&Uuid::now_v7()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_persists_patch_and_columns() {
        let (_dir, pool) = pool().await;
        let repo = SqliteExecutionRepository::new(pool);

        let execution = sample(ExecutionStatus::Pending);
        repo.create(&execution).await.unwrap();

        let patch = ExecutionPatch {
            status: Some(ExecutionStatus::Running),
            started_at: Some(Some(Utc::now())),
            step_result: Some(("fetch".to_string(), StepResult::succeeded(json!(1), 9))),
            ..Default::default()
        };
        let updated = repo.update(&execution.id, &patch).await.unwrap();
        assert_eq!(updated.status, ExecutionStatus::Running);

        // The status column tracks the record, so filters see the change.
        let running = repo
            .find_many(&ExecutionFilter::with_statuses(vec![
                ExecutionStatus::Running,
            ]))
            .await
            .unwrap();
        assert_eq!(running.len(), 1);
        assert!(running[0].step_results.contains_key("fetch"));
    }

    #[tokio::test]
    async fn test_update_unknown_id_is_not_found() {
        let (_dir, pool) = pool().await;
        let repo = SqliteExecutionRepository::new(pool);
        let err = repo
            .update(&Uuid::now_v7(), &ExecutionPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn test_find_many_filters_order_and_limit() {
        let (_dir, pool) = pool().await;
        let repo = SqliteExecutionRepository::new(pool);

        let mut ids = Vec::new();
        for i in 0..3i64 {
            let mut execution = sample(ExecutionStatus::Completed);
            execution.created_at = Utc::now() + chrono::Duration::seconds(i);
            ids.push(execution.id);
            repo.create(&execution).await.unwrap();
        }
        repo.create(&sample(ExecutionStatus::Running)).await.unwrap();

        let newest_first = repo
            .find_many(&ExecutionFilter {
                statuses: vec![ExecutionStatus::Completed],
                limit: Some(2),
                order: SortOrder::Desc,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(newest_first.len(), 2);
        assert_eq!(newest_first[0].id, ids[2]);

        assert_eq!(
            repo.count(&ExecutionFilter::with_statuses(vec![
                ExecutionStatus::Completed
            ]))
            .await
            .unwrap(),
            3
        );
    }

    #[tokio::test]
    async fn test_delete_many_respects_created_before() {
        let (_dir, pool) = pool().await;
        let repo = SqliteExecutionRepository::new(pool);

        let mut old = sample(ExecutionStatus::Completed);
        old.created_at = Utc::now() - chrono::Duration::days(60);
        repo.create(&old).await.unwrap();
        repo.create(&sample(ExecutionStatus::Completed)).await.unwrap();

        let deleted = repo
            .delete_many(&ExecutionFilter {
                statuses: vec![ExecutionStatus::Completed],
                created_before: Some(Utc::now() - chrono::Duration::days(30)),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert!(repo.find_by_id(&old.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_started_before_ignores_never_started() {
        let (_dir, pool) = pool().await;
        let repo = SqliteExecutionRepository::new(pool);

        let never_started = sample(ExecutionStatus::Running);
        repo.create(&never_started).await.unwrap();

        let mut stuck = sample(ExecutionStatus::Running);
        stuck.started_at = Some(Utc::now() - chrono::Duration::hours(3));
        repo.create(&stuck).await.unwrap();

        let matched = repo
            .find_many(&ExecutionFilter {
                statuses: vec![ExecutionStatus::Running],
                started_before: Some(Utc::now() - chrono::Duration::hours(1)),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, stuck.id);
    }

    #[tokio::test]
    async fn test_log_sink_roundtrip() {
        let (_dir, pool) = pool().await;
        let sink = SqliteLogSink::new(pool);
        let execution_id = Uuid::now_v7();

        for attempt in 1..=2u32 {
            sink.record(&ExecutionLogEntry {
                id: Uuid::now_v7(),
                execution_id,
                step_id: "fetch".to_string(),
                step_name: "Fetch".to_string(),
                attempt,
                success: attempt == 2,
                output: Some(json!({ "attempt": attempt })),
                error: (attempt == 1).then(|| "TIMEOUT: x".to_string()),
                duration_ms: 15,
                created_at: Utc::now() + chrono::Duration::milliseconds(i64::from(attempt)),
            })
            .await
            .unwrap();
        }

        let entries = sink.list_entries(&execution_id).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].attempt, 1);
        assert!(!entries[0].success);
        assert_eq!(entries[0].error.as_deref(), Some("TIMEOUT: x"));
        assert_eq!(entries[1].output, Some(json!({ "attempt": 2 })));
        assert!(sink.list_entries(&Uuid::now_v7()).await.unwrap().is_empty());
    }
}
