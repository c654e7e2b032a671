//! Execution-log sink port.

use flowline_types::error::RepositoryError;
use flowline_types::execution::ExecutionLogEntry;

/// Best-effort sink for per-attempt execution log records.
///
/// The step runner emits one entry per attempt from a detached task and never
/// waits on the write for correctness: a failing sink is observable only
/// through its own monitoring, never through a failed step.
pub trait ExecutionLogSink: Send + Sync {
    /// Persist one log entry.
    fn record(
        &self,
        entry: &ExecutionLogEntry,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
