//! In-memory execution log sink.

use std::sync::Mutex;

use flowline_core::repository::log::ExecutionLogSink;
use flowline_types::error::RepositoryError;
use flowline_types::execution::ExecutionLogEntry;
use uuid::Uuid;

/// Lock-guarded log sink for tests and embedded use.
#[derive(Default)]
pub struct InMemoryLogSink {
    entries: Mutex<Vec<ExecutionLogEntry>>,
}

impl InMemoryLogSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded entries, in insertion order.
    pub fn entries(&self) -> Vec<ExecutionLogEntry> {
        self.entries.lock().unwrap().clone()
    }

    /// Entries for one execution, in insertion order.
    pub fn entries_for(&self, execution_id: &Uuid) -> Vec<ExecutionLogEntry> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| entry.execution_id == *execution_id)
            .cloned()
            .collect()
    }
}

impl ExecutionLogSink for InMemoryLogSink {
    async fn record(&self, entry: &ExecutionLogEntry) -> Result<(), RepositoryError> {
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }
}
