//! In-memory execution repository.
//!
//! Dashmap-backed adapter used in tests and embedded deployments. The
//! per-entry lock taken by `get_mut` is what gives `update` the atomic
//! read-apply-write semantics the core contract requires: a pause request
//! and a worker's progress report racing on the same record serialize on the
//! entry, so neither patch is lost.

use dashmap::DashMap;
use flowline_core::repository::SortOrder;
use flowline_core::repository::execution::{ExecutionFilter, ExecutionPatch, ExecutionRepository};
use flowline_types::error::RepositoryError;
use flowline_types::execution::WorkflowExecution;
use uuid::Uuid;

/// In-memory implementation of `ExecutionRepository`.
#[derive(Default)]
pub struct InMemoryExecutionRepository {
    records: DashMap<Uuid, WorkflowExecution>,
}

impl InMemoryExecutionRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl ExecutionRepository for InMemoryExecutionRepository {
    async fn create(&self, execution: &WorkflowExecution) -> Result<(), RepositoryError> {
        if self.records.contains_key(&execution.id) {
            return Err(RepositoryError::Conflict(format!(
                "execution {} already exists",
                execution.id
            )));
        }
        self.records.insert(execution.id, execution.clone());
        Ok(())
    }

    async fn update(
        &self,
        id: &Uuid,
        patch: &ExecutionPatch,
    ) -> Result<WorkflowExecution, RepositoryError> {
        // The entry lock holds for the whole read-apply-write.
        let mut entry = self.records.get_mut(id).ok_or(RepositoryError::NotFound)?;
        patch.apply(entry.value_mut());
        Ok(entry.clone())
    }

    async fn find_by_id(&self, id: &Uuid) -> Result<Option<WorkflowExecution>, RepositoryError> {
        Ok(self.records.get(id).map(|entry| entry.clone()))
    }

    async fn find_many(
        &self,
        filter: &ExecutionFilter,
    ) -> Result<Vec<WorkflowExecution>, RepositoryError> {
        let mut matched: Vec<WorkflowExecution> = self
            .records
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.clone())
            .collect();

        matched.sort_by_key(|execution| execution.created_at);
        if matches!(filter.order, SortOrder::Desc) {
            matched.reverse();
        }
        if let Some(limit) = filter.limit {
            matched.truncate(limit as usize);
        }
        Ok(matched)
    }

    async fn delete_many(&self, filter: &ExecutionFilter) -> Result<u64, RepositoryError> {
        let before = self.records.len();
        self.records.retain(|_, execution| !filter.matches(execution));
        Ok((before - self.records.len()) as u64)
    }

    async fn count(&self, filter: &ExecutionFilter) -> Result<u64, RepositoryError> {
        Ok(self
            .records
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .count() as u64)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
