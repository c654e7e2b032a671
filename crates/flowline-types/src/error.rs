use thiserror::Error;

/// Errors from repository operations (used by trait definitions in
/// flowline-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors from the queue-service collaborator.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue '{0}' is unavailable")]
    Unavailable(String),

    #[error("enqueue rejected: {0}")]
    Rejected(String),

    #[error("queue backend error: {0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_display() {
        let err = RepositoryError::Query("syntax error".to_string());
        assert_eq!(err.to_string(), "query error: syntax error");
    }

    #[test]
    fn test_queue_error_display() {
        let err = QueueError::Unavailable("workflows".to_string());
        assert!(err.to_string().contains("workflows"));
    }
}
