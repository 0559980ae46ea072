use thiserror::Error;

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Not enough live replicas to satisfy the requested consistency level.
    #[error("Store unavailable: {required} replicas required, {alive} alive")]
    Unavailable { required: usize, alive: usize },

    /// The operation did not complete in time.
    #[error("Store operation timed out: {operation}")]
    Timeout { operation: &'static str },

    /// The store rejected or dropped a single write.
    #[error("Write to view {view} was rejected")]
    WriteRejected { view: String },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns true if the store could not be reached at all.
    pub fn is_connectivity(&self) -> bool {
        match self {
            StoreError::Unavailable { .. } | StoreError::Timeout { .. } => true,
            StoreError::Database(e) => matches!(
                e,
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
            ),
            _ => false,
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_is_connectivity() {
        let err = StoreError::Unavailable {
            required: 2,
            alive: 0,
        };
        assert!(err.is_connectivity());
        assert_eq!(
            err.to_string(),
            "Store unavailable: 2 replicas required, 0 alive"
        );
    }

    #[test]
    fn rejected_write_is_not_connectivity() {
        let err = StoreError::WriteRejected {
            view: "posts_by_author".to_string(),
        };
        assert!(!err.is_connectivity());
    }
}
