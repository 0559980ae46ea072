//! Harness error types.

use coordinator::CoordinatorError;
use thiserror::Error;

/// Errors that end a worker early.
///
/// These are recorded in the report as worker failures, separately from
/// anomalies, and never stop the other workers.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// A coordinator operation failed outright.
    #[error("Coordinator error: {0}")]
    Coordinator(#[from] CoordinatorError),

    /// Scenario-specific failure.
    #[error("Scenario error: {0}")]
    Scenario(String),
}

impl HarnessError {
    /// Returns true if the store could not be reached.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, HarnessError::Coordinator(e) if e.is_connectivity())
    }
}

impl From<catalog::CatalogError> for HarnessError {
    fn from(e: catalog::CatalogError) -> Self {
        HarnessError::Coordinator(e.into())
    }
}

/// Result type for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;
