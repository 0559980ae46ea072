//! Coordinator error types.

use catalog::CatalogError;
use common::EntityId;
use store::StoreError;
use thiserror::Error;

/// Errors surfaced by coordinator operations.
///
/// A fan-out where only some views failed is not an error: it is returned as
/// a [`FanoutOutcome`](crate::FanoutOutcome) with a partial status.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// The store failed and nothing was written.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The catalog is misconfigured or a row could not be decoded.
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// The entity to edit or delete could not be located.
    #[error("Entity not found: {entity_id}")]
    NotFound { entity_id: EntityId },
}

impl CoordinatorError {
    /// Returns true if the store could not be reached.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, CoordinatorError::Store(e) if e.is_connectivity())
    }
}

/// Result type for coordinator operations.
pub type Result<T> = std::result::Result<T, CoordinatorError>;
