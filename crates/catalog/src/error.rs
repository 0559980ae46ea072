//! Catalog error types.

use common::EntityId;
use thiserror::Error;

use crate::EntityKind;

/// Errors raised by catalog lookups and row decoding.
///
/// All of these indicate misconfiguration or corrupt rows and are fatal to the
/// worker that hits them.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// No view group is registered for this entity kind.
    #[error("No views registered for entity kind {0}")]
    UnknownKind(EntityKind),

    /// No view with this name exists in the catalog.
    #[error("Unknown view: {0}")]
    UnknownView(String),

    /// The entity lacks an attribute a view is keyed by.
    #[error("Entity {entity_id} has no attribute '{attribute}' required by view {view}")]
    MissingAttribute {
        entity_id: EntityId,
        view: &'static str,
        attribute: &'static str,
    },

    /// The catalog definition itself is inconsistent.
    #[error("Invalid catalog: {0}")]
    Invalid(String),

    /// A stored row could not be decoded into an entity.
    #[error("Row decoding error: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Result type for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;
