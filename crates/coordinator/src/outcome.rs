//! Structured results of fan-out writes.

use common::EntityId;
use serde::Serialize;
use store::StoreError;

/// Logical operation a fan-out carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FanoutOperation {
    Create,
    Edit,
    Delete,
}

impl FanoutOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            FanoutOperation::Create => "create",
            FanoutOperation::Edit => "edit",
            FanoutOperation::Delete => "delete",
        }
    }
}

impl std::fmt::Display for FanoutOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether every view write of a fan-out succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FanoutStatus {
    /// Every view acknowledged the write.
    Applied,
    /// Some views acknowledged and some did not; the views now disagree.
    Partial,
}

/// A view write that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewFailure {
    pub view: &'static str,
    pub reason: String,
    pub connectivity: bool,
}

impl ViewFailure {
    pub fn new(view: &'static str, error: &StoreError) -> Self {
        Self {
            view,
            reason: error.to_string(),
            connectivity: error.is_connectivity(),
        }
    }

    /// A view write held back because an earlier view of the same fan-out failed.
    pub fn skipped(view: &'static str) -> Self {
        Self {
            view,
            reason: "skipped after an earlier view write failed".to_string(),
            connectivity: false,
        }
    }
}

/// Result of a fan-out that reached at least one view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FanoutOutcome {
    pub operation: FanoutOperation,
    pub entity_id: EntityId,
    /// Views written, in the order they were written.
    pub succeeded: Vec<&'static str>,
    /// Views whose write failed, in the order they were attempted.
    pub failed: Vec<ViewFailure>,
}

impl FanoutOutcome {
    pub fn new(operation: FanoutOperation, entity_id: EntityId) -> Self {
        Self {
            operation,
            entity_id,
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn status(&self) -> FanoutStatus {
        if self.failed.is_empty() {
            FanoutStatus::Applied
        } else {
            FanoutStatus::Partial
        }
    }

    pub fn is_applied(&self) -> bool {
        self.status() == FanoutStatus::Applied
    }

    pub fn is_partial(&self) -> bool {
        self.status() == FanoutStatus::Partial
    }

    pub fn failed_views(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.failed.iter().map(|f| f.view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_failures_means_applied() {
        let mut outcome = FanoutOutcome::new(FanoutOperation::Create, EntityId::new());
        outcome.succeeded.push("posts_by_id");
        assert!(outcome.is_applied());
        assert_eq!(outcome.status(), FanoutStatus::Applied);
    }

    #[test]
    fn any_failure_means_partial() {
        let mut outcome = FanoutOutcome::new(FanoutOperation::Delete, EntityId::new());
        outcome.succeeded.push("posts_by_author");
        outcome.failed.push(ViewFailure::new(
            "posts_by_category",
            &StoreError::WriteRejected {
                view: "posts_by_category".to_string(),
            },
        ));

        assert!(outcome.is_partial());
        assert_eq!(
            outcome.failed_views().collect::<Vec<_>>(),
            vec!["posts_by_category"]
        );
        assert!(!outcome.failed[0].connectivity);
    }

    #[test]
    fn operation_display() {
        assert_eq!(FanoutOperation::Edit.to_string(), "edit");
    }
}
