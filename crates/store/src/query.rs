use crate::row::{ClusteringKey, ClusteringOrder};

/// Builder for constructing row queries against one partition.
///
/// An empty query returns the whole partition in newest-first order.
#[derive(Debug, Clone, Default)]
pub struct RowQuery {
    /// Restrict to the single row with this clustering key.
    pub clustering: Option<ClusteringKey>,

    /// Maximum number of rows to return, applied after ordering.
    pub limit: Option<usize>,

    /// Order in which rows are returned.
    pub order: ClusteringOrder,
}

impl RowQuery {
    /// Creates a query for the whole partition.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query for one concrete row.
    pub fn row(clustering: ClusteringKey) -> Self {
        Self {
            clustering: Some(clustering),
            ..Default::default()
        }
    }

    /// Creates a query for the most recent `limit` rows.
    pub fn newest(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Default::default()
        }
    }

    /// Limits the number of rows returned.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the order of returned rows.
    pub fn order(mut self, order: ClusteringOrder) -> Self {
        self.order = order;
        self
    }
}
