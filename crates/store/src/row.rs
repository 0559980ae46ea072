//! Addressing and row types shared by every store backend.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Partition address of a view: the view name plus its key attribute value.
///
/// Two entities that share a view key land in the same partition and are told
/// apart by their [`ClusteringKey`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ViewKey {
    pub view: String,
    pub partition: String,
}

impl ViewKey {
    pub fn new(view: impl Into<String>, partition: impl Into<String>) -> Self {
        Self {
            view: view.into(),
            partition: partition.into(),
        }
    }
}

impl std::fmt::Display for ViewKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.view, self.partition)
    }
}

/// Position of a row inside a partition.
///
/// Rows are ordered by creation time, tie-broken by id. Timestamps are kept at
/// millisecond precision so every backend round-trips them exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClusteringKey {
    pub created_at: DateTime<Utc>,
    pub id: Uuid,
}

impl ClusteringKey {
    pub fn new(created_at: DateTime<Utc>, id: impl Into<Uuid>) -> Self {
        Self {
            created_at: created_at.trunc_subsecs(3),
            id: id.into(),
        }
    }

    /// A key for rows addressed by id alone, such as membership rows.
    pub fn for_id(id: impl Into<Uuid>) -> Self {
        Self {
            created_at: DateTime::<Utc>::default(),
            id: id.into(),
        }
    }
}

/// Order in which a partition's rows are returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ClusteringOrder {
    /// Most recent creation time first.
    #[default]
    NewestFirst,
    /// Oldest creation time first.
    OldestFirst,
}

impl ClusteringOrder {
    /// Sorts rows in place according to this order.
    pub fn sort(&self, rows: &mut [StoredRow]) {
        match self {
            ClusteringOrder::NewestFirst => rows.sort_by(|a, b| b.clustering.cmp(&a.clustering)),
            ClusteringOrder::OldestFirst => rows.sort_by(|a, b| a.clustering.cmp(&b.clustering)),
        }
    }
}

/// A single row as returned by a read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRow {
    pub clustering: ClusteringKey,
    pub payload: serde_json::Value,
}

impl StoredRow {
    pub fn new(clustering: ClusteringKey, payload: serde_json::Value) -> Self {
        Self {
            clustering,
            payload,
        }
    }
}
