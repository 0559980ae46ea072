use async_trait::async_trait;
use common::{Consistency, EntityId};

use crate::{ClusteringKey, Result, RowQuery, StoredRow, ViewKey};

/// Core trait for store client implementations.
///
/// A store client executes single-key operations against the replicated store
/// at a caller-supplied consistency level. No operation spans more than one
/// key, so nothing above this trait can assume multi-row atomicity.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Upserts the row at `clustering` inside the partition `key`.
    async fn put(
        &self,
        key: &ViewKey,
        clustering: ClusteringKey,
        payload: serde_json::Value,
        consistency: Consistency,
    ) -> Result<()>;

    /// Reads rows of one partition.
    ///
    /// A missing partition or row yields an empty vector, not an error.
    async fn get(
        &self,
        key: &ViewKey,
        query: RowQuery,
        consistency: Consistency,
    ) -> Result<Vec<StoredRow>>;

    /// Removes the row at `clustering` inside the partition `key`.
    ///
    /// Deleting a row that does not exist succeeds.
    async fn delete(
        &self,
        key: &ViewKey,
        clustering: ClusteringKey,
        consistency: Consistency,
    ) -> Result<()>;

    /// Applies a relative delta to a counter, creating it on first use.
    async fn counter_delta(
        &self,
        counter: EntityId,
        delta: i64,
        consistency: Consistency,
    ) -> Result<()>;

    /// Reads a counter's value. An absent counter reads as zero.
    async fn read_counter(&self, counter: EntityId, consistency: Consistency) -> Result<i64>;

    /// Deletes a counter.
    async fn delete_counter(&self, counter: EntityId, consistency: Consistency) -> Result<()>;
}

/// Extension trait providing convenience methods for store clients.
#[async_trait]
pub trait StoreClientExt: StoreClient {
    /// Reads one concrete row.
    async fn get_row(
        &self,
        key: &ViewKey,
        clustering: ClusteringKey,
        consistency: Consistency,
    ) -> Result<Option<StoredRow>> {
        let mut rows = self.get(key, RowQuery::row(clustering), consistency).await?;
        Ok(rows.pop())
    }

    /// Counts the rows of one partition.
    async fn partition_len(&self, key: &ViewKey, consistency: Consistency) -> Result<usize> {
        Ok(self.get(key, RowQuery::new(), consistency).await?.len())
    }
}

// Blanket implementation for all StoreClient implementations
impl<T: StoreClient + ?Sized> StoreClientExt for T {}
