//! Restartable reads of one view partition.

use std::pin::Pin;

use catalog::Entity;
use common::Consistency;
use futures_core::Stream;
use futures_util::{TryStreamExt, stream};
use store::{RowQuery, StoreClient, ViewKey};

use crate::{CoordinatorError, Result};

/// Stream of entities decoded from one partition read.
pub type EntityStream = Pin<Box<dyn Stream<Item = Result<Entity>> + Send>>;

/// A lazy, finite, restartable read of one view partition.
///
/// Nothing is read until [`stream`](Self::stream) or [`fetch`](Self::fetch) is
/// called, and each call issues a fresh read. No cursor survives between
/// calls, so two calls may observe different rows.
#[derive(Debug, Clone)]
pub struct ViewSequence<S> {
    store: S,
    key: ViewKey,
    query: RowQuery,
    consistency: Consistency,
}

impl<S: StoreClient + Clone> ViewSequence<S> {
    pub(crate) fn new(store: S, key: ViewKey, query: RowQuery, consistency: Consistency) -> Self {
        Self {
            store,
            key,
            query,
            consistency,
        }
    }

    /// Reads the partition and yields its entities one at a time.
    ///
    /// A row that fails to decode is yielded as an error without ending the
    /// stream.
    pub async fn stream(&self) -> Result<EntityStream> {
        let rows = self
            .store
            .get(&self.key, self.query.clone(), self.consistency)
            .await?;
        let entities = rows
            .into_iter()
            .map(|row| Entity::from_row(&row).map_err(CoordinatorError::from));
        Ok(Box::pin(stream::iter(entities)))
    }

    /// Reads the partition and decodes every row, failing on the first bad row.
    #[tracing::instrument(skip(self), fields(view = %self.key))]
    pub async fn fetch(&self) -> Result<Vec<Entity>> {
        let entities: Vec<Entity> = self.stream().await?.try_collect().await?;
        tracing::trace!(rows = entities.len(), "view read");
        Ok(entities)
    }

    /// Number of rows a fresh read observes.
    pub async fn count(&self) -> Result<usize> {
        Ok(self
            .store
            .get(&self.key, self.query.clone(), self.consistency)
            .await?
            .len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ActorId;
    use futures_util::StreamExt;
    use store::{ClusteringKey, InMemoryStoreClient};

    #[tokio::test]
    async fn stream_yields_bad_rows_as_errors_and_keeps_going() {
        let store = InMemoryStoreClient::new();
        let key = ViewKey::new("posts_by_author", "a");
        let base = chrono::Utc::now();
        let good = Entity::post(ActorId::new(), "Name0", "category1", "abc0")
            .with_created_at(base - chrono::Duration::seconds(10));
        store
            .put(
                &key,
                ClusteringKey::new(good.created_at, good.id),
                good.to_payload().unwrap(),
                Consistency::Quorum,
            )
            .await
            .unwrap();
        store
            .put(
                &key,
                ClusteringKey::new(base, common::EntityId::new()),
                serde_json::json!({ "not": "an entity" }),
                Consistency::Quorum,
            )
            .await
            .unwrap();

        let sequence = ViewSequence::new(store, key, RowQuery::new(), Consistency::Quorum);
        let items: Vec<_> = sequence.stream().await.unwrap().collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_err());
        assert_eq!(items[1].as_ref().unwrap(), &good);

        assert!(sequence.fetch().await.is_err());
        assert_eq!(sequence.count().await.unwrap(), 2);
    }
}
