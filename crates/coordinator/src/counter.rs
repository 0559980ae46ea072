//! Membership rows and the counters summarizing them.

use std::sync::Arc;

use catalog::ViewCatalog;
use chrono::Utc;
use common::{ActorId, Consistency, EntityId};
use serde::Serialize;
use serde_json::json;
use store::{StoreClient, StoreClientExt};

use crate::outcome::ViewFailure;
use crate::Result;

const COUNTER_TARGET: &str = "counters";

/// Effect of an increment or decrement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CounterChange {
    /// Membership and counter were both updated.
    Applied,
    /// The membership was already in the requested state; nothing was written.
    Unchanged,
    /// The membership row was written but the counter delta failed. The
    /// counter now disagrees with the membership view.
    Partial(ViewFailure),
}

/// Maintains "actor X liked entity Y" memberships and their counters.
///
/// A membership row and its counter delta are two separate store writes with
/// no atomicity between them. Two actors racing on the same entity can both
/// pass the membership check, and a failed delta after a successful
/// membership write leaves the counter behind. Both show up as drift between
/// [`current_value`](Self::current_value) and
/// [`membership_count`](Self::membership_count).
pub struct CounterAggregate<S: StoreClient> {
    store: S,
    catalog: Arc<ViewCatalog>,
}

impl<S> Clone for CounterAggregate<S>
where
    S: StoreClient + Clone,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            catalog: Arc::clone(&self.catalog),
        }
    }
}

impl<S> CounterAggregate<S>
where
    S: StoreClient + Clone,
{
    pub fn new(store: S, catalog: Arc<ViewCatalog>) -> Self {
        Self { store, catalog }
    }

    /// Records that `actor` liked `entity_id` and bumps its counter.
    ///
    /// A no-op if the membership already exists. The membership row is
    /// written before the delta.
    #[tracing::instrument(skip(self))]
    pub async fn increment(
        &self,
        actor: ActorId,
        entity_id: EntityId,
        consistency: Consistency,
    ) -> Result<CounterChange> {
        if self.has_membership(actor, entity_id, consistency).await? {
            return Ok(CounterChange::Unchanged);
        }

        let payload = json!({
            "actor_id": actor,
            "entity_id": entity_id,
            "created_at": Utc::now(),
        });
        self.store
            .put(
                &self.catalog.membership_key(entity_id),
                self.catalog.membership_clustering(actor),
                payload,
                consistency,
            )
            .await?;

        self.apply_delta(entity_id, 1, consistency).await
    }

    /// Removes the membership of `actor` in `entity_id` and decrements its
    /// counter. A no-op if there is no membership.
    #[tracing::instrument(skip(self))]
    pub async fn decrement(
        &self,
        actor: ActorId,
        entity_id: EntityId,
        consistency: Consistency,
    ) -> Result<CounterChange> {
        if !self.has_membership(actor, entity_id, consistency).await? {
            return Ok(CounterChange::Unchanged);
        }

        self.store
            .delete(
                &self.catalog.membership_key(entity_id),
                self.catalog.membership_clustering(actor),
                consistency,
            )
            .await?;

        self.apply_delta(entity_id, -1, consistency).await
    }

    pub async fn has_membership(
        &self,
        actor: ActorId,
        entity_id: EntityId,
        consistency: Consistency,
    ) -> Result<bool> {
        let row = self
            .store
            .get_row(
                &self.catalog.membership_key(entity_id),
                self.catalog.membership_clustering(actor),
                consistency,
            )
            .await?;
        Ok(row.is_some())
    }

    /// The counter's stored value. An absent counter reads as zero.
    pub async fn current_value(&self, entity_id: EntityId, consistency: Consistency) -> Result<i64> {
        Ok(self.store.read_counter(entity_id, consistency).await?)
    }

    /// Number of membership rows for `entity_id`.
    pub async fn membership_count(
        &self,
        entity_id: EntityId,
        consistency: Consistency,
    ) -> Result<usize> {
        Ok(self
            .store
            .partition_len(&self.catalog.membership_key(entity_id), consistency)
            .await?)
    }

    /// Drops the counter of `entity_id`. Membership rows are left alone.
    #[tracing::instrument(skip(self))]
    pub async fn delete_counter(&self, entity_id: EntityId, consistency: Consistency) -> Result<()> {
        Ok(self.store.delete_counter(entity_id, consistency).await?)
    }

    async fn apply_delta(
        &self,
        entity_id: EntityId,
        delta: i64,
        consistency: Consistency,
    ) -> Result<CounterChange> {
        match self.store.counter_delta(entity_id, delta, consistency).await {
            Ok(()) => {
                metrics::counter!("counter_deltas_total", "direction" => direction(delta))
                    .increment(1);
                Ok(CounterChange::Applied)
            }
            Err(e) => {
                metrics::counter!("fanout_partial_failures_total", "operation" => "counter")
                    .increment(1);
                tracing::warn!(
                    %entity_id,
                    delta,
                    error = %e,
                    "membership changed without counter delta"
                );
                Ok(CounterChange::Partial(ViewFailure::new(COUNTER_TARGET, &e)))
            }
        }
    }
}

fn direction(delta: i64) -> &'static str {
    if delta >= 0 { "increment" } else { "decrement" }
}
