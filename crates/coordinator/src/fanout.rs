//! Fan-out coordinator for multi-view writes.

use std::sync::Arc;
use std::time::Instant;

use catalog::{Entity, EntityKind, ViewCatalog, ViewDescriptor};
use common::{Consistency, EntityId};
use store::{RowQuery, StoreClient, StoreError, ViewKey};

use crate::outcome::{FanoutOperation, FanoutOutcome, ViewFailure};
use crate::sequence::ViewSequence;
use crate::{CoordinatorError, Result};

/// Writes each logical mutation to every view of the entity's group.
///
/// View writes are independent, non-atomic store operations issued in catalog
/// order (reverse order for deletes, so the locator row goes last). A failed
/// view write does not stop the remaining ones, with two exceptions that keep
/// every written row reachable through the locator view:
///
/// - a create whose locator write fails stops before touching other views
/// - a delete with any failed view keeps the locator row, so it can be retried
///
/// When at least one view was written the call returns a [`FanoutOutcome`]
/// naming the views that failed; only a fan-out that wrote nothing is an error.
pub struct FanoutCoordinator<S: StoreClient> {
    store: S,
    catalog: Arc<ViewCatalog>,
}

impl<S> Clone for FanoutCoordinator<S>
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

enum ViewWrite {
    Put(serde_json::Value),
    Remove,
}

impl<S> FanoutCoordinator<S>
where
    S: StoreClient + Clone,
{
    pub fn new(store: S, catalog: Arc<ViewCatalog>) -> Self {
        Self { store, catalog }
    }

    pub fn catalog(&self) -> &Arc<ViewCatalog> {
        &self.catalog
    }

    /// Writes a new entity to every view of its group.
    #[tracing::instrument(skip(self, entity), fields(entity_id = %entity.id, kind = %entity.kind))]
    pub async fn create(&self, entity: &Entity, consistency: Consistency) -> Result<FanoutOutcome> {
        let views = self.catalog.views_for(entity.kind)?;
        let payload = entity.to_payload()?;
        self.fan_out(
            FanoutOperation::Create,
            entity,
            views.iter(),
            ViewWrite::Put(payload),
            consistency,
        )
        .await
    }

    /// Replaces the content of an existing entity in every view of its group.
    ///
    /// The entity is located through its group's locator view; identity,
    /// timestamp and key attributes are preserved.
    #[tracing::instrument(skip(self, new_content))]
    pub async fn edit(
        &self,
        kind: EntityKind,
        entity_id: EntityId,
        new_content: &str,
        consistency: Consistency,
    ) -> Result<FanoutOutcome> {
        let current = self
            .locate(kind, entity_id, consistency)
            .await?
            .ok_or(CoordinatorError::NotFound { entity_id })?;
        let edited = current.with_content(new_content);
        let views = self.catalog.views_for(kind)?;
        let payload = edited.to_payload()?;
        self.fan_out(
            FanoutOperation::Edit,
            &edited,
            views.iter(),
            ViewWrite::Put(payload),
            consistency,
        )
        .await
    }

    /// Removes an entity from every view of its group, locator view last.
    #[tracing::instrument(skip(self))]
    pub async fn delete(
        &self,
        kind: EntityKind,
        entity_id: EntityId,
        consistency: Consistency,
    ) -> Result<FanoutOutcome> {
        let current = self
            .locate(kind, entity_id, consistency)
            .await?
            .ok_or(CoordinatorError::NotFound { entity_id })?;
        let views = self.catalog.views_for(kind)?;
        self.fan_out(
            FanoutOperation::Delete,
            &current,
            views.iter().rev(),
            ViewWrite::Remove,
            consistency,
        )
        .await
    }

    /// Builds a restartable read of one view partition.
    ///
    /// Rows come back in the view's clustering order, truncated to `limit`.
    pub fn read_view(
        &self,
        key: &ViewKey,
        consistency: Consistency,
        limit: Option<usize>,
    ) -> Result<ViewSequence<S>> {
        let (_, view) = self.catalog.view(&key.view)?;
        let mut query = RowQuery::new().order(view.order);
        if let Some(limit) = limit {
            query = query.limit(limit);
        }
        Ok(ViewSequence::new(
            self.store.clone(),
            key.clone(),
            query,
            consistency,
        ))
    }

    /// Reads the row for `entity_id` from one view partition, if present.
    #[tracing::instrument(skip(self), fields(view = %key))]
    pub async fn read_one(
        &self,
        key: &ViewKey,
        entity_id: EntityId,
        consistency: Consistency,
    ) -> Result<Option<Entity>> {
        self.catalog.view(&key.view)?;
        let rows = self.store.get(key, RowQuery::new(), consistency).await?;
        rows.iter()
            .find(|row| row.clustering.id == entity_id.as_uuid())
            .map(|row| Entity::from_row(row).map_err(CoordinatorError::from))
            .transpose()
    }

    /// Reads an entity through its group's locator view.
    pub async fn locate(
        &self,
        kind: EntityKind,
        entity_id: EntityId,
        consistency: Consistency,
    ) -> Result<Option<Entity>> {
        let key = self.catalog.group(kind)?.locator_key(entity_id)?;
        self.read_one(&key, entity_id, consistency).await
    }

    async fn fan_out<'a>(
        &self,
        operation: FanoutOperation,
        entity: &Entity,
        views: impl Iterator<Item = &'a ViewDescriptor>,
        write: ViewWrite,
        consistency: Consistency,
    ) -> Result<FanoutOutcome> {
        let started = Instant::now();

        // Resolve every key before the first write so a catalog error never
        // leaves a half-written entity behind.
        let targets = views
            .map(|view| -> Result<_> { Ok((view, view.view_key(entity)?)) })
            .collect::<Result<Vec<_>>>()?;

        let mut outcome = FanoutOutcome::new(operation, entity.id);
        let mut first_error: Option<StoreError> = None;

        for (view, key) in targets {
            if matches!(write, ViewWrite::Remove)
                && view.is_locator()
                && !outcome.failed.is_empty()
            {
                tracing::warn!(view = view.name, "keeping locator row after failed view delete");
                outcome.failed.push(ViewFailure::skipped(view.name));
                continue;
            }

            let clustering = view.clustering_key(entity);
            let result = match &write {
                ViewWrite::Put(payload) => {
                    self.store
                        .put(&key, clustering, payload.clone(), consistency)
                        .await
                }
                ViewWrite::Remove => self.store.delete(&key, clustering, consistency).await,
            };
            metrics::counter!(
                "fanout_writes_total",
                "operation" => operation.as_str(),
                "view" => view.name
            )
            .increment(1);

            match result {
                Ok(()) => outcome.succeeded.push(view.name),
                Err(e) => {
                    tracing::warn!(
                        view = view.name,
                        partition = %key.partition,
                        error = %e,
                        "view write failed"
                    );
                    outcome.failed.push(ViewFailure::new(view.name, &e));
                    first_error.get_or_insert(e);
                    if operation == FanoutOperation::Create && view.is_locator() {
                        break;
                    }
                }
            }
        }

        metrics::histogram!("fanout_duration_seconds", "operation" => operation.as_str())
            .record(started.elapsed().as_secs_f64());

        if outcome.succeeded.is_empty()
            && let Some(e) = first_error
        {
            return Err(e.into());
        }

        if outcome.is_partial() {
            metrics::counter!("fanout_partial_failures_total", "operation" => operation.as_str())
                .increment(1);
            tracing::warn!(
                failed = outcome.failed.len(),
                succeeded = outcome.succeeded.len(),
                "fan-out left views inconsistent"
            );
        } else {
            tracing::debug!(views = outcome.succeeded.len(), "fan-out applied");
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FanoutStatus;
    use common::ActorId;
    use store::{FaultInjector, InMemoryStoreClient, ReplicationConfig};

    fn coordinator() -> FanoutCoordinator<InMemoryStoreClient> {
        FanoutCoordinator::new(InMemoryStoreClient::new(), Arc::new(ViewCatalog::standard()))
    }

    fn post() -> Entity {
        Entity::post(ActorId::new(), "Name0", "category1", "abc0")
    }

    fn key_in(catalog: &ViewCatalog, view: &str, entity: &Entity) -> ViewKey {
        catalog.view(view).unwrap().1.view_key(entity).unwrap()
    }

    #[tokio::test]
    async fn create_writes_every_view() {
        let coordinator = coordinator();
        let post = post();

        let outcome = coordinator.create(&post, Consistency::Quorum).await.unwrap();
        assert!(outcome.is_applied());
        assert_eq!(
            outcome.succeeded,
            vec!["posts_by_id", "posts_by_author", "posts_by_category"]
        );

        for view in ["posts_by_id", "posts_by_author", "posts_by_category"] {
            let key = key_in(coordinator.catalog(), view, &post);
            let found = coordinator
                .read_one(&key, post.id, Consistency::Quorum)
                .await
                .unwrap();
            assert_eq!(found.as_ref(), Some(&post), "missing from {view}");
        }
    }

    #[tokio::test]
    async fn partial_failure_is_reported_not_raised() {
        let faults = FaultInjector::new();
        faults.reject_view("posts_by_category");
        let store = InMemoryStoreClient::with_faults(ReplicationConfig::default(), faults);
        let coordinator = FanoutCoordinator::new(store, Arc::new(ViewCatalog::standard()));
        let post = post();

        let outcome = coordinator.create(&post, Consistency::Quorum).await.unwrap();
        assert!(outcome.is_partial());
        assert_eq!(outcome.succeeded, vec!["posts_by_id", "posts_by_author"]);
        assert_eq!(
            outcome.failed_views().collect::<Vec<_>>(),
            vec!["posts_by_category"]
        );

        let category = key_in(coordinator.catalog(), "posts_by_category", &post);
        assert!(
            coordinator
                .read_one(&category, post.id, Consistency::Quorum)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn total_failure_is_an_error() {
        let faults = FaultInjector::new();
        faults.set_unreachable(true);
        let store = InMemoryStoreClient::with_faults(ReplicationConfig::default(), faults);
        let coordinator = FanoutCoordinator::new(store, Arc::new(ViewCatalog::standard()));

        let err = coordinator
            .create(&post(), Consistency::Quorum)
            .await
            .unwrap_err();
        assert!(err.is_connectivity());
    }

    #[tokio::test]
    async fn missing_attribute_fails_before_any_write() {
        let coordinator = coordinator();
        let incomplete = Entity::new(EntityKind::Post, "no author");

        let err = coordinator
            .create(&incomplete, Consistency::Quorum)
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::Catalog(_)));

        let locator = coordinator
            .catalog()
            .group(EntityKind::Post)
            .unwrap()
            .locator_key(incomplete.id)
            .unwrap();
        let found = coordinator
            .read_one(&locator, incomplete.id, Consistency::Quorum)
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn edit_preserves_identity() {
        let coordinator = coordinator();
        let post = post();
        coordinator.create(&post, Consistency::Quorum).await.unwrap();

        let outcome = coordinator
            .edit(EntityKind::Post, post.id, "edited", Consistency::Quorum)
            .await
            .unwrap();
        assert!(outcome.is_applied());

        let by_author = key_in(coordinator.catalog(), "posts_by_author", &post);
        let rows = coordinator
            .read_view(&by_author, Consistency::Quorum, None)
            .unwrap()
            .fetch()
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, post.id);
        assert_eq!(rows[0].created_at, post.created_at);
        assert_eq!(rows[0].content, "edited");
    }

    #[tokio::test]
    async fn edit_of_unknown_entity_is_not_found() {
        let coordinator = coordinator();
        let missing = EntityId::new();

        let err = coordinator
            .edit(EntityKind::Post, missing, "edited", Consistency::Quorum)
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::NotFound { entity_id } if entity_id == missing));
    }

    #[tokio::test]
    async fn delete_removes_locator_last() {
        let coordinator = coordinator();
        let post = post();
        coordinator.create(&post, Consistency::Quorum).await.unwrap();

        let outcome = coordinator
            .delete(EntityKind::Post, post.id, Consistency::Quorum)
            .await
            .unwrap();
        assert_eq!(
            outcome.succeeded,
            vec!["posts_by_category", "posts_by_author", "posts_by_id"]
        );
        assert!(
            coordinator
                .locate(EntityKind::Post, post.id, Consistency::Quorum)
                .await
                .unwrap()
                .is_none()
        );
    }

    fn faulty_coordinator() -> (FanoutCoordinator<InMemoryStoreClient>, FaultInjector) {
        let faults = FaultInjector::new();
        let store = InMemoryStoreClient::with_faults(ReplicationConfig::default(), faults.clone());
        (
            FanoutCoordinator::new(store, Arc::new(ViewCatalog::standard())),
            faults,
        )
    }

    #[tokio::test]
    async fn partial_edit_names_the_stale_view() {
        let (coordinator, faults) = faulty_coordinator();
        let post = post();
        coordinator.create(&post, Consistency::Quorum).await.unwrap();

        faults.reject_view("posts_by_category");
        let outcome = coordinator
            .edit(EntityKind::Post, post.id, "edited", Consistency::Quorum)
            .await
            .unwrap();
        assert_eq!(outcome.status(), FanoutStatus::Partial);
        assert_eq!(outcome.succeeded, vec!["posts_by_id", "posts_by_author"]);
        assert_eq!(
            outcome.failed_views().collect::<Vec<_>>(),
            vec!["posts_by_category"]
        );

        let category = key_in(coordinator.catalog(), "posts_by_category", &post);
        let stale = coordinator
            .read_one(&category, post.id, Consistency::Quorum)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stale.content, "abc0");
    }

    #[tokio::test]
    async fn failed_delete_keeps_locator_for_retry() {
        let (coordinator, faults) = faulty_coordinator();
        let post = post();
        coordinator.create(&post, Consistency::Quorum).await.unwrap();

        faults.reject_view("posts_by_author");
        let outcome = coordinator
            .delete(EntityKind::Post, post.id, Consistency::Quorum)
            .await
            .unwrap();
        assert_eq!(outcome.status(), FanoutStatus::Partial);
        assert_eq!(outcome.succeeded, vec!["posts_by_category"]);
        assert_eq!(
            outcome.failed_views().collect::<Vec<_>>(),
            vec!["posts_by_author", "posts_by_id"]
        );
        assert!(
            coordinator
                .locate(EntityKind::Post, post.id, Consistency::Quorum)
                .await
                .unwrap()
                .is_some()
        );

        faults.clear();
        let retried = coordinator
            .delete(EntityKind::Post, post.id, Consistency::Quorum)
            .await
            .unwrap();
        assert!(retried.is_applied());

        let by_author = key_in(coordinator.catalog(), "posts_by_author", &post);
        assert!(
            coordinator
                .read_one(&by_author, post.id, Consistency::Quorum)
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            coordinator
                .locate(EntityKind::Post, post.id, Consistency::Quorum)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn failed_locator_write_stops_create() {
        let (coordinator, faults) = faulty_coordinator();
        let post = post();

        faults.reject_next_writes(1);
        let err = coordinator
            .create(&post, Consistency::Quorum)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::Store(StoreError::WriteRejected { ref view }) if view == "posts_by_id"
        ));

        for view in ["posts_by_author", "posts_by_category"] {
            let key = key_in(coordinator.catalog(), view, &post);
            let found = coordinator
                .read_one(&key, post.id, Consistency::Quorum)
                .await
                .unwrap();
            assert!(found.is_none(), "orphan row in {view}");
        }
    }

    #[tokio::test]
    async fn read_view_is_newest_first_and_limited() {
        let coordinator = coordinator();
        let author = ActorId::new();
        let base = chrono::Utc::now();
        let mut ids = Vec::new();
        for i in 0..5 {
            let post = Entity::post(author, "Name0", "category1", format!("abc{i}"))
                .with_created_at(base + chrono::Duration::seconds(i));
            coordinator.create(&post, Consistency::Quorum).await.unwrap();
            ids.push(post.id);
        }

        let key = coordinator
            .catalog()
            .view("posts_by_author")
            .unwrap()
            .1
            .key_for(author);
        let sequence = coordinator
            .read_view(&key, Consistency::Quorum, Some(3))
            .unwrap();
        let rows = sequence.fetch().await.unwrap();
        let got: Vec<_> = rows.iter().map(|e| e.id).collect();
        assert_eq!(got, vec![ids[4], ids[3], ids[2]]);

        // Each call issues a fresh read.
        let again = sequence.count().await.unwrap();
        assert_eq!(again, 3);
    }

    #[tokio::test]
    async fn read_view_of_unknown_view_fails() {
        let coordinator = coordinator();
        let err = coordinator
            .read_view(&ViewKey::new("nope", "x"), Consistency::One, None)
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::Catalog(_)));
    }
}
