//! Integration tests for fan-out writes over a replicated in-memory store.

use std::sync::Arc;
use std::time::Duration;

use catalog::{Entity, EntityKind, ViewCatalog};
use common::{ActorId, Consistency, EntityId};
use coordinator::{CoordinatorError, CounterAggregate, FanoutCoordinator};
use store::{FaultInjector, InMemoryStoreClient, ReplicationConfig, StoreError, ViewKey};

struct TestHarness {
    store: InMemoryStoreClient,
    coordinator: FanoutCoordinator<InMemoryStoreClient>,
    counters: CounterAggregate<InMemoryStoreClient>,
}

impl TestHarness {
    fn new(config: ReplicationConfig) -> Self {
        let store = InMemoryStoreClient::with_config(config);
        let catalog = Arc::new(ViewCatalog::standard());
        Self {
            coordinator: FanoutCoordinator::new(store.clone(), Arc::clone(&catalog)),
            counters: CounterAggregate::new(store.clone(), catalog),
            store,
        }
    }

    fn lagging() -> Self {
        Self::new(ReplicationConfig::new(3).with_propagation_lag(Duration::from_secs(60)))
    }

    fn key(&self, view: &str, entity: &Entity) -> ViewKey {
        self.coordinator
            .catalog()
            .view(view)
            .unwrap()
            .1
            .view_key(entity)
            .unwrap()
    }
}

fn post(author: ActorId) -> Entity {
    Entity::post(author, "Name0", "category1", "abc0")
}

#[tokio::test]
async fn quorum_reads_observe_quorum_writes_under_lag() {
    let h = TestHarness::lagging();
    let author = ActorId::new();

    for _ in 0..20 {
        let outcome = h
            .coordinator
            .create(&post(author), Consistency::Quorum)
            .await
            .unwrap();
        assert!(outcome.is_applied());
    }

    let by_author = h.coordinator.catalog().view("posts_by_author").unwrap().1.key_for(author);
    for _ in 0..5 {
        let count = h
            .coordinator
            .read_view(&by_author, Consistency::Quorum, None)
            .unwrap()
            .count()
            .await
            .unwrap();
        assert_eq!(count, 20);
    }
    assert!(h.store.pending_hints().await > 0);
}

#[tokio::test]
async fn single_replica_reads_can_miss_single_replica_writes() {
    let h = TestHarness::lagging();
    let post = post(ActorId::new());
    h.coordinator.create(&post, Consistency::One).await.unwrap();

    let locator = h.key("posts_by_id", &post);
    let mut seen = 0;
    // Three consecutive reads at ONE visit each of the three replicas once.
    for _ in 0..3 {
        if h
            .coordinator
            .read_one(&locator, post.id, Consistency::One)
            .await
            .unwrap()
            .is_some()
        {
            seen += 1;
        }
    }
    assert_eq!(seen, 1);

    h.store.deliver_all_hints().await;
    let found = h
        .coordinator
        .read_one(&locator, post.id, Consistency::One)
        .await
        .unwrap();
    assert_eq!(found, Some(post));
}

#[tokio::test]
async fn all_reads_observe_single_replica_writes() {
    let h = TestHarness::lagging();
    let post = post(ActorId::new());
    h.coordinator.create(&post, Consistency::One).await.unwrap();

    let by_category = h.key("posts_by_category", &post);
    let found = h
        .coordinator
        .read_one(&by_category, post.id, Consistency::All)
        .await
        .unwrap();
    assert_eq!(found.map(|e| e.id), Some(post.id));
}

#[tokio::test]
async fn quorum_delete_hides_row_from_quorum_reads() {
    let h = TestHarness::lagging();
    let post = post(ActorId::new());
    h.coordinator.create(&post, Consistency::All).await.unwrap();
    h.coordinator
        .delete(EntityKind::Post, post.id, Consistency::Quorum)
        .await
        .unwrap();

    for view in ["posts_by_id", "posts_by_author", "posts_by_category"] {
        let key = h.key(view, &post);
        for _ in 0..3 {
            let found = h
                .coordinator
                .read_one(&key, post.id, Consistency::Quorum)
                .await
                .unwrap();
            assert!(found.is_none(), "{view} still shows deleted post");
        }
    }
}

#[tokio::test]
async fn edit_repairs_view_missed_by_create() {
    let faults = FaultInjector::new();
    faults.reject_view("posts_by_author");
    let store = InMemoryStoreClient::with_faults(ReplicationConfig::default(), faults.clone());
    let coordinator = FanoutCoordinator::new(store, Arc::new(ViewCatalog::standard()));
    let author = ActorId::new();
    let post = post(author);

    let created = coordinator.create(&post, Consistency::Quorum).await.unwrap();
    assert_eq!(created.failed_views().collect::<Vec<_>>(), vec!["posts_by_author"]);

    faults.clear();
    let edited = coordinator
        .edit(EntityKind::Post, post.id, "second draft", Consistency::Quorum)
        .await
        .unwrap();
    assert!(edited.is_applied());

    let by_author = coordinator.catalog().view("posts_by_author").unwrap().1.key_for(author);
    let rows = coordinator
        .read_view(&by_author, Consistency::Quorum, None)
        .unwrap()
        .fetch()
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].content, "second draft");
}

#[tokio::test]
async fn all_level_needs_every_replica() {
    let faults = FaultInjector::new();
    faults.set_replica_down(2, true);
    let store = InMemoryStoreClient::with_faults(ReplicationConfig::new(3), faults);
    let coordinator = FanoutCoordinator::new(store, Arc::new(ViewCatalog::standard()));
    let post = post(ActorId::new());

    assert!(
        coordinator
            .create(&post, Consistency::Quorum)
            .await
            .unwrap()
            .is_applied()
    );

    let err = coordinator
        .edit(EntityKind::Post, post.id, "edited", Consistency::All)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoordinatorError::Store(StoreError::Unavailable {
            required: 3,
            alive: 2
        })
    ));
}

#[tokio::test]
async fn comments_fan_out_to_their_own_group() {
    let h = TestHarness::new(ReplicationConfig::default());
    let parent = post(ActorId::new());
    h.coordinator.create(&parent, Consistency::Quorum).await.unwrap();

    let commenter = ActorId::new();
    for i in 0..4 {
        let comment = Entity::comment(parent.id, commenter, "Name1", format!("comment{i}"));
        let outcome = h.coordinator.create(&comment, Consistency::Quorum).await.unwrap();
        assert_eq!(
            outcome.succeeded,
            vec!["comments_by_id", "comments_by_post", "comments_by_author"]
        );
    }

    let by_post = h.coordinator.catalog().view("comments_by_post").unwrap().1.key_for(parent.id);
    let count = h
        .coordinator
        .read_view(&by_post, Consistency::Quorum, Some(10))
        .unwrap()
        .count()
        .await
        .unwrap();
    assert_eq!(count, 4);
}

#[tokio::test]
async fn distinct_actors_keep_counter_in_step() {
    let h = TestHarness::new(ReplicationConfig::default());
    let post = EntityId::new();

    let mut handles = Vec::new();
    for _ in 0..25 {
        let counters = h.counters.clone();
        handles.push(tokio::spawn(async move {
            counters
                .increment(ActorId::new(), post, Consistency::Quorum)
                .await
                .unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(h.counters.current_value(post, Consistency::Quorum).await.unwrap(), 25);
    assert_eq!(h.counters.membership_count(post, Consistency::Quorum).await.unwrap(), 25);
}

#[tokio::test]
async fn same_actor_race_never_duplicates_membership() {
    let h = TestHarness::new(
        ReplicationConfig::new(3).with_operation_latency(Duration::from_millis(5)),
    );
    let actor = ActorId::new();
    let post = EntityId::new();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let counters = h.counters.clone();
        handles.push(tokio::spawn(async move {
            counters.increment(actor, post, Consistency::Quorum).await.unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // Membership rows collapse onto one clustering key; the counter keeps
    // every delta that got past the check.
    let memberships = h.counters.membership_count(post, Consistency::Quorum).await.unwrap();
    let value = h.counters.current_value(post, Consistency::Quorum).await.unwrap();
    assert_eq!(memberships, 1);
    assert!(value >= 1);
}

#[tokio::test]
async fn repeated_membership_checks_agree_under_lag() {
    let h = TestHarness::lagging();
    let post = EntityId::new();
    let liker = ActorId::new();
    let bystander = ActorId::new();
    h.counters
        .increment(liker, post, Consistency::Quorum)
        .await
        .unwrap();

    for actor in [liker, bystander] {
        let first = h
            .counters
            .has_membership(actor, post, Consistency::Quorum)
            .await
            .unwrap();
        for _ in 0..6 {
            let again = h
                .counters
                .has_membership(actor, post, Consistency::Quorum)
                .await
                .unwrap();
            assert_eq!(again, first);
        }
        assert_eq!(first, actor == liker);
    }
}
