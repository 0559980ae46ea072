//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use chrono::{Duration, Utc};
use serial_test::serial;
use sqlx::PgPool;
use store::{
    ClusteringKey, Consistency, EntityId, PostgresStoreClient, RowQuery, StoreClient,
    StoreClientExt, ViewKey,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_view_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh client with its own pool and cleared tables
async fn get_test_client() -> PostgresStoreClient {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE view_rows, counters")
        .execute(&pool)
        .await
        .unwrap();

    PostgresStoreClient::new(pool, "cassdemo_test")
}

fn author_key() -> ViewKey {
    ViewKey::new("posts_by_author", Uuid::new_v4().to_string())
}

#[tokio::test]
#[serial]
async fn put_and_get_row() {
    let client = get_test_client().await;
    let key = author_key();
    let clustering = ClusteringKey::new(Utc::now(), Uuid::new_v4());

    client
        .put(&key, clustering, serde_json::json!({"content": "abc0"}), Consistency::Quorum)
        .await
        .unwrap();

    let row = client
        .get_row(&key, clustering, Consistency::Quorum)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.clustering, clustering);
    assert_eq!(row.payload["content"], "abc0");
}

#[tokio::test]
#[serial]
async fn put_is_an_upsert() {
    let client = get_test_client().await;
    let key = author_key();
    let clustering = ClusteringKey::new(Utc::now(), Uuid::new_v4());

    client.put(&key, clustering, serde_json::json!(1), Consistency::One).await.unwrap();
    client.put(&key, clustering, serde_json::json!(2), Consistency::One).await.unwrap();

    let rows = client.get(&key, RowQuery::new(), Consistency::One).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].payload, serde_json::json!(2));
}

#[tokio::test]
#[serial]
async fn newest_rows_come_first() {
    let client = get_test_client().await;
    let key = author_key();
    let base = Utc::now();

    for i in 0..12 {
        let clustering = ClusteringKey::new(base + Duration::milliseconds(i * 10), Uuid::new_v4());
        client.put(&key, clustering, serde_json::json!(i), Consistency::Quorum).await.unwrap();
    }

    let newest = client.get(&key, RowQuery::newest(10), Consistency::Quorum).await.unwrap();
    assert_eq!(newest.len(), 10);
    assert_eq!(newest[0].payload, serde_json::json!(11));
    assert_eq!(newest[9].payload, serde_json::json!(2));
}

#[tokio::test]
#[serial]
async fn delete_removes_row() {
    let client = get_test_client().await;
    let key = author_key();
    let clustering = ClusteringKey::new(Utc::now(), Uuid::new_v4());

    client.put(&key, clustering, serde_json::json!(1), Consistency::Quorum).await.unwrap();
    client.delete(&key, clustering, Consistency::Quorum).await.unwrap();

    assert_eq!(client.partition_len(&key, Consistency::Quorum).await.unwrap(), 0);
}

#[tokio::test]
#[serial]
async fn counters_accumulate_and_delete() {
    let client = get_test_client().await;
    let post = EntityId::new();

    assert_eq!(client.read_counter(post, Consistency::Quorum).await.unwrap(), 0);
    client.counter_delta(post, 1, Consistency::Quorum).await.unwrap();
    client.counter_delta(post, 1, Consistency::Quorum).await.unwrap();
    client.counter_delta(post, -1, Consistency::Quorum).await.unwrap();
    assert_eq!(client.read_counter(post, Consistency::Quorum).await.unwrap(), 1);

    client.delete_counter(post, Consistency::Quorum).await.unwrap();
    assert_eq!(client.read_counter(post, Consistency::Quorum).await.unwrap(), 0);
}

#[tokio::test]
#[serial]
async fn namespaces_are_isolated() {
    let client = get_test_client().await;
    let other = PostgresStoreClient::new(client.pool().clone(), "other_namespace");
    let key = author_key();

    client
        .put(&key, ClusteringKey::for_id(Uuid::new_v4()), serde_json::json!(1), Consistency::One)
        .await
        .unwrap();

    assert_eq!(other.partition_len(&key, Consistency::One).await.unwrap(), 0);
}
