use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Consistency, EntityId};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    ClusteringKey, ClusteringOrder, Result, RowQuery, StoredRow, ViewKey, client::StoreClient,
};

/// PostgreSQL-backed store client.
///
/// A single PostgreSQL node has no replicas to tune, so the requested
/// consistency level is passed through to the logs only. All rows of every
/// view live in one table, scoped by namespace.
#[derive(Clone)]
pub struct PostgresStoreClient {
    pool: PgPool,
    namespace: String,
}

impl PostgresStoreClient {
    /// Creates a new PostgreSQL store client writing into `namespace`.
    pub fn new(pool: PgPool, namespace: impl Into<String>) -> Self {
        Self {
            pool,
            namespace: namespace.into(),
        }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_stored(row: PgRow) -> Result<StoredRow> {
        let created_at: DateTime<Utc> = row.try_get("created_at")?;
        let row_id: Uuid = row.try_get("row_id")?;
        Ok(StoredRow::new(
            ClusteringKey::new(created_at, row_id),
            row.try_get("payload")?,
        ))
    }
}

#[async_trait]
impl StoreClient for PostgresStoreClient {
    async fn put(
        &self,
        key: &ViewKey,
        clustering: ClusteringKey,
        payload: serde_json::Value,
        consistency: Consistency,
    ) -> Result<()> {
        tracing::trace!(%key, %consistency, "put");
        sqlx::query(
            r#"
            INSERT INTO view_rows (namespace, view_name, partition_key, created_at, row_id, payload)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (namespace, view_name, partition_key, created_at, row_id)
            DO UPDATE SET payload = EXCLUDED.payload, written_at = NOW()
            "#,
        )
        .bind(&self.namespace)
        .bind(&key.view)
        .bind(&key.partition)
        .bind(clustering.created_at)
        .bind(clustering.id)
        .bind(&payload)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(
        &self,
        key: &ViewKey,
        query: RowQuery,
        consistency: Consistency,
    ) -> Result<Vec<StoredRow>> {
        tracing::trace!(%key, %consistency, "get");
        let direction = match query.order {
            ClusteringOrder::NewestFirst => "DESC",
            ClusteringOrder::OldestFirst => "ASC",
        };
        // LIMIT NULL is LIMIT ALL in PostgreSQL.
        let sql = format!(
            r#"
            SELECT created_at, row_id, payload
            FROM view_rows
            WHERE namespace = $1 AND view_name = $2 AND partition_key = $3
              AND ($4::timestamptz IS NULL OR (created_at = $4 AND row_id = $5))
            ORDER BY created_at {direction}, row_id {direction}
            LIMIT $6
            "#
        );

        let rows = sqlx::query(&sql)
            .bind(&self.namespace)
            .bind(&key.view)
            .bind(&key.partition)
            .bind(query.clustering.map(|c| c.created_at))
            .bind(query.clustering.map(|c| c.id))
            .bind(query.limit.map(|l| l as i64))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::row_to_stored).collect()
    }

    async fn delete(
        &self,
        key: &ViewKey,
        clustering: ClusteringKey,
        consistency: Consistency,
    ) -> Result<()> {
        tracing::trace!(%key, %consistency, "delete");
        sqlx::query(
            r#"
            DELETE FROM view_rows
            WHERE namespace = $1 AND view_name = $2 AND partition_key = $3
              AND created_at = $4 AND row_id = $5
            "#,
        )
        .bind(&self.namespace)
        .bind(&key.view)
        .bind(&key.partition)
        .bind(clustering.created_at)
        .bind(clustering.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn counter_delta(
        &self,
        counter: EntityId,
        delta: i64,
        consistency: Consistency,
    ) -> Result<()> {
        tracing::trace!(%counter, delta, %consistency, "counter delta");
        sqlx::query(
            r#"
            INSERT INTO counters (namespace, counter_id, value)
            VALUES ($1, $2, $3)
            ON CONFLICT (namespace, counter_id)
            DO UPDATE SET value = counters.value + EXCLUDED.value
            "#,
        )
        .bind(&self.namespace)
        .bind(counter.as_uuid())
        .bind(delta)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn read_counter(&self, counter: EntityId, consistency: Consistency) -> Result<i64> {
        tracing::trace!(%counter, %consistency, "read counter");
        let value: Option<i64> = sqlx::query_scalar(
            "SELECT value FROM counters WHERE namespace = $1 AND counter_id = $2",
        )
        .bind(&self.namespace)
        .bind(counter.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        Ok(value.unwrap_or(0))
    }

    async fn delete_counter(&self, counter: EntityId, consistency: Consistency) -> Result<()> {
        tracing::trace!(%counter, %consistency, "delete counter");
        sqlx::query("DELETE FROM counters WHERE namespace = $1 AND counter_id = $2")
            .bind(&self.namespace)
            .bind(counter.as_uuid())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
