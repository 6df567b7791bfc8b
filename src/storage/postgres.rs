use crate::models::{Batch, Dimension, DimensionCount, Interval, QueryScope, TimelineEntry};
use crate::storage::{
    dimension_counts, timeline_entries, to_count, AnalyticsStore, StorageResult,
    ROWS_PER_STATEMENT,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::sync::Arc;

const SCOPE_PREDICATE: &str = "code = $1 AND created_at >= $2 AND created_at <= $3";

/// Bucket start in unix seconds, computed in UTC. Weeks start on Monday.
fn bucket_expr(interval: Interval) -> &'static str {
    match interval {
        Interval::Minute => "(created_at / 60) * 60",
        Interval::Hour => "(created_at / 3600) * 3600",
        Interval::Day => "(created_at / 86400) * 86400",
        Interval::Week => "((created_at - 345600) / 604800) * 604800 + 345600",
        Interval::Month => {
            "CAST(EXTRACT(EPOCH FROM date_trunc('month', to_timestamp(created_at) AT TIME ZONE 'UTC')) AS BIGINT)"
        }
        Interval::Year => {
            "CAST(EXTRACT(EPOCH FROM date_trunc('year', to_timestamp(created_at) AT TIME ZONE 'UTC')) AS BIGINT)"
        }
    }
}

pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[async_trait]
impl AnalyticsStore for PostgresStore {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS analytics (
                id BIGSERIAL PRIMARY KEY,
                code TEXT NOT NULL,
                browser TEXT NOT NULL,
                os TEXT NOT NULL,
                device_type TEXT NOT NULL,
                country TEXT NOT NULL,
                state TEXT NOT NULL,
                referer TEXT NOT NULL DEFAULT '',
                created_at BIGINT NOT NULL DEFAULT (FLOOR(EXTRACT(EPOCH FROM now()))::BIGINT)
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_analytics_code_created_at ON analytics(code, created_at)",
        )
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn ping(&self) -> StorageResult<()> {
        sqlx::query("SELECT 1").execute(self.pool.as_ref()).await?;
        Ok(())
    }

    async fn write_batch(&self, batch: Batch) -> StorageResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for chunk in batch.events().chunks(ROWS_PER_STATEMENT) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO analytics (code, browser, os, device_type, country, state, referer) ",
            );
            builder.push_values(chunk, |mut row, event| {
                row.push_bind(event.code.as_str())
                    .push_bind(event.browser.as_str())
                    .push_bind(event.os.as_str())
                    .push_bind(event.device.as_str())
                    .push_bind(event.country.as_str())
                    .push_bind(event.state.as_str())
                    .push_bind(event.referer.as_str());
            });
            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn count(&self, scope: &QueryScope) -> StorageResult<u64> {
        let sql = format!("SELECT COUNT(*) FROM analytics WHERE {SCOPE_PREDICATE}");
        let count = sqlx::query_scalar::<_, i64>(&sql)
            .bind(&scope.code)
            .bind(scope.start)
            .bind(scope.end)
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(to_count(count))
    }

    async fn timeline(
        &self,
        scope: &QueryScope,
        interval: Interval,
    ) -> StorageResult<Vec<TimelineEntry>> {
        let sql = format!(
            r#"
            SELECT {bucket} AS bucket, COUNT(*) AS count
            FROM analytics
            WHERE {SCOPE_PREDICATE}
            GROUP BY bucket
            ORDER BY bucket ASC
            "#,
            bucket = bucket_expr(interval),
        );
        let rows = sqlx::query_as::<_, (i64, i64)>(&sql)
            .bind(&scope.code)
            .bind(scope.start)
            .bind(scope.end)
            .fetch_all(self.pool.as_ref())
            .await?;

        Ok(timeline_entries(rows))
    }

    async fn breakdown(
        &self,
        scope: &QueryScope,
        dimension: Dimension,
        limit: u32,
    ) -> StorageResult<Vec<DimensionCount>> {
        let column = dimension.column();
        let extra = if dimension == Dimension::Referrer {
            " AND referer <> ''"
        } else {
            ""
        };
        let sql = format!(
            r#"
            SELECT {column} AS name, COUNT(*) AS count
            FROM analytics
            WHERE {SCOPE_PREDICATE}{extra}
            GROUP BY {column}
            ORDER BY count DESC, name ASC
            LIMIT $4
            "#
        );
        let rows = sqlx::query_as::<_, (String, i64)>(&sql)
            .bind(&scope.code)
            .bind(scope.start)
            .bind(scope.end)
            .bind(i64::from(limit))
            .fetch_all(self.pool.as_ref())
            .await?;

        Ok(dimension_counts(dimension, rows))
    }

    async fn prune_before(&self, cutoff: DateTime<Utc>) -> StorageResult<u64> {
        let result = sqlx::query("DELETE FROM analytics WHERE created_at < $1")
            .bind(cutoff.timestamp())
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected())
    }
}
