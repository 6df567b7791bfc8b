use crate::models::{Batch, Dimension, DimensionCount, Interval, QueryScope, TimelineEntry};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("analytics store unavailable: {0}")]
    Unavailable(#[source] sqlx::Error),
    #[error("analytics query failed: {0}")]
    Query(#[source] sqlx::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StorageError::Unavailable(err),
            other => StorageError::Query(other),
        }
    }
}

impl StorageError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StorageError::Unavailable(_))
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Columnar click store: the single batch writer plus the read projections the
/// query engine combines into a summary.
///
/// Every read takes the same [`QueryScope`], so all projections of one summary
/// describe the same event population.
#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    /// Initialize the storage (create tables and indexes)
    async fn init(&self) -> Result<()>;

    /// Cheap round-trip to confirm the store is reachable
    async fn ping(&self) -> StorageResult<()>;

    /// Append the whole batch atomically; on error nothing is visible
    async fn write_batch(&self, batch: Batch) -> StorageResult<()>;

    /// Number of events matching the scope
    async fn count(&self, scope: &QueryScope) -> StorageResult<u64>;

    /// Event counts per interval bucket, ascending by bucket
    async fn timeline(
        &self,
        scope: &QueryScope,
        interval: Interval,
    ) -> StorageResult<Vec<TimelineEntry>>;

    /// Top `limit` values of a dimension by count, descending.
    /// The referrer dimension skips empty referers and reports host names.
    async fn breakdown(
        &self,
        scope: &QueryScope,
        dimension: Dimension,
        limit: u32,
    ) -> StorageResult<Vec<DimensionCount>>;

    /// Delete events created before `cutoff`, returning how many were removed
    async fn prune_before(&self, cutoff: DateTime<Utc>) -> StorageResult<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connectivity_errors_are_unavailable() {
        assert!(StorageError::from(sqlx::Error::PoolClosed).is_unavailable());
        assert!(StorageError::from(sqlx::Error::PoolTimedOut).is_unavailable());
        assert!(!StorageError::from(sqlx::Error::RowNotFound).is_unavailable());
    }
}
