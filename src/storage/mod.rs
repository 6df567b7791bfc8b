pub mod connect;
pub mod postgres;
pub mod sqlite;
pub mod trait_def;

pub use connect::{connect_store, retry_with_delay};
pub use postgres::PostgresStore;
pub use sqlite::SqliteStore;
pub use trait_def::{AnalyticsStore, StorageError, StorageResult};

use chrono::{TimeZone, Utc};

use crate::enrich::normalize::referer_host;
use crate::models::{Dimension, DimensionCount, TimelineEntry};

/// Rows per multi-row INSERT; keeps every statement under both backends' bind limits
const ROWS_PER_STATEMENT: usize = 1000;

fn to_count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}

fn timeline_entries(rows: Vec<(i64, i64)>) -> Vec<TimelineEntry> {
    rows.into_iter()
        .filter_map(|(bucket, count)| {
            Utc.timestamp_opt(bucket, 0)
                .single()
                .map(|time| TimelineEntry {
                    time,
                    count: to_count(count),
                })
        })
        .collect()
}

fn dimension_counts(dimension: Dimension, rows: Vec<(String, i64)>) -> Vec<DimensionCount> {
    rows.into_iter()
        .map(|(name, count)| {
            let name = match dimension {
                Dimension::Referrer => referer_host(&name).to_string(),
                _ => name,
            };
            DimensionCount::new(name, to_count(count))
        })
        .collect()
}
