//! Aggregation query layer
//!
//! Translates a `(code, start, end, interval)` request into a total count, a
//! bucketed timeline and per-dimension top lists. All seven projections share
//! one [`QueryScope`], so every breakdown describes the same population as
//! `total_clicks`.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

use crate::models::{AggregationQuery, AnalyticsSummary, Dimension, Interval};
use crate::storage::{AnalyticsStore, StorageError};

/// Entries kept per dimension breakdown
pub const TOP_N: u32 = 10;

/// Window used when no start is given
pub const DEFAULT_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid {field} time format (RFC3339 required)")]
    InvalidTimestamp { field: &'static str },
    #[error("start must not be after end")]
    InvalidRange,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Query-string parameters as they arrive from the HTTP layer
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SummaryParams {
    pub start: Option<String>,
    pub end: Option<String>,
    pub interval: Option<String>,
}

fn parse_time(value: Option<&str>, field: &'static str) -> Result<Option<DateTime<Utc>>, QueryError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => DateTime::parse_from_rfc3339(v)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|_| QueryError::InvalidTimestamp { field }),
        None => Ok(None),
    }
}

impl AggregationQuery {
    /// Apply defaults: `end` = now, `start` = end - 24h, `interval` = hour
    pub fn resolve(
        code: impl Into<String>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        interval: Option<Interval>,
        now: DateTime<Utc>,
    ) -> Result<Self, QueryError> {
        let end = end.unwrap_or(now);
        let start = start.unwrap_or_else(|| end - Duration::hours(DEFAULT_WINDOW_HOURS));
        if start > end {
            return Err(QueryError::InvalidRange);
        }

        Ok(Self {
            code: code.into(),
            start,
            end,
            interval: interval.unwrap_or_default(),
        })
    }

    /// Parse raw request parameters; unknown intervals fall back to hourly
    pub fn from_params(
        code: impl Into<String>,
        params: &SummaryParams,
        now: DateTime<Utc>,
    ) -> Result<Self, QueryError> {
        let start = parse_time(params.start.as_deref(), "start")?;
        let end = parse_time(params.end.as_deref(), "end")?;
        let interval = params.interval.as_deref().map(Interval::from_param);
        Self::resolve(code, start, end, interval, now)
    }
}

/// Stateless and reentrant; clone freely and share across requests
#[derive(Clone)]
pub struct AggregationQueryEngine {
    store: Arc<dyn AnalyticsStore>,
}

impl AggregationQueryEngine {
    pub fn new(store: Arc<dyn AnalyticsStore>) -> Self {
        Self { store }
    }

    pub async fn summarize(&self, query: &AggregationQuery) -> Result<AnalyticsSummary, QueryError> {
        let scope = query.scope();
        let store = self.store.as_ref();

        let (total_clicks, timeline, browsers, os, devices, countries, referrers) = tokio::try_join!(
            store.count(&scope),
            store.timeline(&scope, query.interval),
            store.breakdown(&scope, Dimension::Browser, TOP_N),
            store.breakdown(&scope, Dimension::Os, TOP_N),
            store.breakdown(&scope, Dimension::Device, TOP_N),
            store.breakdown(&scope, Dimension::Country, TOP_N),
            store.breakdown(&scope, Dimension::Referrer, TOP_N),
        )?;

        Ok(AnalyticsSummary {
            total_clicks,
            timeline,
            browsers,
            os,
            devices,
            countries,
            referrers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_defaults() {
        let now = at("2024-05-15T12:00:00Z");
        let query = AggregationQuery::from_params("abc", &SummaryParams::default(), now).unwrap();

        assert_eq!(query.end, now);
        assert_eq!(query.start, at("2024-05-14T12:00:00Z"));
        assert_eq!(query.interval, Interval::Hour);
    }

    #[test]
    fn test_start_defaults_relative_to_explicit_end() {
        let now = at("2024-05-15T12:00:00Z");
        let params = SummaryParams {
            end: Some("2024-05-01T00:00:00Z".to_string()),
            ..Default::default()
        };
        let query = AggregationQuery::from_params("abc", &params, now).unwrap();
        assert_eq!(query.start, at("2024-04-30T00:00:00Z"));
    }

    #[test]
    fn test_unknown_interval_is_hourly() {
        let params = SummaryParams {
            interval: Some("fortnight".to_string()),
            ..Default::default()
        };
        let query = AggregationQuery::from_params("abc", &params, Utc::now()).unwrap();
        assert_eq!(query.interval, Interval::Hour);
    }

    #[test]
    fn test_invalid_timestamp() {
        let params = SummaryParams {
            start: Some("yesterday".to_string()),
            ..Default::default()
        };
        let err = AggregationQuery::from_params("abc", &params, Utc::now()).unwrap_err();
        assert!(matches!(err, QueryError::InvalidTimestamp { field: "start" }));
    }

    #[test]
    fn test_start_after_end_is_rejected() {
        let params = SummaryParams {
            start: Some("2024-05-02T00:00:00Z".to_string()),
            end: Some("2024-05-01T00:00:00Z".to_string()),
            ..Default::default()
        };
        let err = AggregationQuery::from_params("abc", &params, Utc::now()).unwrap_err();
        assert!(matches!(err, QueryError::InvalidRange));
    }

    #[test]
    fn test_offsets_are_converted_to_utc() {
        let params = SummaryParams {
            start: Some("2024-05-01T02:00:00+02:00".to_string()),
            end: Some("2024-05-01T03:00:00+02:00".to_string()),
            interval: Some("minute".to_string()),
        };
        let query = AggregationQuery::from_params("abc", &params, Utc::now()).unwrap();
        assert_eq!(query.start, at("2024-05-01T00:00:00Z"));
        assert_eq!(query.interval, Interval::Minute);
    }
}
