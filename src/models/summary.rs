use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

const MINUTE: i64 = 60;
const HOUR: i64 = 3_600;
const DAY: i64 = 86_400;
const WEEK: i64 = 7 * DAY;
/// 1970-01-05 was the first Monday after the epoch
const FIRST_MONDAY: i64 = 4 * DAY;

/// Timeline bucket granularity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    Minute,
    #[default]
    Hour,
    Day,
    Week,
    Month,
    Year,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown interval '{0}'")]
pub struct UnknownInterval(pub String);

impl FromStr for Interval {
    type Err = UnknownInterval;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "minute" => Ok(Interval::Minute),
            "hour" => Ok(Interval::Hour),
            "day" => Ok(Interval::Day),
            "week" => Ok(Interval::Week),
            "month" => Ok(Interval::Month),
            "year" => Ok(Interval::Year),
            _ => Err(UnknownInterval(s.to_string())),
        }
    }
}

impl Interval {
    /// Parse a request parameter; anything unrecognised buckets hourly
    pub fn from_param(value: &str) -> Self {
        value.parse().unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Minute => "minute",
            Interval::Hour => "hour",
            Interval::Day => "day",
            Interval::Week => "week",
            Interval::Month => "month",
            Interval::Year => "year",
        }
    }

    /// Start of the period containing `ts` (UTC, weeks start on Monday)
    pub fn truncate(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let secs = ts.timestamp();
        let truncated = match self {
            Interval::Minute => secs.div_euclid(MINUTE) * MINUTE,
            Interval::Hour => secs.div_euclid(HOUR) * HOUR,
            Interval::Day => secs.div_euclid(DAY) * DAY,
            Interval::Week => (secs - FIRST_MONDAY).div_euclid(WEEK) * WEEK + FIRST_MONDAY,
            Interval::Month => return first_of(ts.year(), ts.month()),
            Interval::Year => return first_of(ts.year(), 1),
        };
        Utc.timestamp_opt(truncated, 0).single().unwrap_or(ts)
    }
}

fn first_of(year: i32, month: u32) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// A summary request after defaults are applied. `start <= end` always holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationQuery {
    pub code: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub interval: Interval,
}

impl AggregationQuery {
    /// The filter every projection of this query is evaluated against
    pub fn scope(&self) -> QueryScope {
        QueryScope {
            code: self.code.clone(),
            start: self.start.timestamp(),
            end: self.end.timestamp(),
        }
    }
}

/// `(code, start, end)` predicate in store terms (unix seconds, both ends inclusive)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryScope {
    pub code: String,
    pub start: i64,
    pub end: i64,
}

/// Grouping dimension for breakdown queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Browser,
    Os,
    Device,
    Country,
    Referrer,
}

impl Dimension {
    pub const ALL: [Dimension; 5] = [
        Dimension::Browser,
        Dimension::Os,
        Dimension::Device,
        Dimension::Country,
        Dimension::Referrer,
    ];

    /// Column in the `analytics` table
    pub fn column(&self) -> &'static str {
        match self {
            Dimension::Browser => "browser",
            Dimension::Os => "os",
            Dimension::Device => "device_type",
            Dimension::Country => "country",
            Dimension::Referrer => "referer",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub time: DateTime<Utc>,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionCount {
    pub name: String,
    pub count: u64,
}

impl DimensionCount {
    pub fn new(name: impl Into<String>, count: u64) -> Self {
        Self {
            name: name.into(),
            count,
        }
    }
}

/// Aggregated statistics for one code over one time window
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    pub total_clicks: u64,
    pub timeline: Vec<TimelineEntry>,
    pub browsers: Vec<DimensionCount>,
    pub os: Vec<DimensionCount>,
    pub devices: Vec<DimensionCount>,
    pub countries: Vec<DimensionCount>,
    pub referrers: Vec<DimensionCount>,
}

impl AnalyticsSummary {
    pub fn timeline_total(&self) -> u64 {
        self.timeline.iter().map(|entry| entry.count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_interval_parse() {
        assert_eq!("minute".parse::<Interval>(), Ok(Interval::Minute));
        assert_eq!("WEEK".parse::<Interval>(), Ok(Interval::Week));
        assert!("fortnight".parse::<Interval>().is_err());
    }

    #[test]
    fn test_unknown_interval_error_message() {
        let err = "fortnight".parse::<Interval>().unwrap_err();
        assert_eq!(err, UnknownInterval("fortnight".to_string()));
        assert_eq!(err.to_string(), "unknown interval 'fortnight'");

        let boxed: Box<dyn std::error::Error> = Box::new(err);
        assert!(boxed.source().is_none());
    }

    #[test]
    fn test_unknown_interval_defaults_to_hour() {
        assert_eq!(Interval::from_param("fortnight"), Interval::Hour);
        assert_eq!(Interval::from_param(""), Interval::Hour);
        assert_eq!(Interval::from_param("day"), Interval::Day);
    }

    #[test]
    fn test_truncate_each_interval() {
        let ts = at("2024-05-15T13:47:29Z"); // a Wednesday

        assert_eq!(Interval::Minute.truncate(ts), at("2024-05-15T13:47:00Z"));
        assert_eq!(Interval::Hour.truncate(ts), at("2024-05-15T13:00:00Z"));
        assert_eq!(Interval::Day.truncate(ts), at("2024-05-15T00:00:00Z"));
        assert_eq!(Interval::Week.truncate(ts), at("2024-05-13T00:00:00Z"));
        assert_eq!(Interval::Month.truncate(ts), at("2024-05-01T00:00:00Z"));
        assert_eq!(Interval::Year.truncate(ts), at("2024-01-01T00:00:00Z"));
    }

    #[test]
    fn test_week_truncation_boundaries() {
        // Monday stays put, Sunday goes back six days
        assert_eq!(
            Interval::Week.truncate(at("2024-05-13T00:00:00Z")),
            at("2024-05-13T00:00:00Z")
        );
        assert_eq!(
            Interval::Week.truncate(at("2024-05-19T23:59:59Z")),
            at("2024-05-13T00:00:00Z")
        );
    }

    #[test]
    fn test_scope_uses_unix_seconds() {
        let query = AggregationQuery {
            code: "abc".to_string(),
            start: at("2024-05-15T00:00:00Z"),
            end: at("2024-05-16T00:00:00Z"),
            interval: Interval::Hour,
        };
        let scope = query.scope();
        assert_eq!(scope.end - scope.start, DAY);
        assert_eq!(scope.code, "abc");
    }

    #[test]
    fn test_summary_serializes_with_snake_case_total() {
        let summary = AnalyticsSummary {
            total_clicks: 1,
            browsers: vec![DimensionCount::new("chrome", 1)],
            ..Default::default()
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["total_clicks"], 1);
        assert_eq!(json["browsers"][0]["name"], "chrome");
        assert!(json["referrers"].as_array().unwrap().is_empty());
    }
}
