pub mod event;
pub mod summary;

pub use event::{Batch, DeviceClass, NormalizedEvent, RawEvent};
pub use summary::{
    AggregationQuery, AnalyticsSummary, Dimension, DimensionCount, Interval, QueryScope,
    TimelineEntry,
};
