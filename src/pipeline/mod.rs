//! Event ingestion pipeline
//!
//! Message source → [`Enricher`](crate::enrich::Enricher) → [`Validator`] →
//! [`BatchAccumulator`] → [`AnalyticsStore::write_batch`](crate::storage::AnalyticsStore::write_batch),
//! driven by a single [`ConsumerLoop`].

pub mod accumulator;
pub mod consumer;
pub mod source;
pub mod validate;

pub use accumulator::BatchAccumulator;
pub use consumer::{ConsumerLoop, ConsumerStats};
pub use source::{ingest_channel, ChannelSource, EventPublisher, EventSource, PublishError, SourceError};
pub use validate::{ValidationError, Validator};
