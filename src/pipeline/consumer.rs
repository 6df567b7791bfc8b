//! Consumer loop: source → enrich → validate → accumulate → flush
//!
//! Runs on a single task and is the only writer to the store. Each iteration
//! is one of three states:
//!
//! - `Polling`: a read bounded by the poll timeout, so the time trigger is
//!   never starved by an idle source
//! - `Flushing`: drain the accumulator and write the batch
//! - `Draining`: final best-effort flush before exit, entered on shutdown or
//!   when the source closes
//!
//! A failed write drops the drained batch. There is no retry queue: memory
//! stays bounded and the loop keeps moving at the cost of losing that batch.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::enrich::Enricher;
use crate::models::{Batch, NormalizedEvent, RawEvent};
use crate::pipeline::{BatchAccumulator, EventSource, SourceError, ValidationError, Validator};
use crate::storage::AnalyticsStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    Polling,
    Flushing,
    Draining,
}

/// Counters for one run of the loop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub received: u64,
    pub decode_failures: u64,
    pub rejected: u64,
    pub degraded: u64,
    pub batches_written: u64,
    pub events_written: u64,
    pub batches_dropped: u64,
    pub events_dropped: u64,
}

#[derive(Debug)]
enum Skip {
    Decode(serde_json::Error),
    Invalid(ValidationError),
}

pub struct ConsumerLoop<S: EventSource> {
    source: S,
    enricher: Arc<Enricher>,
    validator: Validator,
    accumulator: BatchAccumulator,
    store: Arc<dyn AnalyticsStore>,
    poll_timeout: Duration,
    shutdown: watch::Receiver<bool>,
    stats: ConsumerStats,
}

impl<S: EventSource> ConsumerLoop<S> {
    pub fn new(
        source: S,
        enricher: Arc<Enricher>,
        validator: Validator,
        accumulator: BatchAccumulator,
        store: Arc<dyn AnalyticsStore>,
        poll_timeout: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            source,
            enricher,
            validator,
            accumulator,
            store,
            poll_timeout,
            shutdown,
            stats: ConsumerStats::default(),
        }
    }

    /// Run until shutdown is signalled or the source closes
    pub async fn run(mut self) -> ConsumerStats {
        info!(
            batch_size = self.accumulator.max_size(),
            flush_interval_ms = self.accumulator.flush_interval().as_millis() as u64,
            "Starting to read analytics events"
        );

        let mut state = LoopState::Polling;
        loop {
            state = match state {
                LoopState::Polling => {
                    if self.shutdown_requested() {
                        LoopState::Draining
                    } else if self.accumulator.should_flush() {
                        LoopState::Flushing
                    } else {
                        self.poll().await
                    }
                }
                LoopState::Flushing => {
                    self.flush().await;
                    LoopState::Polling
                }
                LoopState::Draining => {
                    info!("Shutting down analytics consumer...");
                    self.flush().await;
                    break;
                }
            };
        }

        info!(stats = ?self.stats, "Analytics consumer stopped");
        self.stats
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    async fn poll(&mut self) -> LoopState {
        let message = match self.source.recv(self.poll_timeout).await {
            Ok(Some(message)) => message,
            Ok(None) => return LoopState::Polling,
            Err(SourceError::Closed) => {
                info!("Event source closed");
                return LoopState::Draining;
            }
            Err(e) => {
                error!(error = %e, "Error reading message");
                return LoopState::Polling;
            }
        };

        self.stats.received += 1;
        match self.process(&message).await {
            Ok(event) => {
                self.accumulator.append(event);
                if self.accumulator.is_full() {
                    LoopState::Flushing
                } else {
                    LoopState::Polling
                }
            }
            Err(Skip::Decode(e)) => {
                self.stats.decode_failures += 1;
                warn!(error = %e, "Error decoding event, skipping message");
                LoopState::Polling
            }
            Err(Skip::Invalid(e)) => {
                self.stats.rejected += 1;
                warn!(error = %e, "Validation failed for event, skipping message");
                LoopState::Polling
            }
        }
    }

    async fn process(&mut self, message: &[u8]) -> Result<NormalizedEvent, Skip> {
        let raw = RawEvent::from_slice(message).map_err(Skip::Decode)?;
        let enriched = self.enricher.enrich(raw).await;
        if enriched.is_degraded() {
            self.stats.degraded += 1;
            debug!(
                code = %enriched.value.code,
                degradation = ?enriched.degradation,
                "Event enriched with fallback values"
            );
        }
        self.validator
            .validate(&enriched.value)
            .map_err(Skip::Invalid)?;
        Ok(enriched.value)
    }

    async fn flush(&mut self) {
        let Some(batch) = self.accumulator.drain() else {
            return;
        };
        self.write(batch).await;
    }

    async fn write(&mut self, batch: Batch) {
        let size = batch.len();
        match self.store.write_batch(batch).await {
            Ok(()) => {
                self.stats.batches_written += 1;
                self.stats.events_written += size as u64;
                info!(size, "Successfully inserted batch");
            }
            Err(e) => {
                self.stats.batches_dropped += 1;
                self.stats.events_dropped += size as u64;
                error!(size, error = %e, "Error inserting batch, dropping it");
            }
        }
    }
}
