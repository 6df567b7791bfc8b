//! In-memory batch with size and time flush triggers
//!
//! Owned by the consumer loop and touched by nothing else, so there is no
//! locking. Time is measured with `tokio::time::Instant`, which lets tests
//! drive the time trigger with a paused clock.

use std::time::Duration;
use tokio::time::Instant;

use crate::models::{Batch, NormalizedEvent};

pub struct BatchAccumulator {
    buffer: Vec<NormalizedEvent>,
    max_size: usize,
    flush_interval: Duration,
    last_flush: Instant,
}

impl BatchAccumulator {
    pub fn new(max_size: usize, flush_interval: Duration) -> Self {
        let max_size = max_size.max(1);
        Self {
            buffer: Vec::with_capacity(max_size),
            max_size,
            flush_interval,
            last_flush: Instant::now(),
        }
    }

    pub fn append(&mut self, event: NormalizedEvent) {
        self.buffer.push(event);
    }

    /// Size trigger: the batch has reached its configured maximum
    pub fn is_full(&self) -> bool {
        self.buffer.len() >= self.max_size
    }

    /// Time trigger: the flush interval has elapsed since the last drain
    pub fn is_due(&self) -> bool {
        self.last_flush.elapsed() >= self.flush_interval
    }

    /// Either trigger has fired
    pub fn should_flush(&self) -> bool {
        self.is_full() || self.is_due()
    }

    /// Hand the buffered events over and restart the flush timer.
    ///
    /// Returns `None` when nothing was buffered, so an idle tick never
    /// produces a write.
    pub fn drain(&mut self) -> Option<Batch> {
        self.last_flush = Instant::now();
        if self.buffer.is_empty() {
            return None;
        }
        let events = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.max_size));
        Some(Batch::new(events))
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DeviceClass;

    fn event(code: &str) -> NormalizedEvent {
        NormalizedEvent {
            code: code.to_string(),
            browser: "chrome".to_string(),
            os: "mac os x".to_string(),
            device: DeviceClass::Desktop,
            country: "internal".to_string(),
            state: "internal".to_string(),
            referer: String::new(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_size_trigger() {
        let mut acc = BatchAccumulator::new(3, Duration::from_secs(2));

        acc.append(event("a"));
        acc.append(event("b"));
        assert!(!acc.should_flush());

        acc.append(event("c"));
        assert!(acc.is_full());
        assert!(acc.should_flush());

        let batch = acc.drain().unwrap();
        assert_eq!(batch.len(), 3);
        assert!(acc.is_empty());
        assert!(!acc.should_flush());
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_trigger() {
        let mut acc = BatchAccumulator::new(5000, Duration::from_secs(2));
        acc.append(event("a"));

        tokio::time::advance(Duration::from_millis(1999)).await;
        assert!(!acc.should_flush());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(acc.is_due());
        assert!(acc.should_flush());

        let batch = acc.drain().unwrap();
        assert_eq!(batch.len(), 1);
        assert!(!acc.should_flush());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_restarts_timer() {
        let mut acc = BatchAccumulator::new(10, Duration::from_secs(2));

        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(acc.is_due());
        assert!(acc.drain().is_none());
        assert!(!acc.is_due());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!acc.is_due());
    }

    #[tokio::test]
    async fn test_drain_empty_is_noop() {
        let mut acc = BatchAccumulator::new(10, Duration::from_secs(2));
        assert!(acc.drain().is_none());
        assert!(acc.drain().is_none());
        assert_eq!(acc.len(), 0);
    }

    #[tokio::test]
    async fn test_drain_preserves_arrival_order() {
        let mut acc = BatchAccumulator::new(10, Duration::from_secs(2));
        for code in ["first", "second", "third"] {
            acc.append(event(code));
        }

        let codes: Vec<String> = acc
            .drain()
            .unwrap()
            .into_events()
            .into_iter()
            .map(|e| e.code)
            .collect();
        assert_eq!(codes, vec!["first", "second", "third"]);
    }
}
