//! Event sources feeding the consumer loop

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum SourceError {
    /// No producer can ever publish again
    #[error("event source closed")]
    Closed,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PublishError {
    #[error("ingest queue is full")]
    Full,
    #[error("ingest queue is closed")]
    Closed,
}

/// Source of encoded event messages
#[async_trait]
pub trait EventSource: Send {
    /// Wait at most `timeout` for the next message; `Ok(None)` means the read
    /// timed out with nothing available.
    async fn recv(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, SourceError>;
}

/// Producer half of the in-process ingest queue
#[derive(Clone)]
pub struct EventPublisher {
    tx: mpsc::Sender<Vec<u8>>,
}

impl EventPublisher {
    /// Enqueue one message without waiting for room
    pub fn publish(&self, message: Vec<u8>) -> Result<(), PublishError> {
        self.tx.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PublishError::Full,
            mpsc::error::TrySendError::Closed(_) => PublishError::Closed,
        })
    }
}

/// Consumer half of the in-process ingest queue
pub struct ChannelSource {
    rx: mpsc::Receiver<Vec<u8>>,
}

/// Bounded queue connecting ingest producers to the consumer loop
pub fn ingest_channel(capacity: usize) -> (EventPublisher, ChannelSource) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventPublisher { tx }, ChannelSource { rx })
}

#[async_trait]
impl EventSource for ChannelSource {
    async fn recv(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, SourceError> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(message)) => Ok(Some(message)),
            Ok(None) => Err(SourceError::Closed),
            Err(_) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_then_recv() {
        let (publisher, mut source) = ingest_channel(4);
        publisher.publish(b"hello".to_vec()).unwrap();

        let message = source.recv(Duration::from_millis(100)).await.unwrap();
        assert_eq!(message.as_deref(), Some(&b"hello"[..]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recv_times_out_when_idle() {
        let (_publisher, mut source) = ingest_channel(4);
        let message = source.recv(Duration::from_millis(100)).await.unwrap();
        assert!(message.is_none());
    }

    #[tokio::test]
    async fn test_recv_reports_closed() {
        let (publisher, mut source) = ingest_channel(4);
        drop(publisher);
        assert!(matches!(
            source.recv(Duration::from_millis(100)).await,
            Err(SourceError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_publish_reports_full_queue() {
        let (publisher, _source) = ingest_channel(1);
        publisher.publish(b"one".to_vec()).unwrap();
        assert_eq!(publisher.publish(b"two".to_vec()), Err(PublishError::Full));
    }

    #[tokio::test]
    async fn test_publish_reports_closed_queue() {
        let (publisher, source) = ingest_channel(1);
        drop(source);
        assert_eq!(publisher.publish(b"one".to_vec()), Err(PublishError::Closed));
    }
}
