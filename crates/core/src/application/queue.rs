// Message Queue
// Single shared FIFO between producers and the consumer pool

use crate::domain::Envelope;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

/// Capacity policy of the shared queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueCapacity {
    /// Writes never block; memory grows with the backlog
    Unbounded,
    /// Writes block or fail once this many messages are buffered
    Bounded(usize),
}

/// Enqueue errors (the only broker error that reaches business code)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnqueueError {
    #[error("Queue full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("Queue still full after {0:?}")]
    Timeout(Duration),

    #[error("Queue closed: no consumer will ever read this message")]
    Closed,
}

#[derive(Clone)]
enum Tx {
    Bounded(mpsc::Sender<Envelope>),
    Unbounded(mpsc::UnboundedSender<Envelope>),
}

enum Rx {
    Bounded(mpsc::Receiver<Envelope>),
    Unbounded(mpsc::UnboundedReceiver<Envelope>),
}

/// Write side of the queue (cheap to clone, one per producer)
#[derive(Clone)]
pub struct QueueWriter {
    tx: Tx,
    capacity: QueueCapacity,
}

/// Read side of the queue, shared by all consumers.
///
/// tokio's mpsc receiver has a single owner, so competing consumers take turns
/// on it through an async mutex. The lock is only held while waiting for the
/// next message; dispatch happens after it is released.
#[derive(Clone)]
pub struct QueueReader {
    rx: Arc<Mutex<Rx>>,
}

/// Create the shared queue
///
/// # Panics
/// Panics if `capacity` is `Bounded(0)` (rejected earlier by config validation).
pub fn message_queue(capacity: QueueCapacity) -> (QueueWriter, QueueReader) {
    let (tx, rx) = match capacity {
        QueueCapacity::Bounded(size) => {
            let (tx, rx) = mpsc::channel(size);
            (Tx::Bounded(tx), Rx::Bounded(rx))
        }
        QueueCapacity::Unbounded => {
            let (tx, rx) = mpsc::unbounded_channel();
            (Tx::Unbounded(tx), Rx::Unbounded(rx))
        }
    };
    (
        QueueWriter { tx, capacity },
        QueueReader {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

impl QueueWriter {
    pub fn capacity(&self) -> QueueCapacity {
        self.capacity
    }

    /// Free slots (None when unbounded)
    pub fn available(&self) -> Option<usize> {
        match &self.tx {
            Tx::Bounded(tx) => Some(tx.capacity()),
            Tx::Unbounded(_) => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        match &self.tx {
            Tx::Bounded(tx) => tx.is_closed(),
            Tx::Unbounded(tx) => tx.is_closed(),
        }
    }

    /// Write, waiting for space as long as needed
    pub async fn send(&self, envelope: Envelope) -> Result<(), EnqueueError> {
        match &self.tx {
            Tx::Bounded(tx) => tx.send(envelope).await.map_err(|_| EnqueueError::Closed),
            Tx::Unbounded(tx) => tx.send(envelope).map_err(|_| EnqueueError::Closed),
        }
    }

    /// Write, waiting for space at most `timeout`
    pub async fn send_timeout(
        &self,
        envelope: Envelope,
        timeout: Duration,
    ) -> Result<(), EnqueueError> {
        match &self.tx {
            Tx::Bounded(tx) => tx.send_timeout(envelope, timeout).await.map_err(|e| match e {
                mpsc::error::SendTimeoutError::Timeout(_) => EnqueueError::Timeout(timeout),
                mpsc::error::SendTimeoutError::Closed(_) => EnqueueError::Closed,
            }),
            Tx::Unbounded(tx) => tx.send(envelope).map_err(|_| EnqueueError::Closed),
        }
    }

    /// Write without waiting
    pub fn try_send(&self, envelope: Envelope) -> Result<(), EnqueueError> {
        match &self.tx {
            Tx::Bounded(tx) => tx.try_send(envelope).map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => EnqueueError::QueueFull {
                    capacity: tx.max_capacity(),
                },
                mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
            }),
            Tx::Unbounded(tx) => tx.send(envelope).map_err(|_| EnqueueError::Closed),
        }
    }
}

impl QueueReader {
    /// Wait for the next message in FIFO order.
    ///
    /// Returns `None` once every writer is gone and the backlog is empty.
    /// Cancel safe: dropping the future never loses a message.
    pub async fn recv(&self) -> Option<Envelope> {
        let mut rx = self.rx.lock().await;
        match &mut *rx {
            Rx::Bounded(rx) => rx.recv().await,
            Rx::Unbounded(rx) => rx.recv().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Notification;

    #[derive(Debug)]
    struct Ping;
    impl Notification for Ping {}

    fn env(id: &str) -> Envelope {
        Envelope::new(id, None, 0, Ping)
    }

    #[tokio::test]
    async fn test_fifo_dequeue_order() {
        let (writer, reader) = message_queue(QueueCapacity::Bounded(8));
        for i in 0..5 {
            writer.send(env(&format!("m{}", i))).await.unwrap();
        }

        for i in 0..5 {
            let next = reader.recv().await.unwrap();
            assert_eq!(next.id(), format!("m{}", i));
        }
    }

    #[tokio::test]
    async fn test_try_send_reports_full() {
        let (writer, _reader) = message_queue(QueueCapacity::Bounded(2));
        writer.try_send(env("a")).unwrap();
        writer.try_send(env("b")).unwrap();
        assert_eq!(writer.available(), Some(0));

        let err = writer.try_send(env("c")).unwrap_err();
        assert_eq!(err, EnqueueError::QueueFull { capacity: 2 });
    }

    #[tokio::test]
    async fn test_send_timeout_when_full() {
        let (writer, _reader) = message_queue(QueueCapacity::Bounded(1));
        writer.send(env("a")).await.unwrap();

        let err = writer
            .send_timeout(env("b"), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert_eq!(err, EnqueueError::Timeout(Duration::from_millis(20)));
    }

    #[tokio::test]
    async fn test_unbounded_never_blocks() {
        let (writer, reader) = message_queue(QueueCapacity::Unbounded);
        for i in 0..10_000 {
            writer.try_send(env(&i.to_string())).unwrap();
        }
        assert_eq!(writer.available(), None);
        assert_eq!(reader.recv().await.unwrap().id(), "0");
    }

    #[tokio::test]
    async fn test_closed_after_reader_dropped() {
        let (writer, reader) = message_queue(QueueCapacity::Bounded(4));
        drop(reader);

        assert!(writer.is_closed());
        assert_eq!(writer.send(env("a")).await.unwrap_err(), EnqueueError::Closed);
    }

    #[tokio::test]
    async fn test_recv_drains_then_ends_when_writers_gone() {
        let (writer, reader) = message_queue(QueueCapacity::Unbounded);
        writer.send(env("last")).await.unwrap();
        drop(writer);

        assert_eq!(reader.recv().await.unwrap().id(), "last");
        assert!(reader.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_each_message_read_by_one_reader() {
        let (writer, reader) = message_queue(QueueCapacity::Bounded(64));
        for i in 0..50 {
            writer.send(env(&i.to_string())).await.unwrap();
        }
        drop(writer);

        let mut readers = Vec::new();
        for _ in 0..4 {
            let reader = reader.clone();
            readers.push(tokio::spawn(async move {
                let mut ids = Vec::new();
                while let Some(env) = reader.recv().await {
                    ids.push(env.id().to_string());
                }
                ids
            }));
        }

        let mut all = Vec::new();
        for handle in readers {
            all.extend(handle.await.unwrap());
        }
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 50, "every message read exactly once");
    }
}
