//! Bounded FIFO handoff between a worker's tasks.
//!
//! A full queue makes `push` wait, so a flood of notifications slows the
//! producers down instead of growing memory without limit.

use thiserror::Error;
use tokio::sync::mpsc;

/// The consumer side went away
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("queue closed")]
pub struct QueueClosed;

#[derive(Debug)]
pub struct QueueSender<T> {
    tx: mpsc::Sender<T>,
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

#[derive(Debug)]
pub struct QueueReceiver<T> {
    rx: mpsc::Receiver<T>,
}

/// Create a queue holding at most `capacity` items (minimum 1)
pub fn channel<T>(capacity: usize) -> (QueueSender<T>, QueueReceiver<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (QueueSender { tx }, QueueReceiver { rx })
}

impl<T> QueueSender<T> {
    /// Enqueue, waiting for room when the queue is full
    pub async fn push(&self, item: T) -> Result<(), QueueClosed> {
        self.tx.send(item).await.map_err(|_| QueueClosed)
    }
}

impl<T> QueueReceiver<T> {
    /// Next item in FIFO order, None once every sender is gone and the queue is drained
    pub async fn pop(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    #[cfg(test)]
    pub fn try_pop(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fifo_order() {
        let (tx, mut rx) = channel(8);
        for i in 0..5 {
            tx.push(i).await.unwrap();
        }
        for i in 0..5 {
            assert_eq!(rx.pop().await, Some(i));
        }
        assert_eq!(rx.try_pop(), None);
    }

    #[tokio::test]
    async fn test_full_queue_blocks_producer() {
        let (tx, mut rx) = channel(2);
        tx.push(1).await.unwrap();
        tx.push(2).await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(50), tx.push(3)).await;
        assert!(blocked.is_err(), "push into a full queue should wait");

        assert_eq!(rx.pop().await, Some(1));
        tokio::time::timeout(Duration::from_millis(500), tx.push(3))
            .await
            .expect("push should proceed once there is room")
            .unwrap();
        assert_eq!(rx.pop().await, Some(2));
        assert_eq!(rx.pop().await, Some(3));
    }

    #[tokio::test]
    async fn test_push_after_receiver_dropped() {
        let (tx, rx) = channel::<u32>(1);
        drop(rx);
        let err = tx.push(1).await.unwrap_err();
        assert_eq!(err, QueueClosed);
        assert_eq!(err.to_string(), "queue closed");
    }

    #[tokio::test]
    async fn test_zero_capacity_clamped() {
        let (tx, mut rx) = channel(0);
        tx.push("a").await.unwrap();
        assert_eq!(rx.pop().await, Some("a"));
    }
}
