//! Bounded dispatch queues.
//!
//! Both the inbound queue and the broadcast queue are fixed-capacity tokio
//! channels. A full queue blocks the producer until the consumer catches
//! up; nothing is dropped. Every wait also watches a cancellation token so
//! shutdown never hangs on a stalled consumer.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::QueueError;

/// Create a bounded FIFO queue.
///
/// Panics if `capacity` is zero; `Config::validate` rules that out.
pub fn bounded<T>(capacity: usize) -> (mpsc::Sender<T>, mpsc::Receiver<T>) {
    mpsc::channel(capacity)
}

/// Enqueue `item`, waiting for capacity unless `cancel` fires first.
pub async fn enqueue<T>(
    tx: &mpsc::Sender<T>,
    item: T,
    cancel: &CancellationToken,
) -> Result<(), QueueError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(QueueError::Cancelled),
        res = tx.send(item) => res.map_err(|_| QueueError::Closed),
    }
}

/// Dequeue the next item, waiting while empty.
///
/// Returns `None` when the queue is closed or `cancel` fires.
pub async fn dequeue<T>(rx: &mut mpsc::Receiver<T>, cancel: &CancellationToken) -> Option<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        item = rx.recv() => item,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn full_queue_blocks_producer_until_dequeue() {
        let (tx, mut rx) = bounded::<u32>(2);
        let cancel = CancellationToken::new();

        enqueue(&tx, 1, &cancel).await.unwrap();
        enqueue(&tx, 2, &cancel).await.unwrap();

        let producer = {
            let tx = tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { enqueue(&tx, 3, &cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!producer.is_finished(), "producer must block on a full queue");

        assert_eq!(dequeue(&mut rx, &cancel).await, Some(1));
        producer.await.unwrap().unwrap();

        assert_eq!(dequeue(&mut rx, &cancel).await, Some(2));
        assert_eq!(dequeue(&mut rx, &cancel).await, Some(3));
    }

    #[tokio::test]
    async fn cancellation_releases_blocked_producer() {
        let (tx, _rx) = bounded::<u32>(1);
        let cancel = CancellationToken::new();
        enqueue(&tx, 1, &cancel).await.unwrap();

        let waiter = {
            let cancel = cancel.clone();
            tokio::spawn(async move { enqueue(&tx, 2, &cancel).await })
        };
        cancel.cancel();

        assert_eq!(waiter.await.unwrap(), Err(QueueError::Cancelled));
    }

    #[tokio::test]
    async fn dequeue_returns_none_on_cancel() {
        let (_tx, mut rx) = bounded::<u32>(1);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(dequeue(&mut rx, &cancel).await, None);
    }
}
