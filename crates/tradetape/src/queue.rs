//! Bounded in-memory trade queue coupling the stream receiver to the
//! batch writer.
//!
//! Multi-producer, single-reader, fixed capacity. Producers suspend in
//! `offer` while the queue is full (back-pressure). `close` stops further
//! offers and wakes any parked producer; the reader drains the residue and
//! then observes end-of-stream.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, watch};

use crate::trade::Trade;

/// Capacity of the queue between the stream receiver and the batch writer.
pub const QUEUE_CAPACITY: usize = 50_000;

#[derive(Error, Debug, PartialEq, Eq)]
#[error("trade queue closed")]
pub struct QueueClosed;

/// Create a bounded queue with the given capacity.
pub fn bounded(capacity: usize) -> (QueueSender, QueueReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    let (closed_tx, closed_rx) = watch::channel(false);
    (
        QueueSender {
            tx,
            closed_tx: Arc::new(closed_tx),
            closed_rx: closed_rx.clone(),
        },
        QueueReceiver { rx, closed_rx },
    )
}

#[derive(Clone)]
pub struct QueueSender {
    tx: mpsc::Sender<Trade>,
    closed_tx: Arc<watch::Sender<bool>>,
    closed_rx: watch::Receiver<bool>,
}

impl QueueSender {
    /// Enqueue one trade in FIFO order. Suspends while the queue is full;
    /// completes with `Err(QueueClosed)` once the queue is closed.
    pub async fn offer(&self, trade: Trade) -> Result<(), QueueClosed> {
        if *self.closed_rx.borrow() {
            return Err(QueueClosed);
        }
        let mut closed = self.closed_rx.clone();
        tokio::select! {
            res = self.tx.send(trade) => res.map_err(|_| QueueClosed),
            _ = closed.wait_for(|c| *c) => Err(QueueClosed),
        }
    }

    /// Close the queue for writes. Parked producers wake with an error;
    /// the reader drains buffered trades and then sees end-of-stream.
    pub fn close(&self) {
        let _ = self.closed_tx.send(true);
    }
}

pub struct QueueReceiver {
    rx: mpsc::Receiver<Trade>,
    closed_rx: watch::Receiver<bool>,
}

impl QueueReceiver {
    /// Next trade in arrival order. Suspends while the queue is open and
    /// empty; after `close`, yields the buffered residue and then `None`.
    pub async fn drain_next(&mut self) -> Option<Trade> {
        if *self.closed_rx.borrow() {
            return self.rx.try_recv().ok();
        }
        let mut closed = self.closed_rx.clone();
        tokio::select! {
            item = self.rx.recv() => item,
            _ = closed.wait_for(|c| *c) => self.rx.try_recv().ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use std::time::Duration;

    fn trade(id: i64) -> Trade {
        Trade::new("BTCUSDT", Decimal::ONE, Decimal::ONE, id, Utc::now())
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let (tx, mut rx) = bounded(8);
        tx.offer(trade(1)).await.unwrap();
        tx.offer(trade(2)).await.unwrap();
        tx.offer(trade(3)).await.unwrap();

        assert_eq!(rx.drain_next().await.unwrap().trade_id, 1);
        assert_eq!(rx.drain_next().await.unwrap().trade_id, 2);
        assert_eq!(rx.drain_next().await.unwrap().trade_id, 3);
    }

    #[tokio::test]
    async fn test_offer_blocks_when_full() {
        let (tx, mut rx) = bounded(2);
        tx.offer(trade(1)).await.unwrap();
        tx.offer(trade(2)).await.unwrap();

        // Third offer must suspend until the reader makes room.
        let blocked = tokio::time::timeout(Duration::from_millis(50), tx.offer(trade(3))).await;
        assert!(blocked.is_err(), "offer should block at capacity");

        let tx2 = tx.clone();
        let pending = tokio::spawn(async move { tx2.offer(trade(3)).await });
        rx.drain_next().await.unwrap();
        pending.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_close_drains_residue_then_ends() {
        let (tx, mut rx) = bounded(8);
        tx.offer(trade(1)).await.unwrap();
        tx.offer(trade(2)).await.unwrap();
        tx.close();

        assert!(tx.offer(trade(3)).await.is_err());
        assert_eq!(rx.drain_next().await.unwrap().trade_id, 1);
        assert_eq!(rx.drain_next().await.unwrap().trade_id, 2);
        assert!(rx.drain_next().await.is_none());
        assert!(rx.drain_next().await.is_none());
    }

    #[tokio::test]
    async fn test_close_wakes_parked_producer() {
        let (tx, _rx) = bounded(1);
        tx.offer(trade(1)).await.unwrap();

        let tx2 = tx.clone();
        let parked = tokio::spawn(async move { tx2.offer(trade(2)).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.close();

        assert_eq!(parked.await.unwrap(), Err(QueueClosed));
    }

    #[tokio::test]
    async fn test_reader_ends_when_all_senders_dropped() {
        let (tx, mut rx) = bounded(8);
        tx.offer(trade(1)).await.unwrap();
        drop(tx);

        assert_eq!(rx.drain_next().await.unwrap().trade_id, 1);
        assert!(rx.drain_next().await.is_none());
    }
}
