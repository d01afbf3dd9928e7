//! Queue-to-writer pipeline tests with an in-memory sink.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tradetape::error::StoreError;
use tradetape::{bounded, parse_trade_event, BatchWriter, Trade, TradeCounter, TradeSink};

#[derive(Clone, Default)]
struct MemorySink {
    batches: Arc<Mutex<Vec<Vec<Trade>>>>,
}

#[async_trait]
impl TradeSink for MemorySink {
    async fn save_batch(&self, trades: &[Trade]) -> Result<(), StoreError> {
        self.batches.lock().unwrap().push(trades.to_vec());
        Ok(())
    }
}

fn trade(symbol: &str, id: i64) -> Trade {
    Trade::new(
        symbol,
        Decimal::from_str("100.5").unwrap(),
        Decimal::from_str("0.1").unwrap(),
        id,
        Utc.timestamp_millis_opt(1_700_000_000_000 + id).unwrap(),
    )
}

/// Two parsed upstream events, BatchSize 2: one commit holding both rows,
/// counter at 2.
#[tokio::test]
async fn test_two_trades_one_commit() {
    let first = parse_trade_event(
        r#"{"e":"trade","s":"BTCUSDT","p":"100.5","q":"0.1","t":1,"T":1700000000000}"#,
    )
    .unwrap();
    let second = parse_trade_event(
        r#"{"e":"trade","s":"ETHUSDT","p":"2000","q":"0.05","t":2,"T":1700000000500}"#,
    )
    .unwrap();

    let sink = MemorySink::default();
    let batches = Arc::clone(&sink.batches);
    let (tx, rx) = bounded(16);
    let counter = TradeCounter::new();
    let writer = BatchWriter::new(sink, rx, 2, counter.clone());
    let handle = tokio::spawn(writer.run());

    tx.offer(first).await.unwrap();
    tx.offer(second).await.unwrap();
    tx.close();
    handle.await.unwrap();

    let committed = batches.lock().unwrap();
    assert_eq!(committed.len(), 1);
    assert_eq!(committed[0].len(), 2);
    assert_eq!(committed[0][0].symbol, "BTCUSDT");
    assert_eq!(committed[0][1].symbol, "ETHUSDT");
    assert_eq!(counter.get(), 2);
}

/// Shutdown with 37 unflushed trades: the residue commits as one final
/// batch within the grace window.
#[tokio::test]
async fn test_shutdown_drains_residue_within_grace() {
    let sink = MemorySink::default();
    let batches = Arc::clone(&sink.batches);
    let (tx, rx) = bounded(50_000);
    let counter = TradeCounter::new();
    let writer = BatchWriter::new(sink, rx, 100, counter.clone());

    for id in 0..37 {
        tx.offer(trade("BTCUSDT", id)).await.unwrap();
    }

    // Shutdown ordering: close the queue first, then run the writer with
    // the grace bound around it.
    let handle = tokio::spawn(writer.run());
    tx.close();
    tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("writer must finish within the shutdown grace")
        .unwrap();

    let committed = batches.lock().unwrap();
    assert_eq!(committed.len(), 1);
    assert_eq!(committed[0].len(), 37);
    assert_eq!(counter.get(), 37);
}

/// A producer offering past capacity is held back until the writer drains.
#[tokio::test]
async fn test_backpressure_holds_producer() {
    let sink = MemorySink::default();
    let (tx, rx) = bounded(8);
    let counter = TradeCounter::new();

    // Fill to capacity before the writer starts.
    for id in 0..8 {
        tx.offer(trade("BTCUSDT", id)).await.unwrap();
    }
    let blocked = tokio::time::timeout(Duration::from_millis(50), tx.offer(trade("BTCUSDT", 8)));
    assert!(blocked.await.is_err(), "ninth offer must block");

    let writer = BatchWriter::new(sink, rx, 4, counter.clone());
    let handle = tokio::spawn(writer.run());

    // With the writer draining, the held offer completes.
    tx.offer(trade("BTCUSDT", 8)).await.unwrap();
    tx.close();
    handle.await.unwrap();

    assert_eq!(counter.get(), 9);
}

/// Batches are formed and committed in arrival order.
#[tokio::test]
async fn test_trades_arrive_in_offer_order() {
    let sink = MemorySink::default();
    let batches = Arc::clone(&sink.batches);
    let (tx, rx) = bounded(128);
    let writer = BatchWriter::new(sink, rx, 10, TradeCounter::new());
    let handle = tokio::spawn(writer.run());

    for id in 0..25 {
        tx.offer(trade("BTCUSDT", id)).await.unwrap();
    }
    tx.close();
    handle.await.unwrap();

    let committed = batches.lock().unwrap();
    let flattened: Vec<i64> = committed
        .iter()
        .flat_map(|b| b.iter().map(|t| t.trade_id))
        .collect();
    assert_eq!(flattened, (0..25).collect::<Vec<i64>>());
}
