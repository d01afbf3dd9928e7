//! Batching writer: drains the queue, groups trades, commits through a
//! sink.
//!
//! Size-driven with a maximum-latency timer: a batch commits as soon as it
//! reaches the configured size, and a partial batch commits after one
//! second so quiet feeds are not delayed indefinitely. End-of-stream
//! flushes the remainder.

use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::error::StoreError;
use crate::metrics;
use crate::queue::QueueReceiver;
use crate::stats::TradeCounter;
use crate::store::TradeSink;
use crate::trade::Trade;

/// Upper bound on how long an undersized batch may wait.
const MAX_BATCH_LATENCY: Duration = Duration::from_secs(1);

/// Attempts per batch before it is discarded.
const SAVE_ATTEMPTS: u32 = 3;

/// Delay before the first retry; doubles per attempt.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Single consumer of the trade queue. `save_batch` calls never overlap.
pub struct BatchWriter<S> {
    sink: S,
    queue: QueueReceiver,
    batch_size: usize,
    counter: TradeCounter,
}

impl<S: TradeSink> BatchWriter<S> {
    pub fn new(sink: S, queue: QueueReceiver, batch_size: usize, counter: TradeCounter) -> Self {
        Self {
            sink,
            queue,
            batch_size,
            counter,
        }
    }

    /// Run until the queue reports end-of-stream, then flush the remainder.
    pub async fn run(mut self) {
        let mut batch: Vec<Trade> = Vec::with_capacity(self.batch_size);
        let mut latency = tokio::time::interval(MAX_BATCH_LATENCY);
        latency.set_missed_tick_behavior(MissedTickBehavior::Delay);
        latency.reset();

        loop {
            tokio::select! {
                item = self.queue.drain_next() => match item {
                    Some(trade) => {
                        batch.push(trade);
                        if batch.len() >= self.batch_size {
                            self.flush(&mut batch).await;
                            latency.reset();
                        }
                    }
                    None => break,
                },
                _ = latency.tick() => {
                    if !batch.is_empty() {
                        self.flush(&mut batch).await;
                    }
                }
            }
        }

        // End-of-stream: commit whatever is left, even undersized.
        self.flush(&mut batch).await;
        info!(persisted = self.counter.get(), "batch writer stopped");
    }

    async fn flush(&self, batch: &mut Vec<Trade>) {
        if batch.is_empty() {
            return;
        }
        let rows = batch.len();
        let started = Instant::now();

        match self.save_with_retry(batch).await {
            Ok(()) => {
                self.counter.add(rows as u64);
                let elapsed = started.elapsed();
                metrics::observe_flush(elapsed, rows);
                debug!(
                    rows,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "batch flushed"
                );
            }
            Err(e) => {
                metrics::inc_batches_failed();
                error!(error = %e, rows, attempts = SAVE_ATTEMPTS, "dropping batch");
            }
        }
        batch.clear();
    }

    async fn save_with_retry(&self, batch: &[Trade]) -> Result<(), StoreError> {
        let mut delay = RETRY_BASE_DELAY;
        let mut attempt = 1;
        loop {
            match self.sink.save_batch(batch).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < SAVE_ATTEMPTS => {
                    warn!(error = %e, attempt, "save_batch failed, retrying");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
