//! Process-wide persisted-trade counter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Monotonic count of trades in successfully committed batches.
///
/// Cloneable handle; the batch writer adds in blocks of batch size after
/// each successful commit, the command reader and shutdown log read it.
#[derive(Debug, Clone, Default)]
pub struct TradeCounter(Arc<AtomicU64>);

impl TradeCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}
