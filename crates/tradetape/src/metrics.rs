//! Prometheus metrics for the ingestion pipeline.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_int_counter, Encoder, Histogram, IntCounter, TextEncoder,
};
use std::time::Duration;

static TRADES_RECEIVED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "tradetape_trades_received_total",
        "Trades decoded from the upstream feed"
    )
    .expect("Failed to register trades_received metric")
});

static TRADES_PERSISTED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "tradetape_trades_persisted_total",
        "Trades in successfully committed batches"
    )
    .expect("Failed to register trades_persisted metric")
});

static BATCHES_COMMITTED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "tradetape_batches_committed_total",
        "Successful store commits"
    )
    .expect("Failed to register batches_committed metric")
});

static BATCHES_FAILED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "tradetape_batches_failed_total",
        "Batches discarded after exhausting store retries"
    )
    .expect("Failed to register batches_failed metric")
});

static MESSAGES_DISCARDED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "tradetape_messages_discarded_total",
        "Upstream messages rejected by the parser"
    )
    .expect("Failed to register messages_discarded metric")
});

static RECONNECTS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "tradetape_reconnects_total",
        "Upstream reconnects after an error or remote close"
    )
    .expect("Failed to register reconnects metric")
});

static FLUSH_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "tradetape_batch_flush_seconds",
        "Wall time per committed batch"
    )
    .expect("Failed to register batch_flush_seconds metric")
});

pub fn inc_trades_received() {
    TRADES_RECEIVED.inc();
}

pub fn inc_messages_discarded() {
    MESSAGES_DISCARDED.inc();
}

pub fn inc_reconnects() {
    RECONNECTS.inc();
}

pub fn inc_batches_failed() {
    BATCHES_FAILED.inc();
}

/// Record one successful commit of `rows` trades.
pub fn observe_flush(elapsed: Duration, rows: usize) {
    FLUSH_SECONDS.observe(elapsed.as_secs_f64());
    BATCHES_COMMITTED.inc();
    TRADES_PERSISTED.inc_by(rows as u64);
}

/// Encode all metrics to Prometheus text format.
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("Failed to encode metrics as UTF-8: {}", e)))
}
