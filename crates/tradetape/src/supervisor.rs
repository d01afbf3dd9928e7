//! Process lifecycle: component startup order and graceful shutdown.
//!
//! Startup order is dependency order: store, queue, batch writer, trade
//! stream, config watcher, command reader, health server. Shutdown runs
//! the reverse contract: cancel the stream (it closes its socket with a
//! normal-closure frame), close the queue for writes, then give the batch
//! writer a bounded grace to drain and flush the remainder.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::batcher::BatchWriter;
use crate::binance::TradeStream;
use crate::config::Config;
use crate::console::CommandReader;
use crate::error::PipelineError;
use crate::exchange_info::ExchangeInfoClient;
use crate::queue::{self, QUEUE_CAPACITY};
use crate::reconfig::{ConfigWatcher, Subscription};
use crate::server::{self, ServerState};
use crate::stats::TradeCounter;
use crate::store::PgTradeStore;
use crate::symbols::SymbolResolver;

/// How long the batch writer gets to drain and flush after shutdown.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

pub struct Supervisor {
    config_path: PathBuf,
    config: Config,
    health_addr: Option<SocketAddr>,
}

impl Supervisor {
    pub fn new(config_path: impl Into<PathBuf>, config: Config) -> Self {
        Self {
            config_path: config_path.into(),
            config,
            health_addr: None,
        }
    }

    pub fn with_health_addr(mut self, addr: SocketAddr) -> Self {
        self.health_addr = Some(addr);
        self
    }

    /// Run the pipeline until SIGTERM or ctrl-c.
    pub async fn run(self) -> Result<(), PipelineError> {
        let database_url = self.config.database_url()?;
        let store = PgTradeStore::connect(&database_url)?;
        store.ensure_schema().await?;

        let (queue_tx, queue_rx) = queue::bounded(QUEUE_CAPACITY);
        let counter = TradeCounter::new();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let batcher = BatchWriter::new(
            store,
            queue_rx,
            self.config.ingest.batch_size,
            counter.clone(),
        );
        let batcher_handle = tokio::spawn(batcher.run());

        let resolver = Arc::new(SymbolResolver::new(
            &self.config_path,
            ExchangeInfoClient::new(),
        ));
        let subscription = Arc::new(Subscription::new(Default::default()));
        let connected = Arc::new(AtomicBool::new(false));

        let stream = TradeStream::new(
            Arc::clone(&resolver),
            Arc::clone(&subscription),
            queue_tx.clone(),
            shutdown_rx.clone(),
            Arc::clone(&connected),
        );
        let stream_handle = tokio::spawn(stream.run());

        let watcher = ConfigWatcher::new(
            &self.config_path,
            Arc::clone(&resolver),
            Arc::clone(&subscription),
            shutdown_rx.clone(),
        );
        let watcher_handle = tokio::spawn(watcher.run());

        let console = CommandReader::new(counter.clone(), shutdown_rx.clone());
        let console_handle = tokio::spawn(console.run());

        if let Some(addr) = self.health_addr {
            let state = ServerState::new(Arc::clone(&connected));
            tokio::spawn(async move {
                if let Err(e) = server::run_server(addr, state).await {
                    error!(error = %e, "health server error");
                }
            });
            info!(addr = %addr, "health server started");
        }

        wait_for_signal().await;
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);

        // The stream closes its socket with a normal-closure frame.
        if let Err(e) = stream_handle.await {
            error!(error = %e, "trade stream task failed");
        }

        // Stop accepting trades; the writer drains the residue.
        queue_tx.close();
        match tokio::time::timeout(SHUTDOWN_GRACE, batcher_handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "batch writer task failed"),
            Err(_) => warn!(
                grace_secs = SHUTDOWN_GRACE.as_secs(),
                "batch writer did not finish within the shutdown grace"
            ),
        }

        // The watcher may be mid-resolution; it has nothing left to do.
        watcher_handle.abort();
        let _ = watcher_handle.await;
        let _ = console_handle.await;

        info!(persisted = counter.get(), "shutdown complete");
        Ok(())
    }
}

/// Resolve on SIGTERM (pod termination) or ctrl-c.
#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to listen for SIGTERM");
    let ctrl_c = tokio::signal::ctrl_c();

    tokio::select! {
        _ = sigterm.recv() => info!("SIGTERM received"),
        _ = ctrl_c => info!("ctrl-c received"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to listen for ctrl-c");
}
