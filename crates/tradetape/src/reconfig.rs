//! Runtime reconfiguration: shared subscription state and the config
//! watcher.
//!
//! The watcher polls the config file and, when the resolved symbol set
//! differs from the one the stream is using, swaps the shared set, raises
//! the reconnect flag, and wakes the receive loop so the subscription is
//! rebuilt promptly.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};

use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};

use crate::symbols::SymbolResolver;

/// How often the config file's modification time is checked.
pub const CONFIG_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Subscription state shared between the watcher (writer) and the trade
/// stream (reader).
pub struct Subscription {
    symbols: RwLock<BTreeSet<String>>,
    reconnect: AtomicBool,
    notify: Notify,
}

impl Subscription {
    pub fn new(initial: BTreeSet<String>) -> Self {
        Self {
            symbols: RwLock::new(initial),
            reconnect: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Snapshot of the current symbol set.
    pub fn current(&self) -> BTreeSet<String> {
        self.symbols.read().unwrap().clone()
    }

    /// Atomically replace the symbol set.
    pub fn replace(&self, set: BTreeSet<String>) {
        *self.symbols.write().unwrap() = set;
    }

    /// Ask the stream to tear down its connection and resubscribe.
    pub fn request_reconnect(&self) {
        self.reconnect.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    /// Cleared by the stream once a fresh connection is established.
    pub fn clear_reconnect(&self) {
        self.reconnect.store(false, Ordering::SeqCst);
    }

    pub fn reconnect_requested(&self) -> bool {
        self.reconnect.load(Ordering::SeqCst)
    }

    /// Resolves on the next reconnect request.
    pub async fn changed(&self) {
        self.notify.notified().await
    }
}

/// Watches the external config and drives resubscription.
pub struct ConfigWatcher {
    config_path: PathBuf,
    resolver: Arc<SymbolResolver>,
    subscription: Arc<Subscription>,
    shutdown: watch::Receiver<bool>,
}

impl ConfigWatcher {
    pub fn new(
        config_path: impl Into<PathBuf>,
        resolver: Arc<SymbolResolver>,
        subscription: Arc<Subscription>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config_path: config_path.into(),
            resolver,
            subscription,
            shutdown,
        }
    }

    /// Poll the config file until shutdown.
    pub async fn run(mut self) {
        let mut last_modified = file_mtime(&self.config_path);
        loop {
            tokio::select! {
                _ = self.shutdown.wait_for(|stop| *stop) => return,
                _ = tokio::time::sleep(CONFIG_POLL_INTERVAL) => {}
            }

            let modified = file_mtime(&self.config_path);
            if modified == last_modified {
                continue;
            }
            last_modified = modified;
            self.apply_change().await;
        }
    }

    /// Re-resolve and, if the set actually changed, restart the stream's
    /// subscription.
    async fn apply_change(&self) {
        let new_set = match self.resolver.resolve().await {
            Ok(set) => set,
            Err(e) => {
                warn!(error = %e, "config change ignored: symbol resolution failed");
                return;
            }
        };

        let current = self.subscription.current();
        if new_set == current {
            debug!("config changed but the symbol set did not");
            return;
        }

        info!(
            before = current.len(),
            after = new_set.len(),
            "symbol set changed, restarting subscription"
        );
        self.subscription.replace(new_set);
        self.subscription.request_reconnect();
    }
}

fn file_mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange_info::ExchangeInfoClient;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn symbols(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_subscription_replace_and_flag() {
        let sub = Subscription::new(symbols(&["BTCUSDT"]));
        assert!(!sub.reconnect_requested());

        sub.replace(symbols(&["BTCUSDT", "ETHUSDT"]));
        sub.request_reconnect();
        assert!(sub.reconnect_requested());
        assert_eq!(sub.current(), symbols(&["BTCUSDT", "ETHUSDT"]));

        sub.clear_reconnect();
        assert!(!sub.reconnect_requested());
    }

    #[tokio::test]
    async fn test_changed_wakes_on_reconnect_request() {
        let sub = Arc::new(Subscription::new(symbols(&["BTCUSDT"])));
        let waiter = Arc::clone(&sub);
        let handle = tokio::spawn(async move { waiter.changed().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        sub.request_reconnect();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("changed() should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn test_apply_change_flips_flag_on_new_set() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(br#"{"TradeIngest":{"Symbols":["btcusdt","ethusdt","solusdt"]}}"#)
            .unwrap();

        let resolver = Arc::new(SymbolResolver::new(
            file.path(),
            ExchangeInfoClient::with_base_url("http://127.0.0.1:9"),
        ));
        let subscription = Arc::new(Subscription::new(symbols(&["BTCUSDT", "ETHUSDT"])));
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let watcher = ConfigWatcher::new(
            file.path(),
            Arc::clone(&resolver),
            Arc::clone(&subscription),
            shutdown_rx,
        );
        watcher.apply_change().await;

        assert!(subscription.reconnect_requested());
        assert_eq!(
            subscription.current(),
            symbols(&["BTCUSDT", "ETHUSDT", "SOLUSDT"])
        );
    }

    #[tokio::test]
    async fn test_apply_change_ignores_equal_set() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(br#"{"TradeIngest":{"Symbols":["btcusdt"]}}"#)
            .unwrap();

        let resolver = Arc::new(SymbolResolver::new(
            file.path(),
            ExchangeInfoClient::with_base_url("http://127.0.0.1:9"),
        ));
        let subscription = Arc::new(Subscription::new(symbols(&["BTCUSDT"])));
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let watcher =
            ConfigWatcher::new(file.path(), resolver, Arc::clone(&subscription), shutdown_rx);
        watcher.apply_change().await;

        assert!(!subscription.reconnect_requested());
    }
}
