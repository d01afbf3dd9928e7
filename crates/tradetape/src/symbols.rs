//! Symbol resolution: config entries to the authoritative subscription set.
//!
//! A configured symbol survives resolution when it is well-formed
//! (ASCII alphanumeric, length 4 to 12 after uppercasing) and recognized by
//! the exchange's reference-data endpoint. The recognized-set lookup is
//! cached; when the endpoint is unreachable the resolver degrades to the
//! format-valid subset so ingestion keeps running.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{ConfigError, ResolverError};
use crate::exchange_info::ExchangeInfoClient;
use crate::trade::is_valid_config_symbol;

/// How long a recognized-set lookup stays valid for the same input set.
const RECOGNIZED_CACHE_TTL: Duration = Duration::from_secs(600);

pub struct SymbolResolver {
    config_path: PathBuf,
    client: ExchangeInfoClient,
    cache: Mutex<Option<RecognizedCache>>,
    cleaned: AtomicBool,
}

struct RecognizedCache {
    /// Sorted format-valid input set the lookup was made for.
    key: Vec<String>,
    fetched_at: Instant,
    recognized: BTreeSet<String>,
}

impl SymbolResolver {
    pub fn new(config_path: impl Into<PathBuf>, client: ExchangeInfoClient) -> Self {
        Self {
            config_path: config_path.into(),
            client,
            cache: Mutex::new(None),
            cleaned: AtomicBool::new(false),
        }
    }

    /// Resolve the current authoritative symbol set on demand.
    ///
    /// Reads the config file fresh each call so edits are picked up. On the
    /// first call of the process lifetime, malformed entries are also
    /// removed from the file on disk.
    pub async fn resolve(&self) -> Result<BTreeSet<String>, ResolverError> {
        let config = Config::load(&self.config_path)?;

        let mut valid = BTreeSet::new();
        let mut rejected = Vec::new();
        for raw in &config.ingest.symbols {
            let upper = raw.to_ascii_uppercase();
            if is_valid_config_symbol(&upper) {
                valid.insert(upper);
            } else {
                warn!(symbol = %raw, "dropping malformed symbol from config");
                rejected.push(raw.clone());
            }
        }

        let first_run = !self.cleaned.swap(true, Ordering::SeqCst);
        if first_run && !rejected.is_empty() {
            if let Err(e) = self.clean_config_file(&rejected) {
                warn!(error = %e, "failed to rewrite config without invalid symbols");
            }
        }

        match self.recognized(&valid).await {
            Ok(recognized) => {
                let resolved: BTreeSet<String> =
                    valid.intersection(&recognized).cloned().collect();
                for unknown in valid.difference(&resolved) {
                    warn!(symbol = %unknown, "symbol not recognized by the exchange");
                }
                Ok(resolved)
            }
            Err(e) => {
                warn!(error = %e, "reference endpoint unreachable, using format-valid symbols");
                Ok(valid)
            }
        }
    }

    /// Recognized-set lookup, cached per sorted input set.
    async fn recognized(
        &self,
        input: &BTreeSet<String>,
    ) -> Result<BTreeSet<String>, ResolverError> {
        let key: Vec<String> = input.iter().cloned().collect();

        let mut cache = self.cache.lock().await;
        if let Some(entry) = cache.as_ref() {
            if entry.key == key && entry.fetched_at.elapsed() < RECOGNIZED_CACHE_TTL {
                debug!("recognized-set cache hit");
                return Ok(entry.recognized.clone());
            }
        }

        let recognized = self.client.recognized_symbols().await?;
        *cache = Some(RecognizedCache {
            key,
            fetched_at: Instant::now(),
            recognized: recognized.clone(),
        });
        Ok(recognized)
    }

    /// Remove malformed entries from the on-disk config, keeping the JSON
    /// structure and the original spelling of surviving entries.
    fn clean_config_file(&self, rejected: &[String]) -> Result<(), ConfigError> {
        let raw = std::fs::read_to_string(&self.config_path)?;
        let mut doc: serde_json::Value = serde_json::from_str(&raw)?;

        if let Some(symbols) = doc
            .get_mut("TradeIngest")
            .and_then(|section| section.get_mut("Symbols"))
            .and_then(|value| value.as_array_mut())
        {
            symbols.retain(|entry| {
                entry
                    .as_str()
                    .map(|s| !rejected.iter().any(|r| r == s))
                    .unwrap_or(false)
            });
        }

        std::fs::write(&self.config_path, serde_json::to_string_pretty(&doc)?)?;
        info!(removed = rejected.len(), "removed invalid symbols from config file");
        Ok(())
    }
}
