//! Exchange reference-data client.
//!
//! Fetches `GET /api/v3/exchangeInfo` and extracts the set of symbols the
//! exchange recognizes. The resolver intersects configured symbols with
//! this set before subscribing.

use serde::Deserialize;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::ResolverError;

/// Binance REST base URL.
pub const EXCHANGE_API_URL: &str = "https://api.binance.com";

const HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct ExchangeInfoResponse {
    #[serde(default)]
    symbols: Vec<SymbolEntry>,
}

#[derive(Debug, Deserialize)]
struct SymbolEntry {
    symbol: String,
}

pub struct ExchangeInfoClient {
    client: reqwest::Client,
    base_url: String,
}

impl ExchangeInfoClient {
    pub fn new() -> Self {
        Self::with_base_url(EXCHANGE_API_URL)
    }

    /// Override the base URL (alternate deployments, tests).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Fetch the full set of symbols the exchange recognizes, uppercased.
    pub async fn recognized_symbols(&self) -> Result<BTreeSet<String>, ResolverError> {
        let url = format!("{}/api/v3/exchangeInfo", self.base_url);
        debug!(url = %url, "fetching exchange info");

        let response = self.client.get(&url).send().await?.error_for_status()?;
        let info: ExchangeInfoResponse = response.json().await?;

        let recognized: BTreeSet<String> = info
            .symbols
            .into_iter()
            .map(|s| s.symbol.to_ascii_uppercase())
            .collect();

        info!(symbol_count = recognized.len(), "exchange info loaded");
        Ok(recognized)
    }
}

impl Default for ExchangeInfoClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_strips_trailing_slash() {
        let client = ExchangeInfoClient::with_base_url("http://localhost:3000/");
        assert_eq!(client.base_url, "http://localhost:3000");
    }

    #[test]
    fn test_parse_exchange_info_response() {
        let json = r#"{
            "timezone": "UTC",
            "serverTime": 1700000000000,
            "symbols": [
                {"symbol": "BTCUSDT", "status": "TRADING"},
                {"symbol": "ethusdt", "status": "TRADING"}
            ]
        }"#;

        let info: ExchangeInfoResponse = serde_json::from_str(json).unwrap();
        let set: BTreeSet<String> = info
            .symbols
            .into_iter()
            .map(|s| s.symbol.to_ascii_uppercase())
            .collect();
        assert!(set.contains("BTCUSDT"));
        assert!(set.contains("ETHUSDT"));
    }

    #[test]
    fn test_api_url_constant() {
        assert!(EXCHANGE_API_URL.starts_with("https://"));
        assert!(EXCHANGE_API_URL.contains("binance.com"));
    }
}
