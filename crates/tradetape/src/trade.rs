//! Trade value and symbol validation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// One executed trade as reported by the upstream feed.
///
/// Immutable after construction; equality is field-wise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trade {
    /// Uppercase ASCII alphanumeric trading-pair name.
    pub symbol: String,
    pub price: Decimal,
    pub quantity: Decimal,
    /// Exchange-assigned identifier, unique per symbol.
    pub trade_id: i64,
    /// Execution instant, millisecond resolution.
    pub trade_time: DateTime<Utc>,
    /// Reserved surrogate. Always 0 in flight; never persisted.
    pub id: i64,
}

impl Trade {
    pub fn new(
        symbol: impl Into<String>,
        price: Decimal,
        quantity: Decimal,
        trade_id: i64,
        trade_time: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            quantity,
            trade_id,
            trade_time,
            id: 0,
        }
    }
}

fn symbol_ok(symbol: &str, min: usize, max: usize) -> bool {
    symbol.len() >= min
        && symbol.len() <= max
        && symbol.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Validate a symbol taken from the configuration file (length 4 to 12).
pub fn is_valid_config_symbol(symbol: &str) -> bool {
    symbol_ok(symbol, 4, 12)
}

/// Validate a symbol taken from an upstream trade message (length 4 to 20).
pub fn is_valid_stream_symbol(symbol: &str) -> bool {
    symbol_ok(symbol, 4, 20)
}
