//! Trade event payload parser.
//!
//! Upstream text frames are JSON objects; only `e == "trade"` events with a
//! plausible symbol become `Trade` values. Everything else is dropped by
//! the caller without tearing down the connection.

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::trade::{is_valid_stream_symbol, Trade};

/// Decode one upstream text payload.
///
/// Returns `None` for non-trade events and events whose symbol is missing,
/// not a string, or malformed. Numeric fields degrade individually: a
/// price or quantity that fails to parse becomes zero, a missing trade id
/// becomes zero, a missing event time becomes now.
pub fn parse_trade_event(payload: &str) -> Option<Trade> {
    let v: serde_json::Value = serde_json::from_str(payload).ok()?;

    if v.get("e")?.as_str()? != "trade" {
        return None;
    }

    let symbol = v.get("s")?.as_str()?;
    if !is_valid_stream_symbol(symbol) {
        return None;
    }

    let price = decimal_field(&v, "p");
    let quantity = decimal_field(&v, "q");
    let trade_id = v
        .get("t")
        .and_then(|t| t.as_i64())
        .filter(|id| *id >= 0)
        .unwrap_or(0);
    let trade_time = v
        .get("T")
        .and_then(|t| t.as_i64())
        .and_then(millis_to_utc)
        .unwrap_or_else(Utc::now);

    Some(Trade::new(
        symbol.to_ascii_uppercase(),
        price,
        quantity,
        trade_id,
        trade_time,
    ))
}

/// Decimal field sent as a string; parse failures substitute zero.
fn decimal_field(v: &serde_json::Value, key: &str) -> Decimal {
    v.get(key)
        .and_then(|f| f.as_str())
        .and_then(|s| Decimal::from_str(s).ok())
        .filter(|d| !d.is_sign_negative())
        .unwrap_or(Decimal::ZERO)
}

fn millis_to_utc(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}
