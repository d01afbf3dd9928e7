//! Binance spot trade stream client.

pub mod parser;
pub mod stream;

pub use parser::parse_trade_event;
pub use stream::{stream_url, TradeStream, STREAM_BASE_URL};
