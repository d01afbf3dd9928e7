//! tradetape: continuous Binance trade ingestion into PostgreSQL.
//!
//! Data flow: [`binance::TradeStream`] decodes trade events from the
//! combined trade stream and offers them to a bounded queue;
//! [`BatchWriter`] drains the queue and commits batches through a
//! [`TradeSink`]; [`ConfigWatcher`] restarts the subscription when the
//! configured symbol set changes. The [`Supervisor`] wires the tasks
//! together and owns the shutdown sequence.

pub mod batcher;
pub mod binance;
pub mod config;
pub mod console;
pub mod error;
pub mod exchange_info;
pub mod metrics;
pub mod queue;
pub mod reconfig;
pub mod server;
pub mod stats;
pub mod store;
pub mod supervisor;
pub mod symbols;
pub mod trade;

pub use batcher::BatchWriter;
pub use binance::{parse_trade_event, stream_url, TradeStream};
pub use config::Config;
pub use error::{ConfigError, PipelineError, ResolverError, StoreError, StreamError};
pub use exchange_info::ExchangeInfoClient;
pub use queue::{bounded, QueueClosed, QueueReceiver, QueueSender, QUEUE_CAPACITY};
pub use reconfig::{ConfigWatcher, Subscription};
pub use server::{create_router, run_server, ServerState};
pub use stats::TradeCounter;
pub use store::{PgTradeStore, TradeSink};
pub use supervisor::Supervisor;
pub use symbols::SymbolResolver;
pub use trade::Trade;
