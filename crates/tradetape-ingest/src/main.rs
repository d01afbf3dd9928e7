//! tradetape-ingest: trade ingestion daemon.
//!
//! Subscribes to the Binance trade stream for the configured symbols and
//! persists trades to PostgreSQL in batches.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tradetape::{Config, Supervisor};

#[derive(Parser, Debug)]
#[command(name = "tradetape-ingest")]
#[command(about = "Binance trade stream ingestion daemon")]
struct Args {
    /// Path to the JSON configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Health server bind address
    #[arg(long, default_value = "0.0.0.0:8080")]
    health_addr: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config = Config::load(&args.config)?;
    info!(
        path = %args.config.display(),
        symbols = config.ingest.symbols.len(),
        batch_size = config.ingest.batch_size,
        "loaded configuration"
    );

    let health_addr: SocketAddr = args.health_addr.parse()?;

    Supervisor::new(&args.config, config)
        .with_health_addr(health_addr)
        .run()
        .await?;

    Ok(())
}
