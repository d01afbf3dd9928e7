use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("no database connection string: set DATABASE_URL or the TradeIngest.Postgres config key")]
    MissingDatabaseUrl,

    #[error("BatchSize must be a positive integer")]
    InvalidBatchSize,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("invalid symbol in batch: {0:?}")]
    InvalidSymbol(String),

    #[error("pool error: {0}")]
    Pool(String),

    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),
}

#[derive(Error, Debug)]
pub enum ResolverError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("no upstream message for {0} seconds")]
    HeartbeatTimeout(u64),
}

/// Startup failures that terminate the process.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
