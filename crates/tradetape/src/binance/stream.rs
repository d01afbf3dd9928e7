//! Live trade subscription.
//!
//! One connection at a time. The receive loop exits for exactly four
//! reasons: process shutdown, a reconnect request from the watcher, a
//! remote close, or an error (socket failure or heartbeat timeout). The
//! first two close the socket with a normal-closure frame; the last two
//! reconnect after a fixed back-off.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::binance::parser::parse_trade_event;
use crate::error::StreamError;
use crate::metrics;
use crate::queue::QueueSender;
use crate::reconfig::Subscription;
use crate::symbols::SymbolResolver;

/// Binance combined-stream WebSocket base URL.
pub const STREAM_BASE_URL: &str = "wss://stream.binance.com:9443/ws";

/// No-data window after which the connection is considered dead.
const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(60);

/// Back-off between reconnect attempts after an error or remote close.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Reason sent with normal-closure frames.
const CLOSE_REASON: &str = "Shutdown";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Build the subscription URL: one `{symbol}@trade` path segment per
/// symbol, lowercased.
pub fn stream_url(base: &str, symbols: &BTreeSet<String>) -> String {
    let streams: Vec<String> = symbols
        .iter()
        .map(|s| format!("{}@trade", s.to_ascii_lowercase()))
        .collect();
    format!("{}/{}", base.trim_end_matches('/'), streams.join("/"))
}

enum LoopExit {
    Shutdown,
    Resubscribe,
    Remote,
}

pub struct TradeStream {
    resolver: Arc<SymbolResolver>,
    subscription: Arc<Subscription>,
    queue: QueueSender,
    shutdown: watch::Receiver<bool>,
    connected: Arc<AtomicBool>,
    base_url: String,
}

impl TradeStream {
    pub fn new(
        resolver: Arc<SymbolResolver>,
        subscription: Arc<Subscription>,
        queue: QueueSender,
        shutdown: watch::Receiver<bool>,
        connected: Arc<AtomicBool>,
    ) -> Self {
        Self {
            resolver,
            subscription,
            queue,
            shutdown,
            connected,
            base_url: STREAM_BASE_URL.to_string(),
        }
    }

    /// Override the stream base URL (alternate deployments, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Run until process shutdown.
    pub async fn run(self) {
        // Seed the shared set from the authoritative source; transient
        // failures retry on the reconnect cadence.
        loop {
            if *self.shutdown.borrow() {
                return;
            }
            match self.resolver.resolve().await {
                Ok(set) => {
                    self.subscription.replace(set);
                    break;
                }
                Err(e) => {
                    error!(error = %e, "initial symbol resolution failed");
                    if self.wait_reconnect_delay().await {
                        return;
                    }
                }
            }
        }

        loop {
            if *self.shutdown.borrow() {
                return;
            }

            // Clear the flag before snapshotting the set: a request raised
            // after this point is seen by the receive loop, one raised
            // before it is already reflected in the snapshot.
            self.subscription.clear_reconnect();
            let symbols = self.subscription.current();
            if symbols.is_empty() {
                warn!("no valid symbols to subscribe to");
                if self.wait_reconnect_delay().await {
                    return;
                }
                continue;
            }

            let url = stream_url(&self.base_url, &symbols);
            info!(url = %url, symbols = symbols.len(), "opening trade subscription");

            let mut ws = match connect_async(url.as_str()).await {
                Ok((ws, _response)) => ws,
                Err(e) => {
                    error!(error = %e, "connect failed");
                    metrics::inc_reconnects();
                    if self.wait_reconnect_delay().await {
                        return;
                    }
                    continue;
                }
            };

            self.connected.store(true, Ordering::SeqCst);

            let exit = self.receive_loop(&mut ws).await;
            self.connected.store(false, Ordering::SeqCst);

            match exit {
                Ok(LoopExit::Shutdown) => {
                    close_normal(&mut ws).await;
                    info!("trade stream stopped");
                    return;
                }
                Ok(LoopExit::Resubscribe) => {
                    close_normal(&mut ws).await;
                    // The watcher already swapped the shared set; refresh it
                    // from the authoritative source all the same.
                    match self.resolver.resolve().await {
                        Ok(set) => self.subscription.replace(set),
                        Err(e) => warn!(error = %e, "re-resolution failed, keeping current set"),
                    }
                    info!("resubscribing with updated symbol set");
                }
                Ok(LoopExit::Remote) => {
                    let _ = ws.close(None).await;
                    metrics::inc_reconnects();
                    if self.wait_reconnect_delay().await {
                        return;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "subscription failed");
                    let _ = ws.close(None).await;
                    metrics::inc_reconnects();
                    if self.wait_reconnect_delay().await {
                        return;
                    }
                }
            }
        }
    }

    async fn receive_loop(&self, ws: &mut WsStream) -> Result<LoopExit, StreamError> {
        let mut shutdown = self.shutdown.clone();
        let mut offer_shutdown = self.shutdown.clone();
        let mut last_msg_at = Instant::now();

        loop {
            if self.subscription.reconnect_requested() {
                return Ok(LoopExit::Resubscribe);
            }

            enum Woken {
                Shutdown,
                Resubscribe,
                HeartbeatTimeout,
                Frame(Option<Result<Message, tokio_tungstenite::tungstenite::Error>>),
            }

            let woken = tokio::select! {
                _ = shutdown.wait_for(|stop| *stop) => Woken::Shutdown,

                // Woken by the watcher; the flag is re-checked at the top.
                _ = self.subscription.changed() => Woken::Resubscribe,

                _ = tokio::time::sleep_until(last_msg_at + HEARTBEAT_TIMEOUT) => {
                    Woken::HeartbeatTimeout
                }

                frame = ws.next() => Woken::Frame(frame),
            };

            match woken {
                Woken::Shutdown => return Ok(LoopExit::Shutdown),
                Woken::Resubscribe => {}
                Woken::HeartbeatTimeout => {
                    return Err(StreamError::HeartbeatTimeout(HEARTBEAT_TIMEOUT.as_secs()));
                }
                Woken::Frame(frame) => match frame {
                    Some(Ok(Message::Text(text))) => {
                        last_msg_at = Instant::now();
                        match parse_trade_event(&text) {
                            Some(trade) => {
                                metrics::inc_trades_received();
                                // Back-pressure can park this offer; shutdown
                                // must still win so the socket closes promptly.
                                tokio::select! {
                                    res = self.queue.offer(trade) => if res.is_err() {
                                        return Ok(LoopExit::Shutdown);
                                    },
                                    _ = offer_shutdown.wait_for(|stop| *stop) => {
                                        return Ok(LoopExit::Shutdown);
                                    }
                                }
                            }
                            None => {
                                metrics::inc_messages_discarded();
                                let preview: String = text.chars().take(160).collect();
                                warn!(payload = %preview, "discarding unparseable message");
                            }
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        last_msg_at = Instant::now();
                        debug!(len = data.len(), "ignoring binary frame");
                    }
                    Some(Ok(Message::Ping(data))) => {
                        last_msg_at = Instant::now();
                        let _ = ws.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!(frame = ?frame, "remote closed subscription");
                        return Ok(LoopExit::Remote);
                    }
                    Some(Ok(_)) => {
                        // Pong and raw frames only refresh the heartbeat.
                        last_msg_at = Instant::now();
                    }
                    Some(Err(e)) => return Err(e.into()),
                    None => {
                        warn!("stream ended without a close frame");
                        return Ok(LoopExit::Remote);
                    }
                },
            }
        }
    }

    /// Sleep the reconnect back-off; returns true if shutdown arrived first.
    async fn wait_reconnect_delay(&self) -> bool {
        let mut shutdown = self.shutdown.clone();
        tokio::select! {
            _ = tokio::time::sleep(RECONNECT_DELAY) => false,
            _ = shutdown.wait_for(|stop| *stop) => true,
        }
    }
}

async fn close_normal(ws: &mut WsStream) {
    let frame = CloseFrame {
        code: CloseCode::Normal,
        reason: CLOSE_REASON.into(),
    };
    if let Err(e) = ws.close(Some(frame)).await {
        debug!(error = %e, "close handshake failed");
    }
}
