//! Operator statistics command.
//!
//! A space on standard input reports the persisted-trade count through the
//! log sink. Ends quietly on shutdown or when stdin is detached.

use tokio::io::AsyncReadExt;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::stats::TradeCounter;

pub struct CommandReader {
    counter: TradeCounter,
    shutdown: watch::Receiver<bool>,
}

impl CommandReader {
    pub fn new(counter: TradeCounter, shutdown: watch::Receiver<bool>) -> Self {
        Self { counter, shutdown }
    }

    pub async fn run(self) {
        let mut stdin = tokio::io::stdin();
        let mut buf = [0u8; 64];
        let mut shutdown = self.shutdown.clone();
        loop {
            tokio::select! {
                _ = shutdown.wait_for(|stop| *stop) => return,
                read = stdin.read(&mut buf) => match read {
                    Ok(0) => {
                        debug!("stdin detached, stopping command reader");
                        return;
                    }
                    Ok(n) => self.report_spaces(&buf[..n]),
                    Err(e) => {
                        warn!(error = %e, "stdin read failed, stopping command reader");
                        return;
                    }
                }
            }
        }
    }

    fn report_spaces(&self, bytes: &[u8]) {
        for byte in bytes {
            if *byte == b' ' {
                info!(persisted = self.counter.get(), "trades persisted");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_reads_current_counter() {
        let counter = TradeCounter::new();
        counter.add(42);
        let (_tx, rx) = watch::channel(false);
        let reader = CommandReader::new(counter.clone(), rx);

        // Space bytes trigger a report; anything else is ignored.
        reader.report_spaces(b"  x ");
        reader.report_spaces(b"no spaces here?");
        assert_eq!(counter.get(), 42);
    }
}
