//! Supervised websocket price feed.
//!
//! Connects to the BitMEX realtime stream, turns instrument updates into
//! ticks, drops immaterial moves and forwards the rest. Lost connections
//! are re-established with exponential backoff until the shutdown token
//! fires or the reconnect budget is exhausted.

use futures_util::{SinkExt, StreamExt};
use las_core::{BoxFuture, ReconnectPolicy};
use las_telemetry::Metrics;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::Once;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async_tls_with_config, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bitmex::BitmexParser;
use crate::error::{FeedError, FeedResult};
use crate::tick::{PriceTick, TickFilter};

static INIT_CRYPTO: Once = Once::new();

/// Install the TLS crypto provider.
/// Must be called before any TLS connection is made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Source of material price ticks.
pub trait PriceFeed: Send + Sync {
    /// Forward ticks into `tx` until `shutdown` is cancelled or `tx` closes.
    ///
    /// Returns an error only when the feed gives up reconnecting.
    fn run<'a>(
        &'a self,
        tx: mpsc::Sender<PriceTick>,
        shutdown: CancellationToken,
    ) -> BoxFuture<'a, FeedResult<()>>;
}

/// Price feed configuration.
#[derive(Debug, Clone)]
pub struct BitmexFeedConfig {
    /// Realtime websocket URL including the subscription.
    pub url: String,
    /// Instrument symbol to track.
    pub symbol: String,
    /// Asset the instrument's last price is recorded for.
    pub asset: String,
    /// Minimum absolute move before a tick is forwarded.
    pub min_change: Decimal,
    pub reconnect: ReconnectPolicy,
}

impl Default for BitmexFeedConfig {
    fn default() -> Self {
        Self {
            url: "wss://www.bitmex.com/realtime?subscribe=instrument:XBTUSD".to_string(),
            symbol: "XBTUSD".to_string(),
            asset: "USD".to_string(),
            min_change: Decimal::ONE,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

pub struct BitmexFeed {
    config: BitmexFeedConfig,
    parser: BitmexParser,
    filter: Mutex<TickFilter>,
}

impl BitmexFeed {
    pub fn new(config: BitmexFeedConfig) -> Self {
        let parser = BitmexParser::new(config.symbol.clone(), config.asset.clone());
        let filter = Mutex::new(TickFilter::new(config.min_change));
        Self {
            config,
            parser,
            filter,
        }
    }

    async fn run_with_retry(
        &self,
        tx: mpsc::Sender<PriceTick>,
        shutdown: CancellationToken,
    ) -> FeedResult<()> {
        let mut attempt = 0u32;

        loop {
            if shutdown.is_cancelled() || tx.is_closed() {
                info!("Price feed stopping");
                return Ok(());
            }

            let mut connected = false;
            match self.try_connect(&tx, &shutdown, &mut connected).await {
                Ok(()) => info!("Price feed connection closed"),
                Err(e) => error!(error = %e, "Price feed connection error"),
            }

            if shutdown.is_cancelled() || tx.is_closed() {
                info!("Price feed stopping after disconnect");
                return Ok(());
            }

            if connected {
                attempt = 0;
            }
            attempt += 1;

            if self.config.reconnect.is_exhausted(attempt) {
                error!(attempt, "Price feed reconnection attempts exhausted");
                return Err(FeedError::StreamTerminated(format!(
                    "gave up after {attempt} attempts"
                )));
            }

            let delay = self.config.reconnect.delay(attempt);
            warn!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting price feed");
            Metrics::stream_reconnect("price_feed");

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = shutdown.cancelled() => {
                    info!("Shutdown requested during price feed backoff");
                    return Ok(());
                }
            }
        }
    }

    async fn try_connect(
        &self,
        tx: &mpsc::Sender<PriceTick>,
        shutdown: &CancellationToken,
        connected: &mut bool,
    ) -> FeedResult<()> {
        info!(url = %self.config.url, "Connecting to price feed");
        let (ws_stream, _response) =
            connect_async_tls_with_config(&self.config.url, None, true, None).await?;
        let (mut write, mut read) = ws_stream.split();
        *connected = true;
        info!(symbol = %self.config.symbol, "Price feed connected");

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        warn!(error = %e, "Failed to send close frame");
                    }
                    return Ok(());
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(tick) = self.handle_text(&text) {
                                if tx.send(tick).await.is_err() {
                                    info!("Tick receiver dropped");
                                    return Ok(());
                                }
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "Normal close".to_string()));
                            warn!(code, %reason, "Price feed closed by server");
                            return Err(FeedError::ConnectionClosed { code, reason });
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            return Err(FeedError::StreamTerminated("stream ended".to_string()));
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    /// Parse and filter one frame. Malformed frames are logged and skipped.
    fn handle_text(&self, text: &str) -> Option<PriceTick> {
        let tick = match self.parser.parse(text) {
            Ok(Some(tick)) => tick,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Skipping malformed price frame");
                return None;
            }
        };

        if !self.filter.lock().accept(&tick) {
            debug!(asset = %tick.asset, price = %tick.price, "Immaterial price move");
            return None;
        }
        info!(asset = %tick.asset, price = %tick.price, "Material price move");
        Some(tick)
    }
}

impl PriceFeed for BitmexFeed {
    fn run<'a>(
        &'a self,
        tx: mpsc::Sender<PriceTick>,
        shutdown: CancellationToken,
    ) -> BoxFuture<'a, FeedResult<()>> {
        Box::pin(self.run_with_retry(tx, shutdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use las_core::Price;
    use rust_decimal_macros::dec;

    fn frame(price: &str) -> String {
        format!(
            r#"{{"table":"instrument","action":"update","data":[{{"symbol":"XBTUSD","lastPrice":{price}}}]}}"#
        )
    }

    #[test]
    fn test_handle_text_filters_immaterial_moves() {
        let feed = BitmexFeed::new(BitmexFeedConfig::default());

        let first = feed.handle_text(&frame("6500")).unwrap();
        assert_eq!(first.price, Price::new(dec!(6500)));
        assert!(feed.handle_text(&frame("6500.5")).is_none());
        assert!(feed.handle_text(&frame("6502")).is_some());
    }

    #[test]
    fn test_handle_text_skips_garbage() {
        let feed = BitmexFeed::new(BitmexFeedConfig::default());
        assert!(feed.handle_text("{").is_none());
        assert!(feed.handle_text(r#"{"info":"Welcome"}"#).is_none());
    }
}
