//! Realtime transport: one WebSocket multiplexed into two logical
//! streams, order book snapshots keyed by token id and oracle prices
//! keyed by symbol.
//!
//! Features:
//! - Automatic reconnection with exponential backoff
//! - Re-subscription of all live subscriptions after reconnect
//! - Heartbeat ping-pong handling
//!
//! Missed deltas during a reconnect are not replayed; the next full
//! snapshot heals the book.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::error::TransportError;
use crate::metrics;
use crate::orderbook::types::{resolve_timestamp, NumberOrString, OraclePrice, RawLevel, TokenBook};

/// Reconnection configuration.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Initial backoff delay in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum backoff delay in seconds.
    pub max_delay_s: u64,
    /// Backoff multiplier.
    pub backoff_multiplier: f64,
    /// Heartbeat interval in seconds.
    pub heartbeat_interval_s: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1000,
            max_delay_s: 30,
            backoff_multiplier: 2.0,
            heartbeat_interval_s: 30,
        }
    }
}

impl ReconnectConfig {
    /// Create from config values.
    pub fn from_config(max_delay_s: u64, heartbeat_interval_s: u64) -> Self {
        Self {
            max_delay_s,
            heartbeat_interval_s,
            ..Default::default()
        }
    }

    /// Calculate next delay with exponential backoff.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let delay_ms = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        let max_delay_ms = self.max_delay_s * 1000;
        Duration::from_millis(delay_ms.min(max_delay_ms as f64) as u64)
    }
}

/// L2 book state maintained from stream updates.
#[derive(Debug, Clone, Default)]
pub struct L2BookState {
    /// Bid levels: price -> size.
    pub bids: HashMap<Decimal, Decimal>,
    /// Ask levels: price -> size.
    pub asks: HashMap<Decimal, Decimal>,
}

impl L2BookState {
    /// Apply a full book snapshot.
    pub fn apply_snapshot(&mut self, bids: &[RawLevel], asks: &[RawLevel]) {
        self.bids.clear();
        self.asks.clear();
        for level in crate::orderbook::types::parse_levels(bids) {
            self.bids.insert(level.price, level.size);
        }
        for level in crate::orderbook::types::parse_levels(asks) {
            self.asks.insert(level.price, level.size);
        }
    }

    /// Apply a price change delta. Size zero removes the level.
    pub fn apply_delta(&mut self, change: &WirePriceChange) {
        let (Some(price), Some(size)) = (change.price.as_decimal(), change.size.as_decimal())
        else {
            return;
        };

        let book = match change.side.to_uppercase().as_str() {
            "BUY" => &mut self.bids,
            "SELL" => &mut self.asks,
            _ => return,
        };

        if size <= Decimal::ZERO {
            book.remove(&price);
        } else {
            book.insert(price, size);
        }
    }

    /// Snapshot into a normalized [`TokenBook`].
    pub fn to_book(&self, token_id: &str, timestamp: time::OffsetDateTime) -> TokenBook {
        let bids = self
            .bids
            .iter()
            .map(|(&price, &size)| crate::orderbook::PriceLevel::new(price, size))
            .collect();
        let asks = self
            .asks
            .iter()
            .map(|(&price, &size)| crate::orderbook::PriceLevel::new(price, size))
            .collect();
        TokenBook::new(token_id, bids, asks, timestamp)
    }
}

/// Price change from the stream.
#[derive(Debug, Clone, Deserialize)]
pub struct WirePriceChange {
    /// Asset id.
    pub asset_id: Option<String>,
    /// Price.
    pub price: NumberOrString,
    /// Size.
    pub size: NumberOrString,
    /// Side: "BUY" or "SELL".
    pub side: String,
}

/// Event from the multiplexed stream.
#[derive(Debug, Clone, Deserialize)]
struct WireEvent {
    /// Event type: "book", "price_change", or "crypto_price".
    event_type: Option<String>,
    /// Asset id (book events).
    asset_id: Option<String>,
    /// Bid levels (book events).
    bids: Option<Vec<RawLevel>>,
    /// Ask levels (book events).
    asks: Option<Vec<RawLevel>>,
    /// Price changes (price_change events).
    price_changes: Option<Vec<WirePriceChange>>,
    /// Oracle symbol (crypto_price events).
    symbol: Option<String>,
    /// Oracle price (crypto_price events).
    price: Option<NumberOrString>,
    /// Timestamp in milliseconds.
    timestamp: Option<NumberOrString>,
}

/// Subscription message for the market channel.
#[derive(Debug, Serialize)]
struct SubscribeBooks {
    #[serde(rename = "type")]
    msg_type: &'static str,
    assets_ids: Vec<String>,
}

/// Subscription message for the oracle channel.
#[derive(Debug, Serialize)]
struct SubscribeOracle {
    #[serde(rename = "type")]
    msg_type: &'static str,
    symbols: Vec<String>,
}

enum SubscriberSink {
    Books(mpsc::Sender<TokenBook>),
    Oracle(mpsc::Sender<OraclePrice>),
}

struct Subscriber {
    keys: Vec<String>,
    sink: SubscriberSink,
}

/// Handle to a live subscription. Dropping it unsubscribes.
pub struct SubscriptionHandle {
    id: u64,
    feed: Weak<RealtimeFeed>,
}

impl SubscriptionHandle {
    /// Explicitly cancel the subscription.
    pub fn unsubscribe(self) {
        // Drop impl does the work.
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if let Some(feed) = self.feed.upgrade() {
            feed.remove_subscription(self.id);
        }
    }
}

/// A live order book subscription.
pub struct BookSubscription {
    /// Keep-alive handle; dropping it unsubscribes.
    pub handle: SubscriptionHandle,
    /// Normalized snapshots, newest-wins on backpressure.
    pub rx: mpsc::Receiver<TokenBook>,
}

/// A live oracle price subscription.
pub struct OracleSubscription {
    /// Keep-alive handle; dropping it unsubscribes.
    pub handle: SubscriptionHandle,
    /// Oracle ticks.
    pub rx: mpsc::Receiver<OraclePrice>,
}

/// Multiplexes one WebSocket connection into book and oracle streams.
pub struct RealtimeFeed {
    ws_url: String,
    reconnect: ReconnectConfig,
    subscribers: DashMap<u64, Subscriber>,
    books: DashMap<String, L2BookState>,
    next_id: AtomicU64,
    reconnects: AtomicU64,
    connected_tx: watch::Sender<bool>,
    resub_tx: mpsc::UnboundedSender<()>,
    resub_rx: tokio::sync::Mutex<Option<mpsc::UnboundedReceiver<()>>>,
    self_ref: Weak<RealtimeFeed>,
}

impl RealtimeFeed {
    /// Create the feed and spawn its connection loop.
    pub fn spawn(ws_url: impl Into<String>, reconnect: ReconnectConfig) -> Arc<Self> {
        let (connected_tx, _) = watch::channel(false);
        let (resub_tx, resub_rx) = mpsc::unbounded_channel();

        let feed = Arc::new_cyclic(|weak| Self {
            ws_url: ws_url.into(),
            reconnect,
            subscribers: DashMap::new(),
            books: DashMap::new(),
            next_id: AtomicU64::new(1),
            reconnects: AtomicU64::new(0),
            connected_tx,
            resub_tx,
            resub_rx: tokio::sync::Mutex::new(Some(resub_rx)),
            self_ref: weak.clone(),
        });

        let task_feed = feed.clone();
        tokio::spawn(async move {
            task_feed.run().await;
        });

        feed
    }

    /// Check if the socket is currently connected.
    pub fn is_connected(&self) -> bool {
        *self.connected_tx.borrow()
    }

    /// Number of reconnections performed so far.
    pub fn reconnect_attempts(&self) -> u64 {
        self.reconnects.load(Ordering::SeqCst)
    }

    /// Wait until the socket reports connected, up to `timeout`.
    /// Returns whether the connection is up.
    pub async fn wait_until_connected(&self, timeout: Duration) -> bool {
        let mut rx = self.connected_tx.subscribe();
        if *rx.borrow() {
            return true;
        }
        tokio::time::timeout(timeout, async {
            while rx.changed().await.is_ok() {
                if *rx.borrow() {
                    return true;
                }
            }
            false
        })
        .await
        .unwrap_or(false)
    }

    /// Subscribe to order book snapshots for a set of tokens.
    pub fn subscribe_books(&self, token_ids: &[String]) -> BookSubscription {
        let (tx, rx) = mpsc::channel(256);
        let id = self.insert_subscriber(Subscriber {
            keys: token_ids.to_vec(),
            sink: SubscriberSink::Books(tx),
        });
        BookSubscription {
            handle: SubscriptionHandle {
                id,
                feed: self.self_ref.clone(),
            },
            rx,
        }
    }

    /// Subscribe to oracle prices for a set of symbols.
    pub fn subscribe_oracle(&self, symbols: &[String]) -> OracleSubscription {
        let (tx, rx) = mpsc::channel(256);
        let id = self.insert_subscriber(Subscriber {
            keys: symbols.to_vec(),
            sink: SubscriberSink::Oracle(tx),
        });
        OracleSubscription {
            handle: SubscriptionHandle {
                id,
                feed: self.self_ref.clone(),
            },
            rx,
        }
    }

    fn insert_subscriber(&self, subscriber: Subscriber) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.subscribers.insert(id, subscriber);
        let _ = self.resub_tx.send(());
        id
    }

    fn remove_subscription(&self, id: u64) {
        if self.subscribers.remove(&id).is_some() {
            let _ = self.resub_tx.send(());
        }
    }

    fn book_tokens(&self) -> Vec<String> {
        let mut tokens: Vec<String> = self
            .subscribers
            .iter()
            .filter(|s| matches!(s.sink, SubscriberSink::Books(_)))
            .flat_map(|s| s.keys.clone())
            .collect();
        tokens.sort();
        tokens.dedup();
        tokens
    }

    fn oracle_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self
            .subscribers
            .iter()
            .filter(|s| matches!(s.sink, SubscriberSink::Oracle(_)))
            .flat_map(|s| s.keys.clone())
            .collect();
        symbols.sort();
        symbols.dedup();
        symbols
    }

    async fn run(self: Arc<Self>) {
        let mut resub_rx = self
            .resub_rx
            .lock()
            .await
            .take()
            .expect("run called once");
        let mut attempt = 0u32;

        loop {
            match self.run_connection(&mut resub_rx).await {
                Ok(()) => {
                    attempt = 0;
                    warn!("websocket stream ended, will reconnect");
                }
                Err(e) => {
                    error!(error = %e, attempt, "websocket connection failed");
                }
            }

            let _ = self.connected_tx.send(false);
            self.reconnects.fetch_add(1, Ordering::SeqCst);
            metrics::inc_ws_reconnects();

            let delay = self.reconnect.next_delay(attempt);
            info!(delay_ms = delay.as_millis(), "reconnecting after delay");
            tokio::time::sleep(delay).await;
            attempt = attempt.saturating_add(1);
        }
    }

    async fn run_connection(
        &self,
        resub_rx: &mut mpsc::UnboundedReceiver<()>,
    ) -> Result<(), TransportError> {
        let url = format!("{}/ws/market", self.ws_url.trim_end_matches('/'));
        info!(url = %url, "connecting to websocket");

        let (ws_stream, _) = connect_async(&url)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        let (mut write, mut read) = ws_stream.split();

        self.send_subscriptions(&mut write).await?;
        let _ = self.connected_tx.send(true);

        let mut heartbeat =
            tokio::time::interval(Duration::from_secs(self.reconnect.heartbeat_interval_s));
        heartbeat.tick().await; // immediate first tick

        loop {
            tokio::select! {
                message = read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            metrics::inc_ws_messages_received();
                            self.dispatch(&text);
                        }
                        Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
                        Some(Ok(Message::Close(frame))) => {
                            warn!(frame = ?frame, "websocket closed by peer");
                            return Ok(());
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(TransportError::Tungstenite(e)),
                        None => return Ok(()),
                    }
                }
                _ = resub_rx.recv() => {
                    self.send_subscriptions(&mut write).await?;
                }
                _ = heartbeat.tick() => {
                    write
                        .send(Message::Ping(Vec::new()))
                        .await
                        .map_err(|e| TransportError::SendFailed(e.to_string()))?;
                }
            }
        }
    }

    async fn send_subscriptions<S>(&self, write: &mut S) -> Result<(), TransportError>
    where
        S: SinkExt<Message> + Unpin,
        S::Error: std::fmt::Display,
    {
        let tokens = self.book_tokens();
        if !tokens.is_empty() {
            for token in &tokens {
                self.books.entry(token.clone()).or_default();
            }
            let message = serde_json::to_string(&SubscribeBooks {
                msg_type: "MARKET",
                assets_ids: tokens,
            })
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
            write
                .send(Message::Text(message))
                .await
                .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        }

        let symbols = self.oracle_symbols();
        if !symbols.is_empty() {
            let message = serde_json::to_string(&SubscribeOracle {
                msg_type: "CRYPTO_PRICES",
                symbols,
            })
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
            write
                .send(Message::Text(message))
                .await
                .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        }

        debug!("subscriptions sent");
        Ok(())
    }

    /// Parse one frame and deliver to matching subscribers. Frames can be
    /// single objects or arrays.
    fn dispatch(&self, text: &str) {
        let events: Vec<WireEvent> = if text.trim_start().starts_with('[') {
            match serde_json::from_str(text) {
                Ok(events) => events,
                Err(_) => return,
            }
        } else {
            match serde_json::from_str(text) {
                Ok(event) => vec![event],
                Err(_) => return,
            }
        };

        for event in events {
            match event.event_type.as_deref() {
                Some("book") => {
                    let Some(asset_id) = event.asset_id.clone() else {
                        continue;
                    };
                    let timestamp = resolve_timestamp(event.timestamp.as_ref());
                    let book = {
                        let mut state = self.books.entry(asset_id.clone()).or_default();
                        state.apply_snapshot(
                            &event.bids.unwrap_or_default(),
                            &event.asks.unwrap_or_default(),
                        );
                        state.to_book(&asset_id, timestamp)
                    };
                    self.deliver_book(&asset_id, book);
                }
                Some("price_change") => {
                    let timestamp = resolve_timestamp(event.timestamp.as_ref());
                    for change in event.price_changes.unwrap_or_default() {
                        let Some(asset_id) = change.asset_id.clone() else {
                            continue;
                        };
                        let book = {
                            let mut state = self.books.entry(asset_id.clone()).or_default();
                            state.apply_delta(&change);
                            state.to_book(&asset_id, timestamp)
                        };
                        self.deliver_book(&asset_id, book);
                    }
                }
                Some("crypto_price") => {
                    let (Some(symbol), Some(price)) = (
                        event.symbol.clone(),
                        event.price.as_ref().and_then(NumberOrString::as_decimal),
                    ) else {
                        continue;
                    };
                    if price <= Decimal::ZERO {
                        continue;
                    }
                    let tick = OraclePrice {
                        symbol: symbol.clone(),
                        price,
                        timestamp: resolve_timestamp(event.timestamp.as_ref()),
                    };
                    self.deliver_oracle(&symbol, tick);
                }
                _ => {}
            }
        }
    }

    fn deliver_book(&self, asset_id: &str, book: TokenBook) {
        for subscriber in self.subscribers.iter() {
            if let SubscriberSink::Books(tx) = &subscriber.sink {
                if subscriber.keys.iter().any(|k| k == asset_id) {
                    // Newest snapshot supersedes; drop on full channel.
                    let _ = tx.try_send(book.clone());
                }
            }
        }
    }

    fn deliver_oracle(&self, symbol: &str, tick: OraclePrice) {
        for subscriber in self.subscribers.iter() {
            if let SubscriberSink::Oracle(tx) = &subscriber.sink {
                if subscriber.keys.iter().any(|k| k == symbol) {
                    let _ = tx.try_send(tick.clone());
                }
            }
        }
    }
}
