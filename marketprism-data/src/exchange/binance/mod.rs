//! Binance spot + USDⓈ-M futures connector.
//!
//! Grounded on `barter-data`'s `exchange::binance::spot::l2` module for the
//! depth-update sequencing algorithm, and on
//! `jackbot-data/src/exchange/binance/rate_limit.rs` for the split
//! REST/WS token-bucket shape.

mod wire;

use crate::books::manager::OrderBookL2Manager;
use crate::books::sequencer::{BinanceL2Sequencer, BinanceUpdate};
use crate::books::Level;
use crate::error::DataError;
use crate::event::{MarketEvent, MarketPayload};
use crate::exchange::{require_supported, Connector};
use crate::subscription::Subscription;
use async_trait::async_trait;
use chrono::Utc;
use marketprism_instrument::{DataType, ExchangeId, MarketType, Symbol};
use marketprism_integration::protocol::{self, WsSink, WsStream};
use marketprism_integration::rate_limit::{Priority, RateLimiter};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use url::Url;

pub const BASE_URL_BINANCE_SPOT: &str = "wss://stream.binance.com:9443/stream";
pub const BASE_URL_BINANCE_FUTURES: &str = "wss://fstream.binance.com/stream";
pub const REST_URL_BINANCE_SPOT: &str = "https://api.binance.com";
pub const REST_URL_BINANCE_FUTURES: &str = "https://fapi.binance.com";

/// (market_type, data_type) combinations Binance supports, per
/// `SPEC_FULL.md` §4.1's matrix. Binance has no options market.
const SUPPORTED: &[(MarketType, DataType)] = &[
    (MarketType::Spot, DataType::Trade),
    (MarketType::Spot, DataType::Orderbook),
    (MarketType::Perpetual, DataType::Trade),
    (MarketType::Perpetual, DataType::Orderbook),
    (MarketType::Perpetual, DataType::FundingRate),
    (MarketType::Perpetual, DataType::OpenInterest),
    (MarketType::Perpetual, DataType::Liquidation),
    (MarketType::Perpetual, DataType::LsrTopPosition),
    (MarketType::Perpetual, DataType::LsrAllAccount),
];

const EMIT_INTERVAL: Duration = Duration::from_secs(1);
const ORDERBOOK_DEPTH: usize = 400;
const CONSECUTIVE_FAILURE_THRESHOLD: u32 = 5;
const CONSECUTIVE_FAILURE_WINDOW: Duration = Duration::from_secs(60);

/// Binance has no push channel for open interest or long/short ratios; the
/// futures data endpoints that carry them are themselves only refreshed
/// every 5 minutes server-side, but a shorter local poll-check interval
/// keeps per-symbol staleness bounded without adding request volume (a
/// no-new-data response is cheap and handled as a no-op).
const REST_POLL_INTERVAL: Duration = Duration::from_secs(60);
const REST_POLL_PERIOD: &str = "5m";

/// Data types Binance only exposes over REST polling, never over the
/// combined WS stream.
const REST_ONLY_DATA_TYPES: &[DataType] = &[
    DataType::OpenInterest,
    DataType::LsrTopPosition,
    DataType::LsrAllAccount,
];

pub struct BinanceConnector {
    market_type: MarketType,
    http: reqwest::Client,
    ws: Option<(WsSink, WsStream)>,
    subscriptions: Vec<Subscription>,
    books: HashMap<Symbol, OrderBookL2Manager<BinanceL2Sequencer>>,
    last_emit: HashMap<Symbol, Instant>,
    last_rest_poll: HashMap<(Symbol, DataType), Instant>,
    queued: VecDeque<Result<MarketEvent, DataError>>,
    rest_limiter: RateLimiter,
    ws_limiter: RateLimiter,
    recent_failures: VecDeque<Instant>,
}

impl BinanceConnector {
    pub fn new(market_type: MarketType) -> Self {
        Self {
            market_type,
            http: reqwest::Client::new(),
            ws: None,
            subscriptions: Vec::new(),
            books: HashMap::new(),
            last_emit: HashMap::new(),
            last_rest_poll: HashMap::new(),
            queued: VecDeque::new(),
            // Binance: 1200 requests/minute, 6000 weight/minute -> model as
            // a single REST bucket sized to the weight budget.
            rest_limiter: RateLimiter::new_with_jitter(
                6000,
                Duration::from_secs(60),
                Duration::from_millis(50),
            ),
            ws_limiter: RateLimiter::new(10, Duration::from_secs(1)),
            recent_failures: VecDeque::new(),
        }
    }

    fn base_ws_url(&self) -> &'static str {
        match self.market_type {
            MarketType::Perpetual => BASE_URL_BINANCE_FUTURES,
            _ => BASE_URL_BINANCE_SPOT,
        }
    }

    fn rest_url(&self) -> &'static str {
        match self.market_type {
            MarketType::Perpetual => REST_URL_BINANCE_FUTURES,
            _ => REST_URL_BINANCE_SPOT,
        }
    }

    /// Only ever called for the WS-pushed data types; `connect()` filters
    /// `self.subscriptions` down to those before building stream names.
    fn stream_name(symbol: &Symbol, data_type: DataType) -> String {
        let lower = symbol.as_str().replace('-', "").to_ascii_lowercase();
        match data_type {
            DataType::Trade => format!("{lower}@trade"),
            DataType::Orderbook => format!("{lower}@depth@100ms"),
            DataType::FundingRate => format!("{lower}@markPrice@1s"),
            DataType::Liquidation => format!("{lower}@forceOrder"),
            DataType::OpenInterest | DataType::LsrTopPosition | DataType::LsrAllAccount => {
                unreachable!("polled over REST, never subscribed to a WS stream")
            }
            DataType::VolatilityIndex => unreachable!("Binance has no options market"),
        }
    }

    fn record_malformed(&mut self, now: Instant) -> Result<(), DataError> {
        self.recent_failures.push_back(now);
        while let Some(&front) = self.recent_failures.front() {
            if now.duration_since(front) > CONSECUTIVE_FAILURE_WINDOW {
                self.recent_failures.pop_front();
            } else {
                break;
            }
        }
        if self.recent_failures.len() as u32 >= CONSECUTIVE_FAILURE_THRESHOLD {
            return Err(DataError::Fatal {
                consecutive: self.recent_failures.len() as u32,
                window_secs: CONSECUTIVE_FAILURE_WINDOW.as_secs(),
            });
        }
        Ok(())
    }

    async fn fetch_snapshot(&mut self, symbol: &Symbol) -> Result<(), DataError> {
        self.rest_limiter.acquire(Priority::High).await;
        let depth_path = match self.market_type {
            MarketType::Perpetual => "/fapi/v1/depth",
            _ => "/api/v3/depth",
        };
        let url = format!(
            "{}{}?symbol={}&limit=1000",
            self.rest_url(),
            depth_path,
            symbol.as_str().replace('-', "")
        );
        let snapshot: wire::DepthSnapshot = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| DataError::Socket(e.into()))?
            .json()
            .await
            .map_err(|e| DataError::Socket(e.into()))?;

        let manager = self
            .books
            .entry(symbol.clone())
            .or_insert_with(|| OrderBookL2Manager::new(BinanceL2Sequencer::new()));
        manager.apply_snapshot(
            snapshot.last_update_id,
            &snapshot.bids_as_levels(),
            &snapshot.asks_as_levels(),
        );
        Ok(())
    }

    /// Polls every due `(symbol, data_type)` pair among the REST-only data
    /// types and pushes the resulting events onto `self.queued`. Called on
    /// every `next_event` loop iteration, piggybacking on its existing
    /// cadence rather than running its own ticker task.
    async fn poll_rest_data_types(&mut self, now: Instant) -> Result<(), DataError> {
        let due: Vec<(Symbol, DataType)> = self
            .subscriptions
            .iter()
            .filter(|s| REST_ONLY_DATA_TYPES.contains(&s.data_type))
            .map(|s| (s.symbol.clone(), s.data_type))
            .filter(|key| {
                self.last_rest_poll
                    .get(key)
                    .map(|last| now.duration_since(*last) >= REST_POLL_INTERVAL)
                    .unwrap_or(true)
            })
            .collect();

        for (symbol, data_type) in due {
            self.last_rest_poll.insert((symbol.clone(), data_type), now);
            let event = match data_type {
                DataType::OpenInterest => self.fetch_open_interest(&symbol).await?,
                DataType::LsrTopPosition => {
                    self.fetch_long_short_ratio(&symbol, "/futures/data/topLongShortPositionRatio", true)
                        .await?
                }
                DataType::LsrAllAccount => {
                    self.fetch_long_short_ratio(&symbol, "/futures/data/globalLongShortAccountRatio", false)
                        .await?
                }
                _ => unreachable!("REST_ONLY_DATA_TYPES only lists the three arms above"),
            };

            if let Some(event) = event {
                self.queued.push_back(Ok(event));
            }
        }

        Ok(())
    }

    async fn fetch_open_interest(&mut self, symbol: &Symbol) -> Result<Option<MarketEvent>, DataError> {
        self.rest_limiter.acquire(Priority::Low).await;
        let url = format!(
            "{}/futures/data/openInterestHist?symbol={}&period={REST_POLL_PERIOD}&limit=1",
            self.rest_url(),
            symbol.as_str().replace('-', "")
        );
        let entries: Vec<wire::BinanceOpenInterestHistEntry> = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| DataError::Socket(e.into()))?
            .json()
            .await
            .map_err(|e| DataError::Socket(e.into()))?;

        Ok(entries.into_iter().last().map(|entry| {
            let time_exchange = entry.timestamp;
            MarketEvent {
                exchange: ExchangeId::Binance,
                market_type: self.market_type,
                symbol: symbol.clone(),
                time_exchange,
                time_received: Utc::now(),
                payload: MarketPayload::OpenInterest(entry.into_raw()),
            }
        }))
    }

    async fn fetch_long_short_ratio(
        &mut self,
        symbol: &Symbol,
        path: &str,
        top_position: bool,
    ) -> Result<Option<MarketEvent>, DataError> {
        self.rest_limiter.acquire(Priority::Low).await;
        let url = format!(
            "{}{}?symbol={}&period={REST_POLL_PERIOD}&limit=1",
            self.rest_url(),
            path,
            symbol.as_str().replace('-', "")
        );
        let entries: Vec<wire::BinanceLongShortRatioEntry> = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| DataError::Socket(e.into()))?
            .json()
            .await
            .map_err(|e| DataError::Socket(e.into()))?;

        Ok(entries.into_iter().last().map(|entry| {
            let time_exchange = entry.timestamp;
            let raw = entry.into_raw(REST_POLL_PERIOD);
            let payload = if top_position {
                MarketPayload::LsrTopPosition(raw)
            } else {
                MarketPayload::LsrAllAccount(raw)
            };
            MarketEvent {
                exchange: ExchangeId::Binance,
                market_type: self.market_type,
                symbol: symbol.clone(),
                time_exchange,
                time_received: Utc::now(),
                payload,
            }
        }))
    }

    fn route_message(&mut self, text: String, now: Instant) -> Option<Result<MarketEvent, DataError>> {
        let envelope: wire::StreamEnvelope = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(_) => {
                if let Err(fatal) = self.record_malformed(now) {
                    return Some(Err(fatal));
                }
                return None;
            }
        };

        if envelope.stream.ends_with("@trade") {
            let trade: wire::BinanceTrade = serde_json::from_value(envelope.data).ok()?;
            let symbol = Symbol::normalize(&trade.symbol);
            return Some(Ok(MarketEvent {
                exchange: ExchangeId::Binance,
                market_type: self.market_type,
                symbol,
                time_exchange: trade.time,
                time_received: Utc::now(),
                payload: MarketPayload::Trade(trade.into_raw()),
            }));
        }

        if envelope.stream.contains("@depth") {
            let update: wire::BinanceDepthUpdate = serde_json::from_value(envelope.data).ok()?;
            let symbol = Symbol::normalize(&update.symbol);
            let manager = self
                .books
                .entry(symbol.clone())
                .or_insert_with(|| OrderBookL2Manager::new(BinanceL2Sequencer::new()));

            let bids: Vec<Level> = update.bids_as_levels();
            let asks: Vec<Level> = update.asks_as_levels();
            let synced = manager.on_update(
                BinanceUpdate {
                    first_update_id: update.first_update_id,
                    last_update_id: update.final_update_id,
                },
                bids,
                asks,
                now,
            );

            if !synced {
                return None;
            }

            let due = self
                .last_emit
                .get(&symbol)
                .map(|last| now.duration_since(*last) >= EMIT_INTERVAL)
                .unwrap_or(true);
            if !due {
                return None;
            }
            self.last_emit.insert(symbol.clone(), now);

            let book = &manager.book;
            let bid_levels = book.bids.top_n(ORDERBOOK_DEPTH);
            let ask_levels = book.asks.top_n(ORDERBOOK_DEPTH);
            return Some(Ok(MarketEvent {
                exchange: ExchangeId::Binance,
                market_type: self.market_type,
                symbol,
                time_exchange: update.event_time,
                time_received: Utc::now(),
                payload: MarketPayload::OrderbookSnapshot(crate::event::RawOrderbookSnapshot {
                    last_update_id: book.last_update_id,
                    best_bid_price: book.best_bid().map(|l| l.price),
                    best_ask_price: book.best_ask().map(|l| l.price),
                    bids: bid_levels.into_iter().map(|l| (l.price, l.quantity)).collect(),
                    asks: ask_levels.into_iter().map(|l| (l.price, l.quantity)).collect(),
                }),
            }));
        }

        if envelope.stream.contains("@markPrice") {
            let mp: wire::BinanceMarkPrice = serde_json::from_value(envelope.data).ok()?;
            let symbol = Symbol::normalize(&mp.symbol);
            return Some(Ok(MarketEvent {
                exchange: ExchangeId::Binance,
                market_type: self.market_type,
                symbol,
                time_exchange: mp.event_time,
                time_received: Utc::now(),
                payload: MarketPayload::FundingRate(mp.into_raw()),
            }));
        }

        if envelope.stream.contains("@forceOrder") {
            let liq: wire::BinanceForceOrder = serde_json::from_value(envelope.data).ok()?;
            let symbol = Symbol::normalize(&liq.order.symbol);
            return Some(Ok(MarketEvent {
                exchange: ExchangeId::Binance,
                market_type: self.market_type,
                symbol,
                time_exchange: liq.order.trade_time,
                time_received: Utc::now(),
                payload: MarketPayload::Liquidation(liq.order.into_raw()),
            }));
        }

        None
    }
}

#[async_trait]
impl Connector for BinanceConnector {
    const ID: ExchangeId = ExchangeId::Binance;

    async fn connect(&mut self) -> Result<(), DataError> {
        let streams: Vec<String> = self
            .subscriptions
            .iter()
            .filter(|s| !REST_ONLY_DATA_TYPES.contains(&s.data_type))
            .map(|s| Self::stream_name(&s.symbol, s.data_type))
            .collect();

        if streams.is_empty() {
            // Every subscription on this connector is REST-only (e.g. open
            // interest alone); there is nothing to push a WS stream for.
            self.ws = None;
            return Ok(());
        }

        let url = format!("{}?streams={}", self.base_ws_url(), streams.join("/"));
        let url = Url::parse(&url).map_err(marketprism_integration::SocketError::from)?;

        self.ws_limiter.acquire(Priority::High).await;
        let (sink, stream) = protocol::connect(&url).await?;
        self.ws = Some((sink, stream));

        let symbols: Vec<Symbol> = self
            .subscriptions
            .iter()
            .filter(|s| s.data_type == DataType::Orderbook)
            .map(|s| s.symbol.clone())
            .collect();
        for symbol in symbols {
            self.fetch_snapshot(&symbol).await?;
        }

        Ok(())
    }

    fn subscribe(&mut self, sub: Subscription) -> Result<(), DataError> {
        require_supported(ExchangeId::Binance, &sub, SUPPORTED)?;
        if !self.subscriptions.contains(&sub) {
            self.subscriptions.push(sub);
        }
        Ok(())
    }

    async fn next_event(&mut self) -> Option<Result<MarketEvent, DataError>> {
        loop {
            if let Err(e) = self.poll_rest_data_types(Instant::now()).await {
                return Some(Err(e));
            }

            if let Some(event) = self.queued.pop_front() {
                return Some(event);
            }

            let Some((_, stream)) = self.ws.as_mut() else {
                // REST-only connector: nothing to await on the socket, just
                // wait out the poll interval and check for due polls again.
                tokio::time::sleep(REST_POLL_INTERVAL).await;
                continue;
            };
            use futures::StreamExt;
            let message = stream.next().await?;
            let message = match message {
                Ok(m) => m,
                Err(e) => return Some(Err(DataError::Socket(e.into()))),
            };

            let text = match message {
                protocol::WsMessage::Text(t) => t,
                protocol::WsMessage::Close(_) => {
                    return Some(Err(DataError::Socket(
                        marketprism_integration::SocketError::SinkClosed,
                    )))
                }
                _ => continue,
            };

            if let Some(event) = self.route_message(text.to_string(), Instant::now()) {
                return Some(event);
            }
        }
    }

    async fn shutdown(&mut self) {
        self.ws = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unsupported_combination() {
        let mut connector = BinanceConnector::new(MarketType::Spot);
        let result = connector.subscribe(Subscription::new(
            MarketType::Spot,
            "BTC-USDT",
            DataType::FundingRate,
        ));
        assert!(matches!(
            result,
            Err(DataError::UnsupportedCombination { .. })
        ));
    }

    #[test]
    fn subscribe_is_idempotent() {
        let mut connector = BinanceConnector::new(MarketType::Spot);
        let sub = Subscription::new(MarketType::Spot, "BTC-USDT", DataType::Trade);
        connector.subscribe(sub.clone()).unwrap();
        connector.subscribe(sub).unwrap();
        assert_eq!(connector.subscriptions.len(), 1);
    }

    #[test]
    fn stream_name_lowercases_and_strips_hyphen() {
        let symbol = Symbol::normalize("BTC-USDT");
        assert_eq!(
            BinanceConnector::stream_name(&symbol, DataType::Trade),
            "btcusdt@trade"
        );
    }
}
