//! Deribit perpetual + options connector.
//!
//! Deribit has no spot market. Sequencing uses `change_id`/`prev_change_id`,
//! which `SPEC_FULL.md` §3 resolves as directly analogous to OKX's
//! `seqId`/`prevSeqId` — so this connector reuses
//! [`crate::books::sequencer::SeqIdL2Sequencer`] unchanged.

mod wire;

use crate::books::manager::OrderBookL2Manager;
use crate::books::sequencer::{SeqIdL2Sequencer, SeqIdUpdate};
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
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use url::Url;

pub const BASE_URL_DERIBIT: &str = "wss://www.deribit.com/ws/api/v2";
pub const REST_URL_DERIBIT: &str = "https://www.deribit.com";

const SUPPORTED: &[(MarketType, DataType)] = &[
    (MarketType::Perpetual, DataType::Trade),
    (MarketType::Perpetual, DataType::Orderbook),
    (MarketType::Perpetual, DataType::FundingRate),
    (MarketType::Perpetual, DataType::OpenInterest),
    (MarketType::Perpetual, DataType::Liquidation),
    (MarketType::Options, DataType::Trade),
    (MarketType::Options, DataType::VolatilityIndex),
];

const EMIT_INTERVAL: Duration = Duration::from_secs(1);
const ORDERBOOK_DEPTH: usize = 400;
const CONSECUTIVE_FAILURE_THRESHOLD: u32 = 5;
const CONSECUTIVE_FAILURE_WINDOW: Duration = Duration::from_secs(60);

pub struct DeribitConnector {
    market_type: MarketType,
    http: reqwest::Client,
    ws: Option<(WsSink, WsStream)>,
    subscriptions: Vec<Subscription>,
    books: HashMap<Symbol, OrderBookL2Manager<SeqIdL2Sequencer>>,
    last_emit: HashMap<Symbol, Instant>,
    queued: VecDeque<Result<MarketEvent, DataError>>,
    rest_limiter: RateLimiter,
    recent_failures: VecDeque<Instant>,
}

impl DeribitConnector {
    pub fn new(market_type: MarketType) -> Self {
        Self {
            market_type,
            http: reqwest::Client::new(),
            ws: None,
            subscriptions: Vec::new(),
            books: HashMap::new(),
            last_emit: HashMap::new(),
            queued: VecDeque::new(),
            rest_limiter: RateLimiter::new_with_jitter(
                20,
                Duration::from_secs(1),
                Duration::from_millis(50),
            ),
            recent_failures: VecDeque::new(),
        }
    }

    fn instrument_name(symbol: &Symbol, market_type: MarketType) -> String {
        match market_type {
            MarketType::Perpetual => format!("{}-PERPETUAL", symbol.as_str().replace('-', "_")),
            _ => symbol.as_str().to_string(),
        }
    }

    /// `Liquidation` shares the `trades.` channel with `Trade`: Deribit has
    /// no separate liquidation feed, but flags liquidating trades on the
    /// trades channel itself (see `DeribitTrade::is_liquidation`).
    /// `FundingRate` and `OpenInterest` likewise share `ticker.`, which
    /// pushes both fields together; `route_message` splits them back out
    /// per what each symbol is actually subscribed to.
    fn channel_name(symbol: &Symbol, market_type: MarketType, data_type: DataType) -> String {
        let inst = Self::instrument_name(symbol, market_type);
        match data_type {
            DataType::Trade | DataType::Liquidation => format!("trades.{inst}.100ms"),
            DataType::Orderbook => format!("book.{inst}.100ms"),
            DataType::FundingRate | DataType::OpenInterest => format!("ticker.{inst}.100ms"),
            DataType::VolatilityIndex => format!("deribit_volatility_index.{}", symbol.as_str()),
            DataType::LsrTopPosition | DataType::LsrAllAccount => {
                unreachable!("not in Deribit's SUPPORTED matrix")
            }
        }
    }

    fn is_subscribed(&self, symbol: &Symbol, data_type: DataType) -> bool {
        self.subscriptions
            .iter()
            .any(|s| s.symbol == *symbol && s.data_type == data_type)
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
        let inst = Self::instrument_name(symbol, self.market_type);
        let url = format!(
            "{}/api/v2/public/get_order_book?instrument_name={}&depth=1000",
            REST_URL_DERIBIT, inst
        );
        let response: wire::DeribitRpcResponse<wire::DeribitBookSnapshot> = self
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
            .or_insert_with(|| OrderBookL2Manager::new(SeqIdL2Sequencer::new()));
        manager.apply_snapshot(
            response.result.change_id as u64,
            &response.result.bids_as_levels(),
            &response.result.asks_as_levels(),
        );
        Ok(())
    }

    fn route_message(
        &mut self,
        text: String,
        now: Instant,
    ) -> Option<Result<MarketEvent, DataError>> {
        let notification: wire::DeribitNotification = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(_) => {
                if let Err(fatal) = self.record_malformed(now) {
                    return Some(Err(fatal));
                }
                return None;
            }
        };
        let params = notification.params?;
        let channel = params.channel;

        if channel.starts_with("trades.") {
            let trades: Vec<wire::DeribitTrade> =
                serde_json::from_value(params.data).ok()?;

            let mut events = Vec::new();
            for trade in trades {
                let symbol = Symbol::normalize(&trade.instrument_name);
                let is_liquidation = trade.is_liquidation();
                if is_liquidation && self.is_subscribed(&symbol, DataType::Liquidation) {
                    events.push(MarketEvent {
                        exchange: ExchangeId::Deribit,
                        market_type: self.market_type,
                        symbol,
                        time_exchange: trade.time,
                        time_received: Utc::now(),
                        payload: MarketPayload::Liquidation(trade.into_liquidation()),
                    });
                } else if self.is_subscribed(&symbol, DataType::Trade) {
                    events.push(MarketEvent {
                        exchange: ExchangeId::Deribit,
                        market_type: self.market_type,
                        symbol,
                        time_exchange: trade.time,
                        time_received: Utc::now(),
                        payload: MarketPayload::Trade(trade.into_raw()),
                    });
                }
            }

            let last = events.pop();
            for event in events {
                self.queued.push_back(Ok(event));
            }
            return last.map(Ok);
        }

        if channel.starts_with("ticker.") {
            let ticker: wire::DeribitTicker = serde_json::from_value(params.data).ok()?;
            let symbol = Symbol::normalize(&ticker.instrument_name);

            let mut events = Vec::new();
            if self.is_subscribed(&symbol, DataType::FundingRate) {
                events.push(MarketEvent {
                    exchange: ExchangeId::Deribit,
                    market_type: self.market_type,
                    symbol: symbol.clone(),
                    time_exchange: ticker.time,
                    time_received: Utc::now(),
                    payload: MarketPayload::FundingRate(ticker.into_funding_rate()),
                });
            }
            if self.is_subscribed(&symbol, DataType::OpenInterest) {
                events.push(MarketEvent {
                    exchange: ExchangeId::Deribit,
                    market_type: self.market_type,
                    symbol,
                    time_exchange: ticker.time,
                    time_received: Utc::now(),
                    payload: MarketPayload::OpenInterest(ticker.into_open_interest()),
                });
            }

            let last = events.pop();
            for event in events {
                self.queued.push_back(Ok(event));
            }
            return last.map(Ok);
        }

        if channel.starts_with("book.") {
            let update: wire::DeribitBookUpdate = serde_json::from_value(params.data).ok()?;
            let symbol = Symbol::normalize(&update.instrument_name);
            let manager = self
                .books
                .entry(symbol.clone())
                .or_insert_with(|| OrderBookL2Manager::new(SeqIdL2Sequencer::new()));

            let bids: Vec<Level> = update.bids_as_levels();
            let asks: Vec<Level> = update.asks_as_levels();
            let synced = manager.on_update(
                SeqIdUpdate {
                    seq_id: update.change_id,
                    prev_seq_id: update.prev_change_id.unwrap_or(update.change_id - 1),
                    checksum: None,
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
            return Some(Ok(MarketEvent {
                exchange: ExchangeId::Deribit,
                market_type: self.market_type,
                symbol,
                time_exchange: update.time,
                time_received: Utc::now(),
                payload: MarketPayload::OrderbookSnapshot(crate::event::RawOrderbookSnapshot {
                    last_update_id: book.last_update_id,
                    best_bid_price: book.best_bid().map(|l| l.price),
                    best_ask_price: book.best_ask().map(|l| l.price),
                    bids: book
                        .bids
                        .top_n(ORDERBOOK_DEPTH)
                        .into_iter()
                        .map(|l| (l.price, l.quantity))
                        .collect(),
                    asks: book
                        .asks
                        .top_n(ORDERBOOK_DEPTH)
                        .into_iter()
                        .map(|l| (l.price, l.quantity))
                        .collect(),
                }),
            }));
        }

        if channel.starts_with("deribit_volatility_index.") {
            let vol: wire::DeribitVolatilityIndex = serde_json::from_value(params.data).ok()?;
            let symbol = Symbol::normalize(channel.trim_start_matches("deribit_volatility_index."));
            return Some(Ok(MarketEvent {
                exchange: ExchangeId::Deribit,
                market_type: MarketType::Options,
                symbol: symbol.clone(),
                time_exchange: vol.time,
                time_received: Utc::now(),
                payload: MarketPayload::VolatilityIndex(vol.into_raw(symbol.to_string())),
            }));
        }

        None
    }
}

#[async_trait]
impl Connector for DeribitConnector {
    const ID: ExchangeId = ExchangeId::Deribit;

    async fn connect(&mut self) -> Result<(), DataError> {
        let url = Url::parse(BASE_URL_DERIBIT).map_err(marketprism_integration::SocketError::from)?;
        let (mut sink, stream) = protocol::connect(&url).await?;

        let mut channels: Vec<String> = self
            .subscriptions
            .iter()
            .map(|s| Self::channel_name(&s.symbol, s.market_type, s.data_type))
            .collect();
        channels.sort();
        channels.dedup();

        if !channels.is_empty() {
            use futures::SinkExt;
            let request = json!({
                "jsonrpc": "2.0",
                "method": "public/subscribe",
                "params": { "channels": channels },
            })
            .to_string();
            sink.send(protocol::WsMessage::Text(request.into()))
                .await
                .map_err(|e| DataError::Socket(e.into()))?;
        }

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
        require_supported(ExchangeId::Deribit, &sub, SUPPORTED)?;
        if !self.subscriptions.contains(&sub) {
            self.subscriptions.push(sub);
        }
        Ok(())
    }

    async fn next_event(&mut self) -> Option<Result<MarketEvent, DataError>> {
        loop {
            if let Some(event) = self.queued.pop_front() {
                return Some(event);
            }

            let (_, stream) = self.ws.as_mut()?;
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
    fn perpetual_instrument_name_uses_underscore_and_suffix() {
        let symbol = Symbol::normalize("BTC-USDT");
        assert_eq!(
            DeribitConnector::instrument_name(&symbol, MarketType::Perpetual),
            "BTC_USDT-PERPETUAL"
        );
    }

    #[test]
    fn spot_is_never_supported() {
        let mut connector = DeribitConnector::new(MarketType::Spot);
        let result = connector.subscribe(Subscription::new(
            MarketType::Spot,
            "BTC-USDT",
            DataType::Trade,
        ));
        assert!(matches!(
            result,
            Err(DataError::UnsupportedCombination { .. })
        ));
    }
}
