//! OKX spot + perpetual swap + options connector.
//!
//! Grounded on `barter-data`'s `exchange::okx` module for the channel/arg
//! subscription shape; the `seqId`/`prevSeqId` sequencing and checksum
//! verification are `SPEC_FULL.md`'s own addition (§3), implemented via the
//! shared [`crate::books::sequencer::SeqIdL2Sequencer`].

mod wire;

use crate::books::manager::OrderBookL2Manager;
use crate::books::sequencer::{okx_style_checksum, SeqIdL2Sequencer, SeqIdUpdate};
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

pub const BASE_URL_OKX: &str = "wss://ws.okx.com:8443/ws/v5/public";
pub const REST_URL_OKX: &str = "https://www.okx.com";

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
    (MarketType::Options, DataType::Trade),
    (MarketType::Options, DataType::VolatilityIndex),
];

const EMIT_INTERVAL: Duration = Duration::from_secs(1);
const ORDERBOOK_DEPTH: usize = 400;
const CONSECUTIVE_FAILURE_THRESHOLD: u32 = 5;
const CONSECUTIVE_FAILURE_WINDOW: Duration = Duration::from_secs(60);

pub struct OkxConnector {
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

impl OkxConnector {
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
                Duration::from_secs(2),
                Duration::from_millis(50),
            ),
            recent_failures: VecDeque::new(),
        }
    }

    fn instrument_id(symbol: &Symbol, market_type: MarketType) -> String {
        match market_type {
            MarketType::Perpetual => format!("{}-SWAP", symbol.as_str()),
            _ => symbol.as_str().to_string(),
        }
    }

    fn channel_name(data_type: DataType) -> &'static str {
        match data_type {
            DataType::Trade => "trades",
            DataType::Orderbook => "books",
            DataType::FundingRate => "funding-rate",
            DataType::OpenInterest => "open-interest",
            DataType::Liquidation => "liquidation-orders",
            DataType::LsrTopPosition => "long-short-position-ratio",
            DataType::LsrAllAccount => "long-short-account-ratio",
            DataType::VolatilityIndex => "index-candle1D",
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
        let inst_id = Self::instrument_id(symbol, self.market_type);
        let url = format!(
            "{}/api/v5/market/books?instId={}&sz=400",
            REST_URL_OKX, inst_id
        );
        let response: wire::OkxBooksResponse = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| DataError::Socket(e.into()))?
            .json()
            .await
            .map_err(|e| DataError::Socket(e.into()))?;

        let Some(snapshot) = response.data.into_iter().next() else {
            return Ok(());
        };

        let manager = self
            .books
            .entry(symbol.clone())
            .or_insert_with(|| OrderBookL2Manager::new(SeqIdL2Sequencer::new()));
        manager.apply_snapshot(
            snapshot.seq_id as u64,
            &snapshot.bids_as_levels(),
            &snapshot.asks_as_levels(),
        );
        Ok(())
    }

    fn route_message(
        &mut self,
        text: String,
        now: Instant,
    ) -> Option<Result<MarketEvent, DataError>> {
        let envelope: wire::OkxEnvelope = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(_) => {
                if text == "pong" {
                    return None;
                }
                if let Err(fatal) = self.record_malformed(now) {
                    return Some(Err(fatal));
                }
                return None;
            }
        };

        let symbol = Symbol::normalize(&envelope.arg.inst_id);

        match envelope.arg.channel.as_str() {
            "trades" => {
                let trade: wire::OkxTrade = serde_json::from_value(envelope.data.into_iter().next()?).ok()?;
                Some(Ok(MarketEvent {
                    exchange: ExchangeId::Okx,
                    market_type: self.market_type,
                    symbol,
                    time_exchange: trade.time,
                    time_received: Utc::now(),
                    payload: MarketPayload::Trade(trade.into_raw()),
                }))
            }
            "books" => {
                let update: wire::OkxBookUpdate =
                    serde_json::from_value(envelope.data.into_iter().next()?).ok()?;
                let manager = self
                    .books
                    .entry(symbol.clone())
                    .or_insert_with(|| OrderBookL2Manager::new(SeqIdL2Sequencer::new()));

                let bids: Vec<Level> = update.bids_as_levels();
                let asks: Vec<Level> = update.asks_as_levels();
                let checksum_bids: Vec<(String, String)> = update
                    .bids
                    .iter()
                    .map(|(p, q, _, _)| (p.to_string(), q.to_string()))
                    .collect();
                let checksum_asks: Vec<(String, String)> = update
                    .asks
                    .iter()
                    .map(|(p, q, _, _)| (p.to_string(), q.to_string()))
                    .collect();
                let checksum_ok = update.checksum.map_or(true, |expected| {
                    okx_style_checksum(&checksum_bids, &checksum_asks) as i32 == expected
                });

                let synced = manager.on_update(
                    SeqIdUpdate {
                        seq_id: update.seq_id,
                        prev_seq_id: update.prev_seq_id,
                        checksum: update.checksum.map(|c| c as u32),
                    },
                    bids,
                    asks,
                    now,
                );

                if !checksum_ok {
                    manager.force_unsynced();
                    return None;
                }
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
                Some(Ok(MarketEvent {
                    exchange: ExchangeId::Okx,
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
                }))
            }
            "funding-rate" => {
                let fr: wire::OkxFundingRate =
                    serde_json::from_value(envelope.data.into_iter().next()?).ok()?;
                Some(Ok(MarketEvent {
                    exchange: ExchangeId::Okx,
                    market_type: self.market_type,
                    symbol,
                    time_exchange: fr.funding_time,
                    time_received: Utc::now(),
                    payload: MarketPayload::FundingRate(fr.into_raw()),
                }))
            }
            _ => None,
        }
    }
}

#[async_trait]
impl Connector for OkxConnector {
    const ID: ExchangeId = ExchangeId::Okx;

    async fn connect(&mut self) -> Result<(), DataError> {
        let url = Url::parse(BASE_URL_OKX).map_err(marketprism_integration::SocketError::from)?;
        let (mut sink, stream) = protocol::connect(&url).await?;

        let args: Vec<_> = self
            .subscriptions
            .iter()
            .map(|s| {
                json!({
                    "channel": Self::channel_name(s.data_type),
                    "instId": Self::instrument_id(&s.symbol, s.market_type),
                })
            })
            .collect();

        if !args.is_empty() {
            use futures::SinkExt;
            let request = json!({ "op": "subscribe", "args": args }).to_string();
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
        require_supported(ExchangeId::Okx, &sub, SUPPORTED)?;
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
    fn perpetual_instrument_id_gets_swap_suffix() {
        let symbol = Symbol::normalize("BTC-USDT");
        assert_eq!(
            OkxConnector::instrument_id(&symbol, MarketType::Perpetual),
            "BTC-USDT-SWAP"
        );
        assert_eq!(
            OkxConnector::instrument_id(&symbol, MarketType::Spot),
            "BTC-USDT"
        );
    }

    #[test]
    fn options_trade_subscription_is_supported() {
        let mut connector = OkxConnector::new(MarketType::Options);
        let result = connector.subscribe(Subscription::new(
            MarketType::Options,
            "BTC-USD-30AUG24-70000-C",
            DataType::Trade,
        ));
        assert!(result.is_ok());
    }
}
