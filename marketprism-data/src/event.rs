use chrono::{DateTime, Utc};
use marketprism_instrument::{ExchangeId, MarketType, Symbol};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One decoded exchange event, tagged with the identity the normalizer
/// needs to build a canonical subject and record.
///
/// Grounded on `barter-data`'s `MarketEvent<InstrumentKey, T>`; MarketPrism
/// always knows its instrument statically (exchange/market_type/symbol are
/// fixed per connector subscription), so there is no generic `InstrumentKey`
/// parameter here.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketEvent {
    pub exchange: ExchangeId,
    pub market_type: MarketType,
    pub symbol: Symbol,
    pub time_exchange: DateTime<Utc>,
    pub time_received: DateTime<Utc>,
    pub payload: MarketPayload,
}

/// The eight raw payload shapes a connector can emit, one per canonical
/// `data_type`. Fields are already exchange-agnostic in name (the per-
/// exchange message DTOs convert into these), but are not yet validated —
/// that is `marketprism-normalizer`'s job.
///
/// Mirrors `barter-data`'s `DataKind` enum, restricted to the eight types
/// this system's subject namespace recognises.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MarketPayload {
    Trade(RawTrade),
    OrderbookSnapshot(RawOrderbookSnapshot),
    FundingRate(RawFundingRate),
    OpenInterest(RawOpenInterest),
    Liquidation(RawLiquidation),
    LsrTopPosition(RawLsr),
    LsrAllAccount(RawLsr),
    VolatilityIndex(RawVolatilityIndex),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTrade {
    pub trade_id: String,
    pub price: Decimal,
    pub quantity: Decimal,
    pub side: Side,
    pub is_maker: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawOrderbookSnapshot {
    pub last_update_id: u64,
    pub best_bid_price: Option<Decimal>,
    pub best_ask_price: Option<Decimal>,
    pub bids: Vec<(Decimal, Decimal)>,
    pub asks: Vec<(Decimal, Decimal)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFundingRate {
    pub funding_rate: Decimal,
    pub funding_time: DateTime<Utc>,
    pub next_funding_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawOpenInterest {
    pub open_interest: Decimal,
    pub open_interest_value: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLiquidation {
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLsr {
    pub long_ratio: Decimal,
    pub short_ratio: Decimal,
    pub period: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawVolatilityIndex {
    pub index_value: Decimal,
    pub underlying_asset: String,
}
