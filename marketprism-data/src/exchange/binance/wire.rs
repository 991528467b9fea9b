//! Binance combined-stream wire DTOs. Field names and the `U`/`u`
//! depth-update convention follow Binance's public API docs; see
//! `barter-data`'s `BinanceSpotOrderBookL2Update` for the equivalent types
//! this is adapted from.

use crate::books::Level;
use crate::event::{RawFundingRate, RawLiquidation, RawLsr, RawOpenInterest, RawTrade, Side};
use chrono::{DateTime, Utc};
use marketprism_integration::de::{de_str, de_u64_epoch_ms_as_datetime_utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct StreamEnvelope {
    pub stream: String,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct BinanceTrade {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "t", alias = "a")]
    pub trade_id: u64,
    #[serde(rename = "p", deserialize_with = "de_str")]
    pub price: Decimal,
    #[serde(rename = "q", deserialize_with = "de_str")]
    pub quantity: Decimal,
    #[serde(rename = "T", deserialize_with = "de_u64_epoch_ms_as_datetime_utc")]
    pub time: DateTime<Utc>,
    /// `true` means the buyer is the market maker, ie/ a sell-initiated
    /// trade.
    #[serde(rename = "m")]
    pub buyer_is_maker: bool,
}

impl BinanceTrade {
    pub fn into_raw(self) -> RawTrade {
        RawTrade {
            trade_id: self.trade_id.to_string(),
            price: self.price,
            quantity: self.quantity,
            side: if self.buyer_is_maker {
                Side::Sell
            } else {
                Side::Buy
            },
            is_maker: self.buyer_is_maker,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DepthSnapshot {
    #[serde(rename = "lastUpdateId")]
    pub last_update_id: u64,
    pub bids: Vec<(Decimal, Decimal)>,
    pub asks: Vec<(Decimal, Decimal)>,
}

impl DepthSnapshot {
    pub fn bids_as_levels(&self) -> Vec<Level> {
        self.bids.iter().map(|(p, q)| Level::new(*p, *q)).collect()
    }

    pub fn asks_as_levels(&self) -> Vec<Level> {
        self.asks.iter().map(|(p, q)| Level::new(*p, *q)).collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct BinanceDepthUpdate {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "E", deserialize_with = "de_u64_epoch_ms_as_datetime_utc")]
    pub event_time: DateTime<Utc>,
    #[serde(rename = "U")]
    pub first_update_id: u64,
    #[serde(rename = "u")]
    pub final_update_id: u64,
    #[serde(rename = "b")]
    pub bids: Vec<(Decimal, Decimal)>,
    #[serde(rename = "a")]
    pub asks: Vec<(Decimal, Decimal)>,
}

impl BinanceDepthUpdate {
    pub fn bids_as_levels(&self) -> Vec<Level> {
        self.bids.iter().map(|(p, q)| Level::new(*p, *q)).collect()
    }

    pub fn asks_as_levels(&self) -> Vec<Level> {
        self.asks.iter().map(|(p, q)| Level::new(*p, *q)).collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct BinanceMarkPrice {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "E", deserialize_with = "de_u64_epoch_ms_as_datetime_utc")]
    pub event_time: DateTime<Utc>,
    #[serde(rename = "r", deserialize_with = "de_str")]
    pub funding_rate: Decimal,
    #[serde(rename = "T", deserialize_with = "de_u64_epoch_ms_as_datetime_utc")]
    pub next_funding_time: DateTime<Utc>,
}

impl BinanceMarkPrice {
    pub fn into_raw(self) -> RawFundingRate {
        RawFundingRate {
            funding_rate: self.funding_rate,
            funding_time: self.event_time,
            next_funding_time: self.next_funding_time,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BinanceForceOrder {
    #[serde(rename = "o")]
    pub order: BinanceForceOrderDetail,
}

#[derive(Debug, Deserialize)]
pub struct BinanceForceOrderDetail {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "S")]
    pub side: String,
    #[serde(rename = "p", deserialize_with = "de_str")]
    pub price: Decimal,
    #[serde(rename = "q", deserialize_with = "de_str")]
    pub quantity: Decimal,
    #[serde(rename = "T", deserialize_with = "de_u64_epoch_ms_as_datetime_utc")]
    pub trade_time: DateTime<Utc>,
}

impl BinanceForceOrderDetail {
    pub fn into_raw(self) -> RawLiquidation {
        RawLiquidation {
            side: if self.side.eq_ignore_ascii_case("sell") {
                Side::Sell
            } else {
                Side::Buy
            },
            price: self.price,
            quantity: self.quantity,
        }
    }
}

/// One entry of `/futures/data/openInterestHist`, polled over REST since
/// Binance has no push channel for open interest.
#[derive(Debug, Deserialize)]
pub struct BinanceOpenInterestHistEntry {
    #[serde(rename = "sumOpenInterest", deserialize_with = "de_str")]
    pub sum_open_interest: Decimal,
    #[serde(rename = "sumOpenInterestValue", deserialize_with = "de_str")]
    pub sum_open_interest_value: Decimal,
    #[serde(rename = "timestamp", deserialize_with = "de_u64_epoch_ms_as_datetime_utc")]
    pub timestamp: DateTime<Utc>,
}

impl BinanceOpenInterestHistEntry {
    pub fn into_raw(self) -> RawOpenInterest {
        RawOpenInterest {
            open_interest: self.sum_open_interest,
            open_interest_value: self.sum_open_interest_value,
        }
    }
}

/// One entry of `/futures/data/topLongShortPositionRatio` or
/// `/futures/data/globalLongShortAccountRatio`; both endpoints share this
/// shape and only differ in which population the ratio is computed over.
#[derive(Debug, Deserialize)]
pub struct BinanceLongShortRatioEntry {
    #[serde(rename = "longAccount", deserialize_with = "de_str")]
    pub long_account: Decimal,
    #[serde(rename = "shortAccount", deserialize_with = "de_str")]
    pub short_account: Decimal,
    #[serde(rename = "timestamp", deserialize_with = "de_u64_epoch_ms_as_datetime_utc")]
    pub timestamp: DateTime<Utc>,
}

impl BinanceLongShortRatioEntry {
    pub fn into_raw(self, period: &str) -> RawLsr {
        RawLsr {
            long_ratio: self.long_account,
            short_ratio: self.short_account,
            period: period.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_trade_event() {
        let json = r#"{
            "s": "BTCUSDT", "t": 12345, "p": "42000.50", "q": "0.01",
            "T": 1700000000000, "m": true
        }"#;
        let trade: BinanceTrade = serde_json::from_str(json).unwrap();
        assert_eq!(trade.symbol, "BTCUSDT");
        assert_eq!(trade.into_raw().side, Side::Sell);
    }

    #[test]
    fn deserializes_open_interest_hist_entry() {
        let json = r#"{
            "symbol": "BTCUSDT", "sumOpenInterest": "10659.509",
            "sumOpenInterestValue": "448498320.15", "timestamp": 1700000000000
        }"#;
        let entry: BinanceOpenInterestHistEntry = serde_json::from_str(json).unwrap();
        let raw = entry.into_raw();
        assert_eq!(raw.open_interest.to_string(), "10659.509");
        assert_eq!(raw.open_interest_value.to_string(), "448498320.15");
    }

    #[test]
    fn deserializes_long_short_ratio_entry() {
        let json = r#"{
            "symbol": "BTCUSDT", "longShortRatio": "1.4342",
            "longAccount": "0.5891", "shortAccount": "0.4109", "timestamp": 1700000000000
        }"#;
        let entry: BinanceLongShortRatioEntry = serde_json::from_str(json).unwrap();
        let raw = entry.into_raw("5m");
        assert_eq!(raw.long_ratio.to_string(), "0.5891");
        assert_eq!(raw.period, "5m");
    }

    #[test]
    fn aggtrade_id_field_aliases_to_trade_id() {
        let json = r#"{
            "s": "BTCUSDT", "a": 987, "p": "1", "q": "1",
            "T": 1700000000000, "m": false
        }"#;
        let trade: BinanceTrade = serde_json::from_str(json).unwrap();
        assert_eq!(trade.trade_id, 987);
    }
}
