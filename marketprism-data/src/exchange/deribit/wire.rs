use crate::books::Level;
use crate::event::{RawFundingRate, RawLiquidation, RawOpenInterest, RawTrade, RawVolatilityIndex, Side};
use chrono::{DateTime, Utc};
use marketprism_integration::de::datetime_utc_from_epoch_ms;
use rust_decimal::Decimal;
use serde::{de, Deserialize, Deserializer};

#[derive(Debug, Deserialize)]
pub struct DeribitRpcResponse<T> {
    pub result: T,
}

#[derive(Debug, Deserialize)]
pub struct DeribitNotification {
    pub params: Option<DeribitParams>,
}

#[derive(Debug, Deserialize)]
pub struct DeribitParams {
    pub channel: String,
    pub data: serde_json::Value,
}

fn de_epoch_ms<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let epoch_ms = i64::deserialize(deserializer)?;
    Ok(datetime_utc_from_epoch_ms(epoch_ms))
}

fn de_decimal_from_f64<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    Decimal::try_from(value).map_err(de::Error::custom)
}

#[derive(Debug, Deserialize)]
pub struct DeribitTrade {
    pub instrument_name: String,
    pub trade_id: String,
    #[serde(deserialize_with = "de_decimal_from_f64")]
    pub price: Decimal,
    #[serde(deserialize_with = "de_decimal_from_f64")]
    pub amount: Decimal,
    pub direction: String,
    #[serde(rename = "timestamp", deserialize_with = "de_epoch_ms")]
    pub time: DateTime<Utc>,
    /// Present (`"M"`, `"T"` or `"MT"`, naming which side was liquidated)
    /// only on trades that closed a liquidated position; absent otherwise.
    pub liquidation: Option<String>,
}

impl DeribitTrade {
    pub fn is_liquidation(&self) -> bool {
        self.liquidation.is_some()
    }

    pub fn into_raw(self) -> RawTrade {
        RawTrade {
            trade_id: self.trade_id,
            price: self.price,
            quantity: self.amount,
            side: if self.direction.eq_ignore_ascii_case("sell") {
                Side::Sell
            } else {
                Side::Buy
            },
            is_maker: false,
        }
    }

    pub fn into_liquidation(self) -> RawLiquidation {
        RawLiquidation {
            side: if self.direction.eq_ignore_ascii_case("sell") {
                Side::Sell
            } else {
                Side::Buy
            },
            price: self.price,
            quantity: self.amount,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DeribitBookSnapshot {
    pub change_id: i64,
    pub bids: Vec<(Decimal, Decimal)>,
    pub asks: Vec<(Decimal, Decimal)>,
}

impl DeribitBookSnapshot {
    pub fn bids_as_levels(&self) -> Vec<Level> {
        self.bids.iter().map(|(p, q)| Level::new(*p, *q)).collect()
    }

    pub fn asks_as_levels(&self) -> Vec<Level> {
        self.asks.iter().map(|(p, q)| Level::new(*p, *q)).collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct DeribitBookUpdate {
    pub instrument_name: String,
    pub change_id: i64,
    pub prev_change_id: Option<i64>,
    pub bids: Vec<DeribitBookEntry>,
    pub asks: Vec<DeribitBookEntry>,
    #[serde(rename = "timestamp", deserialize_with = "de_epoch_ms")]
    pub time: DateTime<Utc>,
}

/// Deribit delivers `[action, price, amount]` triples where `action` is
/// `"new" | "change" | "delete"`; a `"delete"` always carries `amount: 0`,
/// so it folds into the same price/qty upsert the other exchanges use.
#[derive(Debug, Deserialize)]
pub struct DeribitBookEntry(String, #[serde(deserialize_with = "de_decimal_from_f64")] Decimal, #[serde(deserialize_with = "de_decimal_from_f64")] Decimal);

impl DeribitBookUpdate {
    pub fn bids_as_levels(&self) -> Vec<Level> {
        self.bids.iter().map(|e| Level::new(e.1, e.2)).collect()
    }

    pub fn asks_as_levels(&self) -> Vec<Level> {
        self.asks.iter().map(|e| Level::new(e.1, e.2)).collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct DeribitVolatilityIndex {
    #[serde(deserialize_with = "de_decimal_from_f64")]
    pub volatility: Decimal,
    #[serde(rename = "timestamp", deserialize_with = "de_epoch_ms")]
    pub time: DateTime<Utc>,
}

impl DeribitVolatilityIndex {
    pub fn into_raw(self, underlying_asset: String) -> RawVolatilityIndex {
        RawVolatilityIndex {
            index_value: self.volatility,
            underlying_asset,
        }
    }
}

/// `ticker.{instrument}.100ms` carries both the funding and open-interest
/// state for a perpetual in one push; `route_message` picks out whichever
/// of the two the caller actually subscribed to.
#[derive(Debug, Deserialize)]
pub struct DeribitTicker {
    pub instrument_name: String,
    #[serde(deserialize_with = "de_decimal_from_f64")]
    pub open_interest: Decimal,
    #[serde(deserialize_with = "de_decimal_from_f64")]
    pub mark_price: Decimal,
    pub current_funding: Option<f64>,
    #[serde(rename = "timestamp", deserialize_with = "de_epoch_ms")]
    pub time: DateTime<Utc>,
}

impl DeribitTicker {
    pub fn into_funding_rate(&self) -> RawFundingRate {
        let rate = Decimal::try_from(self.current_funding.unwrap_or(0.0)).unwrap_or_default();
        RawFundingRate {
            funding_rate: rate,
            funding_time: self.time,
            next_funding_time: self.time + chrono::Duration::hours(8),
        }
    }

    pub fn into_open_interest(&self) -> RawOpenInterest {
        RawOpenInterest {
            open_interest: self.open_interest,
            open_interest_value: self.open_interest * self.mark_price,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_trade_params() {
        let json = r#"{
            "instrument_name": "BTC-PERPETUAL", "trade_id": "1", "price": 42000.5,
            "amount": 10.0, "direction": "sell", "timestamp": 1700000000000
        }"#;
        let trade: DeribitTrade = serde_json::from_str(json).unwrap();
        assert_eq!(trade.into_raw().side, Side::Sell);
    }

    #[test]
    fn book_entry_tuple_decodes_action_price_amount() {
        let json = r#"["new", 42000.5, 1.25]"#;
        let entry: DeribitBookEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.0, "new");
    }

    #[test]
    fn trade_without_liquidation_field_is_not_a_liquidation() {
        let json = r#"{
            "instrument_name": "BTC-PERPETUAL", "trade_id": "1", "price": 42000.5,
            "amount": 10.0, "direction": "sell", "timestamp": 1700000000000
        }"#;
        let trade: DeribitTrade = serde_json::from_str(json).unwrap();
        assert!(!trade.is_liquidation());
    }

    #[test]
    fn trade_with_liquidation_field_is_a_liquidation() {
        let json = r#"{
            "instrument_name": "BTC-PERPETUAL", "trade_id": "1", "price": 42000.5,
            "amount": 10.0, "direction": "sell", "timestamp": 1700000000000,
            "liquidation": "M"
        }"#;
        let trade: DeribitTrade = serde_json::from_str(json).unwrap();
        assert!(trade.is_liquidation());
        assert_eq!(trade.into_liquidation().price.to_string(), "42000.5");
    }

    #[test]
    fn deserializes_ticker_funding_and_open_interest() {
        let json = r#"{
            "instrument_name": "BTC-PERPETUAL", "open_interest": 12345.0,
            "mark_price": 42000.5, "current_funding": 0.0001,
            "timestamp": 1700000000000
        }"#;
        let ticker: DeribitTicker = serde_json::from_str(json).unwrap();
        assert_eq!(ticker.into_open_interest().open_interest.to_string(), "12345");
        assert_eq!(ticker.into_funding_rate().funding_rate.to_string(), "0.0001");
    }
}
