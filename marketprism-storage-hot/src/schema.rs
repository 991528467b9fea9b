//! ClickHouse row shapes and the column lists the startup schema check
//! verifies against `system.columns`, per `spec.md` §6.
//!
//! `rust_decimal::Decimal` has no native ClickHouse wire mapping in the
//! `clickhouse` crate, so price/quantity/ratio fields are carried as their
//! `Decimal::to_string()` representation instead of `f64`, the same way
//! `OrderbookRow::bids`/`asks` are already carried as JSON-encoded
//! strings — `spec.md` §4.2 requires numbers to round-trip through an
//! arbitrary-precision decimal, never through binary floating point.

use chrono::{DateTime, Utc};
use clickhouse::Row;
use marketprism_instrument::DataType;
use marketprism_normalizer::record::{CanonicalPayload, CanonicalRecord, Side};
use serde::{Deserialize, Serialize};

fn to_decimal_string(value: rust_decimal::Decimal) -> String {
    value.to_string()
}

fn side_str(side: Side) -> &'static str {
    match side {
        Side::Buy => "buy",
        Side::Sell => "sell",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Row)]
pub struct TradeRow {
    #[serde(with = "clickhouse::serde::chrono::datetime64::millis")]
    pub timestamp: DateTime<Utc>,
    pub exchange: String,
    pub market_type: String,
    pub symbol: String,
    pub data_source: String,
    pub trade_id: String,
    pub price: String,
    pub quantity: String,
    pub side: String,
    pub is_maker: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Row)]
pub struct OrderbookRow {
    #[serde(with = "clickhouse::serde::chrono::datetime64::millis")]
    pub timestamp: DateTime<Utc>,
    pub exchange: String,
    pub market_type: String,
    pub symbol: String,
    pub data_source: String,
    pub last_update_id: u64,
    pub best_bid_price: Option<String>,
    pub best_ask_price: Option<String>,
    /// JSON-encoded `[["price", "qty"], ...]`; ClickHouse side stores the
    /// raw string and parses it downstream, avoiding a `Decimal`-typed
    /// `Array(Tuple(..))` column the wire crate can't express directly.
    pub bids: String,
    pub asks: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Row)]
pub struct FundingRateRow {
    #[serde(with = "clickhouse::serde::chrono::datetime64::millis")]
    pub timestamp: DateTime<Utc>,
    pub exchange: String,
    pub market_type: String,
    pub symbol: String,
    pub data_source: String,
    pub funding_rate: String,
    #[serde(with = "clickhouse::serde::chrono::datetime64::millis")]
    pub funding_time: DateTime<Utc>,
    #[serde(with = "clickhouse::serde::chrono::datetime64::millis")]
    pub next_funding_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Row)]
pub struct OpenInterestRow {
    #[serde(with = "clickhouse::serde::chrono::datetime64::millis")]
    pub timestamp: DateTime<Utc>,
    pub exchange: String,
    pub market_type: String,
    pub symbol: String,
    pub data_source: String,
    pub open_interest: String,
    pub open_interest_value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Row)]
pub struct LiquidationRow {
    #[serde(with = "clickhouse::serde::chrono::datetime64::millis")]
    pub timestamp: DateTime<Utc>,
    pub exchange: String,
    pub market_type: String,
    pub symbol: String,
    pub data_source: String,
    pub side: String,
    pub price: String,
    pub quantity: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Row)]
pub struct LsrTopPositionRow {
    #[serde(with = "clickhouse::serde::chrono::datetime64::millis")]
    pub timestamp: DateTime<Utc>,
    pub exchange: String,
    pub market_type: String,
    pub symbol: String,
    pub data_source: String,
    pub long_position_ratio: String,
    pub short_position_ratio: String,
    pub period: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Row)]
pub struct LsrAllAccountRow {
    #[serde(with = "clickhouse::serde::chrono::datetime64::millis")]
    pub timestamp: DateTime<Utc>,
    pub exchange: String,
    pub market_type: String,
    pub symbol: String,
    pub data_source: String,
    pub long_account_ratio: String,
    pub short_account_ratio: String,
    pub period: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Row)]
pub struct VolatilityIndexRow {
    #[serde(with = "clickhouse::serde::chrono::datetime64::millis")]
    pub timestamp: DateTime<Utc>,
    pub exchange: String,
    pub market_type: String,
    pub symbol: String,
    pub data_source: String,
    pub index_value: String,
    pub underlying_asset: String,
}

#[derive(Debug, Clone)]
pub enum HotRow {
    Trade(TradeRow),
    Orderbook(OrderbookRow),
    FundingRate(FundingRateRow),
    OpenInterest(OpenInterestRow),
    Liquidation(LiquidationRow),
    LsrTopPosition(LsrTopPositionRow),
    LsrAllAccount(LsrAllAccountRow),
    VolatilityIndex(VolatilityIndexRow),
}

impl From<&CanonicalRecord> for HotRow {
    fn from(record: &CanonicalRecord) -> Self {
        let exchange = record.exchange.as_str().to_string();
        let market_type = record.market_type.as_str().to_string();
        let symbol = record.symbol.as_str().to_string();
        let data_source = record.data_source.to_string();

        match &record.payload {
            CanonicalPayload::Trade {
                trade_id,
                price,
                quantity,
                side,
                is_maker,
            } => HotRow::Trade(TradeRow {
                timestamp: record.timestamp,
                exchange,
                market_type,
                symbol,
                data_source,
                trade_id: trade_id.clone(),
                price: to_decimal_string(*price),
                quantity: to_decimal_string(*quantity),
                side: side_str(*side).to_string(),
                is_maker: *is_maker,
            }),
            CanonicalPayload::Orderbook {
                last_update_id,
                best_bid_price,
                best_ask_price,
                bids,
                asks,
            } => HotRow::Orderbook(OrderbookRow {
                timestamp: record.timestamp,
                exchange,
                market_type,
                symbol,
                data_source,
                last_update_id: *last_update_id,
                best_bid_price: best_bid_price.map(to_decimal_string),
                best_ask_price: best_ask_price.map(to_decimal_string),
                bids: encode_levels(bids),
                asks: encode_levels(asks),
            }),
            CanonicalPayload::FundingRate {
                funding_rate,
                funding_time,
                next_funding_time,
            } => HotRow::FundingRate(FundingRateRow {
                timestamp: record.timestamp,
                exchange,
                market_type,
                symbol,
                data_source,
                funding_rate: to_decimal_string(*funding_rate),
                funding_time: *funding_time,
                next_funding_time: *next_funding_time,
            }),
            CanonicalPayload::OpenInterest {
                open_interest,
                open_interest_value,
            } => HotRow::OpenInterest(OpenInterestRow {
                timestamp: record.timestamp,
                exchange,
                market_type,
                symbol,
                data_source,
                open_interest: to_decimal_string(*open_interest),
                open_interest_value: to_decimal_string(*open_interest_value),
            }),
            CanonicalPayload::Liquidation {
                side,
                price,
                quantity,
            } => HotRow::Liquidation(LiquidationRow {
                timestamp: record.timestamp,
                exchange,
                market_type,
                symbol,
                data_source,
                side: side_str(*side).to_string(),
                price: to_decimal_string(*price),
                quantity: to_decimal_string(*quantity),
            }),
            CanonicalPayload::LsrTopPosition {
                long_position_ratio,
                short_position_ratio,
                period,
            } => HotRow::LsrTopPosition(LsrTopPositionRow {
                timestamp: record.timestamp,
                exchange,
                market_type,
                symbol,
                data_source,
                long_position_ratio: to_decimal_string(*long_position_ratio),
                short_position_ratio: to_decimal_string(*short_position_ratio),
                period: period.clone(),
            }),
            CanonicalPayload::LsrAllAccount {
                long_account_ratio,
                short_account_ratio,
                period,
            } => HotRow::LsrAllAccount(LsrAllAccountRow {
                timestamp: record.timestamp,
                exchange,
                market_type,
                symbol,
                data_source,
                long_account_ratio: to_decimal_string(*long_account_ratio),
                short_account_ratio: to_decimal_string(*short_account_ratio),
                period: period.clone(),
            }),
            CanonicalPayload::VolatilityIndex {
                index_value,
                underlying_asset,
            } => HotRow::VolatilityIndex(VolatilityIndexRow {
                timestamp: record.timestamp,
                exchange,
                market_type,
                symbol,
                data_source,
                index_value: to_decimal_string(*index_value),
                underlying_asset: underlying_asset.clone(),
            }),
        }
    }
}

fn encode_levels(levels: &[(rust_decimal::Decimal, rust_decimal::Decimal)]) -> String {
    let pairs: Vec<(String, String)> = levels
        .iter()
        .map(|(p, q)| (to_decimal_string(*p), to_decimal_string(*q)))
        .collect();
    serde_json::to_string(&pairs).unwrap_or_else(|_| "[]".to_string())
}

const COMMON_COLUMNS: &[&str] = &["timestamp", "exchange", "market_type", "symbol", "data_source"];

/// Columns required on `data_type`'s table, beyond [`COMMON_COLUMNS`].
pub fn required_columns(data_type: DataType) -> Vec<&'static str> {
    let extra: &[&str] = match data_type {
        DataType::Trade => &["trade_id", "price", "quantity", "side", "is_maker"],
        DataType::Orderbook => &[
            "last_update_id",
            "best_bid_price",
            "best_ask_price",
            "bids",
            "asks",
        ],
        DataType::FundingRate => &["funding_rate", "funding_time", "next_funding_time"],
        DataType::OpenInterest => &["open_interest", "open_interest_value"],
        DataType::Liquidation => &["side", "price", "quantity"],
        DataType::LsrTopPosition => &["long_position_ratio", "short_position_ratio", "period"],
        DataType::LsrAllAccount => &["long_account_ratio", "short_account_ratio", "period"],
        DataType::VolatilityIndex => &["index_value", "underlying_asset"],
    };
    COMMON_COLUMNS.iter().chain(extra.iter()).copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use marketprism_instrument::{ExchangeId, MarketType, Symbol};
    use rust_decimal_macros::dec;

    #[test]
    fn trade_record_converts_to_trade_row() {
        let record = CanonicalRecord {
            timestamp: Utc::now(),
            exchange: ExchangeId::Binance,
            market_type: MarketType::Spot,
            symbol: Symbol::normalize("BTCUSDT"),
            data_source: "marketprism",
            payload: CanonicalPayload::Trade {
                trade_id: "42".into(),
                price: dec!(100),
                quantity: dec!(2),
                side: Side::Buy,
                is_maker: false,
            },
        };

        match HotRow::from(&record) {
            HotRow::Trade(row) => {
                assert_eq!(row.trade_id, "42");
                assert_eq!(row.price, "100");
                assert_eq!(row.side, "buy");
            }
            other => panic!("expected a trade row, got {other:?}"),
        }
    }

    #[test]
    fn price_keeps_full_decimal_precision_as_a_string() {
        let record = CanonicalRecord {
            timestamp: Utc::now(),
            exchange: ExchangeId::Binance,
            market_type: MarketType::Spot,
            symbol: Symbol::normalize("BTCUSDT"),
            data_source: "marketprism",
            payload: CanonicalPayload::Trade {
                trade_id: "42".into(),
                price: dec!(42000.123456789),
                quantity: dec!(0.00000001),
                side: Side::Buy,
                is_maker: false,
            },
        };

        match HotRow::from(&record) {
            HotRow::Trade(row) => {
                assert_eq!(row.price, "42000.123456789");
                assert_eq!(row.quantity, "0.00000001");
            }
            other => panic!("expected a trade row, got {other:?}"),
        }
    }

    #[test]
    fn required_columns_include_common_and_type_specific_fields() {
        let columns = required_columns(DataType::Trade);
        assert!(columns.contains(&"timestamp"));
        assert!(columns.contains(&"trade_id"));
        assert_eq!(columns.len(), 10);
    }
}
