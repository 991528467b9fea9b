//! The canonical record schema every exchange's data funnels into, per
//! `spec.md` §3. `CanonicalRecord` is what the publisher subjects and what
//! the hot-storage consumer inserts into ClickHouse — nothing downstream of
//! this module ever looks at an exchange-specific field name again.

use chrono::{DateTime, Utc};
use marketprism_instrument::{DataType, ExchangeId, MarketType, Symbol};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

impl From<marketprism_data::event::Side> for Side {
    fn from(side: marketprism_data::event::Side) -> Self {
        match side {
            marketprism_data::event::Side::Buy => Side::Buy,
            marketprism_data::event::Side::Sell => Side::Sell,
        }
    }
}

/// One validated, canonical-schema record ready for subject derivation and
/// ClickHouse insertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub timestamp: DateTime<Utc>,
    pub exchange: ExchangeId,
    pub market_type: MarketType,
    pub symbol: Symbol,
    pub data_source: &'static str,
    #[serde(flatten)]
    pub payload: CanonicalPayload,
}

impl CanonicalRecord {
    /// The `data_type` segment of this record's canonical subject.
    pub fn data_type(&self) -> DataType {
        self.payload.data_type()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "data_type", rename_all = "snake_case")]
pub enum CanonicalPayload {
    Trade {
        trade_id: String,
        price: Decimal,
        quantity: Decimal,
        side: Side,
        is_maker: bool,
    },
    Orderbook {
        last_update_id: u64,
        best_bid_price: Option<Decimal>,
        best_ask_price: Option<Decimal>,
        bids: Vec<(Decimal, Decimal)>,
        asks: Vec<(Decimal, Decimal)>,
    },
    FundingRate {
        funding_rate: Decimal,
        funding_time: DateTime<Utc>,
        next_funding_time: DateTime<Utc>,
    },
    OpenInterest {
        open_interest: Decimal,
        open_interest_value: Decimal,
    },
    Liquidation {
        side: Side,
        price: Decimal,
        quantity: Decimal,
    },
    LsrTopPosition {
        long_position_ratio: Decimal,
        short_position_ratio: Decimal,
        period: String,
    },
    LsrAllAccount {
        long_account_ratio: Decimal,
        short_account_ratio: Decimal,
        period: String,
    },
    VolatilityIndex {
        index_value: Decimal,
        underlying_asset: String,
    },
}

impl CanonicalPayload {
    pub fn data_type(&self) -> DataType {
        match self {
            CanonicalPayload::Trade { .. } => DataType::Trade,
            CanonicalPayload::Orderbook { .. } => DataType::Orderbook,
            CanonicalPayload::FundingRate { .. } => DataType::FundingRate,
            CanonicalPayload::OpenInterest { .. } => DataType::OpenInterest,
            CanonicalPayload::Liquidation { .. } => DataType::Liquidation,
            CanonicalPayload::LsrTopPosition { .. } => DataType::LsrTopPosition,
            CanonicalPayload::LsrAllAccount { .. } => DataType::LsrAllAccount,
            CanonicalPayload::VolatilityIndex { .. } => DataType::VolatilityIndex,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_data_type_matches_variant() {
        let payload = CanonicalPayload::OpenInterest {
            open_interest: Decimal::ONE,
            open_interest_value: Decimal::ONE,
        };
        assert_eq!(payload.data_type(), DataType::OpenInterest);
    }
}
