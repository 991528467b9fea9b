use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Unique identifier for a supported exchange.
///
/// ### Notes
/// Unlike `barter-instrument`'s `ExchangeId`, MarketPrism's subject naming
/// (`{data_type}.{exchange}.{market_type}.{symbol}`) uses the exchange's
/// *base* name with no per-market suffix — the market type is carried as
/// its own subject segment instead, see [`MarketType`].
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeId {
    Binance,
    Okx,
    Deribit,
}

impl ExchangeId {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ExchangeId::Binance => "binance",
            ExchangeId::Okx => "okx",
            ExchangeId::Deribit => "deribit",
        }
    }

    /// Parses the config-file spelling of an exchange name (same spelling
    /// as [`ExchangeId::as_str`]), used when binding `collector.exchanges`
    /// keys to a concrete connector.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "binance" => Some(ExchangeId::Binance),
            "okx" => Some(ExchangeId::Okx),
            "deribit" => Some(ExchangeId::Deribit),
            _ => None,
        }
    }
}

/// Trading-product category of an instrument, carried as its own subject
/// segment and as a payload field that must equal the subject's segment.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
#[serde(rename_all = "snake_case")]
pub enum MarketType {
    Spot,
    Perpetual,
    Options,
}

impl MarketType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MarketType::Spot => "spot",
            MarketType::Perpetual => "perpetual",
            MarketType::Options => "options",
        }
    }
}

/// One of the eight fixed categories of market data the system handles,
/// used as the first segment of every canonical subject.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Orderbook,
    Trade,
    FundingRate,
    OpenInterest,
    Liquidation,
    LsrTopPosition,
    LsrAllAccount,
    VolatilityIndex,
}

impl DataType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            DataType::Orderbook => "orderbook",
            DataType::Trade => "trade",
            DataType::FundingRate => "funding_rate",
            DataType::OpenInterest => "open_interest",
            DataType::Liquidation => "liquidation",
            DataType::LsrTopPosition => "lsr_top_position",
            DataType::LsrAllAccount => "lsr_all_account",
            DataType::VolatilityIndex => "volatility_index",
        }
    }

    /// ClickHouse table name that stores records of this [`DataType`].
    pub const fn table_name(&self) -> &'static str {
        match self {
            DataType::Orderbook => "orderbooks",
            DataType::Trade => "trades",
            DataType::FundingRate => "funding_rates",
            DataType::OpenInterest => "open_interests",
            DataType::Liquidation => "liquidations",
            DataType::LsrTopPosition => "lsr_top_positions",
            DataType::LsrAllAccount => "lsr_all_accounts",
            DataType::VolatilityIndex => "volatility_indices",
        }
    }

    /// Parses the config-file spelling of a data type (same spelling as
    /// [`DataType::as_str`]), used when binding `collector.exchanges.*.data_types`
    /// entries to a connector subscription.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "orderbook" => Some(DataType::Orderbook),
            "trade" => Some(DataType::Trade),
            "funding_rate" => Some(DataType::FundingRate),
            "open_interest" => Some(DataType::OpenInterest),
            "liquidation" => Some(DataType::Liquidation),
            "lsr_top_position" => Some(DataType::LsrTopPosition),
            "lsr_all_account" => Some(DataType::LsrAllAccount),
            "volatility_index" => Some(DataType::VolatilityIndex),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exchange_id_as_str_matches_subject_segment() {
        assert_eq!(ExchangeId::Binance.as_str(), "binance");
        assert_eq!(ExchangeId::Okx.as_str(), "okx");
        assert_eq!(ExchangeId::Deribit.as_str(), "deribit");
    }

    #[test]
    fn data_type_table_name_is_plural_snake_case() {
        assert_eq!(DataType::Trade.table_name(), "trades");
        assert_eq!(DataType::LsrTopPosition.table_name(), "lsr_top_positions");
    }
}
