#![forbid(unsafe_code)]
#![warn(missing_debug_implementations, rust_2018_idioms)]

//! # marketprism-normalizer
//! Translates [`marketprism_data::MarketEvent`]s into canonical
//! [`record::CanonicalRecord`]s, enforcing the one schema every exchange
//! must agree to and rejecting (never panicking on) malformed input.

pub mod record;
pub mod validate;

use marketprism_data::event::{MarketEvent, MarketPayload};
use record::{CanonicalPayload, CanonicalRecord};
use validate::RejectionReason;

/// Stateless translation from a raw connector event to a canonical record,
/// or a counted rejection. Grounded on `barter-data`'s `From<(ExchangeId,
/// InstrumentKey, ExchangeMessage)> for MarketIter<...>` conversion idiom,
/// collapsed into a single free function since MarketPrism's canonical
/// schema has no exchange-specific variation left to encode generically.
pub fn normalize(event: MarketEvent) -> Result<CanonicalRecord, RejectionReason> {
    validate::validate_event(&event)?;

    let payload = match event.payload {
        MarketPayload::Trade(t) => CanonicalPayload::Trade {
            trade_id: t.trade_id,
            price: t.price,
            quantity: t.quantity,
            side: t.side.into(),
            is_maker: t.is_maker,
        },
        MarketPayload::OrderbookSnapshot(o) => CanonicalPayload::Orderbook {
            last_update_id: o.last_update_id,
            best_bid_price: o.best_bid_price,
            best_ask_price: o.best_ask_price,
            bids: o.bids,
            asks: o.asks,
        },
        MarketPayload::FundingRate(f) => CanonicalPayload::FundingRate {
            funding_rate: f.funding_rate,
            funding_time: f.funding_time,
            next_funding_time: f.next_funding_time,
        },
        MarketPayload::OpenInterest(o) => CanonicalPayload::OpenInterest {
            open_interest: o.open_interest,
            open_interest_value: o.open_interest_value,
        },
        MarketPayload::Liquidation(l) => CanonicalPayload::Liquidation {
            side: l.side.into(),
            price: l.price,
            quantity: l.quantity,
        },
        MarketPayload::LsrTopPosition(l) => CanonicalPayload::LsrTopPosition {
            long_position_ratio: l.long_ratio,
            short_position_ratio: l.short_ratio,
            period: l.period,
        },
        MarketPayload::LsrAllAccount(l) => CanonicalPayload::LsrAllAccount {
            long_account_ratio: l.long_ratio,
            short_account_ratio: l.short_ratio,
            period: l.period,
        },
        MarketPayload::VolatilityIndex(v) => CanonicalPayload::VolatilityIndex {
            index_value: v.index_value,
            underlying_asset: v.underlying_asset,
        },
    };

    Ok(CanonicalRecord {
        timestamp: event.time_exchange,
        exchange: event.exchange,
        market_type: event.market_type,
        symbol: event.symbol,
        data_source: "marketprism",
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use marketprism_data::event::{RawTrade, Side};
    use marketprism_instrument::{ExchangeId, MarketType, Symbol};
    use rust_decimal_macros::dec;

    fn trade_event() -> MarketEvent {
        MarketEvent {
            exchange: ExchangeId::Binance,
            market_type: MarketType::Spot,
            symbol: Symbol::normalize("BTCUSDT"),
            time_exchange: Utc::now(),
            time_received: Utc::now(),
            payload: MarketPayload::Trade(RawTrade {
                trade_id: "1".into(),
                price: dec!(42000.50),
                quantity: dec!(0.01),
                side: Side::Buy,
                is_maker: false,
            }),
        }
    }

    #[test]
    fn normalizes_a_valid_trade() {
        let record = normalize(trade_event()).unwrap();
        assert_eq!(record.symbol.as_str(), "BTC-USDT");
        assert_eq!(record.data_source, "marketprism");
    }

    #[test]
    fn rejects_non_positive_price() {
        let mut event = trade_event();
        event.payload = MarketPayload::Trade(RawTrade {
            trade_id: "1".into(),
            price: dec!(0),
            quantity: dec!(1),
            side: Side::Buy,
            is_maker: false,
        });
        assert!(normalize(event).is_err());
    }

    #[test]
    fn normalization_is_idempotent_given_the_same_input() {
        let a = normalize(trade_event()).unwrap();
        let b = normalize(trade_event()).unwrap();
        assert_eq!(a.symbol, b.symbol);
        assert_eq!(a.exchange, b.exchange);
    }
}
