//! Validation rules applied before a raw event is accepted as canonical,
//! per `spec.md` §4.2: missing mandatory fields, non-positive decimals,
//! out-of-window timestamps. Rejections are counted by the caller, never a
//! panic.

use chrono::{Duration, Utc};
use marketprism_data::event::{MarketEvent, MarketPayload};
use rust_decimal::Decimal;
use thiserror::Error;

const TIMESTAMP_PAST_WINDOW: Duration = Duration::hours(24);
const TIMESTAMP_FUTURE_WINDOW: Duration = Duration::minutes(5);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    #[error("timestamp {0} is outside the accepted [-24h, +5m] window")]
    TimestampOutOfWindow(String),

    #[error("decimal field '{field}' must be positive, got {value}")]
    NonPositiveDecimal { field: &'static str, value: String },

    #[error("mandatory field '{0}' is missing or empty")]
    MissingField(&'static str),
}

pub fn validate_event(event: &MarketEvent) -> Result<(), RejectionReason> {
    validate_timestamp(event.time_exchange)?;
    validate_payload(&event.payload)
}

fn validate_timestamp(ts: chrono::DateTime<Utc>) -> Result<(), RejectionReason> {
    let now = Utc::now();
    if ts < now - TIMESTAMP_PAST_WINDOW || ts > now + TIMESTAMP_FUTURE_WINDOW {
        return Err(RejectionReason::TimestampOutOfWindow(ts.to_rfc3339()));
    }
    Ok(())
}

fn require_positive(field: &'static str, value: Decimal) -> Result<(), RejectionReason> {
    if value <= Decimal::ZERO {
        return Err(RejectionReason::NonPositiveDecimal {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

fn validate_payload(payload: &MarketPayload) -> Result<(), RejectionReason> {
    match payload {
        MarketPayload::Trade(t) => {
            if t.trade_id.is_empty() {
                return Err(RejectionReason::MissingField("trade_id"));
            }
            require_positive("price", t.price)?;
            require_positive("quantity", t.quantity)?;
            Ok(())
        }
        MarketPayload::OrderbookSnapshot(o) => {
            if let Some(bid) = o.best_bid_price {
                require_positive("best_bid_price", bid)?;
            }
            if let Some(ask) = o.best_ask_price {
                require_positive("best_ask_price", ask)?;
            }
            Ok(())
        }
        MarketPayload::FundingRate(_) => Ok(()),
        MarketPayload::OpenInterest(o) => {
            require_positive("open_interest", o.open_interest)?;
            Ok(())
        }
        MarketPayload::Liquidation(l) => {
            require_positive("price", l.price)?;
            require_positive("quantity", l.quantity)?;
            Ok(())
        }
        MarketPayload::LsrTopPosition(l) | MarketPayload::LsrAllAccount(l) => {
            if l.period.is_empty() {
                return Err(RejectionReason::MissingField("period"));
            }
            Ok(())
        }
        MarketPayload::VolatilityIndex(v) => {
            if v.underlying_asset.is_empty() {
                return Err(RejectionReason::MissingField("underlying_asset"));
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use marketprism_data::event::{RawTrade, Side};
    use marketprism_instrument::{ExchangeId, MarketType, Symbol};
    use rust_decimal_macros::dec;

    fn base_event(payload: MarketPayload) -> MarketEvent {
        MarketEvent {
            exchange: ExchangeId::Binance,
            market_type: MarketType::Spot,
            symbol: Symbol::normalize("BTC-USDT"),
            time_exchange: Utc::now(),
            time_received: Utc::now(),
            payload,
        }
    }

    #[test]
    fn rejects_timestamp_far_in_the_past() {
        let mut event = base_event(MarketPayload::Trade(RawTrade {
            trade_id: "1".into(),
            price: dec!(1),
            quantity: dec!(1),
            side: Side::Buy,
            is_maker: false,
        }));
        event.time_exchange = Utc::now() - Duration::hours(48);
        assert!(matches!(
            validate_event(&event),
            Err(RejectionReason::TimestampOutOfWindow(_))
        ));
    }

    #[test]
    fn rejects_empty_trade_id() {
        let event = base_event(MarketPayload::Trade(RawTrade {
            trade_id: String::new(),
            price: dec!(1),
            quantity: dec!(1),
            side: Side::Buy,
            is_maker: false,
        }));
        assert!(matches!(
            validate_event(&event),
            Err(RejectionReason::MissingField("trade_id"))
        ));
    }

    #[test]
    fn accepts_timestamp_within_future_grace_window() {
        let mut event = base_event(MarketPayload::Trade(RawTrade {
            trade_id: "1".into(),
            price: dec!(1),
            quantity: dec!(1),
            side: Side::Buy,
            is_maker: false,
        }));
        event.time_exchange = Utc::now() + Duration::minutes(4);
        assert!(validate_event(&event).is_ok());
    }
}
