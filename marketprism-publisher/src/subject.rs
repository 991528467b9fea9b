//! Canonical subject derivation: `{data_type}.{exchange}.{market_type}.{symbol}`.

use marketprism_normalizer::record::CanonicalRecord;

/// Build the canonical NATS subject for a record. This is the *only* path
/// by which a subject is produced — there is no way to publish to an
/// arbitrary subject string, which is how `spec.md` §4.4's "the publisher
/// rejects anything that does not produce a subject matching [the
/// pattern]" is enforced structurally rather than by a runtime check.
pub fn subject_for(record: &CanonicalRecord) -> String {
    format!(
        "{}.{}.{}.{}",
        record.data_type().as_str(),
        record.exchange.as_str(),
        record.market_type.as_str(),
        record.symbol
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use marketprism_instrument::{ExchangeId, MarketType, Symbol};
    use marketprism_normalizer::record::CanonicalPayload;
    use rust_decimal_macros::dec;

    #[test]
    fn builds_the_canonical_four_segment_subject() {
        let record = CanonicalRecord {
            timestamp: Utc::now(),
            exchange: ExchangeId::Okx,
            market_type: MarketType::Perpetual,
            symbol: Symbol::normalize("BTC-USDT-SWAP"),
            data_source: "marketprism",
            payload: CanonicalPayload::Trade {
                trade_id: "1".into(),
                price: dec!(1),
                quantity: dec!(1),
                side: marketprism_normalizer::record::Side::Buy,
                is_maker: false,
            },
        };
        assert_eq!(subject_for(&record), "trade.okx.perpetual.BTC-USDT");
    }
}
