//! Idempotent creation of the two JetStream streams, per `spec.md` §4.4.

use async_nats::jetstream::{
    self,
    consumer::DeliverPolicy,
    stream::{Config as StreamConfig, DiscardPolicy, RetentionPolicy},
};
use std::time::Duration;

pub const MARKET_DATA_STREAM: &str = "MARKET_DATA";
pub const ORDERBOOK_SNAP_STREAM: &str = "ORDERBOOK_SNAP";

fn market_data_config() -> StreamConfig {
    StreamConfig {
        name: MARKET_DATA_STREAM.to_string(),
        subjects: vec![
            "trade.>".to_string(),
            "funding_rate.>".to_string(),
            "open_interest.>".to_string(),
            "liquidation.>".to_string(),
            "lsr_top_position.>".to_string(),
            "lsr_all_account.>".to_string(),
            "volatility_index.>".to_string(),
        ],
        retention: RetentionPolicy::Limits,
        max_age: Duration::from_secs(24 * 3600),
        discard: DiscardPolicy::Old,
        ..Default::default()
    }
}

fn orderbook_snap_config() -> StreamConfig {
    StreamConfig {
        name: ORDERBOOK_SNAP_STREAM.to_string(),
        subjects: vec!["orderbook.>".to_string()],
        retention: RetentionPolicy::Limits,
        max_age: Duration::from_secs(6 * 3600),
        discard: DiscardPolicy::Old,
        ..Default::default()
    }
}

/// The `deliver_policy` each consumer of these streams should use:
/// orderbook snapshots supersede each other, so a restarting consumer only
/// wants the latest per subject.
pub fn deliver_policy_for(stream: &str) -> DeliverPolicy {
    if stream == ORDERBOOK_SNAP_STREAM {
        DeliverPolicy::LastPerSubject
    } else {
        DeliverPolicy::All
    }
}

/// Create both streams if they do not already exist. Safe to call on every
/// process startup.
pub async fn ensure_streams(jetstream: &jetstream::Context) -> Result<(), async_nats::Error> {
    jetstream
        .get_or_create_stream(market_data_config())
        .await?;
    jetstream
        .get_or_create_stream(orderbook_snap_config())
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn market_data_covers_all_seven_non_orderbook_subjects() {
        let config = market_data_config();
        assert_eq!(config.subjects.len(), 7);
        assert!(config.subjects.contains(&"trade.>".to_string()));
        assert!(!config.subjects.iter().any(|s| s.starts_with("orderbook")));
    }

    #[test]
    fn orderbook_snapshots_use_last_per_subject_delivery() {
        assert_eq!(
            deliver_policy_for(ORDERBOOK_SNAP_STREAM),
            DeliverPolicy::LastPerSubject
        );
        assert_eq!(deliver_policy_for(MARKET_DATA_STREAM), DeliverPolicy::All);
    }
}
