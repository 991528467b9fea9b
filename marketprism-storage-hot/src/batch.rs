//! Per-data-type batching policy, per `spec.md` §4.5.

use marketprism_instrument::DataType;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPolicy {
    pub max_size: usize,
    pub flush_interval: Duration,
}

/// Hardcoded tiers used when `consumer.batch_sizes`/`consumer.flush_intervals`
/// has no entry for `data_type`, and by [`resolve_batch_policy`]'s callers
/// that have no config to consult at all (the `#[cfg(test)]` suite below).
pub fn batch_policy_for(data_type: DataType) -> BatchPolicy {
    match data_type {
        DataType::Trade | DataType::Orderbook => BatchPolicy {
            max_size: 150,
            flush_interval: Duration::from_secs(1),
        },
        DataType::FundingRate | DataType::OpenInterest => BatchPolicy {
            max_size: 50,
            flush_interval: Duration::from_secs(2),
        },
        DataType::Liquidation
        | DataType::LsrTopPosition
        | DataType::LsrAllAccount
        | DataType::VolatilityIndex => BatchPolicy {
            max_size: 20,
            flush_interval: Duration::from_secs(5),
        },
    }
}

/// Looks up `data_type` in the configured `consumer.batch_sizes`/
/// `consumer.flush_intervals` maps (keyed by [`DataType::as_str`]), falling
/// back to [`batch_policy_for`]'s hardcoded tier field-by-field when a map
/// has no entry for it.
pub fn resolve_batch_policy(
    data_type: DataType,
    batch_sizes: &HashMap<String, usize>,
    flush_intervals: &HashMap<String, u64>,
) -> BatchPolicy {
    let default = batch_policy_for(data_type);
    BatchPolicy {
        max_size: batch_sizes.get(data_type.as_str()).copied().unwrap_or(default.max_size),
        flush_interval: flush_intervals
            .get(data_type.as_str())
            .map(|secs| Duration::from_secs(*secs))
            .unwrap_or(default.flush_interval),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_frequency_types_batch_150_flush_1s() {
        for dt in [DataType::Trade, DataType::Orderbook] {
            let policy = batch_policy_for(dt);
            assert_eq!(policy.max_size, 150);
            assert_eq!(policy.flush_interval, Duration::from_secs(1));
        }
    }

    #[test]
    fn low_frequency_types_batch_20_flush_5s() {
        for dt in [
            DataType::Liquidation,
            DataType::LsrTopPosition,
            DataType::LsrAllAccount,
            DataType::VolatilityIndex,
        ] {
            let policy = batch_policy_for(dt);
            assert_eq!(policy.max_size, 20);
            assert_eq!(policy.flush_interval, Duration::from_secs(5));
        }
    }

    #[test]
    fn mid_frequency_types_batch_50_flush_2s() {
        for dt in [DataType::FundingRate, DataType::OpenInterest] {
            let policy = batch_policy_for(dt);
            assert_eq!(policy.max_size, 50);
            assert_eq!(policy.flush_interval, Duration::from_secs(2));
        }
    }

    #[test]
    fn resolve_batch_policy_prefers_configured_values() {
        let mut batch_sizes = HashMap::new();
        batch_sizes.insert("trade".to_string(), 300);
        let mut flush_intervals = HashMap::new();
        flush_intervals.insert("trade".to_string(), 10);

        let policy = resolve_batch_policy(DataType::Trade, &batch_sizes, &flush_intervals);
        assert_eq!(policy.max_size, 300);
        assert_eq!(policy.flush_interval, Duration::from_secs(10));
    }

    #[test]
    fn resolve_batch_policy_falls_back_to_hardcoded_tier_when_unconfigured() {
        let policy = resolve_batch_policy(DataType::VolatilityIndex, &HashMap::new(), &HashMap::new());
        assert_eq!(policy, batch_policy_for(DataType::VolatilityIndex));
    }
}
