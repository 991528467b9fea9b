//! Typed configuration tree, per `spec.md` §6: one YAML file per process,
//! overridable per-key by `MARKETPRISM_{PATH}` environment variables.
//! Struct shape and the `load`/`Default` pairing follow
//! `barter-strategy/src/config.rs`'s `StrategyConfig`; the format is YAML
//! rather than JSON per `SPEC_FULL.md`'s explicit choice of `serde_yaml`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse yaml config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketPrismConfig {
    pub nats: NatsConfig,
    pub clickhouse: ClickHouseConfig,
    pub collector: CollectorConfig,
    pub publisher: PublisherConfig,
    pub consumer: ConsumerConfig,
    pub replicator: ReplicatorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatsConfig {
    pub servers: Vec<String>,
    pub reconnect_max_attempts: u32,
    pub ack_wait_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickHouseConfig {
    pub host: String,
    /// Kept for config-schema parity with `spec.md` §6; `ClickHouseStore`
    /// only connects over `port_http` since the `clickhouse` crate has no
    /// native-protocol client to use it with.
    pub port_native: u16,
    pub port_http: u16,
    pub database: String,
    pub pool_max: u32,
    pub insert_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitsConfig {
    pub weight_per_minute: u32,
    pub requests_per_minute: u32,
    pub orders_per_second: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeCollectorConfig {
    pub enabled: bool,
    pub symbols: Vec<String>,
    pub data_types: Vec<String>,
    pub depth_limit: u32,
    pub snapshot_interval_seconds: u64,
    pub rate_limits: RateLimitsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    pub exchanges: HashMap<String, ExchangeCollectorConfig>,
}

/// `Publisher` publishes one canonical record per `publish()` call (no
/// batching layer sits in front of NATS), so this carries only the knobs it
/// actually reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublisherConfig {
    pub fallback_queue_size: usize,
}

/// Keyed by [`marketprism_instrument::DataType::as_str`]; consulted by
/// `marketprism-storage-hot`'s `resolve_batch_policy` with its own
/// hardcoded tiers as the fallback for any data type missing here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerConfig {
    pub batch_sizes: HashMap<String, usize>,
    pub flush_intervals: HashMap<String, u64>,
    pub spool_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicatorConfig {
    pub window_seconds: u64,
    pub safety_lag_seconds: u64,
    pub delete_after_copy: bool,
    pub retention_days_cold: u32,
}

impl Default for MarketPrismConfig {
    fn default() -> Self {
        let mut batch_sizes = HashMap::new();
        batch_sizes.insert("trade".to_string(), 150);
        batch_sizes.insert("orderbook".to_string(), 150);
        batch_sizes.insert("funding_rate".to_string(), 50);
        batch_sizes.insert("open_interest".to_string(), 50);
        batch_sizes.insert("liquidation".to_string(), 20);
        batch_sizes.insert("lsr_top_position".to_string(), 20);
        batch_sizes.insert("lsr_all_account".to_string(), 20);
        batch_sizes.insert("volatility_index".to_string(), 20);

        let mut flush_intervals = HashMap::new();
        flush_intervals.insert("trade".to_string(), 1);
        flush_intervals.insert("orderbook".to_string(), 1);
        flush_intervals.insert("funding_rate".to_string(), 2);
        flush_intervals.insert("open_interest".to_string(), 2);
        flush_intervals.insert("liquidation".to_string(), 5);
        flush_intervals.insert("lsr_top_position".to_string(), 5);
        flush_intervals.insert("lsr_all_account".to_string(), 5);
        flush_intervals.insert("volatility_index".to_string(), 5);

        Self {
            nats: NatsConfig {
                servers: vec!["nats://127.0.0.1:4222".to_string()],
                reconnect_max_attempts: 60,
                ack_wait_seconds: 60,
            },
            clickhouse: ClickHouseConfig {
                host: "127.0.0.1".to_string(),
                port_native: 9000,
                port_http: 8123,
                database: "marketprism_hot".to_string(),
                pool_max: 16,
                insert_timeout_seconds: 30,
            },
            collector: CollectorConfig {
                exchanges: HashMap::new(),
            },
            publisher: PublisherConfig {
                fallback_queue_size: 10_000,
            },
            consumer: ConsumerConfig {
                batch_sizes,
                flush_intervals,
                spool_dir: "./spool".to_string(),
            },
            replicator: ReplicatorConfig {
                window_seconds: 600,
                safety_lag_seconds: 900,
                delete_after_copy: false,
                retention_days_cold: 365,
            },
        }
    }
}

impl MarketPrismConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut config: Self = serde_yaml::from_str(&contents)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Walk the flat, non-nested keys `spec.md` §6 lists and override them
    /// from `MARKETPRISM_{PATH}` if set. Per-exchange collector keys are
    /// deliberately out of scope here: their path includes a dynamic
    /// exchange name segment, and the spec's key list treats per-exchange
    /// tuning as YAML-only configuration.
    pub fn apply_env_overrides(&mut self) {
        use std::env::var;

        if let Ok(v) = var("MARKETPRISM_NATS_SERVERS") {
            self.nats.servers = v.split(',').map(|s| s.trim().to_string()).collect();
        }
        override_parsed(&mut self.nats.reconnect_max_attempts, "MARKETPRISM_NATS_RECONNECT_MAX_ATTEMPTS");
        override_parsed(&mut self.nats.ack_wait_seconds, "MARKETPRISM_NATS_ACK_WAIT_SECONDS");

        override_string(&mut self.clickhouse.host, "MARKETPRISM_CLICKHOUSE_HOST");
        override_parsed(&mut self.clickhouse.port_native, "MARKETPRISM_CLICKHOUSE_PORT_NATIVE");
        override_parsed(&mut self.clickhouse.port_http, "MARKETPRISM_CLICKHOUSE_PORT_HTTP");
        override_string(&mut self.clickhouse.database, "MARKETPRISM_CLICKHOUSE_DATABASE");
        override_parsed(&mut self.clickhouse.pool_max, "MARKETPRISM_CLICKHOUSE_POOL_MAX");
        override_parsed(
            &mut self.clickhouse.insert_timeout_seconds,
            "MARKETPRISM_CLICKHOUSE_INSERT_TIMEOUT_SECONDS",
        );

        override_parsed(
            &mut self.publisher.fallback_queue_size,
            "MARKETPRISM_PUBLISHER_FALLBACK_QUEUE_SIZE",
        );

        override_string(&mut self.consumer.spool_dir, "MARKETPRISM_CONSUMER_SPOOL_DIR");

        override_parsed(&mut self.replicator.window_seconds, "MARKETPRISM_REPLICATOR_WINDOW_SECONDS");
        override_parsed(
            &mut self.replicator.safety_lag_seconds,
            "MARKETPRISM_REPLICATOR_SAFETY_LAG_SECONDS",
        );
        override_parsed(&mut self.replicator.delete_after_copy, "MARKETPRISM_REPLICATOR_DELETE_AFTER_COPY");
        override_parsed(
            &mut self.replicator.retention_days_cold,
            "MARKETPRISM_REPLICATOR_RETENTION_DAYS_COLD",
        );
    }

    /// Startup validation; an invalid config maps to exit code 2.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nats.servers.is_empty() {
            return Err(ConfigError::Invalid("nats.servers must not be empty".into()));
        }
        if self.clickhouse.host.is_empty() {
            return Err(ConfigError::Invalid("clickhouse.host must not be empty".into()));
        }
        if self.clickhouse.pool_max < 2 {
            return Err(ConfigError::Invalid("clickhouse.pool_max must be at least 2".into()));
        }
        if self.publisher.fallback_queue_size == 0 {
            return Err(ConfigError::Invalid("publisher.fallback_queue_size must be positive".into()));
        }
        if self.replicator.safety_lag_seconds < self.replicator.window_seconds {
            return Err(ConfigError::Invalid(
                "replicator.safety_lag_seconds must be at least one window wide".into(),
            ));
        }
        for (name, exchange) in &self.collector.exchanges {
            if exchange.enabled && exchange.symbols.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "collector.exchanges.{name} is enabled but has no symbols"
                )));
            }
        }
        Ok(())
    }
}

fn override_string(field: &mut String, var: &str) {
    if let Ok(v) = std::env::var(var) {
        *field = v;
    }
}

fn override_parsed<T: std::str::FromStr>(field: &mut T, var: &str) {
    if let Ok(v) = std::env::var(var) {
        if let Ok(parsed) = v.parse() {
            *field = parsed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_passes_validation() {
        assert!(MarketPrismConfig::default().validate().is_ok());
    }

    #[test]
    fn empty_nats_servers_fails_validation() {
        let mut config = MarketPrismConfig::default();
        config.nats.servers.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn enabled_exchange_without_symbols_fails_validation() {
        let mut config = MarketPrismConfig::default();
        config.collector.exchanges.insert(
            "binance".to_string(),
            ExchangeCollectorConfig {
                enabled: true,
                symbols: vec![],
                data_types: vec!["trade".to_string()],
                depth_limit: 400,
                snapshot_interval_seconds: 60,
                rate_limits: RateLimitsConfig {
                    weight_per_minute: 1200,
                    requests_per_minute: 1200,
                    orders_per_second: 10,
                },
            },
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_override_replaces_clickhouse_host() {
        std::env::set_var("MARKETPRISM_CLICKHOUSE_HOST", "ch.internal");
        let mut config = MarketPrismConfig::default();
        config.apply_env_overrides();
        std::env::remove_var("MARKETPRISM_CLICKHOUSE_HOST");
        assert_eq!(config.clickhouse.host, "ch.internal");
    }

    #[test]
    fn safety_lag_shorter_than_window_fails_validation() {
        let mut config = MarketPrismConfig::default();
        config.replicator.safety_lag_seconds = 1;
        assert!(config.validate().is_err());
    }
}
