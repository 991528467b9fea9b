//! Drives the windowed hot-to-cold copy per table, per `spec.md` §4.6.
//! Backoff on failure follows the same attempt-counter idiom as
//! `marketprism-data`'s connector reconnect loop, but with the spec's own
//! discrete step sequence instead of exponential-with-jitter: a window
//! copy either succeeds outright or is retried a handful of times before
//! the whole tick is skipped and picked back up next tick.

use crate::error::ColdError;
use crate::state::ReplicationState;
use crate::window::next_window;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const RETRY_CAP: Duration = Duration::from_secs(300);

/// `spec.md` §4.6: 1s, 5s, 30s, then doubling up to a 5-minute cap.
pub fn backoff_delay(attempt: u32) -> Duration {
    let secs = match attempt {
        0 => 1,
        1 => 5,
        2 => 30,
        n => 30u64.saturating_mul(1u64 << (n - 2).min(10)),
    };
    Duration::from_secs(secs).min(RETRY_CAP)
}

pub const ALL_TABLES: &[&str] = &[
    "trades",
    "orderbooks",
    "funding_rates",
    "open_interests",
    "liquidations",
    "lsr_top_positions",
    "lsr_all_accounts",
    "volatility_indices",
];

pub struct Replicator {
    hot: clickhouse::Client,
    cold: clickhouse::Client,
    hot_database: String,
    cold_database: String,
    state: Arc<dyn ReplicationState>,
    delete_after_copy: bool,
}

impl Replicator {
    /// `hot_database`/`cold_database` must be the actual configured
    /// database names `hot`/`cold` are connected to — the cross-database
    /// `INSERT`/`ALTER` statements below qualify on them directly rather
    /// than on the literal strings `"hot"`/`"cold"`, which are almost
    /// never the real database names.
    pub fn new(
        hot: clickhouse::Client,
        cold: clickhouse::Client,
        hot_database: impl Into<String>,
        cold_database: impl Into<String>,
        state: Arc<dyn ReplicationState>,
        delete_after_copy: bool,
    ) -> Self {
        Self {
            hot,
            cold,
            hot_database: hot_database.into(),
            cold_database: cold_database.into(),
            state,
            delete_after_copy,
        }
    }

    /// Attempt to copy the next eligible window for `table`, retrying on
    /// failure per [`backoff_delay`]. Returns `Ok(true)` if a window was
    /// copied, `Ok(false)` if none was yet eligible.
    pub async fn tick(&self, table: &str, now: DateTime<Utc>, max_attempts: u32) -> Result<bool, ColdError> {
        let last_end = self
            .state
            .last_window_end(table)
            .await?
            .unwrap_or_else(|| now - crate::window::WINDOW - crate::window::SAFETY_LAG);

        let Some((start, end)) = next_window(last_end, now) else {
            return Ok(false);
        };

        let mut attempt = 0;
        loop {
            match self.copy_window(table, start, end).await {
                Ok(()) => {
                    self.state.advance(table, end).await?;
                    info!(table, %start, %end, "replicated window to cold storage");
                    return Ok(true);
                }
                Err(e) if attempt + 1 < max_attempts => {
                    warn!(table, %start, %end, attempt, error = %e, "window copy failed, retrying");
                    tokio::time::sleep(backoff_delay(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn copy_window(&self, table: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), ColdError> {
        let hot_count = self.count_in_window(&self.hot, table, start, end).await?;

        let cold_database = &self.cold_database;
        let hot_database = &self.hot_database;
        self.hot
            .query(&format!(
                "INSERT INTO {cold_database}.{table} SELECT * FROM {hot_database}.{table} WHERE timestamp >= ? AND timestamp < ?"
            ))
            .bind(start)
            .bind(end)
            .execute()
            .await?;

        let cold_count = self.count_in_window(&self.cold, table, start, end).await?;
        metrics::gauge!("marketprism_cold_replication_lag_rows", "table" => table.to_string())
            .set((hot_count - cold_count).max(0) as f64);

        if self.delete_after_copy && cold_count >= hot_count {
            self.hot
                .query(&format!(
                    "ALTER TABLE {hot_database}.{table} DELETE WHERE timestamp >= ? AND timestamp < ?"
                ))
                .bind(start)
                .bind(end)
                .execute()
                .await?;
        }

        Ok(())
    }

    async fn count_in_window(
        &self,
        client: &clickhouse::Client,
        table: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64, ColdError> {
        let count: i64 = client
            .query(&format!("SELECT count() FROM {table} WHERE timestamp >= ? AND timestamp < ?"))
            .bind(start)
            .bind(end)
            .fetch_one()
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_follows_the_documented_step_sequence() {
        assert_eq!(backoff_delay(0), Duration::from_secs(1));
        assert_eq!(backoff_delay(1), Duration::from_secs(5));
        assert_eq!(backoff_delay(2), Duration::from_secs(30));
    }

    #[test]
    fn backoff_is_capped_at_five_minutes() {
        assert_eq!(backoff_delay(10), RETRY_CAP);
        assert_eq!(backoff_delay(50), RETRY_CAP);
    }
}
