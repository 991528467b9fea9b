//! Tracks per-table replication progress so a restarted replicator picks
//! up exactly where it left off instead of re-copying or skipping a
//! window.

use crate::error::ColdError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

#[async_trait]
pub trait ReplicationState: Send + Sync {
    async fn last_window_end(&self, table: &str) -> Result<Option<DateTime<Utc>>, ColdError>;
    async fn advance(&self, table: &str, window_end: DateTime<Utc>) -> Result<(), ColdError>;
}

#[derive(Default)]
pub struct InMemoryReplicationState {
    progress: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl InMemoryReplicationState {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReplicationState for InMemoryReplicationState {
    async fn last_window_end(&self, table: &str) -> Result<Option<DateTime<Utc>>, ColdError> {
        Ok(self.progress.lock().unwrap().get(table).copied())
    }

    async fn advance(&self, table: &str, window_end: DateTime<Utc>) -> Result<(), ColdError> {
        self.progress.lock().unwrap().insert(table.to_string(), window_end);
        Ok(())
    }
}

/// Backs `replication_state(table, last_window_end)` with a ClickHouse
/// table living in the cold database, per `spec.md` §4.6.
pub struct ClickHouseReplicationState {
    client: clickhouse::Client,
}

impl ClickHouseReplicationState {
    pub fn new(client: clickhouse::Client) -> Self {
        Self { client }
    }
}

#[derive(Debug, clickhouse::Row, serde::Deserialize)]
struct ReplicationStateRow {
    #[serde(with = "clickhouse::serde::chrono::datetime64::millis")]
    last_window_end: DateTime<Utc>,
}

#[async_trait]
impl ReplicationState for ClickHouseReplicationState {
    async fn last_window_end(&self, table: &str) -> Result<Option<DateTime<Utc>>, ColdError> {
        let row: Option<ReplicationStateRow> = self
            .client
            .query("SELECT last_window_end FROM replication_state WHERE table = ? ORDER BY last_window_end DESC LIMIT 1")
            .bind(table)
            .fetch_optional()
            .await?;
        Ok(row.map(|r| r.last_window_end))
    }

    async fn advance(&self, table: &str, window_end: DateTime<Utc>) -> Result<(), ColdError> {
        let mut insert = self.client.insert("replication_state")?;
        #[derive(serde::Serialize, clickhouse::Row)]
        struct InsertRow<'a> {
            table: &'a str,
            #[serde(with = "clickhouse::serde::chrono::datetime64::millis")]
            last_window_end: DateTime<Utc>,
        }
        insert
            .write(&InsertRow {
                table,
                last_window_end: window_end,
            })
            .await?;
        insert.end().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn in_memory_state_starts_empty_and_advances() {
        let state = InMemoryReplicationState::new();
        assert_eq!(state.last_window_end("trades").await.unwrap(), None);

        let t = Utc.timestamp_opt(600, 0).unwrap();
        state.advance("trades", t).await.unwrap();
        assert_eq!(state.last_window_end("trades").await.unwrap(), Some(t));
    }

    #[tokio::test]
    async fn progress_is_tracked_independently_per_table() {
        let state = InMemoryReplicationState::new();
        let t1 = Utc.timestamp_opt(600, 0).unwrap();
        let t2 = Utc.timestamp_opt(1200, 0).unwrap();
        state.advance("trades", t1).await.unwrap();
        state.advance("orderbooks", t2).await.unwrap();
        assert_eq!(state.last_window_end("trades").await.unwrap(), Some(t1));
        assert_eq!(state.last_window_end("orderbooks").await.unwrap(), Some(t2));
    }
}
