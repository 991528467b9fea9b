//! Local spool used when ClickHouse has rejected a batch three times
//! running. Batches are appended as length-prefixed JSON frames so a
//! half-written frame at the tail (process killed mid-write) is
//! detectable and skippable rather than corrupting the whole file.

use crate::error::StoreError;
use marketprism_instrument::DataType;
use marketprism_normalizer::record::CanonicalRecord;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

pub const SPOOL_DRAIN_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30);

pub struct Spool {
    dir: PathBuf,
}

impl Spool {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, data_type: DataType) -> PathBuf {
        self.dir.join(format!("{}.spool", data_type.table_name()))
    }

    /// Append a failed batch; called on the third consecutive insert
    /// failure so the consumer can still ack and move on.
    pub async fn append(
        &self,
        data_type: DataType,
        records: &[CanonicalRecord],
    ) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(data_type);
        let mut file = OpenOptions::new().create(true).append(true).open(&path).await?;

        let payload = serde_json::to_vec(records).map_err(|_| StoreError::CorruptSpool)?;
        file.write_all(&(payload.len() as u32).to_le_bytes()).await?;
        file.write_all(&payload).await?;
        file.flush().await?;

        metrics::gauge!("marketprism_storage_hot_spool_bytes", "table" => data_type.table_name().to_string())
            .increment(payload.len() as f64 + 4.0);

        Ok(())
    }

    /// Read every complete frame from `data_type`'s spool file and
    /// truncate it to empty once fully read. A trailing partial frame
    /// (fewer than its declared length available) is left untouched so a
    /// future append can complete it... in practice `append` always
    /// writes whole frames, so this only guards against a truncated file
    /// from an unclean shutdown.
    pub async fn drain(&self, data_type: DataType) -> Result<Vec<Vec<CanonicalRecord>>, StoreError> {
        let path = self.path_for(data_type);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let mut file = File::open(&path).await?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).await?;

        let mut batches = Vec::new();
        let mut offset = 0usize;
        while offset + 4 <= buf.len() {
            let len = u32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap()) as usize;
            offset += 4;
            if offset + len > buf.len() {
                break;
            }
            let frame = &buf[offset..offset + len];
            offset += len;
            match serde_json::from_slice(frame) {
                Ok(records) => batches.push(records),
                Err(_) => continue,
            }
        }

        if !batches.is_empty() {
            tokio::fs::remove_file(&path).await?;
        }
        Ok(batches)
    }

    pub fn spool_dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use marketprism_instrument::{ExchangeId, MarketType, Symbol};
    use marketprism_normalizer::record::{CanonicalPayload, Side};
    use rust_decimal_macros::dec;

    fn trade_record() -> CanonicalRecord {
        CanonicalRecord {
            timestamp: Utc::now(),
            exchange: ExchangeId::Binance,
            market_type: MarketType::Spot,
            symbol: Symbol::normalize("BTCUSDT"),
            data_source: "marketprism",
            payload: CanonicalPayload::Trade {
                trade_id: "1".into(),
                price: dec!(1),
                quantity: dec!(1),
                side: Side::Buy,
                is_maker: false,
            },
        }
    }

    #[tokio::test]
    async fn append_then_drain_round_trips_batches() {
        let dir = tempfile::tempdir().unwrap();
        let spool = Spool::new(dir.path());

        spool
            .append(DataType::Trade, &[trade_record(), trade_record()])
            .await
            .unwrap();
        spool.append(DataType::Trade, &[trade_record()]).await.unwrap();

        let batches = spool.drain(DataType::Trade).await.unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[1].len(), 1);

        // File is removed once fully drained.
        let again = spool.drain(DataType::Trade).await.unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn drain_of_nonexistent_spool_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let spool = Spool::new(dir.path());
        assert!(spool.drain(DataType::Orderbook).await.unwrap().is_empty());
    }
}
