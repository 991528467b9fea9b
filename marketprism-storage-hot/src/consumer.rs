//! Durable JetStream consumer per data type: pulls messages, batches them
//! per the caller-supplied [`BatchPolicy`] (see
//! [`crate::batch::resolve_batch_policy`]), inserts into [`HotStore`], and
//! acknowledges only after the batch is durably persisted (inserted or
//! spooled). Grounded on `marketprism-data`'s reconnect-loop shape
//! (`streams.rs`): an outer loop that never gives up, inner work dispatched
//! per message/tick.

use crate::batch::BatchPolicy;
use crate::spool::Spool;
use crate::store::HotStore;
use async_nats::jetstream::{
    consumer::{pull::Config as PullConfig, AckPolicy, DeliverPolicy},
    Context as JetStreamContext,
};
use futures_util::StreamExt;
use marketprism_instrument::DataType;
use marketprism_normalizer::record::CanonicalRecord;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

const RETRY_DELAYS: [Duration; 3] = [
    Duration::from_millis(500),
    Duration::from_millis(1000),
    Duration::from_millis(2000),
];
const ACK_WAIT: Duration = Duration::from_secs(60);

/// `spec.md` §4.5: `deliver_policy=LAST` for orderbook (a restarting
/// consumer only cares about the latest snapshot per symbol), `ALL` for
/// everything else.
fn deliver_policy_for_data_type(data_type: DataType) -> DeliverPolicy {
    match data_type {
        DataType::Orderbook => DeliverPolicy::LastPerSubject,
        _ => DeliverPolicy::All,
    }
}

/// Create (or reuse) the durable pull consumer for `data_type` on
/// `stream_name`, filtered to that data type's subject root.
pub async fn ensure_consumer(
    jetstream: &JetStreamContext,
    stream_name: &str,
    data_type: DataType,
) -> Result<async_nats::jetstream::consumer::Consumer<PullConfig>, async_nats::Error> {
    let stream = jetstream.get_stream(stream_name).await?;
    let durable_name = format!("hot-{}", data_type.as_str());
    let deliver_policy = deliver_policy_for_data_type(data_type);

    let consumer = stream
        .get_or_create_consumer(
            &durable_name,
            PullConfig {
                durable_name: Some(durable_name.clone()),
                filter_subject: format!("{}.>", data_type.as_str()),
                deliver_policy,
                ack_policy: AckPolicy::Explicit,
                ack_wait: ACK_WAIT,
                ..Default::default()
            },
        )
        .await?;
    Ok(consumer)
}

/// Drive one data type's consumer until `shutdown` fires: pull messages,
/// accumulate them into a batch, flush on size or interval, insert (with
/// retry-then-spool), then ack the whole batch.
pub async fn run_consumer<S: HotStore>(
    consumer: async_nats::jetstream::consumer::Consumer<PullConfig>,
    data_type: DataType,
    store: Arc<S>,
    spool: Spool,
    policy: BatchPolicy,
    mut shutdown: tokio::sync::oneshot::Receiver<()>,
) {
    let mut batch: Vec<CanonicalRecord> = Vec::with_capacity(policy.max_size);
    let mut pending_acks: Vec<async_nats::jetstream::Message> = Vec::with_capacity(policy.max_size);
    let mut ticker = tokio::time::interval(policy.flush_interval);

    let mut messages = match consumer.messages().await {
        Ok(m) => m,
        Err(e) => {
            error!(error = %e, data_type = %data_type, "failed to open consumer message stream");
            return;
        }
    };

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                flush(data_type, &store, &spool, &mut batch, &mut pending_acks).await;
                return;
            }
            _ = ticker.tick() => {
                flush(data_type, &store, &spool, &mut batch, &mut pending_acks).await;
            }
            maybe_msg = messages.next() => {
                let Some(Ok(msg)) = maybe_msg else { continue };
                match serde_json::from_slice::<CanonicalRecord>(&msg.payload) {
                    Ok(record) => {
                        batch.push(record);
                        pending_acks.push(msg);
                    }
                    Err(e) => {
                        warn!(error = %e, "dropping message with unparseable canonical record");
                        let _ = msg.ack().await;
                        continue;
                    }
                }
                if batch.len() >= policy.max_size {
                    flush(data_type, &store, &spool, &mut batch, &mut pending_acks).await;
                }
            }
        }
    }
}

async fn flush<S: HotStore>(
    data_type: DataType,
    store: &Arc<S>,
    spool: &Spool,
    batch: &mut Vec<CanonicalRecord>,
    pending_acks: &mut Vec<async_nats::jetstream::Message>,
) {
    if batch.is_empty() {
        return;
    }

    let persisted = insert_with_retry(store, data_type, batch).await;
    if !persisted {
        if let Err(e) = spool.append(data_type, batch).await {
            error!(error = %e, data_type = %data_type, "failed to spool batch after exhausting clickhouse retries");
        }
    }

    for msg in pending_acks.drain(..) {
        if let Err(e) = msg.ack().await {
            warn!(error = %e, "failed to ack jetstream message after persisting batch");
        }
    }
    batch.clear();
}

/// Three attempts with the documented back-off; returns `false` once all
/// three have failed so the caller spools instead.
async fn insert_with_retry<S: HotStore>(
    store: &Arc<S>,
    data_type: DataType,
    batch: &[CanonicalRecord],
) -> bool {
    for (attempt, delay) in RETRY_DELAYS.iter().enumerate() {
        match store.insert_batch(data_type, batch).await {
            Ok(()) => return true,
            Err(e) => {
                warn!(attempt, error = %e, data_type = %data_type, "clickhouse insert failed");
                tokio::time::sleep(*delay).await;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryHotStore;
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
    async fn insert_with_retry_succeeds_on_first_attempt() {
        let store = Arc::new(InMemoryHotStore::new());
        let batch = vec![trade_record()];
        assert!(insert_with_retry(&store, DataType::Trade, &batch).await);
        assert_eq!(store.row_count(DataType::Trade), 1);
    }
}
