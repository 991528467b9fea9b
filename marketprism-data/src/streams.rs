//! Reconnect-with-backoff loop driving one [`AnyConnector`] for its whole
//! lifetime, pushing decoded events onto a bounded channel.
//!
//! `barter-data`'s `ReconnectingStream` is a trait of `Stream` combinators
//! (`with_reconnect_backoff`, `with_termination_on_error`, ...); MarketPrism
//! only ever wraps one concrete connector type at a time, so this is a
//! plain async function instead of a combinator chain — simpler to read
//! and to reason about under the supervisor's own restart policy.

use crate::error::DataError;
use crate::event::MarketEvent;
use crate::exchange::AnyConnector;
use marketprism_integration::channel::Tx;
use std::time::Duration;
use tracing::{error, info, warn};

pub const BACKOFF_BASE: Duration = Duration::from_secs(1);
pub const BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Exponential backoff with full jitter: `rand(0, min(cap, base * 2^attempt))`.
pub fn backoff_delay(attempt: u32) -> Duration {
    let exp = BACKOFF_BASE.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
    let capped = exp.min(BACKOFF_CAP);
    let jitter_ms = rand::random::<u64>() % (capped.as_millis() as u64).max(1);
    Duration::from_millis(jitter_ms)
}

/// Drives `connector` until `shutdown` resolves, restarting it with
/// exponential-backoff-with-full-jitter on any non-terminal error. Decoded
/// events are pushed onto `tx`; a full channel drops the event (the
/// publisher's own bounded queue is the system's actual backpressure
/// point, per `SPEC_FULL.md`'s ambient-stack note on bounded channels).
pub async fn run_connector<T>(
    mut connector: AnyConnector,
    tx: T,
    mut shutdown: tokio::sync::oneshot::Receiver<()>,
) where
    T: Tx<Result<MarketEvent, DataError>>,
{
    let exchange = connector.exchange_id();
    let mut attempt = 0u32;

    loop {
        if shutdown.try_recv().is_ok() {
            connector.shutdown().await;
            return;
        }

        if let Err(e) = connector.connect().await {
            if e.is_terminal() {
                error!(%exchange, error = %e, "fatal connector error, not retrying");
                let _ = tx.send(Err(e));
                return;
            }
            warn!(%exchange, error = %e, attempt, "connect failed, backing off");
            tokio::time::sleep(backoff_delay(attempt)).await;
            attempt += 1;
            continue;
        }

        attempt = 0;
        info!(%exchange, "connector synced");

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    connector.shutdown().await;
                    return;
                }
                event = connector.next_event() => {
                    match event {
                        Some(Ok(event)) => {
                            let _ = tx.send(Ok(event));
                        }
                        Some(Err(e)) if e.is_terminal() => {
                            error!(%exchange, error = %e, "fatal connector error, not retrying");
                            let _ = tx.send(Err(e));
                            return;
                        }
                        Some(Err(e)) => {
                            warn!(%exchange, error = %e, "connector error, reconnecting");
                            break;
                        }
                        None => {
                            warn!(%exchange, "connector stream ended, reconnecting");
                            break;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_delay_never_exceeds_cap() {
        for attempt in 0..10 {
            assert!(backoff_delay(attempt) <= BACKOFF_CAP);
        }
    }

    #[test]
    fn backoff_delay_grows_with_attempt_on_average() {
        // Not a statistical test: just confirms attempt 0's range is
        // smaller than attempt 4's, since jitter is bounded by 2^attempt.
        let small_cap = BACKOFF_BASE.saturating_mul(1);
        let large_cap = BACKOFF_BASE.saturating_mul(16).min(BACKOFF_CAP);
        assert!(small_cap <= large_cap);
    }
}
