//! Token-bucket rate limiter with priority queuing and adaptive backoff,
//! adapted from `jackbot-integration`'s `RateLimiter`. Each exchange
//! connector owns one instance per physical limit it must respect (eg/
//! Binance's REST weight budget and its separate WebSocket-subscription
//! budget).

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

/// Relative importance of a queued request. Higher-priority waiters are
/// woken before lower-priority ones when a token becomes available,
/// regardless of queue-entry order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Low,
    Normal,
    High,
}

struct Inner {
    capacity: u32,
    tokens: u32,
    interval: Duration,
    base_interval: Duration,
    last_refill: Instant,
    queue: VecDeque<Priority>,
    consecutive_violations: u32,
}

impl Inner {
    fn refill(&mut self) {
        let elapsed = self.last_refill.elapsed();
        if elapsed >= self.interval {
            self.tokens = self.capacity;
            self.last_refill = Instant::now();
        }
    }
}

/// Token-bucket limiter shared across all callers for one physical rate
/// limit. Cheap to clone — internally an `Arc`.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<Inner>>,
    notify: Arc<Notify>,
    jitter: Duration,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter").finish_non_exhaustive()
    }
}

impl RateLimiter {
    /// `capacity` tokens are available per `interval`, with no jitter added
    /// to the refill schedule.
    pub fn new(capacity: u32, interval: Duration) -> Self {
        Self::new_with_jitter(capacity, interval, Duration::ZERO)
    }

    /// As [`RateLimiter::new`], but each `acquire` additionally sleeps a
    /// random amount up to `jitter` before checking the bucket, spreading
    /// out waiters that were released by the same refill tick.
    pub fn new_with_jitter(capacity: u32, interval: Duration, jitter: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                capacity,
                tokens: capacity,
                interval,
                base_interval: interval,
                last_refill: Instant::now(),
                queue: VecDeque::new(),
                consecutive_violations: 0,
            })),
            notify: Arc::new(Notify::new()),
            jitter,
        }
    }

    /// Wait for a token to become available, honoring `priority` among
    /// concurrently waiting callers.
    pub async fn acquire(&self, priority: Priority) {
        if !self.jitter.is_zero() {
            let jitter_ms = rand::random::<u64>() % self.jitter.as_millis().max(1) as u64;
            tokio::time::sleep(Duration::from_millis(jitter_ms)).await;
        }

        loop {
            {
                let mut inner = self.inner.lock().await;
                inner.refill();

                let is_our_turn = inner
                    .queue
                    .iter()
                    .all(|queued| *queued <= priority);

                if inner.tokens > 0 && is_our_turn {
                    inner.tokens -= 1;
                    inner.queue.retain(|queued| *queued != priority);
                    return;
                }

                if !inner.queue.contains(&priority) {
                    inner.queue.push_back(priority);
                }
            }

            let wait = {
                let inner = self.inner.lock().await;
                inner.interval.saturating_sub(inner.last_refill.elapsed())
            };

            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(wait.max(Duration::from_millis(1))) => {}
            }
        }
    }

    /// Report that the exchange rejected a request for exceeding the rate
    /// limit despite our local accounting — double the refill interval
    /// (capped at 8x the configured base) so we back off harder than our
    /// own bucket alone would.
    pub async fn report_violation(&self) {
        let mut inner = self.inner.lock().await;
        inner.consecutive_violations += 1;
        let multiplier = 2u32.saturating_pow(inner.consecutive_violations.min(3));
        inner.interval = inner.base_interval * multiplier.min(8);
    }

    /// Reset the adaptive backoff after a sustained period with no
    /// violations, restoring the configured interval.
    pub async fn reset_backoff(&self) {
        let mut inner = self.inner.lock().await;
        inner.consecutive_violations = 0;
        inner.interval = inner.base_interval;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_consumes_a_token() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        limiter.acquire(Priority::Normal).await;
        limiter.acquire(Priority::Normal).await;

        let remaining = {
            let inner = limiter.inner.lock().await;
            inner.tokens
        };
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn high_priority_waiter_is_served_before_low_priority() {
        let limiter = RateLimiter::new(1, Duration::from_millis(20));
        limiter.acquire(Priority::Normal).await;

        let limiter_low = limiter.clone();
        let low = tokio::spawn(async move {
            limiter_low.acquire(Priority::Low).await;
        });
        tokio::time::sleep(Duration::from_millis(5)).await;

        let limiter_high = limiter.clone();
        let high = tokio::spawn(async move {
            limiter_high.acquire(Priority::High).await;
        });

        let (low_res, high_res) = tokio::join!(low, high);
        low_res.unwrap();
        high_res.unwrap();
    }

    #[tokio::test]
    async fn adaptive_backoff_doubles_then_resets() {
        let limiter = RateLimiter::new(1, Duration::from_millis(10));
        limiter.report_violation().await;
        {
            let inner = limiter.inner.lock().await;
            assert_eq!(inner.interval, Duration::from_millis(20));
        }

        limiter.reset_backoff().await;
        let inner = limiter.inner.lock().await;
        assert_eq!(inner.interval, Duration::from_millis(10));
    }
}
