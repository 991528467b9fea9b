//! Bounded fallback queue for records that exhausted JetStream publish
//! retries. `spec.md` §4.4: default capacity 10,000, overflow drops the
//! oldest entry with a metric.

use std::collections::VecDeque;
use std::sync::Mutex;

pub const DEFAULT_CAPACITY: usize = 10_000;

#[derive(Debug)]
pub struct FallbackQueue<T> {
    capacity: usize,
    inner: Mutex<VecDeque<T>>,
    dropped: std::sync::atomic::AtomicU64,
}

impl<T> FallbackQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            dropped: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Push an item, dropping the oldest queued item if at capacity.
    pub fn push(&self, item: T) {
        let mut queue = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if queue.len() >= self.capacity {
            queue.pop_front();
            self.dropped.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            metrics::counter!("marketprism_publisher_fallback_dropped_total").increment(1);
        }
        queue.push_back(item);
        metrics::gauge!("marketprism_publisher_fallback_depth").set(queue.len() as f64);
    }

    pub fn pop(&self) -> Option<T> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(std::sync::atomic::Ordering::Relaxed)
    }
}

impl<T> Default for FallbackQueue<T> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_drops_the_oldest_entry() {
        let queue = FallbackQueue::new(2);
        queue.push(1);
        queue.push(2);
        queue.push(3);

        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), Some(3));
        assert_eq!(queue.dropped_count(), 1);
    }

    #[test]
    fn pop_returns_none_when_empty() {
        let queue: FallbackQueue<u32> = FallbackQueue::new(4);
        assert_eq!(queue.pop(), None);
    }
}
