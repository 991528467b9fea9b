//! Drives one [`OrderBook`] to synchronization and emits periodic snapshots
//! downstream, adapted from `jackbot-data`'s `OrderBookL2Manager`.

use super::sequencer::{L2Sequencer, SequenceOutcome, SyncState};
use super::{Level, OrderBook};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// How long a buffered pre-sync update may sit before being discarded, and
/// how many consecutive gaps within how long force a cool-down before
/// re-snapshotting. Both are `spec.md` §4.3 edge-case constants.
pub const BUFFERED_UPDATE_MAX_AGE: Duration = Duration::from_secs(30);
pub const GAP_COOLDOWN_THRESHOLD: u32 = 100;
pub const GAP_COOLDOWN_WINDOW: Duration = Duration::from_secs(10);
pub const GAP_COOLDOWN_DURATION: Duration = Duration::from_secs(30);

struct Buffered<U> {
    update: U,
    levels: (Vec<Level>, Vec<Level>),
    received_at: Instant,
}

/// Owns the synchronization state machine and the buffered-update queue for
/// a single (exchange, symbol) order book.
pub struct OrderBookL2Manager<S: L2Sequencer> {
    pub book: OrderBook,
    sequencer: S,
    buffer: VecDeque<Buffered<S::Update>>,
    recent_gaps: VecDeque<Instant>,
    cooldown_until: Option<Instant>,
}

impl<S: L2Sequencer> OrderBookL2Manager<S> {
    pub fn new(sequencer: S) -> Self {
        Self {
            book: OrderBook::default(),
            sequencer,
            buffer: VecDeque::new(),
            recent_gaps: VecDeque::new(),
            cooldown_until: None,
        }
    }

    pub fn state(&self) -> SyncState {
        self.sequencer.state()
    }

    /// Force the book back to `Unsynced`, eg/ on a checksum mismatch that
    /// the sequencer's sequence-id check alone would not have caught.
    pub fn force_unsynced(&mut self) {
        self.sequencer.reset();
        self.buffer.clear();
    }

    /// `true` if a new REST snapshot should be requested right now (either
    /// because we are unsynced, or because a gap cool-down just elapsed).
    pub fn needs_snapshot(&self, now: Instant) -> bool {
        match self.cooldown_until {
            Some(until) if now < until => false,
            _ => matches!(self.sequencer.state(), SyncState::Unsynced),
        }
    }

    pub fn apply_snapshot(&mut self, last_update_id: u64, bids: &[Level], asks: &[Level]) {
        self.book.reset(last_update_id, bids, asks);
        self.sequencer.sync_with_snapshot(last_update_id);
        self.drain_buffer();
    }

    /// Hand one incoming WS delta to the sequencer, buffering, applying, or
    /// discarding it per the sequencer's verdict; returns `true` if the
    /// book transitioned to (or remained) synced and downstream may emit.
    pub fn on_update(
        &mut self,
        update: S::Update,
        bids: Vec<Level>,
        asks: Vec<Level>,
        now: Instant,
    ) -> bool {
        match self.sequencer.validate(&update) {
            SequenceOutcome::Stale => false,
            SequenceOutcome::Buffer => {
                self.buffer.push_back(Buffered {
                    update,
                    levels: (bids, asks),
                    received_at: now,
                });
                self.evict_stale_buffered(now);
                false
            }
            SequenceOutcome::Resync => {
                self.book.apply_delta(self.sequencer.current_id(), &bids, &asks);
                true
            }
            SequenceOutcome::Apply => {
                self.book.apply_delta(self.sequencer.current_id(), &bids, &asks);
                true
            }
            SequenceOutcome::Gap => {
                self.record_gap(now);
                self.buffer.clear();
                false
            }
        }
    }

    fn drain_buffer(&mut self) {
        let pending: Vec<_> = self.buffer.drain(..).collect();
        for buffered in pending {
            match self.sequencer.validate(&buffered.update) {
                SequenceOutcome::Resync | SequenceOutcome::Apply => {
                    self.book.apply_delta(
                        self.sequencer.current_id(),
                        &buffered.levels.0,
                        &buffered.levels.1,
                    );
                }
                _ => {}
            }
        }
    }

    fn evict_stale_buffered(&mut self, now: Instant) {
        self.buffer
            .retain(|b| now.duration_since(b.received_at) < BUFFERED_UPDATE_MAX_AGE);
    }

    fn record_gap(&mut self, now: Instant) {
        self.recent_gaps.push_back(now);
        while let Some(&front) = self.recent_gaps.front() {
            if now.duration_since(front) > GAP_COOLDOWN_WINDOW {
                self.recent_gaps.pop_front();
            } else {
                break;
            }
        }
        if self.recent_gaps.len() as u32 >= GAP_COOLDOWN_THRESHOLD {
            self.cooldown_until = Some(now + GAP_COOLDOWN_DURATION);
            self.recent_gaps.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::books::sequencer::{BinanceL2Sequencer, BinanceUpdate};
    use rust_decimal_macros::dec;

    #[test]
    fn buffered_updates_before_snapshot_apply_once_overlap_found() {
        let mut manager = OrderBookL2Manager::new(BinanceL2Sequencer::new());
        let now = Instant::now();

        assert!(!manager.on_update(
            BinanceUpdate {
                first_update_id: 90,
                last_update_id: 95
            },
            vec![Level::new(dec!(100), dec!(1))],
            vec![],
            now,
        ));
        assert_eq!(manager.state(), SyncState::Unsynced);

        manager.apply_snapshot(100, &[], &[]);
        assert_eq!(manager.state(), SyncState::Buffering);

        assert!(manager.on_update(
            BinanceUpdate {
                first_update_id: 101,
                last_update_id: 105
            },
            vec![Level::new(dec!(101), dec!(2))],
            vec![],
            now,
        ));
        assert_eq!(manager.state(), SyncState::Synced);
    }

    #[test]
    fn gap_after_sync_transitions_back_to_unsynced_and_needs_snapshot() {
        let mut manager = OrderBookL2Manager::new(BinanceL2Sequencer::new());
        let now = Instant::now();
        manager.apply_snapshot(100, &[], &[]);
        manager.on_update(
            BinanceUpdate {
                first_update_id: 101,
                last_update_id: 105,
            },
            vec![],
            vec![],
            now,
        );

        manager.on_update(
            BinanceUpdate {
                first_update_id: 200,
                last_update_id: 205,
            },
            vec![],
            vec![],
            now,
        );
        assert_eq!(manager.state(), SyncState::Unsynced);
        assert!(manager.needs_snapshot(now));
    }
}
