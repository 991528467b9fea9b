//! Local order-book representation and the apply-update algorithm, adapted
//! from `barter-data`'s `books` module.

pub mod manager;
pub mod sequencer;

use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// A single (price, quantity) level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Level {
    pub price: Decimal,
    pub quantity: Decimal,
}

impl Level {
    pub fn new(price: Decimal, quantity: Decimal) -> Self {
        Self { price, quantity }
    }
}

/// One side of an order book. `DESCENDING` selects bid ordering (best price
/// first, ie/ highest); ascending selects ask ordering.
#[derive(Debug, Clone, Default)]
pub struct OrderBookSide<const DESCENDING: bool> {
    levels: BTreeMap<Decimal, Decimal>,
}

pub type Bids = OrderBookSide<true>;
pub type Asks = OrderBookSide<false>;

impl<const DESCENDING: bool> OrderBookSide<DESCENDING> {
    /// Apply a single (price, quantity) update: quantity zero removes the
    /// level, otherwise the level is inserted or overwritten.
    pub fn upsert_single(&mut self, price: Decimal, quantity: Decimal) {
        if quantity.is_zero() {
            self.levels.remove(&price);
        } else {
            self.levels.insert(price, quantity);
        }
    }

    pub fn best(&self) -> Option<Level> {
        let (price, quantity) = if DESCENDING {
            self.levels.iter().next_back()
        } else {
            self.levels.iter().next()
        }?;
        Some(Level::new(*price, *quantity))
    }

    /// Top `n` levels ordered best-first.
    pub fn top_n(&self, n: usize) -> Vec<Level> {
        let iter = self.levels.iter().map(|(p, q)| Level::new(*p, *q));
        if DESCENDING {
            iter.rev().take(n).collect()
        } else {
            iter.take(n).collect()
        }
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

/// A local, incrementally-synchronized order book for one (exchange,
/// symbol) pair.
#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    pub last_update_id: u64,
    pub bids: Bids,
    pub asks: Asks,
}

impl OrderBook {
    pub fn new(last_update_id: u64) -> Self {
        Self {
            last_update_id,
            bids: Bids::default(),
            asks: Asks::default(),
        }
    }

    /// Replace the book wholesale, as when a REST snapshot is applied.
    pub fn reset(&mut self, last_update_id: u64, bids: &[Level], asks: &[Level]) {
        self.last_update_id = last_update_id;
        self.bids = Bids::default();
        self.asks = Asks::default();
        for level in bids {
            self.bids.upsert_single(level.price, level.quantity);
        }
        for level in asks {
            self.asks.upsert_single(level.price, level.quantity);
        }
    }

    /// Apply an incremental delta. Caller is responsible for sequence
    /// validation before calling this (see [`sequencer`]).
    pub fn apply_delta(&mut self, last_update_id: u64, bids: &[Level], asks: &[Level]) {
        for level in bids {
            self.bids.upsert_single(level.price, level.quantity);
        }
        for level in asks {
            self.asks.upsert_single(level.price, level.quantity);
        }
        self.last_update_id = last_update_id;
    }

    pub fn best_bid(&self) -> Option<Level> {
        self.bids.best()
    }

    pub fn best_ask(&self) -> Option<Level> {
        self.asks.best()
    }

    /// `true` if both sides are non-empty and crossed — never expected to
    /// be observed once [`sequencer`] validation has run.
    pub fn is_crossed(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => bid.price >= ask.price,
            _ => false,
        }
    }

    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid.price + ask.price) / Decimal::from(2)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn upsert_inserts_then_removes_a_level() {
        let mut bids = Bids::default();
        bids.upsert_single(dec!(100), dec!(1));
        assert_eq!(bids.best(), Some(Level::new(dec!(100), dec!(1))));

        bids.upsert_single(dec!(100), dec!(0));
        assert_eq!(bids.best(), None);
    }

    #[test]
    fn bids_best_is_highest_price() {
        let mut bids = Bids::default();
        bids.upsert_single(dec!(100), dec!(1));
        bids.upsert_single(dec!(101), dec!(1));
        assert_eq!(bids.best().unwrap().price, dec!(101));
    }

    #[test]
    fn asks_best_is_lowest_price() {
        let mut asks = Asks::default();
        asks.upsert_single(dec!(100), dec!(1));
        asks.upsert_single(dec!(99), dec!(1));
        assert_eq!(asks.best().unwrap().price, dec!(99));
    }

    #[test]
    fn mid_price_averages_best_bid_and_ask() {
        let mut book = OrderBook::new(1);
        book.apply_delta(2, &[Level::new(dec!(100), dec!(1))], &[Level::new(dec!(102), dec!(1))]);
        assert_eq!(book.mid_price(), Some(dec!(101)));
    }

    #[test]
    fn zero_quantity_level_never_appears_in_top_n() {
        let mut book = OrderBook::new(1);
        book.apply_delta(
            2,
            &[Level::new(dec!(100), dec!(1)), Level::new(dec!(99), dec!(1))],
            &[],
        );
        book.apply_delta(3, &[Level::new(dec!(100), dec!(0))], &[]);
        let top = book.bids.top_n(10);
        assert_eq!(top, vec![Level::new(dec!(99), dec!(1))]);
    }
}
