//! Level Book - aggregated market depth rebuilt from a stream of updates.
//!
//! The demand side of the ring: a feed thread pushes fixed-layout
//! [`LevelUpdate`] values and a strategy thread pops them and folds them
//! into a [`LevelBook`]. Levels carry absolute quantities, so each update
//! replaces its level outright and a zero quantity deletes it.
//!
//! Best prices are cached and maintained incrementally; only deleting the
//! current best forces a scan of the remaining levels.

use std::fmt;

use rustc_hash::FxHashMap;

use crate::element::Element;

// ============================================================================
// Side
// ============================================================================

/// Book side: bid (buy) or ask (sell).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Side {
    Bid = 0,
    Ask = 1,
}

impl Side {
    /// Get the opposite side.
    #[inline]
    pub const fn opposite(self) -> Side {
        match self {
            Side::Bid => Side::Ask,
            Side::Ask => Side::Bid,
        }
    }
}

// ============================================================================
// LevelUpdate
// ============================================================================

/// One change to one price level, sized for the ring's hot path.
///
/// `quantity` is the absolute depth now resting at `price`; zero means
/// the level is gone. `sequence` is the feed's own numbering, kept so a
/// consumer can assert it never missed an update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct LevelUpdate {
    /// Price in ticks
    pub price: u64,
    /// Absolute quantity at this level; 0 deletes the level
    pub quantity: u64,
    /// Feed sequence number
    pub sequence: u32,
    /// Which half of the book this touches
    pub side: Side,
}

// Three updates per 64-byte cache line; trailing padding included.
const _: () = assert!(std::mem::size_of::<LevelUpdate>() == 24);
const _: () = assert!(std::mem::align_of::<LevelUpdate>() == 8);

// SAFETY: fixed-layout scalar fields. All-zero bytes decode as a bid
// delete at price 0, and any prefix overwrite leaves each field either
// rewritten or as it was; `side` is a single byte, so it is never torn.
unsafe impl Element for LevelUpdate {}

impl LevelUpdate {
    /// Convenience constructor for a level set or replace.
    #[inline]
    pub fn set(side: Side, price: u64, quantity: u64, sequence: u32) -> Self {
        LevelUpdate {
            price,
            quantity,
            sequence,
            side,
        }
    }

    /// Convenience constructor for a level delete.
    #[inline]
    pub fn delete(side: Side, price: u64, sequence: u32) -> Self {
        LevelUpdate {
            price,
            quantity: 0,
            sequence,
            side,
        }
    }
}

// ============================================================================
// LevelBook
// ============================================================================

/// Sparse depth book keyed by price.
///
/// FxHashMap keeps level upserts O(1) with a non-cryptographic hash;
/// prices are sparse enough in practice that a dense array would waste
/// most of its slots.
pub struct LevelBook {
    /// Bid levels: price -> absolute quantity
    bids: FxHashMap<u64, u64>,
    /// Ask levels: price -> absolute quantity
    asks: FxHashMap<u64, u64>,
    /// Cached best bid price (highest buy price)
    best_bid: Option<u64>,
    /// Cached best ask price (lowest sell price)
    best_ask: Option<u64>,
    /// Sequence number of the last update applied
    last_sequence: u32,
    /// Total updates folded into the book
    updates_applied: u64,
}

impl LevelBook {
    /// Create a new empty book.
    pub fn new() -> Self {
        Self {
            bids: FxHashMap::default(),
            asks: FxHashMap::default(),
            best_bid: None,
            best_ask: None,
            last_sequence: 0,
            updates_applied: 0,
        }
    }

    /// Create a book with pre-allocated capacity per side.
    pub fn with_capacity(levels: usize) -> Self {
        Self {
            bids: FxHashMap::with_capacity_and_hasher(levels, Default::default()),
            asks: FxHashMap::with_capacity_and_hasher(levels, Default::default()),
            best_bid: None,
            best_ask: None,
            last_sequence: 0,
            updates_applied: 0,
        }
    }

    // ========================================================================
    // Update Application
    // ========================================================================

    /// Fold one update into the book.
    ///
    /// Zero quantity removes the level; anything else replaces it. The
    /// best-price caches are maintained as part of the same pass.
    pub fn apply(&mut self, update: &LevelUpdate) {
        if update.quantity == 0 {
            self.remove_level(update.side, update.price);
        } else {
            match update.side {
                Side::Bid => {
                    self.bids.insert(update.price, update.quantity);
                }
                Side::Ask => {
                    self.asks.insert(update.price, update.quantity);
                }
            }
            self.update_best_on_set(update.side, update.price);
        }
        self.last_sequence = update.sequence;
        self.updates_applied += 1;
    }

    /// Remove a price level and repair the best-price cache if the level
    /// removed was the best.
    fn remove_level(&mut self, side: Side, price: u64) {
        match side {
            Side::Bid => {
                self.bids.remove(&price);
                if self.best_bid == Some(price) {
                    self.recalculate_best_bid();
                }
            }
            Side::Ask => {
                self.asks.remove(&price);
                if self.best_ask == Some(price) {
                    self.recalculate_best_ask();
                }
            }
        }
    }

    /// Update the best-price cache when a level is set.
    fn update_best_on_set(&mut self, side: Side, price: u64) {
        match side {
            Side::Bid => {
                if self.best_bid.map_or(true, |best| price > best) {
                    self.best_bid = Some(price);
                }
            }
            Side::Ask => {
                if self.best_ask.map_or(true, |best| price < best) {
                    self.best_ask = Some(price);
                }
            }
        }
    }

    /// Recalculate best bid by scanning all bid levels.
    /// Called when the current best bid level is deleted.
    fn recalculate_best_bid(&mut self) {
        self.best_bid = self.bids.keys().copied().max();
    }

    /// Recalculate best ask by scanning all ask levels.
    /// Called when the current best ask level is deleted.
    fn recalculate_best_ask(&mut self) {
        self.best_ask = self.asks.keys().copied().min();
    }

    // ========================================================================
    // Best Price Access
    // ========================================================================

    /// Get the best bid price (highest buy price).
    #[inline]
    pub fn best_bid(&self) -> Option<u64> {
        self.best_bid
    }

    /// Get the best ask price (lowest sell price).
    #[inline]
    pub fn best_ask(&self) -> Option<u64> {
        self.best_ask
    }

    /// Get the best price on a given side.
    #[inline]
    pub fn best_price(&self, side: Side) -> Option<u64> {
        match side {
            Side::Bid => self.best_bid,
            Side::Ask => self.best_ask,
        }
    }

    /// Calculate spread (best_ask - best_bid).
    pub fn spread(&self) -> Option<u64> {
        match (self.best_bid, self.best_ask) {
            (Some(bid), Some(ask)) if ask > bid => Some(ask - bid),
            _ => None,
        }
    }

    /// A crossed book (best bid >= best ask) means updates arrived out
    /// of order or the feed itself glitched.
    pub fn is_crossed(&self) -> bool {
        match (self.best_bid, self.best_ask) {
            (Some(bid), Some(ask)) => bid >= ask,
            _ => false,
        }
    }

    // ========================================================================
    // Depth Access
    // ========================================================================

    /// Get the quantity resting at a price level, 0 if the level is gone.
    pub fn depth_at(&self, side: Side, price: u64) -> u64 {
        let levels = match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        };
        levels.get(&price).copied().unwrap_or(0)
    }

    /// Get the number of bid levels.
    pub fn bid_levels(&self) -> usize {
        self.bids.len()
    }

    /// Get the number of ask levels.
    pub fn ask_levels(&self) -> usize {
        self.asks.len()
    }

    /// Check if the book has no levels on either side.
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    // ========================================================================
    // Bookkeeping
    // ========================================================================

    /// Sequence number of the last update applied.
    #[inline]
    pub fn last_sequence(&self) -> u32 {
        self.last_sequence
    }

    /// Total updates folded into the book since creation or clear.
    #[inline]
    pub fn updates_applied(&self) -> u64 {
        self.updates_applied
    }

    /// Drop all levels and reset the caches and counters.
    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
        self.best_bid = None;
        self.best_ask = None;
        self.last_sequence = 0;
        self.updates_applied = 0;
    }
}

impl Default for LevelBook {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LevelBook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LevelBook")
            .field("best_bid", &self.best_bid)
            .field("best_ask", &self.best_ask)
            .field("bid_levels", &self.bids.len())
            .field("ask_levels", &self.asks.len())
            .field("last_sequence", &self.last_sequence)
            .finish()
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use crate::spsc::SpscQueue;

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Bid.opposite(), Side::Ask);
        assert_eq!(Side::Ask.opposite(), Side::Bid);
    }

    #[test]
    fn test_empty_book() {
        let book = LevelBook::new();
        assert!(book.is_empty());
        assert_eq!(book.best_bid(), None);
        assert_eq!(book.best_ask(), None);
        assert_eq!(book.spread(), None);
        assert!(!book.is_crossed());
    }

    #[test]
    fn test_apply_tracks_best_prices() {
        let mut book = LevelBook::new();

        book.apply(&LevelUpdate::set(Side::Bid, 10000, 100, 1));
        assert_eq!(book.best_bid(), Some(10000));

        book.apply(&LevelUpdate::set(Side::Bid, 10050, 100, 2));
        assert_eq!(book.best_bid(), Some(10050)); // Higher is better for bids

        book.apply(&LevelUpdate::set(Side::Bid, 9950, 100, 3));
        assert_eq!(book.best_bid(), Some(10050));

        book.apply(&LevelUpdate::set(Side::Ask, 10100, 100, 4));
        assert_eq!(book.best_ask(), Some(10100));

        book.apply(&LevelUpdate::set(Side::Ask, 10080, 100, 5));
        assert_eq!(book.best_ask(), Some(10080)); // Lower is better for asks

        assert_eq!(book.last_sequence(), 5);
        assert_eq!(book.updates_applied(), 5);
    }

    #[test]
    fn test_quantity_is_absolute() {
        let mut book = LevelBook::new();

        book.apply(&LevelUpdate::set(Side::Bid, 10000, 100, 1));
        book.apply(&LevelUpdate::set(Side::Bid, 10000, 250, 2));

        // Replaces, never accumulates
        assert_eq!(book.depth_at(Side::Bid, 10000), 250);
        assert_eq!(book.bid_levels(), 1);
    }

    #[test]
    fn test_zero_quantity_removes_and_recalculates() {
        let mut book = LevelBook::new();

        book.apply(&LevelUpdate::set(Side::Bid, 10050, 100, 1));
        book.apply(&LevelUpdate::set(Side::Bid, 10000, 100, 2));
        book.apply(&LevelUpdate::set(Side::Bid, 9950, 100, 3));
        assert_eq!(book.best_bid(), Some(10050));

        book.apply(&LevelUpdate::delete(Side::Bid, 10050, 4));
        assert_eq!(book.best_bid(), Some(10000)); // Recalculated by scan

        book.apply(&LevelUpdate::delete(Side::Bid, 10000, 5));
        assert_eq!(book.best_bid(), Some(9950));

        book.apply(&LevelUpdate::delete(Side::Bid, 9950, 6));
        assert_eq!(book.best_bid(), None);
        assert!(book.is_empty());
    }

    #[test]
    fn test_delete_missing_level_is_harmless() {
        let mut book = LevelBook::new();
        book.apply(&LevelUpdate::delete(Side::Ask, 12345, 1));
        assert!(book.is_empty());
        assert_eq!(book.updates_applied(), 1);
    }

    #[test]
    fn test_spread_and_crossed() {
        let mut book = LevelBook::new();

        book.apply(&LevelUpdate::set(Side::Bid, 10000, 100, 1));
        book.apply(&LevelUpdate::set(Side::Ask, 10100, 100, 2));
        assert_eq!(book.spread(), Some(100));
        assert!(!book.is_crossed());

        // A bid through the ask crosses the book; spread is meaningless
        book.apply(&LevelUpdate::set(Side::Bid, 10100, 50, 3));
        assert!(book.is_crossed());
        assert_eq!(book.spread(), None);
    }

    #[test]
    fn test_depth_at_missing_level() {
        let book = LevelBook::new();
        assert_eq!(book.depth_at(Side::Bid, 10000), 0);
        assert_eq!(book.depth_at(Side::Ask, 10000), 0);
    }

    #[test]
    fn test_clear() {
        let mut book = LevelBook::new();
        book.apply(&LevelUpdate::set(Side::Bid, 10000, 100, 1));
        book.apply(&LevelUpdate::set(Side::Ask, 10100, 100, 2));

        book.clear();
        assert!(book.is_empty());
        assert_eq!(book.best_bid(), None);
        assert_eq!(book.best_ask(), None);
        assert_eq!(book.last_sequence(), 0);
        assert_eq!(book.updates_applied(), 0);
    }

    #[test]
    fn test_update_layout_fits_ring_slots() {
        assert_eq!(std::mem::size_of::<LevelUpdate>(), 24);
        assert_eq!(std::mem::align_of::<LevelUpdate>(), 8);
    }

    #[test]
    fn test_updates_stream_through_ring() {
        let (mut tx, mut rx) = SpscQueue::<LevelUpdate>::with_capacity(64);

        let updates = [
            LevelUpdate::set(Side::Bid, 10000, 100, 1),
            LevelUpdate::set(Side::Ask, 10100, 200, 2),
            LevelUpdate::set(Side::Bid, 10050, 50, 3),
            LevelUpdate::delete(Side::Bid, 10000, 4),
            LevelUpdate::set(Side::Ask, 10100, 75, 5),
        ];

        let consumer = std::thread::spawn(move || {
            let mut book = LevelBook::new();
            let mut expected_sequence = 1u32;
            while book.updates_applied() < 5 {
                if let Some(update) = rx.pop() {
                    assert_eq!(update.sequence, expected_sequence, "feed gap");
                    expected_sequence += 1;
                    book.apply(&update);
                }
            }
            book
        });

        for update in updates {
            tx.push(update).expect("ring has room");
        }

        let book = consumer.join().expect("consumer panicked");
        assert_eq!(book.best_bid(), Some(10050));
        assert_eq!(book.best_ask(), Some(10100));
        assert_eq!(book.depth_at(Side::Ask, 10100), 75);
        assert_eq!(book.depth_at(Side::Bid, 10000), 0);
        assert_eq!(book.last_sequence(), 5);
    }
}
