//! Order book snapshot types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::event::MessageType;

/// Fixed snapshot depth per side.
pub const BOOK_DEPTH: usize = 5;

/// One aggregated price level (price, total resting quantity).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookLevel {
    /// Level price.
    pub price: Decimal,
    /// Total resting quantity at this price.
    pub quantity: i64,
}

impl BookLevel {
    /// Sentinel for an absent level.
    pub const EMPTY: Self = Self {
        price: Decimal::ZERO,
        quantity: 0,
    };

    /// Create a populated level.
    #[must_use]
    pub const fn new(price: Decimal, quantity: i64) -> Self {
        Self { price, quantity }
    }

    /// True if this slot holds no level.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }
}

/// Immutable top-of-book snapshot, depth [`BOOK_DEPTH`] per side.
///
/// Asks are ascending by price, bids descending. Populated levels are
/// contiguous from index 0 and never carry a zero price or non-positive
/// quantity; trailing slots are [`BookLevel::EMPTY`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBook {
    /// Timestamp of the event that produced this snapshot.
    pub timestamp: DateTime<Utc>,
    /// Message type of the triggering event.
    pub triggered_by: MessageType,
    /// Ask levels, ascending by price.
    pub asks: [BookLevel; BOOK_DEPTH],
    /// Bid levels, descending by price.
    pub bids: [BookLevel; BOOK_DEPTH],
}

impl OrderBook {
    /// An empty snapshot at the given timestamp.
    #[must_use]
    pub const fn empty(timestamp: DateTime<Utc>, triggered_by: MessageType) -> Self {
        Self {
            timestamp,
            triggered_by,
            asks: [BookLevel::EMPTY; BOOK_DEPTH],
            bids: [BookLevel::EMPTY; BOOK_DEPTH],
        }
    }

    /// Best bid price (zero when the side is empty).
    #[must_use]
    pub fn best_bid(&self) -> Decimal {
        self.bids[0].price
    }

    /// Best ask price (zero when the side is empty).
    #[must_use]
    pub fn best_ask(&self) -> Decimal {
        self.asks[0].price
    }

    /// Mid price between best bid and best ask.
    ///
    /// Falls back to whichever side is populated when the other is
    /// empty, and to zero when both are.
    #[must_use]
    pub fn mid(&self) -> Decimal {
        let bid = self.best_bid();
        let ask = self.best_ask();
        if bid > Decimal::ZERO && ask > Decimal::ZERO {
            (bid + ask) / Decimal::TWO
        } else if bid > Decimal::ZERO {
            bid
        } else {
            ask
        }
    }

    /// True once both top-of-book prices are positive.
    #[must_use]
    pub fn has_two_sides(&self) -> bool {
        self.best_bid() > Decimal::ZERO && self.best_ask() > Decimal::ZERO
    }

    /// True when the book is crossed (bid0 > ask0). Indicates a feed
    /// or reconstruction inconsistency; never corrected here.
    #[must_use]
    pub fn is_crossed(&self) -> bool {
        self.has_two_sides() && self.best_bid() > self.best_ask()
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn snapshot(bid: BookLevel, ask: BookLevel) -> OrderBook {
        let mut book = OrderBook::empty(DateTime::<Utc>::MIN_UTC, MessageType::AddOrder);
        book.bids[0] = bid;
        book.asks[0] = ask;
        book
    }

    #[test]
    fn test_mid_two_sided() {
        let book = snapshot(
            BookLevel::new(dec!(99), 10),
            BookLevel::new(dec!(101), 5),
        );
        assert_eq!(book.mid(), dec!(100));
        assert!(book.has_two_sides());
        assert!(!book.is_crossed());
    }

    #[test]
    fn test_mid_one_sided() {
        let book = snapshot(BookLevel::new(dec!(99), 10), BookLevel::EMPTY);
        assert_eq!(book.mid(), dec!(99));
        assert!(!book.has_two_sides());
    }

    #[test]
    fn test_crossed_book_detected() {
        let book = snapshot(
            BookLevel::new(dec!(102), 10),
            BookLevel::new(dec!(101), 5),
        );
        assert!(book.is_crossed());
    }

    #[test]
    fn test_empty_level_sentinel() {
        assert!(BookLevel::EMPTY.is_empty());
        assert!(!BookLevel::new(dec!(1), 1).is_empty());
    }
}
