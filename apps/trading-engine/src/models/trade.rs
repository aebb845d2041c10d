//! Trade tape types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::book::OrderBook;
use super::event::Side;

/// A trade resolved against the reconstructed book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    /// Trade timestamp.
    pub timestamp: DateTime<Utc>,
    /// Print price.
    pub price: Decimal,
    /// Traded quantity.
    pub quantity: i64,
    /// Unique id of the resting order this print filled, 0 when the
    /// order could not be located.
    pub resting_order_id: i64,
    /// Side assignment derived from the book mid at print time.
    pub side: Side,
}

impl Trade {
    /// Build a trade, assigning the side from the current book mid:
    /// a print at or below mid is treated as hitting the bid, above
    /// mid as lifting the ask.
    #[must_use]
    pub fn with_side_from_mid(
        timestamp: DateTime<Utc>,
        price: Decimal,
        quantity: i64,
        resting_order_id: i64,
        book: &OrderBook,
    ) -> Self {
        let side = if price <= book.mid() {
            Side::Bid
        } else {
            Side::Ask
        };
        Self {
            timestamp,
            price,
            quantity,
            resting_order_id,
            side,
        }
    }
}
