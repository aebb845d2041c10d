//! Raw market event types.
//!
//! A [`MarketEvent`] is one discrete message from the exchange feed
//! (or a replayed log line): an order being added, deleted, or traded
//! against, a full book clear, or an opening-price calculation marker.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Market side of an order or trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    /// Bid (buy) side.
    Bid,
    /// Ask (sell) side.
    Ask,
    /// No side (administrative events).
    None,
}

impl Side {
    /// Signed direction: +1 for Bid, -1 for Ask, 0 for None.
    #[must_use]
    pub const fn sign(&self) -> i64 {
        match self {
            Self::Bid => 1,
            Self::Ask => -1,
            Self::None => 0,
        }
    }

    /// The opposing side. `None` opposes itself.
    #[must_use]
    pub const fn opposite(&self) -> Self {
        match self {
            Self::Bid => Self::Ask,
            Self::Ask => Self::Bid,
            Self::None => Self::None,
        }
    }
}

/// Message type of a raw exchange event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    /// A new resting order entered the book.
    AddOrder,
    /// An existing resting order was amended in place.
    ModifyOrder,
    /// An existing resting order was removed.
    DeleteOrder,
    /// A trade print against a resting order.
    Trade,
    /// The exchange signalled a full book reset.
    OrderBookClear,
    /// Opening-price calculation marker.
    CalculateOpeningPrice,
}

/// Exchange order type carried on add/modify events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExchangeOrderType {
    /// Plain limit order resting in the book.
    #[default]
    Limit,
    /// Market order (never rests; seen on some trade prints).
    Market,
}

/// One immutable raw market event.
///
/// The exchange numbers bid and ask orders independently, so the raw
/// `order_id` alone is ambiguous. [`MarketEvent::unique_order_id`]
/// folds the side into a signed id that is unique across the book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketEvent {
    /// Event timestamp as reported by the feed.
    pub timestamp: DateTime<Utc>,
    /// Message type.
    pub message_type: MessageType,
    /// Raw per-side order id from the exchange.
    pub order_id: u64,
    /// Price of the order or trade print.
    pub price: Decimal,
    /// Quantity of the order or trade print (contracts).
    pub quantity: i64,
    /// Side of the order (`None` for administrative events).
    pub side: Side,
    /// Exchange order type.
    pub order_type: ExchangeOrderType,
}

impl MarketEvent {
    /// Signed order id unique across both per-side id spaces.
    ///
    /// `+order_id` for Bid, `-order_id` for Ask, `0` for None.
    #[must_use]
    pub fn unique_order_id(&self) -> i64 {
        Self::unique_id_for(self.side, self.order_id)
    }

    /// Compute the unique id for an arbitrary side/raw-id pair.
    #[must_use]
    pub fn unique_id_for(side: Side, raw_id: u64) -> i64 {
        let raw = i64::try_from(raw_id).unwrap_or(i64::MAX);
        side.sign() * raw
    }
}
