//! Trade-to-resting-order matching.
//!
//! A trade print names a raw order id in one of the two per-side id
//! spaces. Some feeds mislabel the side, so a failed lookup (or a
//! price mismatch) is retried against the sign-flipped unique id
//! before the print is declared unmatchable.

use std::collections::HashMap;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::{MarketEvent, MessageType};

/// A resting order tracked by the [`ActiveOrderRegistry`].
///
/// The originating add event is kept immutable; only the remaining
/// quantity accumulator changes as partial fills are applied.
#[derive(Debug, Clone)]
pub struct RestingOrder {
    /// The ADD_ORDER event that created this order.
    pub event: MarketEvent,
    /// Quantity not yet filled.
    pub remaining_quantity: i64,
}

impl RestingOrder {
    /// Track a new resting order from its add event.
    #[must_use]
    pub fn new(event: MarketEvent) -> Self {
        let remaining_quantity = event.quantity;
        Self {
            event,
            remaining_quantity,
        }
    }

    /// Resting price of this order.
    #[must_use]
    pub fn price(&self) -> Decimal {
        self.event.price
    }
}

/// Mapping from unique order id to the resting order it identifies.
///
/// Entries are inserted on ADD_ORDER and removed on DELETE_ORDER or a
/// trade that consumes the full remaining quantity.
#[derive(Debug, Default)]
pub struct ActiveOrderRegistry {
    orders: HashMap<i64, RestingOrder>,
}

impl ActiveOrderRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a resting order under its unique id.
    pub fn insert(&mut self, order: RestingOrder) {
        self.orders.insert(order.event.unique_order_id(), order);
    }

    /// Look up a resting order by unique id.
    #[must_use]
    pub fn get(&self, unique_id: i64) -> Option<&RestingOrder> {
        self.orders.get(&unique_id)
    }

    /// Mutable lookup by unique id.
    pub fn get_mut(&mut self, unique_id: i64) -> Option<&mut RestingOrder> {
        self.orders.get_mut(&unique_id)
    }

    /// Remove a resting order, returning it if present.
    pub fn remove(&mut self, unique_id: i64) -> Option<RestingOrder> {
        self.orders.remove(&unique_id)
    }

    /// Number of tracked orders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    /// True when no orders are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Drop all tracked orders.
    pub fn clear(&mut self) {
        self.orders.clear();
    }
}

/// Matching failures. All are feed inconsistencies: callers count and
/// log them, drop the print, and keep the book live.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MatchError {
    /// No resting order found under either signed id.
    #[error("no resting order found for trade (unique id {unique_id} or {flipped_id})")]
    OrderNotFound {
        /// Unique id derived from the event's reported side.
        unique_id: i64,
        /// The sign-flipped id tried as a fallback.
        flipped_id: i64,
    },
    /// A trade for more than the order's remaining quantity.
    #[error("trade quantity {trade_quantity} exceeds remaining {remaining} on order {unique_id}")]
    Overfill {
        /// Unique id of the matched resting order.
        unique_id: i64,
        /// Quantity on the trade print.
        trade_quantity: i64,
        /// Remaining quantity before the print.
        remaining: i64,
    },
    /// The event is not a trade print.
    #[error("expected TRADE event, got {0:?}")]
    NotATrade(MessageType),
}

/// Outcome of a successful match: which resting order absorbed the
/// print and at what resting price the book must be decremented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedFill {
    /// Unique id of the matched resting order.
    pub unique_id: i64,
    /// Price the order rests at. Trade prints may be marked at the
    /// aggressor's price, so book decrements use this price instead.
    pub resting_price: Decimal,
    /// Quantity consumed from the resting order.
    pub fill_quantity: i64,
    /// True when the print consumed the order entirely (it has been
    /// removed from the registry).
    pub exhausted: bool,
}

/// Resolves trade prints against the active-order registry.
#[derive(Debug, Default)]
pub struct TradeMatcher;

impl TradeMatcher {
    /// Resolve a TRADE event to the resting order it filled and apply
    /// the fill to the registry.
    ///
    /// Lookup order: the unique id derived from the event's reported
    /// side first; on a miss or a resting-price mismatch, the
    /// sign-flipped id. A match on either id requires the resting
    /// price to equal the print price unless the primary lookup
    /// found no order at all.
    ///
    /// # Errors
    ///
    /// [`MatchError::OrderNotFound`] when neither id resolves,
    /// [`MatchError::Overfill`] when the print exceeds the order's
    /// remaining quantity (registry left untouched).
    pub fn resolve(
        registry: &mut ActiveOrderRegistry,
        event: &MarketEvent,
    ) -> Result<MatchedFill, MatchError> {
        if event.message_type != MessageType::Trade {
            return Err(MatchError::NotATrade(event.message_type));
        }

        let primary = event.unique_order_id();
        let flipped = -primary;

        let unique_id = match registry.get(primary) {
            Some(order) if order.price() == event.price => primary,
            // Price mismatch or miss: the feed mislabelled the side.
            _ => match registry.get(flipped) {
                Some(order) if order.price() == event.price => flipped,
                _ => {
                    return Err(MatchError::OrderNotFound {
                        unique_id: primary,
                        flipped_id: flipped,
                    });
                }
            },
        };

        let order = registry
            .get_mut(unique_id)
            .ok_or(MatchError::OrderNotFound {
                unique_id: primary,
                flipped_id: flipped,
            })?;

        if event.quantity > order.remaining_quantity {
            return Err(MatchError::Overfill {
                unique_id,
                trade_quantity: event.quantity,
                remaining: order.remaining_quantity,
            });
        }

        let resting_price = order.price();
        order.remaining_quantity -= event.quantity;
        let exhausted = order.remaining_quantity == 0;
        if exhausted {
            registry.remove(unique_id);
        }

        Ok(MatchedFill {
            unique_id,
            resting_price,
            fill_quantity: event.quantity,
            exhausted,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    use super::*;
    use crate::models::{ExchangeOrderType, Side};

    fn add(side: Side, order_id: u64, price: Decimal, quantity: i64) -> MarketEvent {
        MarketEvent {
            timestamp: Utc.with_ymd_and_hms(2026, 3, 2, 14, 0, 0).unwrap(),
            message_type: MessageType::AddOrder,
            order_id,
            price,
            quantity,
            side,
            order_type: ExchangeOrderType::Limit,
        }
    }

    fn trade(side: Side, order_id: u64, price: Decimal, quantity: i64) -> MarketEvent {
        MarketEvent {
            message_type: MessageType::Trade,
            ..add(side, order_id, price, quantity)
        }
    }

    fn registry_with(events: &[MarketEvent]) -> ActiveOrderRegistry {
        let mut registry = ActiveOrderRegistry::new();
        for event in events {
            registry.insert(RestingOrder::new(event.clone()));
        }
        registry
    }

    #[test]
    fn test_full_fill_removes_order() {
        let mut registry = registry_with(&[add(Side::Bid, 10, dec!(99), 5)]);
        let fill =
            TradeMatcher::resolve(&mut registry, &trade(Side::Bid, 10, dec!(99), 5)).unwrap();
        assert!(fill.exhausted);
        assert_eq!(fill.unique_id, 10);
        assert_eq!(fill.resting_price, dec!(99));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_partial_fill_keeps_order_with_reduced_quantity() {
        let mut registry = registry_with(&[add(Side::Bid, 10, dec!(99), 5)]);
        let fill =
            TradeMatcher::resolve(&mut registry, &trade(Side::Bid, 10, dec!(99), 2)).unwrap();
        assert!(!fill.exhausted);
        assert_eq!(registry.get(10).unwrap().remaining_quantity, 3);
    }

    #[test]
    fn test_mislabelled_side_retried_with_flipped_id() {
        // Order rests on the ask side; the print claims bid.
        let mut registry = registry_with(&[add(Side::Ask, 10, dec!(101), 4)]);
        let fill =
            TradeMatcher::resolve(&mut registry, &trade(Side::Bid, 10, dec!(101), 4)).unwrap();
        assert_eq!(fill.unique_id, -10);
        assert!(fill.exhausted);
    }

    #[test]
    fn test_price_mismatch_on_primary_retries_flipped() {
        // Same raw id on both sides at different prices; the print
        // price only matches the ask-side order.
        let mut registry = registry_with(&[
            add(Side::Bid, 10, dec!(99), 5),
            add(Side::Ask, 10, dec!(101), 5),
        ]);
        let fill =
            TradeMatcher::resolve(&mut registry, &trade(Side::Bid, 10, dec!(101), 5)).unwrap();
        assert_eq!(fill.unique_id, -10);
        assert_eq!(registry.get(10).unwrap().remaining_quantity, 5);
    }

    #[test]
    fn test_unmatched_trade_is_error() {
        let mut registry = registry_with(&[]);
        let err =
            TradeMatcher::resolve(&mut registry, &trade(Side::Bid, 10, dec!(99), 5)).unwrap_err();
        assert_eq!(
            err,
            MatchError::OrderNotFound {
                unique_id: 10,
                flipped_id: -10
            }
        );
    }

    #[test]
    fn test_overfill_leaves_registry_untouched() {
        let mut registry = registry_with(&[add(Side::Bid, 10, dec!(99), 5)]);
        let err =
            TradeMatcher::resolve(&mut registry, &trade(Side::Bid, 10, dec!(99), 6)).unwrap_err();
        assert!(matches!(err, MatchError::Overfill { remaining: 5, .. }));
        assert_eq!(registry.get(10).unwrap().remaining_quantity, 5);
    }
}
