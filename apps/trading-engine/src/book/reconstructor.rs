//! Order book reconstruction from discrete exchange events.
//!
//! Each side keeps a price-to-quantity aggregate. Every mutation
//! yields a fresh depth-5 [`OrderBook`] snapshot: filter to positive
//! quantities, sort (asks ascending, bids descending), take the top
//! five, pad with the empty sentinel.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, error, warn};

use super::matcher::{ActiveOrderRegistry, MatchError, RestingOrder, TradeMatcher};
use crate::models::{
    BOOK_DEPTH, BookLevel, MarketEvent, MarketPhase, MessageType, OrderBook, Trade,
};

/// Running totals of absorbed feed inconsistencies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedErrorCounters {
    /// Trades whose resting order could not be located.
    pub trade_errors: u64,
    /// Deletes for unknown orders during the open session.
    pub delete_errors: u64,
    /// Modifies for unknown orders during the open session.
    pub modify_errors: u64,
}

/// Rebuilds the live order book from add/modify/delete/trade events.
#[derive(Debug, Default)]
pub struct OrderBookReconstructor {
    bids: BTreeMap<Decimal, i64>,
    asks: BTreeMap<Decimal, i64>,
    registry: ActiveOrderRegistry,
    errors: FeedErrorCounters,
}

impl OrderBookReconstructor {
    /// Create an empty reconstructor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorbed-error counters.
    #[must_use]
    pub const fn errors(&self) -> FeedErrorCounters {
        self.errors
    }

    /// The active-order registry (resting orders by unique id).
    #[must_use]
    pub const fn registry(&self) -> &ActiveOrderRegistry {
        &self.registry
    }

    /// Apply an ADD_ORDER event.
    pub fn process_add(&mut self, event: &MarketEvent) -> OrderBook {
        self.merge(side_of(event), event.price, event.quantity);
        self.registry.insert(RestingOrder::new(event.clone()));
        self.to_order_book(event.timestamp, MessageType::AddOrder)
    }

    /// Apply a MODIFY_ORDER event: remove the order's old remaining
    /// quantity from its old price level and insert the amended
    /// price/quantity. Unknown orders follow the delete-of-unknown
    /// policy.
    pub fn process_modify(&mut self, event: &MarketEvent, phase: MarketPhase) -> OrderBook {
        let unique_id = event.unique_order_id();
        if let Some(mut resting) = self.registry.remove(unique_id) {
            let old_price = resting.price();
            let old_remaining = resting.remaining_quantity;
            self.merge(side_of(&resting.event), old_price, -old_remaining);
            self.merge(side_of(event), event.price, event.quantity);
            resting.event = event.clone();
            resting.remaining_quantity = event.quantity;
            self.registry.insert(resting);
        } else if phase == MarketPhase::Open {
            self.errors.modify_errors += 1;
            error!(unique_id, "modify for unknown order during open session");
        } else {
            debug!(unique_id, "modify for unknown order outside open session, ignored");
        }
        self.to_order_book(event.timestamp, MessageType::ModifyOrder)
    }

    /// Apply a DELETE_ORDER event.
    ///
    /// Deletes for unknown orders are expected noise outside the open
    /// session and are dropped silently; during the open session they
    /// are counted and logged as errors.
    pub fn process_delete(&mut self, event: &MarketEvent, phase: MarketPhase) -> OrderBook {
        let unique_id = event.unique_order_id();
        if let Some(resting) = self.registry.remove(unique_id) {
            self.merge(
                side_of(&resting.event),
                resting.price(),
                -resting.remaining_quantity,
            );
        } else if phase == MarketPhase::Open {
            self.errors.delete_errors += 1;
            error!(unique_id, "delete for unknown order during open session");
        } else {
            debug!(unique_id, "delete for unknown order outside open session, ignored");
        }
        self.to_order_book(event.timestamp, MessageType::DeleteOrder)
    }

    /// Apply a TRADE event.
    ///
    /// The print is matched to its resting order (with the sign-flip
    /// retry); the book is decremented at the *resting* price, since
    /// prints may be marked at the aggressor's price. An unmatchable
    /// print leaves the book unchanged and emits no [`Trade`].
    pub fn process_trade(&mut self, event: &MarketEvent) -> (OrderBook, Option<Trade>) {
        match TradeMatcher::resolve(&mut self.registry, event) {
            Ok(fill) => {
                // The matched order may rest on either side; recover
                // the side from the signed unique id.
                let map = if fill.unique_id > 0 {
                    &mut self.bids
                } else {
                    &mut self.asks
                };
                Self::merge_into(map, fill.resting_price, -fill.fill_quantity);
                let book = self.to_order_book(event.timestamp, MessageType::Trade);
                let trade = Trade::with_side_from_mid(
                    event.timestamp,
                    event.price,
                    event.quantity,
                    fill.unique_id,
                    &book,
                );
                (book, Some(trade))
            }
            Err(err) => {
                self.errors.trade_errors += 1;
                match err {
                    MatchError::OrderNotFound { .. } => {
                        warn!(%err, price = %event.price, quantity = event.quantity, "unmatched trade dropped");
                    }
                    MatchError::Overfill { .. } | MatchError::NotATrade(_) => {
                        error!(%err, "trade dropped");
                    }
                }
                (self.to_order_book(event.timestamp, MessageType::Trade), None)
            }
        }
    }

    /// Discard all book state (exchange signalled a full reset).
    pub fn clear(&mut self, timestamp: DateTime<Utc>) -> OrderBook {
        self.bids.clear();
        self.asks.clear();
        self.registry.clear();
        self.to_order_book(timestamp, MessageType::OrderBookClear)
    }

    /// Derive the current depth-5 snapshot.
    #[must_use]
    pub fn to_order_book(&self, timestamp: DateTime<Utc>, triggered_by: MessageType) -> OrderBook {
        let mut book = OrderBook::empty(timestamp, triggered_by);
        for (slot, (price, quantity)) in book
            .asks
            .iter_mut()
            .zip(self.asks.iter().filter(|(_, q)| **q > 0).take(BOOK_DEPTH))
        {
            *slot = BookLevel::new(*price, *quantity);
        }
        for (slot, (price, quantity)) in book.bids.iter_mut().zip(
            self.bids
                .iter()
                .rev()
                .filter(|(_, q)| **q > 0)
                .take(BOOK_DEPTH),
        ) {
            *slot = BookLevel::new(*price, *quantity);
        }
        book
    }

    fn merge(&mut self, side: BookSide, price: Decimal, delta: i64) {
        let map = match side {
            BookSide::Bid => &mut self.bids,
            BookSide::Ask => &mut self.asks,
        };
        Self::merge_into(map, price, delta);
    }

    fn merge_into(map: &mut BTreeMap<Decimal, i64>, price: Decimal, delta: i64) {
        let level = map.entry(price).or_insert(0);
        *level += delta;
        if *level <= 0 {
            map.remove(&price);
        }
    }
}

/// Which aggregate map an event's side lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BookSide {
    Bid,
    Ask,
}

/// Aggregate map for an event's side. Events with no side fold into
/// the bid map; they never reach `merge` in practice because
/// administrative events are dispatched separately.
fn side_of(event: &MarketEvent) -> BookSide {
    match event.side {
        crate::models::Side::Ask => BookSide::Ask,
        crate::models::Side::Bid | crate::models::Side::None => BookSide::Bid,
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::models::{ExchangeOrderType, Side};

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 14, 0, 0).unwrap()
    }

    fn event(
        message_type: MessageType,
        side: Side,
        order_id: u64,
        price: Decimal,
        quantity: i64,
    ) -> MarketEvent {
        MarketEvent {
            timestamp: ts(),
            message_type,
            order_id,
            price,
            quantity,
            side,
            order_type: ExchangeOrderType::Limit,
        }
    }

    #[test]
    fn test_add_sorts_asks_ascending_bids_descending() {
        let mut book = OrderBookReconstructor::new();
        book.process_add(&event(MessageType::AddOrder, Side::Ask, 1, dec!(102), 5));
        book.process_add(&event(MessageType::AddOrder, Side::Ask, 2, dec!(101), 3));
        book.process_add(&event(MessageType::AddOrder, Side::Bid, 3, dec!(99), 7));
        let snap = book.process_add(&event(MessageType::AddOrder, Side::Bid, 4, dec!(100), 2));

        assert_eq!(snap.asks[0], BookLevel::new(dec!(101), 3));
        assert_eq!(snap.asks[1], BookLevel::new(dec!(102), 5));
        assert_eq!(snap.bids[0], BookLevel::new(dec!(100), 2));
        assert_eq!(snap.bids[1], BookLevel::new(dec!(99), 7));
        assert!(snap.asks[2].is_empty());
    }

    #[test]
    fn test_same_price_orders_aggregate_into_one_level() {
        let mut book = OrderBookReconstructor::new();
        book.process_add(&event(MessageType::AddOrder, Side::Bid, 1, dec!(99), 5));
        let snap = book.process_add(&event(MessageType::AddOrder, Side::Bid, 2, dec!(99), 4));
        assert_eq!(snap.bids[0], BookLevel::new(dec!(99), 9));
        assert!(snap.bids[1].is_empty());
    }

    #[test]
    fn test_delete_removes_remaining_quantity() {
        let mut book = OrderBookReconstructor::new();
        book.process_add(&event(MessageType::AddOrder, Side::Bid, 1, dec!(99), 5));
        let snap = book.process_delete(
            &event(MessageType::DeleteOrder, Side::Bid, 1, dec!(99), 5),
            MarketPhase::Open,
        );
        assert!(snap.bids[0].is_empty());
        assert!(book.registry().is_empty());
    }

    #[test]
    fn test_delete_unknown_counted_only_during_open() {
        let mut book = OrderBookReconstructor::new();
        book.process_delete(
            &event(MessageType::DeleteOrder, Side::Bid, 9, dec!(99), 5),
            MarketPhase::PreMarket,
        );
        assert_eq!(book.errors().delete_errors, 0);
        book.process_delete(
            &event(MessageType::DeleteOrder, Side::Bid, 9, dec!(99), 5),
            MarketPhase::Open,
        );
        assert_eq!(book.errors().delete_errors, 1);
    }

    #[test]
    fn test_modify_moves_order_to_new_level() {
        let mut book = OrderBookReconstructor::new();
        book.process_add(&event(MessageType::AddOrder, Side::Ask, 1, dec!(101), 5));
        let snap = book.process_modify(
            &event(MessageType::ModifyOrder, Side::Ask, 1, dec!(102), 8),
            MarketPhase::Open,
        );
        assert_eq!(snap.asks[0], BookLevel::new(dec!(102), 8));
        assert_eq!(book.registry().get(-1).unwrap().remaining_quantity, 8);
    }

    #[test]
    fn test_trade_decrements_at_resting_price() {
        let mut book = OrderBookReconstructor::new();
        book.process_add(&event(MessageType::AddOrder, Side::Ask, 1, dec!(101), 5));
        book.process_add(&event(MessageType::AddOrder, Side::Bid, 2, dec!(99), 5));
        // Print marked at the aggressor's price, resting at 101.
        let mut trade_event = event(MessageType::Trade, Side::Ask, 1, dec!(101), 2);
        trade_event.price = dec!(101);
        let (snap, trade) = book.process_trade(&trade_event);
        assert_eq!(snap.asks[0], BookLevel::new(dec!(101), 3));
        let trade = trade.unwrap();
        assert_eq!(trade.resting_order_id, -1);
        assert_eq!(trade.quantity, 2);
    }

    #[test]
    fn test_trade_consuming_order_removes_it_from_registry() {
        let mut book = OrderBookReconstructor::new();
        book.process_add(&event(MessageType::AddOrder, Side::Ask, 1, dec!(101), 5));
        let (_, trade) = book.process_trade(&event(MessageType::Trade, Side::Ask, 1, dec!(101), 5));
        assert!(trade.is_some());
        assert!(book.registry().is_empty());
    }

    #[test]
    fn test_unmatched_trade_leaves_book_unchanged() {
        let mut book = OrderBookReconstructor::new();
        book.process_add(&event(MessageType::AddOrder, Side::Ask, 1, dec!(101), 5));
        let before = book.to_order_book(ts(), MessageType::Trade);
        let (after, trade) =
            book.process_trade(&event(MessageType::Trade, Side::Ask, 99, dec!(101), 5));
        assert!(trade.is_none());
        assert_eq!(before.asks, after.asks);
        assert_eq!(book.errors().trade_errors, 1);
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut book = OrderBookReconstructor::new();
        book.process_add(&event(MessageType::AddOrder, Side::Ask, 1, dec!(101), 5));
        book.process_add(&event(MessageType::AddOrder, Side::Bid, 2, dec!(99), 5));
        let snap = book.clear(ts());
        assert!(snap.asks[0].is_empty());
        assert!(snap.bids[0].is_empty());
        assert!(book.registry().is_empty());
    }

    #[test]
    fn test_replay_determinism() {
        let events = vec![
            event(MessageType::AddOrder, Side::Ask, 1, dec!(101), 5),
            event(MessageType::AddOrder, Side::Bid, 2, dec!(99), 7),
            event(MessageType::Trade, Side::Ask, 1, dec!(101), 2),
            event(MessageType::DeleteOrder, Side::Bid, 2, dec!(99), 7),
        ];
        let run = |events: &[MarketEvent]| {
            let mut book = OrderBookReconstructor::new();
            let mut snaps = Vec::new();
            for e in events {
                let snap = match e.message_type {
                    MessageType::AddOrder => book.process_add(e),
                    MessageType::DeleteOrder => book.process_delete(e, MarketPhase::Open),
                    MessageType::Trade => book.process_trade(e).0,
                    _ => unreachable!(),
                };
                snaps.push(snap);
            }
            snaps
        };
        assert_eq!(run(&events), run(&events));
    }

    proptest! {
        /// Arbitrary add/delete sequences never produce a level with
        /// non-positive price or quantity, and levels stay sorted.
        #[test]
        fn prop_book_invariants(ops in prop::collection::vec((0u8..2, 1u64..20, 1i64..100i64, 0u8..2), 1..60)) {
            let mut book = OrderBookReconstructor::new();
            let mut snap = book.to_order_book(ts(), MessageType::AddOrder);
            for (op, id, qty, side) in ops {
                let side = if side == 0 { Side::Bid } else { Side::Ask };
                // Price derived from the id keeps add/delete pairs consistent.
                let price = Decimal::from(100 + id);
                snap = if op == 0 {
                    book.process_add(&event(MessageType::AddOrder, side, id, price, qty))
                } else {
                    book.process_delete(
                        &event(MessageType::DeleteOrder, side, id, price, qty),
                        MarketPhase::PreMarket,
                    )
                };
            }
            let populated_asks: Vec<_> = snap.asks.iter().take_while(|l| !l.is_empty()).collect();
            let populated_bids: Vec<_> = snap.bids.iter().take_while(|l| !l.is_empty()).collect();
            for level in populated_asks.iter().chain(populated_bids.iter()) {
                prop_assert!(level.price > Decimal::ZERO);
                prop_assert!(level.quantity > 0);
            }
            for pair in populated_asks.windows(2) {
                prop_assert!(pair[0].price < pair[1].price);
            }
            for pair in populated_bids.windows(2) {
                prop_assert!(pair[0].price > pair[1].price);
            }
            // No gaps: everything after the populated prefix is empty.
            for level in snap.asks.iter().skip(populated_asks.len()) {
                prop_assert!(level.is_empty());
            }
            for level in snap.bids.iter().skip(populated_bids.len()) {
                prop_assert!(level.is_empty());
            }
        }
    }
}
