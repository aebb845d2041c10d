//! Market event pipeline.
//!
//! [`MarketPipeline`] is the thin glue between the raw feed and the
//! trading day: it routes each [`MarketEvent`] through the book
//! reconstructor and publishes the resulting snapshot (and trade,
//! when one matched) into the [`TradingDay`], which fans out to
//! subscribers. One pipeline instance per instrument; live feeds and
//! file replays drive it identically.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::book::{FeedErrorCounters, OrderBookReconstructor};
use crate::models::{MarketEvent, MarketSession, MessageType};
use crate::sequencer::TradingDay;

/// Routes raw market events into the book and the trading day.
#[derive(Debug)]
pub struct MarketPipeline {
    session: MarketSession,
    reconstructor: OrderBookReconstructor,
    day: Arc<TradingDay>,
}

impl MarketPipeline {
    /// Create a pipeline over an empty book.
    #[must_use]
    pub fn new(session: MarketSession, day: Arc<TradingDay>) -> Self {
        Self {
            session,
            reconstructor: OrderBookReconstructor::new(),
            day,
        }
    }

    /// The trading day this pipeline publishes into.
    #[must_use]
    pub fn day(&self) -> &Arc<TradingDay> {
        &self.day
    }

    /// Feed-inconsistency counters accumulated so far.
    #[must_use]
    pub const fn feed_errors(&self) -> FeedErrorCounters {
        self.reconstructor.errors()
    }

    /// Apply one event and publish the result.
    pub fn process(&mut self, event: &MarketEvent) {
        let phase = self.session.phase(event.timestamp);
        match event.message_type {
            MessageType::AddOrder => {
                let book = self.reconstructor.process_add(event);
                self.day.order_book(book);
            }
            MessageType::ModifyOrder => {
                let book = self.reconstructor.process_modify(event, phase);
                self.day.order_book(book);
            }
            MessageType::DeleteOrder => {
                let book = self.reconstructor.process_delete(event, phase);
                self.day.order_book(book);
            }
            MessageType::Trade => {
                let (book, trade) = self.reconstructor.process_trade(event);
                match trade {
                    Some(trade) => self.day.trade_with_book(trade, book),
                    None => self.day.order_book(book),
                }
            }
            MessageType::OrderBookClear => {
                let book = self.reconstructor.clear(event.timestamp);
                self.day.order_book(book);
            }
            MessageType::CalculateOpeningPrice => {
                debug!(timestamp = %event.timestamp, "opening price calculation");
                self.day.extra(event.clone());
            }
        }
    }

    /// Current depth snapshot without applying an event.
    #[must_use]
    pub fn snapshot(&self, timestamp: DateTime<Utc>, triggered_by: MessageType) -> crate::models::OrderBook {
        self.reconstructor.to_order_book(timestamp, triggered_by)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use crate::models::{ExchangeOrderType, OrderBook, Side, Trade};
    use crate::sequencer::MarketObserver;

    use super::*;

    #[derive(Default)]
    struct Counter {
        books: AtomicUsize,
        trades: AtomicUsize,
        extras: AtomicUsize,
    }

    impl MarketObserver for Counter {
        fn on_order_book(&self, _book: &OrderBook) {
            self.books.fetch_add(1, Ordering::SeqCst);
        }
        fn on_trade(&self, _trade: &Trade, _book: Option<&OrderBook>) {
            self.trades.fetch_add(1, Ordering::SeqCst);
        }
        fn on_extra(&self, _event: &MarketEvent) {
            self.extras.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap()
    }

    fn event(
        message_type: MessageType,
        order_id: u64,
        price: Decimal,
        quantity: i64,
        side: Side,
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
    fn test_events_route_to_their_kind() {
        let counter = Arc::new(Counter::default());
        let mut day = TradingDay::new(MarketSession::default());
        day.subscribe(counter.clone());
        let mut pipeline = MarketPipeline::new(MarketSession::default(), Arc::new(day));

        pipeline.process(&event(MessageType::AddOrder, 1, dec!(99), 5, Side::Bid));
        pipeline.process(&event(MessageType::AddOrder, 1, dec!(101), 5, Side::Ask));
        pipeline.process(&event(MessageType::Trade, 1, dec!(101), 2, Side::Ask));
        pipeline.process(&event(
            MessageType::CalculateOpeningPrice,
            0,
            Decimal::ZERO,
            0,
            Side::None,
        ));

        assert_eq!(counter.books.load(Ordering::SeqCst), 2);
        assert_eq!(counter.trades.load(Ordering::SeqCst), 1);
        assert_eq!(counter.extras.load(Ordering::SeqCst), 1);
        assert!(pipeline.day().is_ready());
    }

    #[test]
    fn test_unmatched_trade_publishes_book_only() {
        let counter = Arc::new(Counter::default());
        let mut day = TradingDay::new(MarketSession::default());
        day.subscribe(counter.clone());
        let mut pipeline = MarketPipeline::new(MarketSession::default(), Arc::new(day));

        pipeline.process(&event(MessageType::Trade, 77, dec!(100), 2, Side::Bid));
        assert_eq!(counter.trades.load(Ordering::SeqCst), 0);
        assert_eq!(counter.books.load(Ordering::SeqCst), 1);
        assert_eq!(pipeline.feed_errors().trade_errors, 1);
    }

    #[test]
    fn test_clear_resets_the_book() {
        let day = Arc::new(TradingDay::new(MarketSession::default()));
        let mut pipeline = MarketPipeline::new(MarketSession::default(), day);

        pipeline.process(&event(MessageType::AddOrder, 1, dec!(99), 5, Side::Bid));
        pipeline.process(&event(
            MessageType::OrderBookClear,
            0,
            Decimal::ZERO,
            0,
            Side::None,
        ));
        let book = pipeline.snapshot(ts(), MessageType::OrderBookClear);
        assert_eq!(book.best_bid(), Decimal::ZERO);
    }
}
