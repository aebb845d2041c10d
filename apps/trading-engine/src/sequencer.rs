//! Event sequencing: the single point all inbound data flows through.
//!
//! [`TradingDay`] records every book snapshot, trade, bar, and extra
//! event into a bounded per-kind history, maintains the daily trade
//! aggregates, and fans each event out to typed subscribers in
//! registration order. Notification is synchronous on the calling
//! thread and happens after the internal lock is released, so a
//! subscriber may call back into position or order state without
//! deadlocking.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::{Bar, MarketEvent, MarketSession, OrderBook, Trade};

/// Default bounded-history capacity per event kind.
pub const DEFAULT_HISTORY_CAPACITY: usize = 4096;

/// Kind of the most recently sequenced event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// An order book snapshot.
    OrderBook,
    /// A trade.
    Trade,
    /// An OHLCV bar.
    Bar,
    /// Any other raw event.
    Extra,
}

/// Append-only history bounded to a fixed capacity; the oldest entry
/// is discarded once the bound is reached.
#[derive(Debug, Clone)]
pub struct BoundedHistory<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedHistory<T> {
    /// Create a history bounded to `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    /// Append, evicting the oldest entry when full.
    pub fn push(&mut self, item: T) {
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    /// Most recent entry.
    #[must_use]
    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }

    /// Number of retained entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

/// Daily trade aggregates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyStats {
    /// Highest trade price seen today (zero until the first trade).
    pub trade_high: Decimal,
    /// Lowest trade price seen today (zero until the first trade).
    pub trade_low: Decimal,
    /// Number of trades sequenced today.
    pub trade_count: u64,
}

impl DailyStats {
    fn record(&mut self, price: Decimal) {
        if self.trade_count == 0 {
            self.trade_high = price;
            self.trade_low = price;
        } else {
            self.trade_high = self.trade_high.max(price);
            self.trade_low = self.trade_low.min(price);
        }
        self.trade_count += 1;
    }
}

/// Typed subscriber for sequenced market events.
///
/// All callbacks run synchronously on the sequencing thread; default
/// implementations ignore the event so observers implement only what
/// they consume.
pub trait MarketObserver: Send + Sync {
    /// A new order book snapshot was sequenced.
    fn on_order_book(&self, _book: &OrderBook) {}

    /// A trade was sequenced, with the book snapshot it produced when
    /// the two arrived together.
    fn on_trade(&self, _trade: &Trade, _book: Option<&OrderBook>) {}

    /// A bar was sequenced.
    fn on_bar(&self, _bar: &Bar) {}

    /// A raw event outside the other kinds was sequenced.
    fn on_extra(&self, _event: &MarketEvent) {}
}

#[derive(Debug)]
struct DayState {
    books: BoundedHistory<OrderBook>,
    trades: BoundedHistory<Trade>,
    bars: BoundedHistory<Bar>,
    extras: BoundedHistory<MarketEvent>,
    stats: DailyStats,
    last_event_kind: Option<EventKind>,
    last_processed: Option<DateTime<Utc>>,
}

/// The single synchronization point for all inbound market data.
pub struct TradingDay {
    session: MarketSession,
    state: Mutex<DayState>,
    subscribers: Vec<Arc<dyn MarketObserver>>,
}

impl std::fmt::Debug for TradingDay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradingDay")
            .field("session", &self.session)
            .field("subscribers", &self.subscribers.len())
            .finish_non_exhaustive()
    }
}

impl TradingDay {
    /// Create a trading day with the default history capacity.
    #[must_use]
    pub fn new(session: MarketSession) -> Self {
        Self::with_capacity(session, DEFAULT_HISTORY_CAPACITY)
    }

    /// Create a trading day with an explicit per-kind history bound.
    #[must_use]
    pub fn with_capacity(session: MarketSession, capacity: usize) -> Self {
        Self {
            session,
            state: Mutex::new(DayState {
                books: BoundedHistory::new(capacity),
                trades: BoundedHistory::new(capacity),
                bars: BoundedHistory::new(capacity),
                extras: BoundedHistory::new(capacity),
                stats: DailyStats::default(),
                last_event_kind: None,
                last_processed: None,
            }),
            subscribers: Vec::new(),
        }
    }

    /// Register a subscriber. Subscribers are notified in
    /// registration order; registration happens before the day is
    /// shared across threads.
    pub fn subscribe(&mut self, observer: Arc<dyn MarketObserver>) {
        self.subscribers.push(observer);
    }

    /// The session schedule this day runs under.
    #[must_use]
    pub const fn session(&self) -> MarketSession {
        self.session
    }

    /// Sequence an order book snapshot.
    pub fn order_book(&self, book: OrderBook) {
        self.warn_if_crossed(&book);
        {
            let mut state = self.state.lock();
            state.last_event_kind = Some(EventKind::OrderBook);
            state.last_processed = Some(book.timestamp);
            state.books.push(book.clone());
        }
        for subscriber in &self.subscribers {
            subscriber.on_order_book(&book);
        }
    }

    /// Sequence a trade with no accompanying snapshot.
    pub fn trade(&self, trade: Trade) {
        self.record_trade(&trade, None);
    }

    /// Sequence a trade together with the book snapshot it produced.
    pub fn trade_with_book(&self, trade: Trade, book: OrderBook) {
        self.warn_if_crossed(&book);
        self.record_trade(&trade, Some(book));
    }

    /// Sequence a bar.
    pub fn bar(&self, bar: Bar) {
        {
            let mut state = self.state.lock();
            state.last_event_kind = Some(EventKind::Bar);
            state.last_processed = Some(bar.timestamp);
            state.bars.push(bar.clone());
        }
        for subscriber in &self.subscribers {
            subscriber.on_bar(&bar);
        }
    }

    /// Sequence a raw event outside the other kinds.
    pub fn extra(&self, event: MarketEvent) {
        {
            let mut state = self.state.lock();
            state.last_event_kind = Some(EventKind::Extra);
            state.last_processed = Some(event.timestamp);
            state.extras.push(event.clone());
        }
        for subscriber in &self.subscribers {
            subscriber.on_extra(&event);
        }
    }

    /// True once both top-of-book prices are positive.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state
            .lock()
            .books
            .latest()
            .is_some_and(OrderBook::has_two_sides)
    }

    /// Most recent book snapshot.
    #[must_use]
    pub fn latest_book(&self) -> Option<OrderBook> {
        self.state.lock().books.latest().cloned()
    }

    /// Most recent trade.
    #[must_use]
    pub fn latest_trade(&self) -> Option<Trade> {
        self.state.lock().trades.latest().cloned()
    }

    /// Daily trade aggregates.
    #[must_use]
    pub fn daily_stats(&self) -> DailyStats {
        self.state.lock().stats
    }

    /// Kind of the most recently sequenced event.
    #[must_use]
    pub fn last_event_kind(&self) -> Option<EventKind> {
        self.state.lock().last_event_kind
    }

    /// Timestamp of the most recently sequenced event.
    #[must_use]
    pub fn last_processed(&self) -> Option<DateTime<Utc>> {
        self.state.lock().last_processed
    }

    fn record_trade(&self, trade: &Trade, book: Option<OrderBook>) {
        {
            let mut state = self.state.lock();
            state.last_event_kind = Some(EventKind::Trade);
            state.last_processed = Some(trade.timestamp);
            state.stats.record(trade.price);
            state.trades.push(trade.clone());
            if let Some(book) = book.clone() {
                state.books.push(book);
            }
        }
        for subscriber in &self.subscribers {
            subscriber.on_trade(trade, book.as_ref());
        }
    }

    // A crossed book during the open session means the feed or the
    // reconstruction is inconsistent; processing continues regardless.
    fn warn_if_crossed(&self, book: &OrderBook) {
        if book.is_crossed() && self.session.is_open(book.timestamp) {
            warn!(
                bid0 = %book.best_bid(),
                ask0 = %book.best_ask(),
                "crossed book during open session"
            );
        }
    }
}
