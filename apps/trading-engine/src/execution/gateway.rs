//! Order execution gateway.
//!
//! [`OrderReceiver`] is the single entry point for trading decisions:
//! every buy, sell, exit, and cancel flows through it. It validates
//! the top of book, consults the risk gate, places the order with the
//! broker, and registers the result against the position ledger. The
//! ledger and risk gate share one lock so every risk decision sees a
//! consistent position/pending-order snapshot; the lock is never held
//! across a broker call, and a failed placement never touches the
//! ledger. Broker callbacks (fills, cancellations, snapshots) land on
//! the same lock from whatever thread delivers them; a fill racing a
//! cancel is applied anyway, because the broker's fills are the truth
//! about the position.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::ledger::{FillOutcome, LedgerError, Order, OrderIntent, Position};
use crate::models::{ExchangeOrderType, MarketEvent, Side};
use crate::risk::{RejectReason, RiskLimits, RiskManager};
use crate::sequencer::TradingDay;

use super::broker::{Broker, BrokerError, OrderRequest};

/// Why a buy/sell/exit did not result in a placed order.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OrderRejected {
    /// Top of book on the relevant side is not a positive price.
    #[error("no valid {side:?} price to trade against ({price})")]
    InvalidBookPrice {
        /// The side whose top-of-book was invalid.
        side: Side,
        /// The offending price.
        price: Decimal,
    },
    /// The risk gate declined the order.
    #[error("risk gate declined: {0}")]
    Risk(#[from] RejectReason),
    /// The broker failed or declined the placement.
    #[error(transparent)]
    Broker(#[from] BrokerError),
    /// Registering the acknowledged order violated the ledger.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Ledger and risk state guarded by the gateway's single lock.
#[derive(Debug)]
struct TradingState {
    position: Position,
    risk: RiskManager,
    exiting: bool,
    exit_order_id: Option<i64>,
}

impl TradingState {
    fn clear_exit(&mut self) {
        self.exiting = false;
        self.exit_order_id = None;
    }
}

/// The one gateway between trading signals and the broker.
pub struct OrderReceiver {
    day: Arc<TradingDay>,
    broker: Arc<dyn Broker>,
    state: Arc<Mutex<TradingState>>,
}

impl std::fmt::Debug for OrderReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderReceiver").finish_non_exhaustive()
    }
}

impl OrderReceiver {
    /// Create a gateway over a fresh position ledger.
    #[must_use]
    pub fn new(
        day: Arc<TradingDay>,
        broker: Arc<dyn Broker>,
        limits: RiskLimits,
        multiplier: Decimal,
    ) -> Self {
        Self {
            day,
            broker,
            state: Arc::new(Mutex::new(TradingState {
                position: Position::new(multiplier),
                risk: RiskManager::new(limits),
                exiting: false,
                exit_order_id: None,
            })),
        }
    }

    /// Net signed position quantity.
    #[must_use]
    pub fn position_quantity(&self) -> i64 {
        self.state.lock().position.quantity()
    }

    /// Realized P&L across every completed exit.
    #[must_use]
    pub fn realized_pnl(&self) -> Decimal {
        self.state.lock().position.realized_pnl()
    }

    /// Mark-to-market P&L of the open position against `mark_price`
    /// (zero when flat).
    #[must_use]
    pub fn unrealized_pnl(&self, mark_price: Decimal) -> Decimal {
        let state = self.state.lock();
        let quantity = state.position.quantity();
        if quantity == 0 {
            return Decimal::ZERO;
        }
        (mark_price - state.position.entry_price())
            * Decimal::from(quantity)
            * state.position.multiplier()
    }

    /// The most recent risk rejection, for logging.
    #[must_use]
    pub fn last_rejection(&self) -> Option<RejectReason> {
        self.state.lock().risk.last_rejection()
    }

    /// Broker order ids with unfilled quantity.
    #[must_use]
    pub fn pending_order_ids(&self) -> Vec<i64> {
        self.state.lock().position.pending_order_ids()
    }

    /// Run a read-only closure over the registered orders for an id.
    pub fn with_order_group<R>(
        &self,
        broker_order_id: i64,
        f: impl FnOnce(Option<&[Order]>) -> R,
    ) -> R {
        f(self.state.lock().position.order_group(broker_order_id))
    }

    /// Place a market buy at the current best ask.
    ///
    /// # Errors
    ///
    /// [`OrderRejected`] when the ask is not a positive price, the
    /// risk gate declines, or the broker fails. Nothing is registered
    /// against the position on rejection.
    pub async fn buy(
        &self,
        source: &str,
        triggering_event: Option<MarketEvent>,
        quantity: i64,
        stop_price: Option<Decimal>,
        at: DateTime<Utc>,
    ) -> Result<i64, OrderRejected> {
        self.submit(Side::Bid, source, triggering_event, quantity, stop_price, at)
            .await
    }

    /// Place a market sell at the current best bid.
    ///
    /// # Errors
    ///
    /// As for [`Self::buy`], against the bid price and sell-side risk
    /// limits.
    pub async fn sell(
        &self,
        source: &str,
        triggering_event: Option<MarketEvent>,
        quantity: i64,
        stop_price: Option<Decimal>,
        at: DateTime<Utc>,
    ) -> Result<i64, OrderRejected> {
        self.submit(Side::Ask, source, triggering_event, quantity, stop_price, at)
            .await
    }

    async fn submit(
        &self,
        side: Side,
        source: &str,
        triggering_event: Option<MarketEvent>,
        quantity: i64,
        stop_price: Option<Decimal>,
        at: DateTime<Utc>,
    ) -> Result<i64, OrderRejected> {
        let price = self.tradable_price(side)?;
        {
            let mut state = self.state.lock();
            let position = state.position.quantity();
            match side {
                Side::Bid => state.risk.can_buy(position, at)?,
                _ => state.risk.can_sell(position, at)?,
            }
        }

        let record = self
            .broker
            .place(OrderRequest {
                client_order_id: uuid::Uuid::new_v4(),
                side,
                quantity,
                price,
                order_type: ExchangeOrderType::Market,
            })
            .await?;

        let mut state = self.state.lock();
        let intent = OrderIntent {
            broker_order_id: record.broker_order_id,
            source: source.to_string(),
            triggering_event,
            quantity,
            price,
            stop_price,
            created_at: at,
        };
        match side {
            Side::Bid => state.position.add_buy_order(&intent)?,
            _ => state.position.add_sell_order(&intent)?,
        };
        state.risk.order_placed(side, at);
        info!(
            broker_order_id = record.broker_order_id,
            ?side,
            quantity,
            %price,
            source,
            "order placed"
        );
        Ok(record.broker_order_id)
    }

    /// Flatten the position: cancel everything pending, then place a
    /// single opposing market order for the full open quantity.
    ///
    /// Idempotent: a second call while an exit is in flight, or with
    /// a flat position, returns `Ok(None)` without touching anything.
    /// The in-flight flag clears when the exit order fills flat, when
    /// the venue cancels it, or when placing it fails, so the exit
    /// can always be retried.
    ///
    /// # Errors
    ///
    /// [`OrderRejected`] from the flattening order itself.
    pub async fn exit_position(
        &self,
        source: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<i64>, OrderRejected> {
        let (side, quantity) = {
            let mut state = self.state.lock();
            if state.exiting {
                return Ok(None);
            }
            let open = state.position.quantity();
            if open == 0 {
                return Ok(None);
            }
            state.exiting = true;
            let side = if open > 0 { Side::Ask } else { Side::Bid };
            (side, open.abs())
        };

        info!(source, ?side, quantity, "exiting position");
        let result = async {
            self.cancel_all_pending().await?;
            self.submit(side, source, None, quantity, None, at).await
        }
        .await;

        match result {
            Ok(id) => {
                self.state.lock().exit_order_id = Some(id);
                Ok(Some(id))
            }
            Err(rejected) => {
                self.state.lock().clear_exit();
                Err(rejected)
            }
        }
    }

    /// Cancel every pending order and zero the pending counters.
    ///
    /// # Errors
    ///
    /// Broker failures; counters are only reset on success.
    pub async fn cancel_all_pending(&self) -> Result<(), BrokerError> {
        self.broker.cancel_all_pending().await?;
        self.state.lock().risk.reset_pending();
        info!("all pending orders cancelled");
        Ok(())
    }

    /// Broker callback: a fill report for a placed order.
    ///
    /// Allocates the fill through the ledger, retires the order group
    /// from the pending counters when it completes, feeds realized
    /// P&L into the losing-streak tracker, and clears the exit flag
    /// once the position is flat.
    ///
    /// # Errors
    ///
    /// Lookup failures ([`LedgerError::OrderNotFound`],
    /// [`LedgerError::AlreadyFilled`]) are logged warnings the caller
    /// may ignore; other variants are fatal ledger violations.
    pub fn order_filled(
        &self,
        at: DateTime<Utc>,
        broker_order_id: i64,
        avg_price: Decimal,
        quantity: i64,
    ) -> Result<FillOutcome, LedgerError> {
        let mut state = self.state.lock();
        let outcome = match state.position.fill_order(at, broker_order_id, avg_price, quantity) {
            Ok(outcome) => outcome,
            Err(err @ (LedgerError::OrderNotFound { .. } | LedgerError::AlreadyFilled { .. })) => {
                warn!(broker_order_id, %err, "ignoring fill report");
                return Err(err);
            }
            Err(err) => {
                error!(broker_order_id, %err, "fill report violated the ledger");
                return Err(err);
            }
        };

        if outcome.completed {
            let retired = state.position.order_group(broker_order_id).map(|group| {
                let exit_pnl = group.iter().filter_map(Order::order_pnl).fold(
                    None,
                    |acc: Option<Decimal>, pnl| Some(acc.unwrap_or(Decimal::ZERO) + pnl),
                );
                (group[0].side(), exit_pnl)
            });
            if let Some((side, exit_pnl)) = retired {
                state.risk.order_resolved(side);
                if let Some(pnl) = exit_pnl {
                    state.risk.round_trip_closed(pnl);
                    info!(broker_order_id, %pnl, "round trip closed");
                }
            }
        }
        if state.exiting && outcome.position_quantity == 0 {
            state.clear_exit();
        }
        Ok(outcome)
    }

    /// Broker callback: an order was cancelled at the venue. Removes
    /// its group from the ledger; fills it already received stand.
    /// Cancelling the in-flight exit order releases the exit flag so
    /// a later [`Self::exit_position`] can flatten again.
    pub fn order_cancelled(&self, broker_order_id: i64) {
        let mut state = self.state.lock();
        if let Some(group) = state.position.cancel_order(broker_order_id) {
            state.risk.order_resolved(group[0].side());
            if state.exit_order_id == Some(broker_order_id) {
                info!(broker_order_id, "exit order cancelled at the venue");
                state.clear_exit();
            }
        } else {
            warn!(broker_order_id, "cancel report for unknown order");
        }
    }

    /// Broker callback: the account's position snapshot. Seeds the
    /// ledger on the first report; afterwards only cross-checks.
    ///
    /// # Errors
    ///
    /// Ledger violations while seeding the synthetic startup order.
    pub fn position_update(
        &self,
        at: DateTime<Utc>,
        quantity: i64,
        avg_cost: Decimal,
    ) -> Result<(), LedgerError> {
        let mut state = self.state.lock();
        if state.position.is_initialised() {
            if state.position.quantity() != quantity {
                warn!(
                    ledger = state.position.quantity(),
                    broker = quantity,
                    "position snapshot disagrees with ledger"
                );
            }
            return Ok(());
        }
        state.position.initialise_position(at, quantity, avg_cost)
    }

    /// Broker callback: account P&L snapshot. Feeds the drawdown
    /// floor the risk gate checks before adding exposure.
    pub fn pnl_update(&self, daily: Decimal) {
        self.state.lock().risk.update_pnl(daily);
    }

    fn tradable_price(&self, side: Side) -> Result<Decimal, OrderRejected> {
        let price = self.day.latest_book().map_or(Decimal::ZERO, |book| match side {
            Side::Bid => book.best_ask(),
            _ => book.best_bid(),
        });
        if price <= Decimal::ZERO {
            return Err(OrderRejected::InvalidBookPrice { side, price });
        }
        Ok(price)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    use crate::execution::broker::PaperBroker;
    use crate::models::{BookLevel, MessageType, OrderBook};

    use super::*;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap()
    }

    fn two_sided_book(bid: Decimal, ask: Decimal) -> OrderBook {
        let mut book = OrderBook::empty(ts(), MessageType::AddOrder);
        book.bids[0] = BookLevel { price: bid, quantity: 3 };
        book.asks[0] = BookLevel { price: ask, quantity: 3 };
        book
    }

    fn gateway_with_book() -> (OrderReceiver, Arc<PaperBroker>) {
        let day = Arc::new(TradingDay::new(crate::models::MarketSession::default()));
        day.order_book(two_sided_book(dec!(99), dec!(100)));
        let broker = Arc::new(PaperBroker::new());
        let receiver = OrderReceiver::new(
            day,
            broker.clone(),
            RiskLimits::default(),
            Decimal::ONE,
        );
        receiver.position_update(ts(), 0, Decimal::ZERO).unwrap();
        (receiver, broker)
    }

    #[tokio::test]
    async fn test_buy_places_market_order_at_ask() {
        let (receiver, broker) = gateway_with_book();
        let id = receiver.buy("ALGO", None, 2, None, ts()).await.unwrap();
        assert_eq!(id, 1);

        let placed = broker.placed_requests();
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].side, Side::Bid);
        assert_eq!(placed[0].price, dec!(100));
        assert_eq!(receiver.pending_order_ids(), vec![1]);
    }

    #[tokio::test]
    async fn test_buy_without_valid_ask_is_rejected() {
        let day = Arc::new(TradingDay::new(crate::models::MarketSession::default()));
        let broker = Arc::new(PaperBroker::new());
        let receiver =
            OrderReceiver::new(day, broker.clone(), RiskLimits::default(), Decimal::ONE);

        let err = receiver.buy("ALGO", None, 1, None, ts()).await.unwrap_err();
        assert!(matches!(err, OrderRejected::InvalidBookPrice { side: Side::Bid, .. }));
        assert!(broker.placed_requests().is_empty());
    }

    #[tokio::test]
    async fn test_risk_rejection_places_nothing() {
        let (receiver, broker) = gateway_with_book();
        // Fill to the position cap, then the next buy must bounce.
        for _ in 0..3 {
            let id = receiver.buy("ALGO", None, 2, None, ts()).await.unwrap();
            receiver.order_filled(ts(), id, dec!(100), -1).unwrap();
        }
        assert_eq!(receiver.position_quantity(), 6);

        let err = receiver.buy("ALGO", None, 1, None, ts()).await.unwrap_err();
        assert_eq!(err, OrderRejected::Risk(RejectReason::AboveMaxPosition));
        assert_eq!(broker.placed_requests().len(), 3);
        assert_eq!(receiver.last_rejection(), Some(RejectReason::AboveMaxPosition));
    }

    #[tokio::test]
    async fn test_fill_updates_position_and_pnl() {
        let (receiver, _) = gateway_with_book();
        let buy = receiver.buy("ALGO", None, 2, None, ts()).await.unwrap();
        receiver.order_filled(ts(), buy, dec!(100), -1).unwrap();
        assert_eq!(receiver.position_quantity(), 2);
        assert_eq!(receiver.unrealized_pnl(dec!(105)), dec!(10));

        let sell = receiver.sell("ALGO", None, 2, None, ts()).await.unwrap();
        receiver.order_filled(ts(), sell, dec!(110), -1).unwrap();
        assert_eq!(receiver.position_quantity(), 0);
        assert_eq!(receiver.realized_pnl(), dec!(20));
    }

    #[tokio::test]
    async fn test_exit_position_is_idempotent() {
        let (receiver, broker) = gateway_with_book();
        let buy = receiver.buy("ALGO", None, 3, None, ts()).await.unwrap();
        receiver.order_filled(ts(), buy, dec!(100), -1).unwrap();

        let exit = receiver.exit_position("ALGO", ts()).await.unwrap();
        assert!(exit.is_some());
        // Second call while the exit order is unfilled: no-op.
        assert_eq!(receiver.exit_position("ALGO", ts()).await.unwrap(), None);
        assert_eq!(broker.placed_requests().len(), 2);

        // Once the exit fills and the position is flat, a later exit
        // is again a no-op because there is nothing to flatten.
        receiver.order_filled(ts(), exit.unwrap(), dec!(99), -1).unwrap();
        assert_eq!(receiver.position_quantity(), 0);
        assert_eq!(receiver.exit_position("ALGO", ts()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_exit_can_retry_after_venue_cancel() {
        let (receiver, broker) = gateway_with_book();
        let buy = receiver.buy("ALGO", None, 2, None, ts()).await.unwrap();
        receiver.order_filled(ts(), buy, dec!(100), -1).unwrap();

        let first = receiver.exit_position("ALGO", ts()).await.unwrap().unwrap();
        receiver.order_cancelled(first);
        assert_eq!(receiver.position_quantity(), 2);

        // The venue killed the exit order, so the flag must release
        // and a retry must place a fresh flattening order.
        let second = receiver.exit_position("ALGO", ts()).await.unwrap();
        let second = second.unwrap();
        assert_ne!(second, first);
        assert_eq!(broker.placed_requests().len(), 3);

        receiver.order_filled(ts(), second, dec!(99), -1).unwrap();
        assert_eq!(receiver.position_quantity(), 0);
    }

    #[tokio::test]
    async fn test_cancel_callback_retires_pending_order() {
        let (receiver, _) = gateway_with_book();
        let id = receiver.buy("ALGO", None, 2, None, ts()).await.unwrap();
        assert_eq!(receiver.pending_order_ids(), vec![id]);

        receiver.order_cancelled(id);
        assert!(receiver.pending_order_ids().is_empty());
        assert_eq!(receiver.position_quantity(), 0);
    }

    #[tokio::test]
    async fn test_broker_failure_leaves_ledger_untouched() {
        let mut day = TradingDay::new(crate::models::MarketSession::default());
        day.order_book(two_sided_book(dec!(99), dec!(100)));
        let day = Arc::new(day);

        let mut broker = crate::execution::broker::MockBroker::new();
        broker
            .expect_place()
            .returning(|_| Err(BrokerError::Transport("link down".to_string())));
        let receiver = OrderReceiver::new(
            day,
            Arc::new(broker),
            RiskLimits::default(),
            Decimal::ONE,
        );
        receiver.position_update(ts(), 0, Decimal::ZERO).unwrap();

        let err = receiver.buy("ALGO", None, 2, None, ts()).await.unwrap_err();
        assert!(matches!(err, OrderRejected::Broker(BrokerError::Transport(_))));
        assert!(receiver.pending_order_ids().is_empty());
        assert_eq!(receiver.position_quantity(), 0);
    }

    #[tokio::test]
    async fn test_fill_for_unknown_order_is_reported() {
        let (receiver, _) = gateway_with_book();
        let err = receiver.order_filled(ts(), 42, dec!(100), 1).unwrap_err();
        assert!(matches!(err, LedgerError::OrderNotFound { broker_order_id: 42 }));
    }

    #[tokio::test]
    async fn test_drawdown_floor_blocks_new_risk_only() {
        let (receiver, _) = gateway_with_book();
        let buy = receiver.buy("ALGO", None, 2, None, ts()).await.unwrap();
        receiver.order_filled(ts(), buy, dec!(100), -1).unwrap();

        receiver.pnl_update(dec!(-1001));
        let err = receiver.buy("ALGO", None, 1, None, ts()).await.unwrap_err();
        assert_eq!(err, OrderRejected::Risk(RejectReason::UnderMinPnl));
        // Selling out of the long is still allowed.
        assert!(receiver.sell("ALGO", None, 2, None, ts()).await.is_ok());
    }
}
