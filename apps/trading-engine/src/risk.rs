//! Pre-trade risk checks.
//!
//! [`RiskManager`] is a decision gate consulted before every order:
//! it evaluates position, pending-order, streak, rate, and drawdown
//! limits against its current counters and answers with the first
//! limit breached. A rejection is a normal declined-order outcome,
//! not a fault. Rate and drawdown limits apply only to trades that
//! increase risk; an order reducing an opposite position always
//! passes those checks so a losing position can still be closed.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::models::Side;

/// Width of the rolling trade-rate window.
const RATE_WINDOW: Duration = Duration::minutes(5);

/// Why an order was declined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectReason {
    /// Position is already at the long/short bound.
    #[error("position already at the maximum")]
    AboveMaxPosition,
    /// Too many unfilled buy orders outstanding.
    #[error("pending buy orders at the limit")]
    AbovePendingBuyLimit,
    /// Too many unfilled sell orders outstanding.
    #[error("pending sell orders at the limit")]
    AbovePendingSellLimit,
    /// Too many unfilled orders outstanding in total.
    #[error("total pending orders at the limit")]
    AbovePendingOrdersLimit,
    /// Too many consecutive losing round-trips.
    #[error("consecutive losing streak at the limit")]
    AboveMaxLosingStreak,
    /// Daily trade count exhausted.
    #[error("daily trade count at the limit")]
    AboveDailyTradeLimit,
    /// Too many trades inside the rolling five-minute window.
    #[error("five-minute trade rate at the limit")]
    OverFiveMinTradeLimit,
    /// Session P&L below the configured floor.
    #[error("session P&L below the floor")]
    UnderMinPnl,
}

/// Static risk limits, loaded from configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskLimits {
    /// Absolute position bound (long and short).
    pub max_position: i64,
    /// Maximum outstanding buy orders.
    pub pending_buy_limit: u32,
    /// Maximum outstanding sell orders.
    pub pending_sell_limit: u32,
    /// Maximum outstanding orders in total.
    pub pending_orders_limit: u32,
    /// Maximum consecutive losing round-trips.
    pub max_losing_streak: u32,
    /// Maximum trades per session.
    pub daily_trade_limit: u32,
    /// Maximum trades per rolling five minutes.
    pub five_min_trade_limit: u32,
    /// Floor on session P&L below which no risk may be added.
    pub min_pnl: Decimal,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_position: 5,
            pending_buy_limit: 2,
            pending_sell_limit: 2,
            pending_orders_limit: 3,
            max_losing_streak: 4,
            daily_trade_limit: 50,
            five_min_trade_limit: 6,
            min_pnl: Decimal::from(-1000),
        }
    }
}

/// Stateful risk gate.
#[derive(Debug)]
pub struct RiskManager {
    limits: RiskLimits,
    pending_buy_orders: u32,
    pending_sell_orders: u32,
    losing_streak: u32,
    daily_trade_count: u32,
    recent_trades: VecDeque<DateTime<Utc>>,
    session_pnl: Decimal,
    last_rejection: Option<RejectReason>,
}

impl RiskManager {
    /// Create a gate with the given limits and zeroed counters.
    #[must_use]
    pub fn new(limits: RiskLimits) -> Self {
        Self {
            limits,
            pending_buy_orders: 0,
            pending_sell_orders: 0,
            losing_streak: 0,
            daily_trade_count: 0,
            recent_trades: VecDeque::new(),
            session_pnl: Decimal::ZERO,
            last_rejection: None,
        }
    }

    /// The configured limits.
    #[must_use]
    pub const fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    /// The most recent rejection reason, for logging.
    #[must_use]
    pub const fn last_rejection(&self) -> Option<RejectReason> {
        self.last_rejection
    }

    /// Outstanding (buy, sell) order counts.
    #[must_use]
    pub const fn pending_orders(&self) -> (u32, u32) {
        (self.pending_buy_orders, self.pending_sell_orders)
    }

    /// Decide whether a buy may be placed against the given position.
    ///
    /// # Errors
    ///
    /// The first [`RejectReason`] breached, checked in order: position
    /// bound, per-side and combined pending limits, losing streak,
    /// then (only when the buy adds risk rather than reducing a
    /// short) daily count, five-minute rate, and the P&L floor.
    pub fn can_buy(&mut self, position: i64, at: DateTime<Utc>) -> Result<(), RejectReason> {
        self.evaluate(Side::Bid, position, at)
    }

    /// Decide whether a sell may be placed against the given position.
    ///
    /// # Errors
    ///
    /// As for [`Self::can_buy`], with the sell-side pending limit and
    /// the short position bound.
    pub fn can_sell(&mut self, position: i64, at: DateTime<Utc>) -> Result<(), RejectReason> {
        self.evaluate(Side::Ask, position, at)
    }

    fn evaluate(
        &mut self,
        side: Side,
        position: i64,
        at: DateTime<Utc>,
    ) -> Result<(), RejectReason> {
        self.prune_rate_window(at);
        let verdict = self.evaluate_inner(side, position);
        if let Err(reason) = verdict {
            self.last_rejection = Some(reason);
            debug!(?side, position, %reason, "order rejected by risk gate");
        }
        verdict
    }

    fn evaluate_inner(&self, side: Side, position: i64) -> Result<(), RejectReason> {
        match side {
            Side::Bid if position >= self.limits.max_position => {
                return Err(RejectReason::AboveMaxPosition);
            }
            Side::Ask if position <= -self.limits.max_position => {
                return Err(RejectReason::AboveMaxPosition);
            }
            _ => {}
        }
        if side == Side::Bid && self.pending_buy_orders >= self.limits.pending_buy_limit {
            return Err(RejectReason::AbovePendingBuyLimit);
        }
        if side == Side::Ask && self.pending_sell_orders >= self.limits.pending_sell_limit {
            return Err(RejectReason::AbovePendingSellLimit);
        }
        if self.pending_buy_orders + self.pending_sell_orders >= self.limits.pending_orders_limit {
            return Err(RejectReason::AbovePendingOrdersLimit);
        }
        if self.losing_streak >= self.limits.max_losing_streak {
            return Err(RejectReason::AboveMaxLosingStreak);
        }

        // An order against an opposite position reduces exposure and
        // must stay allowed even at the rate or drawdown limits.
        let reduces_risk = side.sign() * position < 0;
        if reduces_risk {
            return Ok(());
        }
        if self.daily_trade_count >= self.limits.daily_trade_limit {
            return Err(RejectReason::AboveDailyTradeLimit);
        }
        if self.recent_trades.len() >= self.limits.five_min_trade_limit as usize {
            return Err(RejectReason::OverFiveMinTradeLimit);
        }
        if self.session_pnl < self.limits.min_pnl {
            return Err(RejectReason::UnderMinPnl);
        }
        Ok(())
    }

    /// Record a placed order: bumps the side's pending counter, the
    /// daily count, and the rolling rate window.
    pub fn order_placed(&mut self, side: Side, at: DateTime<Utc>) {
        match side {
            Side::Bid => self.pending_buy_orders += 1,
            Side::Ask => self.pending_sell_orders += 1,
            Side::None => {}
        }
        self.daily_trade_count += 1;
        self.recent_trades.push_back(at);
        self.prune_rate_window(at);
    }

    /// Record an order leaving the pending set (filled or cancelled
    /// individually).
    pub fn order_resolved(&mut self, side: Side) {
        match side {
            Side::Bid => self.pending_buy_orders = self.pending_buy_orders.saturating_sub(1),
            Side::Ask => self.pending_sell_orders = self.pending_sell_orders.saturating_sub(1),
            Side::None => {}
        }
    }

    /// Record a completed round-trip: a losing one extends the
    /// streak, any other resets it.
    pub fn round_trip_closed(&mut self, pnl: Decimal) {
        if pnl < Decimal::ZERO {
            self.losing_streak += 1;
        } else {
            self.losing_streak = 0;
        }
    }

    /// Update the session P&L the drawdown floor is checked against.
    pub fn update_pnl(&mut self, session_pnl: Decimal) {
        self.session_pnl = session_pnl;
    }

    /// Zero both pending counters after a cancel-all.
    pub fn reset_pending(&mut self) {
        self.pending_buy_orders = 0;
        self.pending_sell_orders = 0;
    }

    fn prune_rate_window(&mut self, at: DateTime<Utc>) {
        while let Some(front) = self.recent_trades.front() {
            if *front + RATE_WINDOW <= at {
                self.recent_trades.pop_front();
            } else {
                break;
            }
        }
    }
}
