//! Order and fill accounting.
//!
//! An [`Order`] is immutable except for its fill ledger: fills are
//! appended as the broker reports them and every derived figure
//! (filled/remaining quantity, average price, status, realized P&L)
//! is computed from the stack. Ledger violations (overfills, bad
//! prices, negative quantities) are fatal preconditions, never
//! clamped: they mean broker and ledger have diverged.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{MarketEvent, Side};

/// Upper clamp for stop prices.
const MAX_STOP_PRICE: Decimal = Decimal::from_parts(100_000, 0, 0, false, 0);

/// What an order does to the position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionAction {
    /// Opens or extends a position.
    Enter,
    /// Closes (part of) a position; realized P&L is computed here.
    Exit,
    /// No directional intent (only the synthetic startup order).
    Neither,
}

/// Order lifecycle status, derived from the fill ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// No fills yet.
    Open,
    /// Some quantity filled, some remaining.
    PartialFill,
    /// Entire ordered quantity filled.
    Filled,
    /// Cancelled before completion.
    Cancelled,
}

/// One fill report: quantity at an average price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fill {
    /// Filled quantity.
    pub quantity: i64,
    /// Average fill price.
    pub price: Decimal,
    /// Fill timestamp.
    pub timestamp: DateTime<Utc>,
}

/// Ledger invariant violations and lookup failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// No order group registered under the broker order id.
    #[error("no order registered under broker order id {broker_order_id}")]
    OrderNotFound {
        /// The unregistered broker order id.
        broker_order_id: i64,
    },
    /// The order group has no remaining quantity.
    #[error("order group {broker_order_id} is already fully filled")]
    AlreadyFilled {
        /// The broker order id.
        broker_order_id: i64,
    },
    /// A fill for more than the group's combined remaining quantity.
    #[error(
        "fill of {requested} exceeds remaining {remaining} on order group {broker_order_id}"
    )]
    FillExceedsOrdered {
        /// The broker order id.
        broker_order_id: i64,
        /// Requested fill quantity.
        requested: i64,
        /// Combined remaining quantity.
        remaining: i64,
    },
    /// Fill price must be positive.
    #[error("invalid fill price {price}")]
    InvalidFillPrice {
        /// The offending price.
        price: Decimal,
    },
    /// Fill quantity must be non-negative (or the -1 fill-all sentinel
    /// at the ledger boundary).
    #[error("invalid fill quantity {quantity}")]
    InvalidFillQuantity {
        /// The offending quantity.
        quantity: i64,
    },
    /// An EXIT order with nonzero quantity needs the entry price it
    /// exits against.
    #[error("exit order {order_id} created without an entry price")]
    MissingEntryPrice {
        /// Id of the offending order.
        order_id: String,
    },
}

/// Parameters for creating an [`Order`].
#[derive(Debug, Clone)]
pub struct NewOrder {
    /// Originating component ("ALGO", "EXISTING_POSITION_ORDER", ...).
    pub source: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// The market event that triggered the signal, when there is one.
    pub triggering_event: Option<MarketEvent>,
    /// Order id: the broker order id, suffixed `.1`/`.2` for the two
    /// siblings of a position-flip.
    pub id: String,
    /// Ordered price.
    pub price: Decimal,
    /// Ordered quantity (always positive; direction is `side`).
    pub quantity: i64,
    /// Order side.
    pub side: Side,
    /// Position action.
    pub action: PositionAction,
    /// Contract multiplier for P&L.
    pub multiplier: Decimal,
    /// Entry price of the position this order exits (EXIT only).
    pub enter_position_price: Decimal,
    /// Stop price; `None` means no stop.
    pub stop_price: Option<Decimal>,
}

/// One order with its append-only fill ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    source: String,
    created_at: DateTime<Utc>,
    triggering_event: Option<MarketEvent>,
    id: String,
    price: Decimal,
    quantity: i64,
    side: Side,
    action: PositionAction,
    multiplier: Decimal,
    enter_position_price: Decimal,
    stop_price: Option<Decimal>,
    cancelled: bool,
    fills: Vec<Fill>,
}

impl Order {
    /// Create an order.
    ///
    /// # Errors
    ///
    /// [`LedgerError::MissingEntryPrice`] when an EXIT order with
    /// nonzero quantity carries no entry price to exit against.
    pub fn new(params: NewOrder) -> Result<Self, LedgerError> {
        if params.action == PositionAction::Exit
            && params.quantity != 0
            && params.enter_position_price == Decimal::ZERO
        {
            return Err(LedgerError::MissingEntryPrice { order_id: params.id });
        }
        let stop_price = params
            .stop_price
            .map(|stop| stop.clamp(Decimal::ZERO, MAX_STOP_PRICE));
        Ok(Self {
            source: params.source,
            created_at: params.created_at,
            triggering_event: params.triggering_event,
            id: params.id,
            price: params.price,
            quantity: params.quantity,
            side: params.side,
            action: params.action,
            multiplier: params.multiplier,
            enter_position_price: params.enter_position_price,
            stop_price,
            cancelled: false,
            fills: Vec::new(),
        })
    }

    /// Order id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Originating component.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Ordered price.
    #[must_use]
    pub const fn price(&self) -> Decimal {
        self.price
    }

    /// Ordered quantity.
    #[must_use]
    pub const fn quantity(&self) -> i64 {
        self.quantity
    }

    /// Order side.
    #[must_use]
    pub const fn side(&self) -> Side {
        self.side
    }

    /// Position action.
    #[must_use]
    pub const fn action(&self) -> PositionAction {
        self.action
    }

    /// Contract multiplier.
    #[must_use]
    pub const fn multiplier(&self) -> Decimal {
        self.multiplier
    }

    /// Entry price this order exits against (EXIT only).
    #[must_use]
    pub const fn enter_position_price(&self) -> Decimal {
        self.enter_position_price
    }

    /// Stop price, if any (clamped at creation).
    #[must_use]
    pub const fn stop_price(&self) -> Option<Decimal> {
        self.stop_price
    }

    /// Creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// The market event that triggered this order, when known.
    #[must_use]
    pub const fn triggering_event(&self) -> Option<&MarketEvent> {
        self.triggering_event.as_ref()
    }

    /// The fill ledger, oldest first.
    #[must_use]
    pub fn fills(&self) -> &[Fill] {
        &self.fills
    }

    /// The broker order id this order belongs to: the numeric prefix
    /// of the id, shared by both siblings of a flip.
    #[must_use]
    pub fn broker_order_id(&self) -> i64 {
        self.id
            .split('.')
            .next()
            .and_then(|prefix| prefix.parse().ok())
            .unwrap_or_default()
    }

    /// Total filled quantity.
    #[must_use]
    pub fn filled_quantity(&self) -> i64 {
        self.fills.iter().map(|f| f.quantity).sum()
    }

    /// Ordered quantity not yet filled.
    #[must_use]
    pub fn remaining_quantity(&self) -> i64 {
        self.quantity - self.filled_quantity()
    }

    /// Quantity-weighted average fill price (zero with no fills).
    #[must_use]
    pub fn avg_fill_price(&self) -> Decimal {
        let filled = self.filled_quantity();
        if filled == 0 {
            return Decimal::ZERO;
        }
        let notional: Decimal = self
            .fills
            .iter()
            .map(|f| f.price * Decimal::from(f.quantity))
            .sum();
        notional / Decimal::from(filled)
    }

    /// Lifecycle status derived from the fill ledger.
    #[must_use]
    pub fn status(&self) -> OrderStatus {
        if self.cancelled {
            OrderStatus::Cancelled
        } else if self.fills.is_empty() && self.remaining_quantity() > 0 {
            OrderStatus::Open
        } else if self.remaining_quantity() > 0 {
            OrderStatus::PartialFill
        } else {
            OrderStatus::Filled
        }
    }

    /// Realized P&L, computed only for EXIT orders:
    /// `Σ (fill price − entry price) × fill qty × multiplier`,
    /// negated when the side is Bid: exiting a short means buying
    /// back, so a fall in price is the profitable direction.
    #[must_use]
    pub fn order_pnl(&self) -> Option<Decimal> {
        if self.action != PositionAction::Exit {
            return None;
        }
        let raw: Decimal = self
            .fills
            .iter()
            .map(|f| (f.price - self.enter_position_price) * Decimal::from(f.quantity))
            .sum::<Decimal>()
            * self.multiplier;
        Some(if self.side == Side::Bid { -raw } else { raw })
    }

    /// Append a fill.
    ///
    /// # Errors
    ///
    /// Fatal ledger violations: non-positive price, negative quantity,
    /// a fill on an already-complete order, or a fill past the
    /// remaining quantity.
    pub fn add_fill(
        &mut self,
        timestamp: DateTime<Utc>,
        price: Decimal,
        quantity: i64,
    ) -> Result<(), LedgerError> {
        if price <= Decimal::ZERO {
            return Err(LedgerError::InvalidFillPrice { price });
        }
        if quantity < 0 {
            return Err(LedgerError::InvalidFillQuantity { quantity });
        }
        let remaining = self.remaining_quantity();
        if quantity > remaining {
            return Err(LedgerError::FillExceedsOrdered {
                broker_order_id: self.broker_order_id(),
                requested: quantity,
                remaining,
            });
        }
        self.fills.push(Fill {
            quantity,
            price,
            timestamp,
        });
        Ok(())
    }

    /// Mark the order cancelled. Fills already in the ledger stand.
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }
}
