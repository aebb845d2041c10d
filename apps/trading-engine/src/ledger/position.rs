//! The position ledger.
//!
//! A [`Position`] is the net signed quantity in one instrument plus
//! the registry of every order that moved it, grouped by broker order
//! id. A signal that would carry the position through zero is split at
//! the flip point into an EXIT and an ENTER sibling sharing one broker
//! id (suffixed `.1` and `.2`), so realized P&L is always attributed
//! to an EXIT order against a known entry price.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::models::{MarketEvent, Side};

use super::order::{Fill, LedgerError, NewOrder, Order, PositionAction};

/// Source tag for the synthetic order that seeds a pre-existing
/// position at startup.
pub const EXISTING_POSITION_SOURCE: &str = "EXISTING_POSITION_ORDER";

/// Parameters shared by [`Position::add_buy_order`] and
/// [`Position::add_sell_order`].
#[derive(Debug, Clone)]
pub struct OrderIntent {
    /// Broker order id the order(s) will be registered under.
    pub broker_order_id: i64,
    /// Originating component.
    pub source: String,
    /// The market event that triggered the signal, when known.
    pub triggering_event: Option<MarketEvent>,
    /// Ordered quantity (positive).
    pub quantity: i64,
    /// Reference price at submission.
    pub price: Decimal,
    /// Stop price; `None` means no stop.
    pub stop_price: Option<Decimal>,
    /// Submission timestamp.
    pub created_at: DateTime<Utc>,
}

/// Result of applying one broker fill report to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillOutcome {
    /// Quantity actually allocated across the order group.
    pub filled_quantity: i64,
    /// Net position quantity after the fill.
    pub position_quantity: i64,
    /// Whether the order group is now fully filled.
    pub completed: bool,
}

/// Net position plus its order registry.
#[derive(Debug, Default)]
pub struct Position {
    quantity: i64,
    entry_price: Decimal,
    multiplier: Decimal,
    initialised: bool,
    /// Broker order id to its one or two (flip-split) orders. Fill
    /// allocation walks the group in insertion order, EXIT first.
    orders: HashMap<i64, Vec<Order>>,
}

impl Position {
    /// Create an empty, uninitialised position with the given
    /// contract multiplier.
    #[must_use]
    pub fn new(multiplier: Decimal) -> Self {
        Self {
            quantity: 0,
            entry_price: Decimal::ZERO,
            multiplier,
            initialised: false,
            orders: HashMap::new(),
        }
    }

    /// Net signed quantity (positive long, negative short).
    #[must_use]
    pub const fn quantity(&self) -> i64 {
        self.quantity
    }

    /// Entry price of the current position (zero when flat).
    #[must_use]
    pub const fn entry_price(&self) -> Decimal {
        self.entry_price
    }

    /// Contract multiplier applied to P&L.
    #[must_use]
    pub const fn multiplier(&self) -> Decimal {
        self.multiplier
    }

    /// Whether a startup position (possibly flat) has been seeded.
    #[must_use]
    pub const fn is_initialised(&self) -> bool {
        self.initialised
    }

    /// All orders registered under a broker order id.
    #[must_use]
    pub fn order_group(&self, broker_order_id: i64) -> Option<&[Order]> {
        self.orders.get(&broker_order_id).map(Vec::as_slice)
    }

    /// Broker order ids with remaining quantity.
    #[must_use]
    pub fn pending_order_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self
            .orders
            .iter()
            .filter(|(_, group)| group.iter().any(|o| o.remaining_quantity() > 0))
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Realized P&L across every EXIT order in the registry.
    #[must_use]
    pub fn realized_pnl(&self) -> Decimal {
        self.orders
            .values()
            .flatten()
            .filter_map(Order::order_pnl)
            .sum()
    }

    /// Seed the position held before the engine started. Registers a
    /// pre-filled synthetic order under broker id 0 so the startup
    /// inventory is part of the audit trail like everything else.
    ///
    /// # Errors
    ///
    /// Propagates ledger violations from the synthetic fill, which
    /// only happen on a non-positive entry price with nonzero
    /// quantity.
    pub fn initialise_position(
        &mut self,
        at: DateTime<Utc>,
        quantity: i64,
        entry_price: Decimal,
    ) -> Result<(), LedgerError> {
        let side = if quantity >= 0 { Side::Bid } else { Side::Ask };
        let action = if quantity == 0 {
            PositionAction::Neither
        } else {
            PositionAction::Enter
        };
        let mut order = Order::new(NewOrder {
            source: EXISTING_POSITION_SOURCE.to_string(),
            created_at: at,
            triggering_event: None,
            id: "0".to_string(),
            price: entry_price,
            quantity: quantity.abs(),
            side,
            action,
            multiplier: self.multiplier,
            enter_position_price: Decimal::ZERO,
            stop_price: None,
        })?;
        if quantity != 0 {
            order.add_fill(at, entry_price, quantity.abs())?;
        }
        self.orders.insert(0, vec![order]);
        self.quantity = quantity;
        self.entry_price = entry_price;
        self.initialised = true;
        info!(quantity, %entry_price, "position initialised");
        Ok(())
    }

    /// Register a buy order, splitting at the flip point when it would
    /// carry a short position through zero.
    ///
    /// # Errors
    ///
    /// Propagates order-construction violations.
    pub fn add_buy_order(&mut self, intent: &OrderIntent) -> Result<&[Order], LedgerError> {
        self.add_order(Side::Bid, intent)
    }

    /// Register a sell order, splitting at the flip point when it
    /// would carry a long position through zero.
    ///
    /// # Errors
    ///
    /// Propagates order-construction violations.
    pub fn add_sell_order(&mut self, intent: &OrderIntent) -> Result<&[Order], LedgerError> {
        self.add_order(Side::Ask, intent)
    }

    fn add_order(&mut self, side: Side, intent: &OrderIntent) -> Result<&[Order], LedgerError> {
        let opposing = side.sign() * self.quantity < 0;
        let closing_quantity = self.quantity.abs();

        let group = if opposing && intent.quantity > closing_quantity {
            // Position flip: one broker id, two sibling orders. The
            // EXIT sibling closes the open quantity at the recorded
            // entry price; the ENTER sibling opens the remainder.
            debug!(
                broker_order_id = intent.broker_order_id,
                position = self.quantity,
                ordered = intent.quantity,
                "splitting position-flip order"
            );
            let exit = self.build_order(
                side,
                intent,
                format!("{}.1", intent.broker_order_id),
                closing_quantity,
                PositionAction::Exit,
            )?;
            let enter = self.build_order(
                side,
                intent,
                format!("{}.2", intent.broker_order_id),
                intent.quantity - closing_quantity,
                PositionAction::Enter,
            )?;
            vec![exit, enter]
        } else {
            let action = if opposing && intent.quantity == closing_quantity {
                PositionAction::Exit
            } else {
                PositionAction::Enter
            };
            let order = self.build_order(
                side,
                intent,
                intent.broker_order_id.to_string(),
                intent.quantity,
                action,
            )?;
            vec![order]
        };

        let group = self
            .orders
            .entry(intent.broker_order_id)
            .insert_entry(group)
            .into_mut();
        Ok(group.as_slice())
    }

    fn build_order(
        &self,
        side: Side,
        intent: &OrderIntent,
        id: String,
        quantity: i64,
        action: PositionAction,
    ) -> Result<Order, LedgerError> {
        let enter_position_price = if action == PositionAction::Exit {
            self.entry_price
        } else {
            Decimal::ZERO
        };
        Order::new(NewOrder {
            source: intent.source.clone(),
            created_at: intent.created_at,
            triggering_event: intent.triggering_event.clone(),
            id,
            price: intent.price,
            quantity,
            side,
            action,
            multiplier: self.multiplier,
            enter_position_price,
            stop_price: intent.stop_price,
        })
    }

    /// Apply one broker fill report to the order group registered
    /// under `broker_order_id`.
    ///
    /// `quantity` of `-1` means "fill everything remaining". The fill
    /// is allocated across the group in insertion order, so the EXIT
    /// sibling of a flip is consumed before its ENTER sibling. After
    /// allocation the position quantity moves by the signed fill and
    /// the entry price is refreshed from the group's ENTER order.
    ///
    /// # Errors
    ///
    /// [`LedgerError::OrderNotFound`] for an unregistered id,
    /// [`LedgerError::AlreadyFilled`] when the group has no remaining
    /// quantity, and fatal violations for a bad price or a fill past
    /// the group's remaining quantity. Nothing is mutated on error.
    pub fn fill_order(
        &mut self,
        at: DateTime<Utc>,
        broker_order_id: i64,
        avg_price: Decimal,
        quantity: i64,
    ) -> Result<FillOutcome, LedgerError> {
        if avg_price <= Decimal::ZERO {
            return Err(LedgerError::InvalidFillPrice { price: avg_price });
        }
        if quantity < -1 {
            return Err(LedgerError::InvalidFillQuantity { quantity });
        }
        let group = self
            .orders
            .get_mut(&broker_order_id)
            .ok_or(LedgerError::OrderNotFound { broker_order_id })?;
        let total_remaining: i64 = group.iter().map(Order::remaining_quantity).sum();
        if total_remaining == 0 {
            return Err(LedgerError::AlreadyFilled { broker_order_id });
        }
        let requested = if quantity == -1 { total_remaining } else { quantity };
        if requested > total_remaining {
            return Err(LedgerError::FillExceedsOrdered {
                broker_order_id,
                requested,
                remaining: total_remaining,
            });
        }

        let mut to_allocate = requested;
        let mut signed_delta = 0_i64;
        for order in group.iter_mut() {
            if to_allocate == 0 {
                break;
            }
            let take = to_allocate.min(order.remaining_quantity());
            if take == 0 {
                continue;
            }
            order.add_fill(at, avg_price, take)?;
            signed_delta += order.side().sign() * take;
            to_allocate -= take;
        }

        self.quantity += signed_delta;
        if let Some(enter) = group
            .iter()
            .find(|o| o.action() == PositionAction::Enter && o.filled_quantity() > 0)
        {
            self.entry_price = enter.avg_fill_price();
        }
        if self.quantity == 0 {
            self.entry_price = Decimal::ZERO;
        }

        let completed = group.iter().all(|o| o.remaining_quantity() == 0);
        debug!(
            broker_order_id,
            filled = requested,
            position = self.quantity,
            completed,
            "fill applied"
        );
        Ok(FillOutcome {
            filled_quantity: requested,
            position_quantity: self.quantity,
            completed,
        })
    }

    /// Remove a cancelled order group from the registry. Fills it
    /// already received remain reflected in the position. Returns the
    /// removed orders, or `None` for an unknown id.
    pub fn cancel_order(&mut self, broker_order_id: i64) -> Option<Vec<Order>> {
        let mut group = self.orders.remove(&broker_order_id)?;
        for order in &mut group {
            order.cancel();
        }
        debug!(broker_order_id, "order group cancelled");
        Some(group)
    }

    /// Every fill across every registered order, unordered.
    #[must_use]
    pub fn all_fills(&self) -> Vec<Fill> {
        self.orders
            .values()
            .flatten()
            .flat_map(|o| o.fills().iter().copied())
            .collect()
    }
}
