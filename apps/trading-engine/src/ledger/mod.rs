//! Position and order ledger.

mod order;
mod position;

pub use order::{Fill, LedgerError, NewOrder, Order, OrderStatus, PositionAction};
pub use position::{EXISTING_POSITION_SOURCE, FillOutcome, OrderIntent, Position};
