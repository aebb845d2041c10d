//! Market data value types shared across the engine.

mod bar;
mod book;
mod event;
mod session;
mod trade;

pub use bar::Bar;
pub use book::{BOOK_DEPTH, BookLevel, OrderBook};
pub use event::{ExchangeOrderType, MarketEvent, MessageType, Side};
pub use session::{MarketPhase, MarketSession};
pub use trade::Trade;
