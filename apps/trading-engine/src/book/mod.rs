//! Order book reconstruction and trade matching.

mod matcher;
mod reconstructor;

pub use matcher::{ActiveOrderRegistry, MatchError, MatchedFill, RestingOrder, TradeMatcher};
pub use reconstructor::{FeedErrorCounters, OrderBookReconstructor};
