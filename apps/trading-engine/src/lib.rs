// Allow unwrap/expect in tests - tests should panic on unexpected errors
// Allow test-specific patterns and pedantic lints in test code
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Automated trading engine core.
//!
//! Reconstructs a live order book and trade tape from raw exchange
//! events, sequences them through a single trading-day hub that fans
//! out to strategy subscribers, and converts trading signals into
//! risk-checked orders whose fills are tracked against a position
//! ledger with realized P&L.
//!
//! # Components
//!
//! - [`models`]: market event, book snapshot, trade, bar, and session
//!   value types
//! - [`book`]: per-side aggregate reconstruction and trade-to-order
//!   matching over the signed bid/ask id space
//! - [`sequencer`]: the [`sequencer::TradingDay`] hub: bounded
//!   histories, daily aggregates, synchronous observer fan-out
//! - [`heartbeat`]: periodic ticks with a deterministic replay
//!   catch-up path
//! - [`ledger`]: position and order accounting, position-flip
//!   splitting, exit P&L
//! - [`risk`]: pre-trade limit checks
//! - [`execution`]: the broker contract and the one gateway between
//!   signals and the broker
//! - [`engine`]: event-to-sequencer routing
//! - [`replay`]: log parsing, deterministic replay, JSONL audit trail

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

pub mod book;
pub mod config;
pub mod engine;
pub mod execution;
pub mod heartbeat;
pub mod ledger;
pub mod models;
pub mod replay;
pub mod risk;
pub mod sequencer;
pub mod telemetry;
