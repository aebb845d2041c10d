//! Trading Engine Binary
//!
//! Replays a recorded event log through the full pipeline: book
//! reconstruction, trade matching, day sequencing, heartbeat
//! catch-up, and the JSONL audit trail.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin trading-engine [config.yaml]
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Log level (default: info)

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use chrono::Duration;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use trading_engine::config::load_config;
use trading_engine::engine::MarketPipeline;
use trading_engine::execution::{OrderReceiver, PaperBroker};
use trading_engine::heartbeat::{HeartBeat, HeartBeatListener};
use trading_engine::replay::{AuditRecorder, ReplaySession};
use trading_engine::sequencer::TradingDay;
use trading_engine::telemetry;

/// Tick listener used when no strategy layer is attached: logs the
/// advanced timestamp so replay cadence is visible in the trace.
struct TraceTicks;

impl HeartBeatListener for TraceTicks {
    fn beat(&self, at: chrono::DateTime<chrono::Utc>) {
        debug!(%at, "heartbeat");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing();

    let config_path = std::env::args().nth(1);
    let config = load_config(config_path.as_deref()).context("loading configuration")?;
    info!(
        symbol = %config.instrument.symbol,
        heartbeat_ms = config.heartbeat.period_ms,
        "trading engine starting"
    );

    let session = config.session.to_session();
    let mut day = TradingDay::with_capacity(session, config.history.capacity);

    let audit = match config.replay.audit_path.as_deref() {
        Some(path) => {
            let recorder = Arc::new(
                AuditRecorder::create(Path::new(path)).context("creating audit trail")?,
            );
            day.subscribe(recorder.clone());
            Some(recorder)
        }
        None => None,
    };

    let day = Arc::new(day);
    let broker = Arc::new(PaperBroker::new());
    let receiver = OrderReceiver::new(
        day.clone(),
        broker,
        config.risk.clone(),
        config.instrument.multiplier,
    );

    let Some(log_path) = config.replay.log_path.clone() else {
        warn!("no replay log configured, nothing to do");
        return Ok(());
    };

    let period = Duration::milliseconds(
        i64::try_from(config.heartbeat.period_ms).unwrap_or(i64::MAX),
    );
    let heart = HeartBeat::new(period, Arc::new(TraceTicks));
    let pipeline = MarketPipeline::new(session, day.clone());
    let mut replay = ReplaySession::new(pipeline, heart);

    receiver
        .position_update(chrono::Utc::now(), 0, Decimal::ZERO)
        .context("seeding startup position")?;

    let summary = replay
        .run_file(Path::new(&log_path))
        .context("replaying event log")?;

    if let Some(recorder) = audit {
        recorder.flush().context("flushing audit trail")?;
    }

    let stats = summary.daily_stats;
    let mark = day.latest_book().map_or(Decimal::ZERO, |book| book.mid());
    info!(
        events = summary.events_processed,
        skipped = summary.lines_skipped,
        trades = stats.trade_count,
        high = %stats.trade_high,
        low = %stats.trade_low,
        trade_errors = summary.feed_errors.trade_errors,
        delete_errors = summary.feed_errors.delete_errors,
        modify_errors = summary.feed_errors.modify_errors,
        position = receiver.position_quantity(),
        realized_pnl = %receiver.realized_pnl(),
        unrealized_pnl = %receiver.unrealized_pnl(mark),
        "replay complete"
    );
    Ok(())
}
