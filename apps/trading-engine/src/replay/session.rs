//! Deterministic log replay.
//!
//! [`ReplaySession`] drives the full pipeline from a recorded event
//! log: each line is parsed, the heartbeat is caught up to the event
//! timestamp (so periodic consumers fire at the same cadence as a
//! live run), and the event is applied to the book and sequenced.
//! Everything runs single-threaded in file order, so two replays of
//! the same log produce identical output.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use thiserror::Error;
use tracing::{info, warn};

use crate::engine::MarketPipeline;
use crate::heartbeat::HeartBeat;
use crate::book::FeedErrorCounters;
use crate::sequencer::DailyStats;

use super::parser;

/// Replay failures. Malformed lines are skipped and counted, not
/// failures; only I/O aborts a replay.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// The log file could not be read.
    #[error("replay log read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Totals from one completed replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Events parsed and applied.
    pub events_processed: u64,
    /// Malformed lines skipped.
    pub lines_skipped: u64,
    /// Feed inconsistencies absorbed by the reconstructor.
    pub feed_errors: FeedErrorCounters,
    /// Daily trade aggregates at end of replay.
    pub daily_stats: DailyStats,
}

/// Single-threaded replay driver.
#[derive(Debug)]
pub struct ReplaySession {
    pipeline: MarketPipeline,
    heart: HeartBeat,
}

impl ReplaySession {
    /// Create a session over a pipeline and a heartbeat. Start the
    /// heartbeat (anchored at the log's first timestamp or earlier)
    /// before running if periodic ticks are wanted; a stopped
    /// heartbeat replays events only.
    #[must_use]
    pub const fn new(pipeline: MarketPipeline, heart: HeartBeat) -> Self {
        Self { pipeline, heart }
    }

    /// The pipeline being driven.
    #[must_use]
    pub const fn pipeline(&self) -> &MarketPipeline {
        &self.pipeline
    }

    /// Mutable heartbeat access, for anchoring before a run.
    pub fn heart_mut(&mut self) -> &mut HeartBeat {
        &mut self.heart
    }

    /// Replay a log file.
    ///
    /// # Errors
    ///
    /// [`ReplayError::Io`] when the file cannot be opened or read.
    pub fn run_file(&mut self, path: &Path) -> Result<ReplaySummary, ReplayError> {
        info!(path = %path.display(), "replay starting");
        let file = File::open(path)?;
        self.run(BufReader::new(file))
    }

    /// Replay from any line-oriented reader. Blank lines and lines
    /// starting with `#` are ignored; malformed lines are logged,
    /// counted, and skipped.
    ///
    /// # Errors
    ///
    /// [`ReplayError::Io`] on read failure.
    pub fn run<R: BufRead>(&mut self, reader: R) -> Result<ReplaySummary, ReplayError> {
        let mut summary = ReplaySummary::default();
        for (line_number, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let event = match parser::parse_line(trimmed) {
                Ok(event) => event,
                Err(err) => {
                    warn!(line = line_number + 1, %err, "skipping malformed log line");
                    summary.lines_skipped += 1;
                    continue;
                }
            };
            self.heart.massage_heart(event.timestamp);
            self.pipeline.process(&event);
            summary.events_processed += 1;
        }
        summary.feed_errors = self.pipeline.feed_errors();
        summary.daily_stats = self.pipeline.day().daily_stats();
        info!(
            events = summary.events_processed,
            skipped = summary.lines_skipped,
            trades = summary.daily_stats.trade_count,
            "replay finished"
        );
        Ok(summary)
    }
}
