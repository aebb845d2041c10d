//! Trading session schedule.
//!
//! Components that need to know whether the market is open receive an
//! explicit [`MarketSession`] rather than consulting a process-wide
//! clock. The session is timezone-naive by design: replayed logs and
//! live feeds both deliver UTC timestamps, and open/close are
//! configured as UTC times of day.

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Phase of the trading day at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketPhase {
    /// Before the configured open.
    PreMarket,
    /// Between open (inclusive) and close (exclusive).
    Open,
    /// At or after the configured close.
    PostMarket,
}

/// Open/close schedule for a single trading day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketSession {
    /// Session open time (UTC, inclusive).
    pub open: NaiveTime,
    /// Session close time (UTC, exclusive).
    pub close: NaiveTime,
}

impl MarketSession {
    /// Create a session. `open` must precede `close`.
    #[must_use]
    pub const fn new(open: NaiveTime, close: NaiveTime) -> Self {
        Self { open, close }
    }

    /// Phase of the day the given timestamp falls in.
    #[must_use]
    pub fn phase(&self, at: DateTime<Utc>) -> MarketPhase {
        let time = at.time();
        if time < self.open {
            MarketPhase::PreMarket
        } else if time < self.close {
            MarketPhase::Open
        } else {
            MarketPhase::PostMarket
        }
    }

    /// True while the market is open at the given timestamp.
    #[must_use]
    pub fn is_open(&self, at: DateTime<Utc>) -> bool {
        self.phase(at) == MarketPhase::Open
    }
}

impl Default for MarketSession {
    fn default() -> Self {
        // 13:30-20:00 UTC covers a 09:30-16:00 US equity session.
        Self {
            open: NaiveTime::from_hms_opt(13, 30, 0).unwrap_or(NaiveTime::MIN),
            close: NaiveTime::from_hms_opt(20, 0, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
    }

    #[test]
    fn test_phase_boundaries() {
        let session = MarketSession::default();
        assert_eq!(session.phase(at(13, 29)), MarketPhase::PreMarket);
        assert_eq!(session.phase(at(13, 30)), MarketPhase::Open);
        assert_eq!(session.phase(at(19, 59)), MarketPhase::Open);
        assert_eq!(session.phase(at(20, 0)), MarketPhase::PostMarket);
    }

    #[test]
    fn test_is_open() {
        let session = MarketSession::default();
        assert!(session.is_open(at(15, 0)));
        assert!(!session.is_open(at(21, 0)));
    }
}
