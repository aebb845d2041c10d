//! Periodic heartbeat with deterministic catch-up.
//!
//! Live mode drives the heartbeat from a tokio timer task. Backtests
//! never touch the timer: [`HeartBeat::massage_heart`] advances the
//! logical clock by whole periods until it catches up with the event
//! being replayed, firing the listener once per period. Both paths
//! deliver the same tick timestamps for the same input, which is what
//! makes wall-clock-driven consumers (periodic feature recomputation,
//! for one) bit-reproducible in replay.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tracing::debug;

/// Heartbeat lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartBeatState {
    /// Not emitting ticks.
    Stopped,
    /// Emitting ticks every period.
    Running,
}

/// Receives heartbeat ticks.
pub trait HeartBeatListener: Send + Sync {
    /// One tick at the advanced logical timestamp.
    fn beat(&self, at: DateTime<Utc>);
}

/// Monotonic periodic clock driver.
pub struct HeartBeat {
    state: HeartBeatState,
    period: Duration,
    last_beat: DateTime<Utc>,
    listener: Arc<dyn HeartBeatListener>,
}

impl std::fmt::Debug for HeartBeat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeartBeat")
            .field("state", &self.state)
            .field("period", &self.period)
            .field("last_beat", &self.last_beat)
            .finish_non_exhaustive()
    }
}

impl HeartBeat {
    /// Create a stopped heartbeat with the given period and listener.
    #[must_use]
    pub fn new(period: Duration, listener: Arc<dyn HeartBeatListener>) -> Self {
        Self {
            state: HeartBeatState::Stopped,
            period,
            last_beat: DateTime::<Utc>::MIN_UTC,
            listener,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> HeartBeatState {
        self.state
    }

    /// Current tick period.
    #[must_use]
    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Timestamp of the last emitted tick (or the start anchor).
    #[must_use]
    pub const fn last_beat(&self) -> DateTime<Utc> {
        self.last_beat
    }

    /// Transition to running, anchored at `period_start`. The first
    /// tick fires one period after the anchor.
    pub fn start(&mut self, period_start: DateTime<Utc>) {
        self.state = HeartBeatState::Running;
        self.last_beat = period_start;
        debug!(period_ms = self.period.num_milliseconds(), %period_start, "heartbeat started");
    }

    /// Stop emitting ticks.
    pub fn stop(&mut self) {
        self.state = HeartBeatState::Stopped;
    }

    /// Change the period. The last-beat anchor is preserved, so a
    /// running heartbeat continues its cadence from the same point
    /// with the new spacing.
    pub fn set_duration(&mut self, period: Duration) {
        self.period = period;
        debug!(period_ms = period.num_milliseconds(), "heartbeat period changed");
    }

    /// Catch the logical clock up to `event_timestamp`.
    ///
    /// While `last_beat + period < event_timestamp`, advance by
    /// exactly one period and fire the listener. Replays call this
    /// before processing each event; a stopped heartbeat ignores it.
    pub fn massage_heart(&mut self, event_timestamp: DateTime<Utc>) {
        if self.state != HeartBeatState::Running {
            return;
        }
        while self.last_beat + self.period < event_timestamp {
            self.last_beat += self.period;
            self.listener.beat(self.last_beat);
        }
    }

    /// Fire one tick now. Used by the live timer driver.
    pub fn fire(&mut self, now: DateTime<Utc>) {
        if self.state != HeartBeatState::Running {
            return;
        }
        self.last_beat = now;
        self.listener.beat(now);
    }
}

/// Live-mode driver: fires the heartbeat from a tokio timer until it
/// is stopped. Reads the period on every cycle so `set_duration`
/// takes effect without restarting the task.
pub async fn run_live(heart: Arc<Mutex<HeartBeat>>) {
    loop {
        let period = {
            let guard = heart.lock();
            if guard.state() == HeartBeatState::Stopped {
                return;
            }
            guard.period()
        };
        let sleep_for = period
            .to_std()
            .unwrap_or(std::time::Duration::from_secs(1));
        tokio::time::sleep(sleep_for).await;
        let mut guard = heart.lock();
        guard.fire(Utc::now());
    }
}
