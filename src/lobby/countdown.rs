//! Pre-game countdown machine.
//!
//! ```text
//! Idle ──in-progress event──▶ Armed ──tick──▶ Ticking ──tick reaches 0──▶ Expired
//!   │                           │                │
//!   └──────────teardown─────────┴────────────────┴──▶ Cancelled
//! ```
//!
//! No clock or timer lives in here. The owner feeds progress events with
//! the current wall time and calls [`CountdownSynchronizer::tick`] once per
//! tick period.

use chrono::{DateTime, Duration, Utc};

use crate::domain::{GameId, GameSnapshot, GameStatus, ProgressUpdate};

/// Whole seconds from `now_ms` until `start_ms`, rounded up, never below 1.
#[must_use]
pub fn remaining_seconds(start_ms: i64, now_ms: i64) -> u32 {
    let delta = start_ms.saturating_sub(now_ms);
    if delta <= 0 {
        return 1;
    }
    let secs = (delta - 1) / 1000 + 1;
    u32::try_from(secs).unwrap_or(u32::MAX)
}

/// Phase of the countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CountdownPhase {
    /// Waiting for the match to start.
    #[default]
    Idle,
    /// Deadline known, no tick consumed yet.
    Armed,
    /// Counting down.
    Ticking,
    /// Reached zero; the transition has fired.
    Expired,
    /// Torn down before expiring.
    Cancelled,
}

/// Remaining time while a countdown runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountdownState {
    /// Seconds left on the visible counter.
    pub remaining_seconds: u32,
    /// Absolute start time, when known.
    pub deadline: Option<DateTime<Utc>>,
}

/// What an observed progress event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// Arrived after expiry or teardown.
    Ignored,
    /// Stored as latest game data; not a start event.
    Updated,
    /// Started the countdown.
    Armed(u32),
    /// Re-synchronized a running countdown to a new start timestamp.
    Rearmed(u32),
    /// Start event without timestamp while already counting.
    Kept,
}

/// Result of one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick {
    /// Nothing is counting.
    Idle,
    /// Seconds left after this tick.
    Remaining(u32),
    /// Zero reached. Returned once; carries the latest game data.
    Expired(GameSnapshot),
}

/// Countdown for one lobby.
#[derive(Debug, Clone)]
pub struct CountdownSynchronizer {
    phase: CountdownPhase,
    state: Option<CountdownState>,
    latest: GameSnapshot,
    fallback_secs: u32,
    transitioned: bool,
}

impl CountdownSynchronizer {
    /// Creates an idle countdown for `game` that falls back to
    /// `fallback_secs` when a start event carries no timestamp.
    #[must_use]
    pub fn new(game: GameId, fallback_secs: u32) -> Self {
        Self {
            phase: CountdownPhase::Idle,
            state: None,
            latest: GameSnapshot::new(game),
            fallback_secs: fallback_secs.max(1),
            transitioned: false,
        }
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> CountdownPhase {
        self.phase
    }

    /// Remaining time, while armed or ticking.
    #[must_use]
    pub const fn state(&self) -> Option<CountdownState> {
        self.state
    }

    /// Latest game data seen.
    #[must_use]
    pub const fn latest(&self) -> &GameSnapshot {
        &self.latest
    }

    /// Returns `true` while a timer should be running.
    #[must_use]
    pub const fn is_counting(&self) -> bool {
        matches!(self.phase, CountdownPhase::Armed | CountdownPhase::Ticking)
    }

    /// Feeds one progress event observed at `now_ms`.
    pub fn observe(&mut self, update: ProgressUpdate, now_ms: i64) -> Observation {
        if matches!(self.phase, CountdownPhase::Expired | CountdownPhase::Cancelled) {
            return Observation::Ignored;
        }
        let in_progress = update.game.status == GameStatus::InProgress;
        self.latest = update.game;
        if !in_progress {
            return Observation::Updated;
        }
        match (self.is_counting(), update.start_timestamp) {
            (false, start) => Observation::Armed(self.arm(start, now_ms)),
            (true, Some(start)) => Observation::Rearmed(self.arm(Some(start), now_ms)),
            (true, None) => Observation::Kept,
        }
    }

    /// Sets the deadline from `start_ms`, or from the fallback when absent,
    /// and returns the seconds to count.
    pub fn arm(&mut self, start_ms: Option<i64>, now_ms: i64) -> u32 {
        let (remaining, deadline) = match start_ms {
            Some(start) => (
                remaining_seconds(start, now_ms),
                DateTime::from_timestamp_millis(start),
            ),
            None => (
                self.fallback_secs,
                DateTime::from_timestamp_millis(now_ms)
                    .map(|now| now + Duration::seconds(i64::from(self.fallback_secs))),
            ),
        };
        if !self.is_counting() {
            self.phase = CountdownPhase::Armed;
        }
        self.state = Some(CountdownState {
            remaining_seconds: remaining,
            deadline,
        });
        remaining
    }

    /// Consumes one tick period.
    pub fn tick(&mut self) -> Tick {
        if !self.is_counting() {
            return Tick::Idle;
        }
        let remaining = match self.state.as_mut() {
            Some(state) => {
                state.remaining_seconds = state.remaining_seconds.saturating_sub(1);
                state.remaining_seconds
            }
            None => return Tick::Idle,
        };
        if remaining > 0 {
            self.phase = CountdownPhase::Ticking;
            return Tick::Remaining(remaining);
        }
        self.phase = CountdownPhase::Expired;
        self.state = None;
        if self.transitioned {
            return Tick::Idle;
        }
        self.transitioned = true;
        Tick::Expired(self.latest.clone())
    }

    /// Stops the countdown. Returns `true` if the owner should release
    /// the progress subscription, i.e. it was not handed over on expiry.
    pub fn teardown(&mut self) -> bool {
        if self.transitioned {
            return false;
        }
        self.phase = CountdownPhase::Cancelled;
        self.state = None;
        true
    }
}
