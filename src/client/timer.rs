//! Round countdown that survives tab reloads.
//!
//! The persisted state is `{started_at_ms, duration_secs, position}`, so the
//! remaining time is always derived from the wall clock rather than from how
//! long a given tab has been open. Expiry triggers auto-submission exactly
//! once per round, guarded before the callback is invoked.

use serde::{Deserialize, Serialize};

/// Persisted countdown state, written on every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerSnapshot {
    /// When the countdown started, unix milliseconds.
    pub started_at_ms: i64,
    /// Full round duration in seconds.
    pub duration_secs: u32,
    /// Scenario position the countdown belongs to.
    pub position: u8,
}

impl TimerSnapshot {
    /// Seconds left on the countdown, clamped at zero.
    pub fn remaining_secs(&self, now_ms: i64) -> u32 {
        let elapsed_secs = (now_ms.saturating_sub(self.started_at_ms)) / 1_000;
        u64::from(self.duration_secs).saturating_sub(elapsed_secs.max(0) as u64) as u32
    }
}

/// What the embedding shell should do after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerTick {
    /// Countdown still running; render the remaining seconds.
    Running(u32),
    /// Countdown just expired; stop the interval and auto-submit once.
    AutoSubmit,
    /// Countdown expired earlier; nothing to do.
    Idle,
}

/// One round's countdown with a fire-once expiry guard.
#[derive(Debug, Clone)]
pub struct CountdownTimer {
    snapshot: TimerSnapshot,
    fired: bool,
}

impl CountdownTimer {
    /// Start a fresh countdown for a scenario.
    pub fn start(position: u8, duration_secs: u32, now_ms: i64) -> Self {
        Self {
            snapshot: TimerSnapshot {
                started_at_ms: now_ms,
                duration_secs,
                position,
            },
            fired: false,
        }
    }

    /// Resume a countdown from a persisted snapshot after a reload.
    ///
    /// A snapshot that already ran out resumes as expired with the guard
    /// set: the auto-submit belongs to whichever tab was open at expiry.
    pub fn resume(snapshot: TimerSnapshot, now_ms: i64) -> Self {
        let fired = snapshot.remaining_secs(now_ms) == 0;
        Self { snapshot, fired }
    }

    /// Persistable countdown state.
    pub fn snapshot(&self) -> TimerSnapshot {
        self.snapshot
    }

    /// Scenario position this countdown belongs to.
    pub fn position(&self) -> u8 {
        self.snapshot.position
    }

    /// Advance the countdown. Returns `AutoSubmit` on the first tick at or
    /// past expiry and never again.
    pub fn tick(&mut self, now_ms: i64) -> TimerTick {
        let remaining = self.snapshot.remaining_secs(now_ms);
        if remaining > 0 {
            return TimerTick::Running(remaining);
        }
        if self.fired {
            return TimerTick::Idle;
        }
        // Guard set before the shell gets the order to submit.
        self.fired = true;
        TimerTick::AutoSubmit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_counts_down_from_the_persisted_start() {
        let snapshot = TimerSnapshot {
            started_at_ms: 0,
            duration_secs: 900,
            position: 1,
        };
        assert_eq!(snapshot.remaining_secs(0), 900);
        assert_eq!(snapshot.remaining_secs(500_000), 400);
        assert_eq!(snapshot.remaining_secs(900_000), 0);
        assert_eq!(snapshot.remaining_secs(2_000_000), 0);
    }

    #[test]
    fn reopened_tab_restores_elapsed_time_never_the_full_duration() {
        // Persisted at t=0 with 900s, tab reopened 500s later.
        let persisted = TimerSnapshot {
            started_at_ms: 0,
            duration_secs: 900,
            position: 3,
        };
        let mut timer = CountdownTimer::resume(persisted, 500_000);
        match timer.tick(500_000) {
            TimerTick::Running(remaining) => assert!(remaining <= 400),
            other => panic!("expected a running countdown, got {other:?}"),
        }
    }

    #[test]
    fn expiry_fires_exactly_once() {
        let mut timer = CountdownTimer::start(2, 10, 0);
        assert_eq!(timer.tick(5_000), TimerTick::Running(5));
        assert_eq!(timer.tick(10_000), TimerTick::AutoSubmit);
        assert_eq!(timer.tick(11_000), TimerTick::Idle);
        assert_eq!(timer.tick(60_000), TimerTick::Idle);
    }

    #[test]
    fn resuming_an_already_expired_snapshot_does_not_fire_again() {
        let persisted = TimerSnapshot {
            started_at_ms: 0,
            duration_secs: 10,
            position: 4,
        };
        let mut timer = CountdownTimer::resume(persisted, 60_000);
        assert_eq!(timer.tick(60_000), TimerTick::Idle);
    }

    #[test]
    fn clock_skew_before_start_clamps_to_full_duration() {
        let snapshot = TimerSnapshot {
            started_at_ms: 1_000_000,
            duration_secs: 300,
            position: 1,
        };
        assert_eq!(snapshot.remaining_secs(999_000), 300);
    }
}
