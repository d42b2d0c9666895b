/*
Focus timer state machine.
Pure: callers pass the wall clock in and drive ticks from outside,
so every transition is testable without a runtime.
*/

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::models::{DEFAULT_TIMER_SECS, TimerState};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimerPhase {
    Idle,
    Running,
    Paused,
    Expired,
}

/// Result of feeding one tick to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The tick belongs to a run that is no longer current. Nothing changed.
    Stale,
    Running { remaining: u32 },
    /// This tick ended the session. Produced once per run.
    Expired,
}

/// How a persisted timer came back after a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resumed {
    Stopped,
    Running,
    /// Ran out while the app was closed. No completion event is owed.
    ElapsedWhileClosed,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TimerStatus {
    pub phase: TimerPhase,
    pub duration_seconds: u32,
    pub remaining_seconds: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub lockout: bool,
    pub display: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerEngine {
    duration: u32,
    remaining: u32,
    phase: TimerPhase,
    started_at: Option<DateTime<Utc>>,
    // bumped on every start/reset so ticks from an older run are ignored
    run: u64,
}

impl Default for TimerEngine {
    fn default() -> Self {
        Self::new(DEFAULT_TIMER_SECS)
    }
}

impl TimerEngine {
    pub fn new(duration_secs: u32) -> Self {
        let duration = if duration_secs == 0 {
            DEFAULT_TIMER_SECS
        } else {
            duration_secs
        };
        Self {
            duration,
            remaining: duration,
            phase: TimerPhase::Idle,
            started_at: None,
            run: 0,
        }
    }

    pub fn phase(&self) -> TimerPhase {
        self.phase
    }

    pub fn duration(&self) -> u32 {
        self.duration
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn is_running(&self) -> bool {
        self.phase == TimerPhase::Running
    }

    /// Lockout is engaged exactly while a session is running.
    pub fn lockout(&self) -> bool {
        self.is_running()
    }

    /// Identifier of the live run, if any. A ticker bound to another run is stale.
    pub fn active_run(&self) -> Option<u64> {
        self.is_running().then_some(self.run)
    }

    /// Accepts the raw text of a minutes field. Anything that is not a
    /// positive whole number, or any change while running, is ignored.
    pub fn set_duration(&mut self, minutes: &str) -> bool {
        if self.is_running() {
            return false;
        }
        let Ok(minutes) = minutes.trim().parse::<u32>() else {
            return false;
        };
        let Some(secs) = minutes.checked_mul(60).filter(|s| *s > 0) else {
            return false;
        };
        self.duration = secs;
        self.remaining = secs;
        self.phase = TimerPhase::Idle;
        true
    }

    /// Returns the new run id when the session actually started.
    pub fn start(&mut self, now: DateTime<Utc>) -> Option<u64> {
        let startable = matches!(self.phase, TimerPhase::Idle | TimerPhase::Paused);
        if !startable || self.remaining == 0 {
            return None;
        }
        self.run += 1;
        self.phase = TimerPhase::Running;
        self.started_at = Some(now);
        Some(self.run)
    }

    pub fn pause(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.phase = TimerPhase::Paused;
        self.started_at = None;
        true
    }

    pub fn reset(&mut self) {
        self.run += 1;
        self.phase = TimerPhase::Idle;
        self.remaining = self.duration;
        self.started_at = None;
    }

    /// Back to a fresh 25:00 session. The run counter keeps counting.
    pub fn restore_default(&mut self) {
        self.duration = DEFAULT_TIMER_SECS;
        self.reset();
    }

    pub fn tick(&mut self, run: u64) -> TickOutcome {
        if !self.is_running() || run != self.run {
            return TickOutcome::Stale;
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining > 0 {
            return TickOutcome::Running {
                remaining: self.remaining,
            };
        }
        self.phase = TimerPhase::Expired;
        self.started_at = None;
        TickOutcome::Expired
    }

    /// The persisted form. While running, the start timestamp is back-dated so
    /// that `duration - elapsed` reproduces the remaining time.
    pub fn to_state(&self, now: DateTime<Utc>) -> TimerState {
        let start_timestamp = self
            .is_running()
            .then(|| now - Duration::seconds(i64::from(self.duration - self.remaining)));
        TimerState {
            duration_seconds: self.duration,
            remaining_seconds: self.remaining,
            is_running: self.is_running(),
            start_timestamp,
        }
    }

    pub fn resume(state: &TimerState, now: DateTime<Utc>) -> (Self, Resumed) {
        let mut engine = Self::new(state.duration_seconds);
        let duration = engine.duration;

        if let (true, Some(start)) = (state.is_running, state.start_timestamp) {
            let elapsed_ms = (now - start).num_milliseconds().max(0);
            let elapsed = u32::try_from(elapsed_ms / 1000).unwrap_or(u32::MAX);
            let remaining = duration.saturating_sub(elapsed);
            engine.remaining = remaining;
            if remaining > 0 {
                engine.run = 1;
                engine.phase = TimerPhase::Running;
                engine.started_at = Some(start);
                return (engine, Resumed::Running);
            }
            engine.phase = TimerPhase::Expired;
            return (engine, Resumed::ElapsedWhileClosed);
        }

        engine.remaining = state.remaining_seconds.min(duration);
        engine.phase = match engine.remaining {
            0 => TimerPhase::Expired,
            r if r == duration => TimerPhase::Idle,
            _ => TimerPhase::Paused,
        };
        (engine, Resumed::Stopped)
    }

    pub fn status(&self) -> TimerStatus {
        TimerStatus {
            phase: self.phase,
            duration_seconds: self.duration,
            remaining_seconds: self.remaining,
            started_at: self.started_at,
            lockout: self.lockout(),
            display: format_clock(self.remaining),
        }
    }
}

/// "MM:SS", minutes not wrapped at an hour.
pub fn format_clock(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}
