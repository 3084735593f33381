use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::format_elapsed_secs;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TimerStatus {
    #[default]
    Idle,
    Running,
    Paused,
}

/// What the timer last wrote to storage, as read back on resume or reload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistedTimer {
    pub running: bool,
    pub accumulated_secs: u64,
    pub anchor: Option<DateTime<Utc>>,
    pub last_known_secs: u64,
    pub suspended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    pub status: TimerStatus,
    pub elapsed_secs: u64,
    /// Time accumulated from earlier running windows; combines with `anchor`
    /// to compute the true elapsed time.
    pub accumulated_secs: u64,
    pub anchor: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub last_checkpoint_secs: u64,
    /// Set between `suspend` and the next resume; checkpoints pause meanwhile so
    /// the suspend snapshot stays the base for the resume gap.
    #[serde(skip)]
    pub suspended_at: Option<DateTime<Utc>>,
}

fn whole_secs_between(from: DateTime<Utc>, to: DateTime<Utc>) -> u64 {
    u64::try_from((to - from).num_seconds()).unwrap_or(0)
}

impl TimerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.status == TimerStatus::Running
    }

    pub fn elapsed_at(&self, now: DateTime<Utc>) -> u64 {
        match (self.status, self.anchor) {
            (TimerStatus::Running, Some(anchor)) => self
                .accumulated_secs
                .saturating_add(whole_secs_between(anchor, now)),
            _ => self.elapsed_secs,
        }
    }

    pub fn sync(&mut self, now: DateTime<Utc>) {
        self.elapsed_secs = self.elapsed_at(now);
    }

    /// Idle/Paused → Running. Returns false when already running.
    pub fn start(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_running() {
            return false;
        }
        self.accumulated_secs = self.elapsed_secs;
        self.last_checkpoint_secs = self.elapsed_secs;
        self.anchor = Some(now);
        self.status = TimerStatus::Running;
        self.suspended_at = None;
        true
    }

    /// Running → Paused, freezing elapsed time. Returns false when not running.
    pub fn pause(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_running() {
            return false;
        }
        self.sync(now);
        self.accumulated_secs = self.elapsed_secs;
        self.anchor = None;
        self.status = TimerStatus::Paused;
        self.suspended_at = None;
        true
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Re-anchor at `now` with `base_secs` already on the clock.
    pub fn resume_from(&mut self, base_secs: u64, now: DateTime<Utc>) {
        *self = Self {
            status: TimerStatus::Running,
            elapsed_secs: base_secs,
            accumulated_secs: base_secs,
            anchor: Some(now),
            last_checkpoint_secs: base_secs,
            suspended_at: None,
        };
    }

    /// Back from the background with the in-memory state intact. A running
    /// clock never stopped, so only the anchor moves; anything else just
    /// forgets the suspend.
    pub fn resume_live(&mut self, now: DateTime<Utc>) {
        if self.is_running() {
            let elapsed = self.elapsed_at(now);
            let last_checkpoint = self.last_checkpoint_secs;
            self.resume_from(elapsed, now);
            self.last_checkpoint_secs = last_checkpoint;
        } else {
            self.suspended_at = None;
        }
    }

    pub fn freeze_at(&mut self, elapsed_secs: u64) {
        *self = Self {
            status: if elapsed_secs > 0 {
                TimerStatus::Paused
            } else {
                TimerStatus::Idle
            },
            elapsed_secs,
            accumulated_secs: elapsed_secs,
            last_checkpoint_secs: elapsed_secs,
            ..Self::default()
        };
    }

    /// Rebuild state from storage. A running timer keeps running: time spent
    /// suspended (or closed) is added rather than lost.
    pub fn restored(persisted: &PersistedTimer, now: DateTime<Utc>) -> Self {
        let mut state = Self::new();
        if persisted.running {
            let base = match (persisted.suspended_at, persisted.anchor) {
                (Some(suspended_at), _) => persisted
                    .last_known_secs
                    .saturating_add(whole_secs_between(suspended_at, now)),
                (None, Some(anchor)) => persisted
                    .accumulated_secs
                    .saturating_add(whole_secs_between(anchor, now)),
                (None, None) => persisted.last_known_secs,
            };
            state.resume_from(base, now);
        } else {
            state.freeze_at(persisted.accumulated_secs);
        }
        state
    }

    /// Elapsed value to checkpoint, if one is due.
    pub fn take_checkpoint(&mut self, every_secs: u64) -> Option<u64> {
        if !self.is_running() || self.suspended_at.is_some() {
            return None;
        }
        let every = every_secs.max(1);
        if self.elapsed_secs >= self.last_checkpoint_secs.saturating_add(every) {
            self.last_checkpoint_secs = self.elapsed_secs;
            Some(self.elapsed_secs)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    pub state: TimerState,
    pub display: String,
}

impl From<TimerState> for TimerSnapshot {
    fn from(state: TimerState) -> Self {
        Self {
            display: format_elapsed_secs(state.elapsed_secs),
            state,
        }
    }
}
