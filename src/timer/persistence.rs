//! Timer scratch keys.
//!
//! Five scalar entries, written individually so a checkpoint only touches the
//! one value it changes. Every write path stores a self-consistent view, so a
//! late or duplicated write never leaves the set unreadable.

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::db::{
    helpers::{parse_flag, parse_optional_datetime, parse_seconds},
    KvStore,
};

use super::{PersistedTimer, TimerState};

pub const TIMER_RUNNING_KEY: &str = "timer_is_running";
pub const TIMER_ACCUMULATED_KEY: &str = "timer_last_time";
pub const TIMER_ANCHOR_KEY: &str = "timer_start_time";
pub const TIMER_CURRENT_KEY: &str = "timer_current_time";
pub const TIMER_SUSPENDED_KEY: &str = "timer_background_time";

#[derive(Clone)]
pub struct TimerStore {
    kv: KvStore,
}

impl TimerStore {
    pub fn new(kv: KvStore) -> Self {
        Self { kv }
    }

    /// Persist a transition. Running states carry their anchor; stopped ones drop it.
    pub async fn save_state(&self, state: &TimerState) -> Result<()> {
        if let (true, Some(anchor)) = (state.is_running(), state.anchor) {
            self.kv.set(TIMER_ANCHOR_KEY, &anchor.to_rfc3339()).await?;
            self.kv.set(TIMER_RUNNING_KEY, "true").await?;
            self.kv
                .set(TIMER_ACCUMULATED_KEY, &state.accumulated_secs.to_string())
                .await?;
            self.kv
                .set(TIMER_CURRENT_KEY, &state.elapsed_secs.to_string())
                .await?;
        } else {
            self.kv.remove(TIMER_ANCHOR_KEY).await?;
            self.kv.set(TIMER_RUNNING_KEY, "false").await?;
            self.kv
                .set(TIMER_ACCUMULATED_KEY, &state.elapsed_secs.to_string())
                .await?;
            self.kv
                .set(TIMER_CURRENT_KEY, &state.elapsed_secs.to_string())
                .await?;
        }
        self.kv.remove(TIMER_SUSPENDED_KEY).await?;
        Ok(())
    }

    pub async fn save_checkpoint(&self, elapsed_secs: u64) -> Result<()> {
        self.kv
            .set(TIMER_CURRENT_KEY, &elapsed_secs.to_string())
            .await?;
        Ok(())
    }

    /// Full snapshot plus the moment attention was lost.
    pub async fn save_suspend(&self, state: &TimerState, at: DateTime<Utc>) -> Result<()> {
        self.save_state(state).await?;
        self.kv.set(TIMER_SUSPENDED_KEY, &at.to_rfc3339()).await?;
        Ok(())
    }

    /// Read everything back. Absent entries take their defaults; present but
    /// malformed entries are an error so the caller can fall back to idle.
    pub async fn load(&self) -> Result<PersistedTimer> {
        let running = self.kv.get(TIMER_RUNNING_KEY).await?;
        let accumulated = self.kv.get(TIMER_ACCUMULATED_KEY).await?;
        let anchor = self.kv.get(TIMER_ANCHOR_KEY).await?;
        let current = self.kv.get(TIMER_CURRENT_KEY).await?;
        let suspended = self.kv.get(TIMER_SUSPENDED_KEY).await?;

        Ok(PersistedTimer {
            running: running
                .map(|raw| parse_flag(&raw, TIMER_RUNNING_KEY))
                .transpose()?
                .unwrap_or(false),
            accumulated_secs: accumulated
                .map(|raw| parse_seconds(&raw, TIMER_ACCUMULATED_KEY))
                .transpose()?
                .unwrap_or(0),
            anchor: parse_optional_datetime(anchor, TIMER_ANCHOR_KEY)?,
            last_known_secs: current
                .map(|raw| parse_seconds(&raw, TIMER_CURRENT_KEY))
                .transpose()?
                .unwrap_or(0),
            suspended_at: parse_optional_datetime(suspended, TIMER_SUSPENDED_KEY)?,
        })
    }
}
