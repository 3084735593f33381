use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    clock::Clock,
    config::TimerSettings,
    db::KvStore,
    error::{Result, TrackerError},
};

use super::{persistence::TimerStore, TimerSnapshot, TimerState, TimerStatus};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

struct Ticker {
    handle: JoinHandle<()>,
    cancel_token: CancellationToken,
}

impl Ticker {
    fn stop(self) {
        self.cancel_token.cancel();
        self.handle.abort();
    }
}

/// The stopwatch.
///
/// Elapsed time is always `accumulated + (now - anchor)`, recomputed on every
/// read, so a delayed or skipped tick never costs accuracy. Ticks only exist to
/// push fresh snapshots to subscribers and to checkpoint progress; persistence
/// is best-effort and a failed write never stops the clock.
#[derive(Clone)]
pub struct TimerController {
    state: Arc<Mutex<TimerState>>,
    store: TimerStore,
    clock: Arc<dyn Clock>,
    ticker: Arc<Mutex<Option<Ticker>>>,
    settings: TimerSettings,
    updates: Arc<watch::Sender<TimerSnapshot>>,
    /// Set once the in-memory state is authoritative: after the first load
    /// from storage or the first transition. From then on storage is only a
    /// mirror and a failed write never rolls the clock back.
    live: Arc<AtomicBool>,
}

impl TimerController {
    pub fn new(kv: KvStore, clock: Arc<dyn Clock>, settings: TimerSettings) -> Self {
        let (updates, _) = watch::channel(TimerSnapshot::default());
        Self {
            state: Arc::new(Mutex::new(TimerState::new())),
            store: TimerStore::new(kv),
            clock,
            ticker: Arc::new(Mutex::new(None)),
            settings,
            updates: Arc::new(updates),
            live: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Build a controller and pick up whatever session storage holds.
    pub async fn restore(kv: KvStore, clock: Arc<dyn Clock>, settings: TimerSettings) -> Self {
        let controller = Self::new(kv, clock, settings);
        controller.restore_on_resume().await;
        controller
    }

    pub fn subscribe(&self) -> watch::Receiver<TimerSnapshot> {
        self.updates.subscribe()
    }

    pub async fn snapshot(&self) -> TimerSnapshot {
        let mut guard = self.state.lock().await;
        guard.sync(self.clock.now());
        TimerSnapshot::from(guard.clone())
    }

    pub async fn elapsed_secs(&self) -> u64 {
        let guard = self.state.lock().await;
        guard.elapsed_at(self.clock.now())
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.is_running()
    }

    pub async fn start(&self) -> TimerSnapshot {
        let snapshot = {
            let mut guard = self.state.lock().await;
            self.live.store(true, Ordering::Release);
            if !guard.start(self.clock.now()) {
                log_debug!("start ignored: timer already running");
                return TimerSnapshot::from(guard.clone());
            }
            log_info!("Timer started at {}s", guard.accumulated_secs);
            self.persist_transition(&guard).await;
            guard.clone()
        };

        self.spawn_ticker().await;
        self.publish(snapshot)
    }

    pub async fn pause(&self) -> TimerSnapshot {
        let snapshot = {
            let mut guard = self.state.lock().await;
            self.live.store(true, Ordering::Release);
            if !guard.pause(self.clock.now()) {
                log_debug!("pause ignored: timer not running");
                return TimerSnapshot::from(guard.clone());
            }
            log_info!("Timer paused at {}s", guard.elapsed_secs);
            self.persist_transition(&guard).await;
            guard.clone()
        };

        self.cancel_ticker().await;
        self.publish(snapshot)
    }

    pub async fn reset(&self) -> TimerSnapshot {
        let snapshot = {
            let mut guard = self.state.lock().await;
            self.live.store(true, Ordering::Release);
            guard.reset();
            log_info!("Timer reset");
            self.persist_transition(&guard).await;
            guard.clone()
        };

        self.cancel_ticker().await;
        self.publish(snapshot)
    }

    /// Stop, hand back the elapsed seconds and go idle.
    ///
    /// Nothing is recorded for an empty session.
    pub async fn commit(&self) -> Result<u64> {
        let elapsed = {
            let mut guard = self.state.lock().await;
            self.live.store(true, Ordering::Release);
            let now = self.clock.now();
            guard.sync(now);
            let elapsed = guard.elapsed_secs;
            if elapsed == 0 {
                return Err(TrackerError::validation("no study time to record"));
            }
            guard.reset();
            self.persist_transition(&guard).await;
            log_info!("Timer committed {elapsed}s");
            elapsed
        };

        self.cancel_ticker().await;
        self.publish(TimerState::new());
        Ok(elapsed)
    }

    /// The host is going to the background. The clock keeps counting; this
    /// only records where it stood so a resume can add the gap.
    pub async fn suspend(&self) {
        let mut guard = self.state.lock().await;
        let now = self.clock.now();
        guard.sync(now);
        if guard.is_running() {
            guard.suspended_at = Some(now);
        }
        if let Err(err) = self.store.save_suspend(&guard, now).await {
            log_warn!("Failed to persist suspend snapshot: {err:#}");
        } else {
            log_info!("Timer suspended at {}s", guard.elapsed_secs);
        }
    }

    /// Attention is back (or the process just started).
    ///
    /// A controller that already holds live state keeps it: a running clock
    /// is re-anchored at now with the suspended time included, whatever
    /// storage says. Only a fresh controller rebuilds from storage, and if a
    /// session was running there it continues with the gap added.
    pub async fn restore_on_resume(&self) -> TimerSnapshot {
        let now = self.clock.now();

        let snapshot = {
            let mut guard = self.state.lock().await;
            if self.live.swap(true, Ordering::AcqRel) {
                guard.resume_live(now);
            } else {
                *guard = match self.store.load().await {
                    Ok(persisted) => TimerState::restored(&persisted, now),
                    Err(err) => {
                        log_warn!("Discarding unreadable timer state: {err:#}");
                        TimerState::new()
                    }
                };
            }
            match guard.status {
                TimerStatus::Running => log_info!("Timer resumed at {}s", guard.elapsed_secs),
                TimerStatus::Paused => log_info!("Timer restored paused at {}s", guard.elapsed_secs),
                TimerStatus::Idle => log_debug!("Timer restored idle"),
            }
            self.persist_transition(&guard).await;
            guard.clone()
        };

        if snapshot.is_running() {
            self.spawn_ticker().await;
        } else {
            self.cancel_ticker().await;
        }
        self.publish(snapshot)
    }

    /// One tick: recompute from the anchor, checkpoint if due, notify.
    pub(crate) async fn tick(&self) -> bool {
        run_tick(
            &self.state,
            &self.store,
            self.clock.as_ref(),
            &self.updates,
            self.settings.checkpoint_every_secs,
        )
        .await
    }

    async fn persist_transition(&self, state: &TimerState) {
        if let Err(err) = self.store.save_state(state).await {
            log_warn!("Failed to persist timer state: {err:#}");
        }
    }

    fn publish(&self, state: TimerState) -> TimerSnapshot {
        let snapshot = TimerSnapshot::from(state);
        self.updates.send_replace(snapshot.clone());
        snapshot
    }

    async fn spawn_ticker(&self) {
        let Some(tick_interval) = self.settings.tick_interval() else {
            return;
        };

        let mut ticker_guard = self.ticker.lock().await;
        if let Some(ticker) = ticker_guard.take() {
            ticker.stop();
        }

        let state = self.state.clone();
        let store = self.store.clone();
        let clock = self.clock.clone();
        let updates = self.updates.clone();
        let checkpoint_every = self.settings.checkpoint_every_secs;
        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();

        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(time::Instant::now() + tick_interval, tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if !run_tick(&state, &store, clock.as_ref(), &updates, checkpoint_every).await {
                            break;
                        }
                    }
                    _ = token.cancelled() => break,
                }
            }
        });

        *ticker_guard = Some(Ticker {
            handle,
            cancel_token,
        });
    }

    async fn cancel_ticker(&self) {
        if let Some(ticker) = self.ticker.lock().await.take() {
            ticker.stop();
        }
    }
}

async fn run_tick(
    state: &Mutex<TimerState>,
    store: &TimerStore,
    clock: &dyn Clock,
    updates: &watch::Sender<TimerSnapshot>,
    checkpoint_every: u64,
) -> bool {
    let mut guard = state.lock().await;
    if !guard.is_running() {
        return false;
    }
    guard.sync(clock.now());

    if let Some(elapsed) = guard.take_checkpoint(checkpoint_every) {
        match store.save_checkpoint(elapsed).await {
            Ok(()) => log_debug!("Timer checkpoint at {elapsed}s"),
            Err(err) => log_warn!("Timer checkpoint at {elapsed}s failed: {err:#}"),
        }
    }

    updates.send_replace(TimerSnapshot::from(guard.clone()));
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::ManualClock,
        db::Database,
        timer::persistence::{TIMER_CURRENT_KEY, TIMER_RUNNING_KEY, TIMER_SUSPENDED_KEY},
    };
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    struct Harness {
        _dir: tempfile::TempDir,
        kv: KvStore,
        clock: ManualClock,
    }

    impl Harness {
        fn new(quota: u64) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let db = Database::new(dir.path().join("timer.sqlite3")).unwrap();
            Self {
                _dir: dir,
                kv: KvStore::new(db, quota),
                clock: ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()),
            }
        }

        fn controller(&self) -> TimerController {
            TimerController::new(
                self.kv.clone(),
                Arc::new(self.clock.clone()),
                TimerSettings::manual(),
            )
        }

        async fn restored(&self) -> TimerController {
            TimerController::restore(
                self.kv.clone(),
                Arc::new(self.clock.clone()),
                TimerSettings::manual(),
            )
            .await
        }

        async fn tick_for(&self, timer: &TimerController, secs: u64) {
            for _ in 0..secs {
                self.clock.advance_secs(1);
                timer.tick().await;
            }
        }
    }

    #[tokio::test]
    async fn pause_reports_sum_of_running_intervals() {
        let h = Harness::new(1 << 20);
        let timer = h.controller();

        timer.start().await;
        h.clock.advance_secs(40);
        timer.pause().await;
        h.clock.advance_secs(300);
        timer.start().await;
        h.clock.advance_secs(20);
        let snapshot = timer.pause().await;

        assert_eq!(snapshot.state.status, TimerStatus::Paused);
        assert_eq!(snapshot.state.elapsed_secs, 60);
        assert_eq!(snapshot.display, "00:01:00");
    }

    #[tokio::test]
    async fn background_time_keeps_counting() {
        let h = Harness::new(1 << 20);
        let timer = h.controller();

        timer.start().await;
        h.tick_for(&timer, 5).await;
        timer.suspend().await;
        h.clock.advance_secs(10);
        let snapshot = timer.restore_on_resume().await;

        assert!(snapshot.state.elapsed_secs >= 15);
        assert!(snapshot.state.is_running());
        assert_eq!(h.kv.get(TIMER_SUSPENDED_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn resume_keeps_running_session_when_writes_fail() {
        let h = Harness::new(0);
        let timer = h.controller();

        timer.start().await;
        h.tick_for(&timer, 5).await;
        timer.suspend().await;
        h.clock.advance_secs(10);
        let snapshot = timer.restore_on_resume().await;

        assert!(snapshot.state.is_running());
        assert!(snapshot.state.elapsed_secs >= 15);
        h.clock.advance_secs(5);
        assert_eq!(timer.elapsed_secs().await, 20);
        assert_eq!(timer.commit().await.unwrap(), 20);
    }

    #[tokio::test]
    async fn resume_keeps_paused_session_when_writes_fail() {
        let h = Harness::new(0);
        let timer = h.controller();

        timer.start().await;
        h.clock.advance_secs(42);
        timer.pause().await;
        timer.suspend().await;
        h.clock.advance_secs(600);
        let snapshot = timer.restore_on_resume().await;

        assert_eq!(snapshot.state.status, TimerStatus::Paused);
        assert_eq!(snapshot.state.elapsed_secs, 42);
    }

    #[tokio::test]
    async fn live_reset_is_not_undone_by_stale_storage() {
        let h = Harness::new(1 << 20);
        let timer = h.controller();
        timer.start().await;
        h.clock.advance_secs(30);
        timer.reset().await;
        // Storage claims a running session the controller no longer has.
        h.kv.set(TIMER_RUNNING_KEY, "true").await.unwrap();

        let snapshot = timer.restore_on_resume().await;

        assert_eq!(snapshot.state, TimerState::new());
    }

    #[tokio::test]
    async fn reload_restores_running_session_from_anchor() {
        let h = Harness::new(1 << 20);
        {
            let timer = h.controller();
            timer.start().await;
            h.tick_for(&timer, 7).await;
        }
        h.clock.advance_secs(100);

        let timer = h.restored().await;

        assert!(timer.is_running().await);
        assert_eq!(timer.elapsed_secs().await, 107);
    }

    #[tokio::test]
    async fn reload_restores_paused_session() {
        let h = Harness::new(1 << 20);
        {
            let timer = h.controller();
            timer.start().await;
            h.clock.advance_secs(42);
            timer.pause().await;
        }
        h.clock.advance_secs(1_000);

        let timer = h.restored().await;

        assert!(!timer.is_running().await);
        assert_eq!(timer.elapsed_secs().await, 42);
    }

    #[tokio::test]
    async fn checkpoints_are_monotonic() {
        let h = Harness::new(1 << 20);
        let timer = h.controller();
        timer.start().await;

        let mut persisted = Vec::new();
        for _ in 0..25 {
            h.clock.advance_secs(1);
            timer.tick().await;
            let value = h.kv.get(TIMER_CURRENT_KEY).await.unwrap().unwrap();
            if persisted.last() != Some(&value) {
                persisted.push(value);
            }
        }

        assert_eq!(persisted, ["0", "10", "20"]);
    }

    #[tokio::test]
    async fn failed_checkpoint_does_not_stop_ticking() {
        let h = Harness::new(0);
        let timer = h.controller();

        timer.start().await;
        h.tick_for(&timer, 12).await;

        assert!(timer.is_running().await);
        assert_eq!(timer.elapsed_secs().await, 12);
        assert_eq!(h.kv.get(TIMER_CURRENT_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn commit_returns_elapsed_and_goes_idle() {
        let h = Harness::new(1 << 20);
        let timer = h.controller();
        let mut updates = timer.subscribe();

        timer.start().await;
        h.clock.advance_secs(125);
        let elapsed = timer.commit().await.unwrap();

        assert_eq!(elapsed, 125);
        assert_eq!(timer.snapshot().await.state, TimerState::new());
        assert_eq!(updates.borrow_and_update().state.status, TimerStatus::Idle);
        assert_eq!(h.kv.get(TIMER_RUNNING_KEY).await.unwrap().as_deref(), Some("false"));
    }

    #[tokio::test]
    async fn commit_of_nothing_is_rejected() {
        let h = Harness::new(1 << 20);
        let timer = h.controller();

        let err = timer.commit().await.unwrap_err();
        assert!(matches!(err, TrackerError::Validation(_)));
    }

    #[tokio::test]
    async fn malformed_storage_falls_back_to_idle() {
        let h = Harness::new(1 << 20);
        h.kv.set(TIMER_RUNNING_KEY, "true").await.unwrap();
        h.kv.set(TIMER_CURRENT_KEY, "NaN").await.unwrap();

        let timer = h.restored().await;

        assert_eq!(timer.snapshot().await.state, TimerState::new());
        assert_eq!(h.kv.get(TIMER_RUNNING_KEY).await.unwrap().as_deref(), Some("false"));
    }

    #[tokio::test]
    async fn invalid_suspend_timestamp_falls_back_to_idle() {
        let h = Harness::new(1 << 20);
        h.kv.set(TIMER_RUNNING_KEY, "true").await.unwrap();
        h.kv.set(TIMER_CURRENT_KEY, "30").await.unwrap();
        h.kv.set(TIMER_SUSPENDED_KEY, "last tuesday").await.unwrap();

        let timer = h.restored().await;
        assert_eq!(timer.elapsed_secs().await, 0);
    }

    #[tokio::test]
    async fn ticker_task_runs_when_enabled() {
        let h = Harness::new(1 << 20);
        let settings = TimerSettings {
            tick_interval_ms: Some(10),
            checkpoint_every_secs: 10,
        };
        let timer = TimerController::new(h.kv.clone(), Arc::new(h.clock.clone()), settings);
        let mut updates = timer.subscribe();

        timer.start().await;
        h.clock.advance_secs(3);
        updates.changed().await.unwrap();
        let seen = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if updates.borrow_and_update().state.elapsed_secs == 3 {
                    break;
                }
                updates.changed().await.unwrap();
            }
        })
        .await;

        assert!(seen.is_ok());
        timer.pause().await;
    }
}
