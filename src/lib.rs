pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod history;
pub mod state;
pub mod timer;
mod utils;

use std::sync::Arc;

use anyhow::Context;
use chrono::Local;
use tokio::sync::watch;

use clock::{Clock, SystemClock};
use config::TrackerConfig;
use db::{
    helpers::{new_id, size_in_kb},
    Database, KvStore, NewSubject, RecordRepository, StudyRecord, Subject,
    SubjectUpdate,
};
use error::{Result, TrackerError};
use history::WeeklySummary;
use state::{Action, AppState, StateStore};
use timer::{TimerController, TimerSnapshot};

pub use utils::logging::init_logging;

/// Subject id of the session the timer is currently measuring.
pub const CURRENT_SUBJECT_KEY: &str = "current_subject";

const ENABLE_LOGS: bool = true;

/// The tracker as a host application sees it: subjects, the stopwatch, and the
/// study log, all backed by one data directory.
pub struct StudyTracker {
    config: TrackerConfig,
    clock: Arc<dyn Clock>,
    kv: KvStore,
    store: StateStore,
    timer: TimerController,
}

impl StudyTracker {
    pub async fn open(config: TrackerConfig) -> Result<Self> {
        Self::open_with_clock(config, Arc::new(SystemClock)).await
    }

    pub async fn open_with_clock(config: TrackerConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        log_info!("studytime starting up in {}", config.data_dir.display());

        std::fs::create_dir_all(&config.data_dir).with_context(|| {
            format!(
                "Failed to create data directory {}",
                config.data_dir.display()
            )
        })?;
        let database = Database::new(config.db_path())?;
        let db_path = database.path().to_path_buf();
        let kv = KvStore::new(database, config.storage_quota_bytes);
        match kv.usage_bytes().await {
            Ok(used) => log_info!(
                "Storage at {}: ~{}KB of ~{}KB used",
                db_path.display(),
                size_in_kb(used as usize),
                size_in_kb(kv.quota_bytes() as usize)
            ),
            Err(err) => log_warn!("Could not measure storage usage: {err}"),
        }

        let store = StateStore::new(RecordRepository::new(kv.clone(), config.max_image_bytes));
        store.hydrate().await;

        let timer = TimerController::restore(kv.clone(), clock.clone(), config.timer.clone()).await;

        let tracker = Self {
            config,
            clock,
            kv,
            store,
            timer,
        };
        tracker.restore_active_session().await?;
        Ok(tracker)
    }

    /// An in-progress session is always picked back up, as long as its subject
    /// still exists.
    async fn restore_active_session(&self) -> Result<()> {
        let Some(subject_id) = self.kv.get(CURRENT_SUBJECT_KEY).await? else {
            return Ok(());
        };

        let state = self.store.snapshot().await;
        match state.subjects.into_iter().find(|s| s.id == subject_id) {
            Some(subject) => {
                let running = self.timer.is_running().await;
                log_info!(
                    "Restoring session for '{}' (timer {})",
                    subject.name,
                    if running { "running" } else { "stopped" }
                );
                self.store
                    .dispatch(Action::SetCurrentSubject(Some(subject)))
                    .await?;
                self.store.dispatch(Action::SetTimerRunning(running)).await?;
            }
            None => {
                log_warn!("Active session names unknown subject {subject_id}; dropping it");
                self.kv.remove(CURRENT_SUBJECT_KEY).await?;
            }
        }
        Ok(())
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub async fn state(&self) -> AppState {
        self.store.snapshot().await
    }

    pub fn subscribe(&self) -> watch::Receiver<AppState> {
        self.store.subscribe()
    }

    pub async fn timer_snapshot(&self) -> TimerSnapshot {
        self.timer.snapshot().await
    }

    pub fn subscribe_timer(&self) -> watch::Receiver<TimerSnapshot> {
        self.timer.subscribe()
    }

    /// Make `subject_id` the subject the timer records against. Switching
    /// subjects while the timer is running is refused.
    pub async fn select_subject(&self, subject_id: &str) -> Result<Subject> {
        let state = self.store.snapshot().await;
        let subject = state
            .subjects
            .iter()
            .find(|s| s.id == subject_id)
            .cloned()
            .ok_or_else(|| TrackerError::not_found(format!("subject {subject_id}")))?;

        if let Some(current) = &state.current_subject {
            if current.id != subject.id && self.timer.is_running().await {
                return Err(TrackerError::validation(format!(
                    "'{}' is still being timed; pause or finish it first",
                    current.name
                )));
            }
        }

        self.kv.set(CURRENT_SUBJECT_KEY, &subject.id).await?;
        self.store
            .dispatch(Action::SetCurrentSubject(Some(subject.clone())))
            .await?;
        Ok(subject)
    }

    pub async fn start_timer(&self) -> Result<TimerSnapshot> {
        self.require_current_subject().await?;
        let snapshot = self.timer.start().await;
        self.store.dispatch(Action::SetTimerRunning(true)).await?;
        Ok(snapshot)
    }

    pub async fn pause_timer(&self) -> Result<TimerSnapshot> {
        let snapshot = self.timer.pause().await;
        self.store.dispatch(Action::SetTimerRunning(false)).await?;
        Ok(snapshot)
    }

    pub async fn reset_timer(&self) -> Result<TimerSnapshot> {
        let snapshot = self.timer.reset().await;
        self.store.dispatch(Action::SetTimerRunning(false)).await?;
        Ok(snapshot)
    }

    pub async fn enter_background(&self) {
        self.timer.suspend().await;
    }

    pub async fn enter_foreground(&self) -> Result<TimerSnapshot> {
        let snapshot = self.timer.restore_on_resume().await;
        self.store
            .dispatch(Action::SetTimerRunning(snapshot.state.is_running()))
            .await?;
        Ok(snapshot)
    }

    /// Stop the timer and log the session against the current subject.
    pub async fn finish_session(&self) -> Result<StudyRecord> {
        let subject = self.require_current_subject().await?;
        let elapsed = self.timer.commit().await?;
        let record = StudyRecord::ending_at(new_id(), subject.id.clone(), self.clock.now(), elapsed);
        log_info!(
            "Recording {elapsed}s of '{}' as {}",
            subject.name,
            record.id
        );

        self.store.dispatch(Action::SetTimerRunning(false)).await?;
        self.store.dispatch(Action::SetCurrentSubject(None)).await?;
        if let Err(err) = self.kv.remove(CURRENT_SUBJECT_KEY).await {
            log_warn!("Failed to clear active session marker: {err}");
        }
        self.store
            .dispatch(Action::AddStudyRecord(record.clone()))
            .await?;
        Ok(record)
    }

    pub async fn add_subject(&self, input: NewSubject) -> Result<Subject> {
        let subject = self.store.repository().add_subject(input).await?;
        self.store
            .dispatch(Action::AddSubject(subject.clone()))
            .await?;
        Ok(subject)
    }

    pub async fn update_subject(&self, update: SubjectUpdate) -> Result<Subject> {
        let subject = self.store.repository().update_subject(update).await?;
        self.store
            .dispatch(Action::UpdateSubject(subject.clone()))
            .await?;

        let current = self.store.snapshot().await.current_subject;
        if current.is_some_and(|current| current.id == subject.id) {
            self.store
                .dispatch(Action::SetCurrentSubject(Some(subject.clone())))
                .await?;
        }
        Ok(subject)
    }

    /// Remove a subject. Study records logged against it are kept.
    pub async fn delete_subject(&self, subject_id: &str) -> Result<()> {
        self.store.repository().delete_subject(subject_id).await?;
        self.store
            .dispatch(Action::DeleteSubject(subject_id.to_string()))
            .await
    }

    /// Totals for the week `offset` weeks from the current one, in local time.
    pub async fn weekly_summary(&self, offset: i64) -> WeeklySummary {
        let state = self.store.snapshot().await;
        let today = self.clock.now().with_timezone(&Local).date_naive();
        history::weekly_summary(&state.subjects, &state.study_records, today, offset, &Local)
    }

    async fn require_current_subject(&self) -> Result<Subject> {
        self.store
            .snapshot()
            .await
            .current_subject
            .ok_or_else(|| TrackerError::validation("no subject selected"))
    }
}
