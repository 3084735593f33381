use tokio::sync::{watch, Mutex};

use crate::{
    db::{models::default_subjects, RecordRepository, StudyRecord, Subject},
    error::Result,
};

use super::{reduce, Action, AppState};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Owns the [`AppState`] and mirrors its collections into the repository.
///
/// Dispatches are serialized. Subscribers see every new state before it is
/// persisted; a failed write is returned to the dispatcher and the in-memory
/// state stays as reduced. A collection whose stored copy could not be read at
/// hydration is never written back, so a bad read cannot erase it.
pub struct StateStore {
    state: Mutex<StoreState>,
    updates: watch::Sender<AppState>,
    repository: RecordRepository,
}

#[derive(Default)]
struct StoreState {
    app: AppState,
    subjects_read: bool,
    records_read: bool,
}

impl StateStore {
    pub fn new(repository: RecordRepository) -> Self {
        let (updates, _) = watch::channel(AppState::default());
        Self {
            state: Mutex::new(StoreState::default()),
            updates,
            repository,
        }
    }

    pub fn repository(&self) -> &RecordRepository {
        &self.repository
    }

    pub fn subscribe(&self) -> watch::Receiver<AppState> {
        self.updates.subscribe()
    }

    pub async fn snapshot(&self) -> AppState {
        self.state.lock().await.app.clone()
    }

    pub async fn dispatch(&self, action: Action) -> Result<()> {
        let mut guard = self.state.lock().await;
        let action_name = action.name();
        let previous = guard.app.clone();
        let next = reduce(previous.clone(), action);
        guard.app = next.clone();
        self.updates.send_replace(next.clone());
        log_debug!("Dispatched {action_name}");

        if next.is_loading {
            return Ok(());
        }

        if next.subjects != previous.subjects {
            if !guard.subjects_read {
                log_warn!("Not saving subjects after {action_name}: stored copy was never read");
            } else if let Err(err) = self.repository.replace_subjects(&next.subjects).await {
                log_error!("Failed to save subjects after {action_name}: {err}");
                return Err(err);
            }
        }
        if next.study_records != previous.study_records {
            if !guard.records_read {
                log_warn!("Not saving study records after {action_name}: stored copy was never read");
            } else if let Err(err) = self
                .repository
                .replace_study_records(&next.study_records)
                .await
            {
                log_error!("Failed to save study records after {action_name}: {err}");
                return Err(err);
            }
        }
        Ok(())
    }

    /// Load both collections, each on its own. Never fails: unreadable
    /// subjects fall back to the defaults so the app always has something to
    /// show, and a failed seed write only costs the seed.
    pub async fn hydrate(&self) -> AppState {
        self.dispatch_quietly(Action::SetLoading(true)).await;

        let subjects = self.load_subjects().await;
        let records = self.load_records().await;
        log_info!(
            "Hydrated {} subjects and {} study records",
            subjects.len(),
            records.len()
        );
        self.dispatch_quietly(Action::InitializeSubjects(subjects))
            .await;
        self.dispatch_quietly(Action::InitializeRecords(records))
            .await;

        self.dispatch_quietly(Action::SetLoading(false)).await;
        self.snapshot().await
    }

    async fn load_subjects(&self) -> Vec<Subject> {
        let subjects = match self.repository.list_subjects().await {
            Ok(subjects) => subjects,
            Err(err) => {
                log_error!("Error loading subjects, using defaults: {err}");
                return default_subjects();
            }
        };
        self.state.lock().await.subjects_read = true;

        if !subjects.is_empty() {
            return subjects;
        }
        log_info!("No subjects found, seeding defaults");
        let defaults = default_subjects();
        if let Err(err) = self.repository.replace_subjects(&defaults).await {
            log_warn!("Failed to save default subjects: {err}");
        }
        defaults
    }

    async fn load_records(&self) -> Vec<StudyRecord> {
        match self.repository.list_study_records().await {
            Ok(records) => {
                self.state.lock().await.records_read = true;
                records
            }
            Err(err) => {
                log_error!("Error loading study records: {err}");
                Vec::new()
            }
        }
    }

    /// Loading-phase actions never persist, so they cannot fail.
    async fn dispatch_quietly(&self, action: Action) {
        if let Err(err) = self.dispatch(action).await {
            log_error!("Unexpected failure during hydration: {err}");
        }
    }
}
