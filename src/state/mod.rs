//! Application state: one tree, changed only through [`Action`]s.

use serde::{Deserialize, Serialize};

use crate::db::{StudyRecord, Subject};

pub mod store;

pub use store::StateStore;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    pub subjects: Vec<Subject>,
    pub study_records: Vec<StudyRecord>,
    pub current_subject: Option<Subject>,
    pub is_timer_running: bool,
    pub is_loading: bool,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            subjects: Vec::new(),
            study_records: Vec::new(),
            current_subject: None,
            is_timer_running: false,
            is_loading: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "SCREAMING_SNAKE_CASE"
)]
pub enum Action {
    AddSubject(Subject),
    /// Replaces the subject with the same id; unknown ids change nothing.
    UpdateSubject(Subject),
    DeleteSubject(String),
    AddStudyRecord(StudyRecord),
    SetCurrentSubject(Option<Subject>),
    SetTimerRunning(bool),
    InitializeSubjects(Vec<Subject>),
    InitializeRecords(Vec<StudyRecord>),
    SetLoading(bool),
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AddSubject(_) => "ADD_SUBJECT",
            Self::UpdateSubject(_) => "UPDATE_SUBJECT",
            Self::DeleteSubject(_) => "DELETE_SUBJECT",
            Self::AddStudyRecord(_) => "ADD_STUDY_RECORD",
            Self::SetCurrentSubject(_) => "SET_CURRENT_SUBJECT",
            Self::SetTimerRunning(_) => "SET_TIMER_RUNNING",
            Self::InitializeSubjects(_) => "INITIALIZE_SUBJECTS",
            Self::InitializeRecords(_) => "INITIALIZE_RECORDS",
            Self::SetLoading(_) => "SET_LOADING",
        }
    }
}

pub fn reduce(mut state: AppState, action: Action) -> AppState {
    match action {
        Action::AddSubject(subject) => state.subjects.push(subject),
        Action::UpdateSubject(updated) => {
            if let Some(slot) = state.subjects.iter_mut().find(|s| s.id == updated.id) {
                *slot = updated;
            }
        }
        Action::DeleteSubject(id) => state.subjects.retain(|subject| subject.id != id),
        Action::AddStudyRecord(record) => state.study_records.push(record),
        Action::SetCurrentSubject(subject) => state.current_subject = subject,
        Action::SetTimerRunning(running) => state.is_timer_running = running,
        Action::InitializeSubjects(subjects) => state.subjects = subjects,
        Action::InitializeRecords(records) => state.study_records = records,
        Action::SetLoading(loading) => state.is_loading = loading,
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn with_subjects(names: &[(&str, &str)]) -> AppState {
        let subjects = names
            .iter()
            .map(|(id, name)| Subject::new(*id, *name))
            .collect();
        reduce(AppState::default(), Action::InitializeSubjects(subjects))
    }

    #[test]
    fn starts_loading_and_empty() {
        let state = AppState::default();
        assert!(state.is_loading);
        assert!(state.subjects.is_empty());
        assert!(state.current_subject.is_none());
    }

    #[test]
    fn update_replaces_matching_subject_in_place() {
        let state = with_subjects(&[("1", "English"), ("2", "History")]);
        let mut renamed = Subject::new("2", "World History");
        renamed.image_url = "data:image/png;base64,AAAA".into();

        let state = reduce(state, Action::UpdateSubject(renamed.clone()));

        assert_eq!(state.subjects[1], renamed);
        assert_eq!(state.subjects[0].name, "English");
    }

    #[test]
    fn update_of_unknown_id_changes_nothing() {
        let state = with_subjects(&[("1", "English")]);
        let next = reduce(state.clone(), Action::UpdateSubject(Subject::new("9", "Art")));
        assert_eq!(next, state);
    }

    #[test]
    fn delete_keeps_records_for_that_subject() {
        let end = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let state = with_subjects(&[("1", "English"), ("2", "History")]);
        let state = reduce(
            state,
            Action::AddStudyRecord(StudyRecord::ending_at("r1", "1", end, 60)),
        );

        let state = reduce(state, Action::DeleteSubject("1".into()));

        assert_eq!(state.subjects.len(), 1);
        assert_eq!(state.study_records.len(), 1);
        assert_eq!(state.study_records[0].subject_id, "1");
    }

    #[test]
    fn flags_and_current_subject() {
        let state = with_subjects(&[("3", "Math")]);
        let math = state.subjects[0].clone();

        let state = reduce(state, Action::SetCurrentSubject(Some(math.clone())));
        let state = reduce(state, Action::SetTimerRunning(true));
        let state = reduce(state, Action::SetLoading(false));

        assert_eq!(state.current_subject, Some(math));
        assert!(state.is_timer_running);
        assert!(!state.is_loading);
    }

    #[test]
    fn actions_use_screaming_type_tags() {
        let json = serde_json::to_value(Action::DeleteSubject("4".into())).unwrap();
        assert_eq!(json["type"], "DELETE_SUBJECT");
        assert_eq!(json["payload"], "4");
        assert_eq!(Action::SetLoading(true).name(), "SET_LOADING");
    }
}
