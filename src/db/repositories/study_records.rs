use chrono::{DateTime, Duration, Utc};

use crate::{
    db::{
        helpers::{new_id, parse_datetime},
        models::{StoredStudyRecord, StudyRecord},
    },
    error::Result,
};

use super::{RecordRepository, RECORDS_KEY};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

fn stored_duration(value: Option<serde_json::Number>) -> Option<u64> {
    let number = value?;
    number.as_u64().or_else(|| {
        number
            .as_f64()
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(|secs| secs.round() as u64)
    })
}

fn stored_timestamp(value: Option<String>, field: &str, record_id: &str) -> Option<DateTime<Utc>> {
    let raw = value?;
    match parse_datetime(&raw, field) {
        Ok(ts) => Some(ts),
        Err(err) => {
            log_warn!("Record {record_id}: ignoring {field} '{raw}': {err:#}");
            None
        }
    }
}

fn span(secs: u64) -> Duration {
    Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX))
}

/// Fill whatever is missing from whatever is present:
/// the duration comes from the timestamps, a lone timestamp plus a duration
/// gives the other, and with no timestamps at all the record sits at the epoch.
fn normalize_record(stored: StoredStudyRecord) -> StudyRecord {
    let id = stored
        .id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(new_id);
    let start = stored_timestamp(stored.start_time, "startTime", &id);
    let end = stored_timestamp(stored.end_time, "endTime", &id);
    let duration = stored_duration(stored.duration);

    let (start_time, end_time, duration) = match (start, end, duration) {
        (Some(start), Some(end), Some(duration)) => (start, end, duration),
        (Some(start), Some(end), None) => {
            let derived = u64::try_from((end - start).num_seconds()).unwrap_or(0);
            (start, end, derived)
        }
        (Some(start), None, duration) => {
            let duration = duration.unwrap_or(0);
            let end = start.checked_add_signed(span(duration)).unwrap_or(start);
            (start, end, duration)
        }
        (None, Some(end), duration) => {
            let duration = duration.unwrap_or(0);
            let start = end.checked_sub_signed(span(duration)).unwrap_or(end);
            (start, end, duration)
        }
        (None, None, duration) => {
            let duration = duration.unwrap_or(0);
            log_warn!("Record {id} has no timestamps; placing it at the epoch");
            let start = DateTime::<Utc>::default();
            let end = start.checked_add_signed(span(duration)).unwrap_or(start);
            (start, end, duration)
        }
    };

    StudyRecord {
        id,
        subject_id: stored.subject_id.unwrap_or_default(),
        start_time,
        end_time,
        duration,
    }
}

impl RecordRepository {
    pub async fn list_study_records(&self) -> Result<Vec<StudyRecord>> {
        let stored: Vec<StoredStudyRecord> = self.read_collection(RECORDS_KEY).await?;
        Ok(stored.into_iter().map(normalize_record).collect())
    }

    pub async fn replace_study_records(&self, records: &[StudyRecord]) -> Result<()> {
        self.write_collection(RECORDS_KEY, records).await
    }

    pub async fn add_study_record(&self, record: StudyRecord) -> Result<()> {
        let mut records = self.list_study_records().await?;
        let subject_id = record.subject_id.clone();
        records.push(record);
        self.replace_study_records(&records).await?;
        log_info!("Added study record for subject {subject_id}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::repository;
    use super::*;
    use chrono::TimeZone;

    const QUOTA: u64 = 5 * 1024 * 1024;

    #[tokio::test]
    async fn append_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(&dir, QUOTA);
        let end = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();

        repo.add_study_record(StudyRecord::ending_at("a", "math", end, 60))
            .await
            .unwrap();
        repo.add_study_record(StudyRecord::ending_at("b", "gone", end, 30))
            .await
            .unwrap();

        let ids: Vec<String> = repo
            .list_study_records()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[tokio::test]
    async fn missing_fields_get_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(&dir, QUOTA);
        let legacy = r#"[
            {"id":"r1","subjectId":"1","startTime":"2024-05-01T09:00:00.000Z","endTime":"2024-05-01T09:30:00.000Z"},
            {"id":"r2","subjectId":"1","endTime":"2024-05-01T10:00:00Z","duration":90},
            {"subjectId":"2","startTime":"not a date","endTime":"2024-05-01T11:00:00Z","duration":12.0},
            42
        ]"#;
        repo.store().set(RECORDS_KEY, legacy).await.unwrap();

        let records = repo.list_study_records().await.unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].duration, 1800);
        assert_eq!(
            records[1].start_time,
            Utc.with_ymd_and_hms(2024, 5, 1, 9, 58, 30).unwrap()
        );
        assert!(!records[2].id.is_empty());
        assert_eq!(records[2].duration, 12);
        assert_eq!((records[2].end_time - records[2].start_time).num_seconds(), 12);
    }

    #[tokio::test]
    async fn corrupt_records_read_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(&dir, QUOTA);
        repo.store().set(RECORDS_KEY, "[{]").await.unwrap();

        assert!(repo.list_study_records().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_append_leaves_stored_records_alone() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repository(&dir, 300);
        let end = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        repo.add_study_record(StudyRecord::ending_at("a", "math", end, 60))
            .await
            .unwrap();

        let bulky = StudyRecord::ending_at("b".repeat(400), "math", end, 60);
        let err = repo.add_study_record(bulky).await.unwrap_err();

        assert!(err.is_quota_exceeded());
        assert_eq!(repo.list_study_records().await.unwrap().len(), 1);
    }
}
