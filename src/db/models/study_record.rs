//! Study record data models.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// One committed study session. Append-only; `duration` is whole seconds and
/// always equals `end_time - start_time`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StudyRecord {
    pub id: String,
    pub subject_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration: u64,
}

impl StudyRecord {
    /// Build a record for a session of `duration_secs` that ended at `end_time`.
    pub fn ending_at(
        id: impl Into<String>,
        subject_id: impl Into<String>,
        end_time: DateTime<Utc>,
        duration_secs: u64,
    ) -> Self {
        let span = Duration::seconds(i64::try_from(duration_secs).unwrap_or(i64::MAX));
        let start_time = end_time.checked_sub_signed(span).unwrap_or(end_time);
        Self {
            id: id.into(),
            subject_id: subject_id.into(),
            start_time,
            end_time,
            duration: duration_secs,
        }
    }
}

/// Lenient on-disk form. Timestamps stay as strings so one bad value only
/// costs that field, not the whole record.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct StoredStudyRecord {
    pub id: Option<String>,
    pub subject_id: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub duration: Option<serde_json::Number>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn ending_at_derives_start_time() {
        let end = Utc.with_ymd_and_hms(2024, 5, 1, 10, 2, 5).unwrap();
        let record = StudyRecord::ending_at("r1", "math", end, 125);

        assert_eq!(record.start_time, Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap());
        assert_eq!((record.end_time - record.start_time).num_seconds(), 125);
    }

    #[test]
    fn serializes_with_camel_case_iso_timestamps() {
        let end = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let record = StudyRecord::ending_at("r1", "math", end, 60);
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["subjectId"], "math");
        assert_eq!(json["startTime"], "2024-05-01T09:59:00Z");
        assert_eq!(json["duration"], 60);
    }
}
