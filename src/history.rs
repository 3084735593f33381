//! Weekly study totals per subject, bucketed by local calendar day.

use chrono::{Datelike, Duration, NaiveDate, TimeZone};
use serde::Serialize;

use crate::db::{StudyRecord, Subject};

pub const DAYS_PER_WEEK: usize = 7;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubjectWeek {
    pub subject: Subject,
    /// Seconds studied on each day, Monday first.
    pub daily_secs: [u64; DAYS_PER_WEEK],
    pub total_secs: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WeeklySummary {
    pub days: [NaiveDate; DAYS_PER_WEEK],
    pub subjects: Vec<SubjectWeek>,
    pub daily_totals: [u64; DAYS_PER_WEEK],
    pub total_secs: u64,
}

/// The Monday-started week `offset` weeks away from the week containing `today`.
pub fn week_days(today: NaiveDate, offset: i64) -> [NaiveDate; DAYS_PER_WEEK] {
    let base = Duration::try_weeks(offset)
        .and_then(|shift| today.checked_add_signed(shift))
        .unwrap_or(today);
    let since_monday = i64::from(base.weekday().num_days_from_monday());
    let monday = base
        .checked_sub_signed(Duration::days(since_monday))
        .unwrap_or(base);

    std::array::from_fn(|index| {
        monday
            .checked_add_signed(Duration::days(index as i64))
            .unwrap_or(NaiveDate::MAX)
    })
}

/// Records count on the local day their session ended. Records whose subject
/// no longer exists are left out of every total.
pub fn weekly_summary<Tz: TimeZone>(
    subjects: &[Subject],
    records: &[StudyRecord],
    today: NaiveDate,
    offset: i64,
    tz: &Tz,
) -> WeeklySummary {
    let days = week_days(today, offset);

    let subject_weeks: Vec<SubjectWeek> = subjects
        .iter()
        .map(|subject| {
            let mut daily_secs = [0u64; DAYS_PER_WEEK];
            for record in records.iter().filter(|r| r.subject_id == subject.id) {
                let local_day = record.end_time.with_timezone(tz).date_naive();
                if let Some(index) = days.iter().position(|day| *day == local_day) {
                    daily_secs[index] = daily_secs[index].saturating_add(record.duration);
                }
            }
            SubjectWeek {
                subject: subject.clone(),
                daily_secs,
                total_secs: daily_secs.iter().sum(),
            }
        })
        .collect();

    let mut daily_totals = [0u64; DAYS_PER_WEEK];
    for week in &subject_weeks {
        for (total, secs) in daily_totals.iter_mut().zip(week.daily_secs) {
            *total = total.saturating_add(secs);
        }
    }

    WeeklySummary {
        days,
        total_secs: daily_totals.iter().sum(),
        daily_totals,
        subjects: subject_weeks,
    }
}

/// Compact duration for tables: `-`, `45m`, `2h`, `1h30m`.
pub fn format_study_duration(seconds: u64) -> String {
    if seconds == 0 {
        return "-".to_string();
    }
    let hours = seconds / 3_600;
    let minutes = (seconds % 3_600) / 60;
    match (hours, minutes) {
        (0, minutes) => format!("{minutes}m"),
        (hours, 0) => format!("{hours}h"),
        (hours, minutes) => format!("{hours}h{minutes}m"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc, Weekday};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn record(id: &str, subject: &str, end: &str, secs: u64) -> StudyRecord {
        let end = chrono::DateTime::parse_from_rfc3339(end)
            .unwrap()
            .with_timezone(&Utc);
        StudyRecord::ending_at(id, subject, end, secs)
    }

    #[test]
    fn weeks_start_on_monday() {
        // 2024-05-01 is a Wednesday.
        let days = week_days(date(2024, 5, 1), 0);
        assert_eq!(days[0], date(2024, 4, 29));
        assert_eq!(days[0].weekday(), Weekday::Mon);
        assert_eq!(days[6], date(2024, 5, 5));

        let sunday = week_days(date(2024, 5, 5), 0);
        assert_eq!(sunday[0], date(2024, 4, 29));
    }

    #[test]
    fn offsets_move_whole_weeks() {
        assert_eq!(week_days(date(2024, 5, 1), -1)[0], date(2024, 4, 22));
        assert_eq!(week_days(date(2024, 5, 1), 2)[0], date(2024, 5, 13));
    }

    #[test]
    fn totals_per_subject_and_day() {
        let subjects = [Subject::new("1", "English"), Subject::new("3", "Math")];
        let records = [
            record("a", "1", "2024-04-29T10:00:00Z", 1_800),
            record("b", "1", "2024-04-29T18:00:00Z", 600),
            record("c", "3", "2024-05-02T09:00:00Z", 3_600),
            record("d", "3", "2024-05-06T09:00:00Z", 999),
            record("e", "gone", "2024-05-01T09:00:00Z", 500),
        ];

        let summary = weekly_summary(&subjects, &records, date(2024, 5, 1), 0, &Utc);

        assert_eq!(summary.subjects[0].daily_secs[0], 2_400);
        assert_eq!(summary.subjects[0].total_secs, 2_400);
        assert_eq!(summary.subjects[1].daily_secs[3], 3_600);
        assert_eq!(summary.subjects[1].total_secs, 3_600);
        assert_eq!(summary.daily_totals, [2_400, 0, 0, 3_600, 0, 0, 0]);
        assert_eq!(summary.total_secs, 6_000);
    }

    #[test]
    fn records_count_on_local_end_day() {
        let subjects = [Subject::new("1", "English")];
        // Monday 23:30 UTC is already Tuesday in Tokyo.
        let records = [record("a", "1", "2024-04-29T23:30:00Z", 60)];
        let tokyo = FixedOffset::east_opt(9 * 3_600).unwrap();

        let utc = weekly_summary(&subjects, &records, date(2024, 5, 1), 0, &Utc);
        let local = weekly_summary(&subjects, &records, date(2024, 5, 1), 0, &tokyo);

        assert_eq!(utc.daily_totals[0], 60);
        assert_eq!(local.daily_totals[1], 60);
    }

    #[test]
    fn compact_durations() {
        assert_eq!(format_study_duration(0), "-");
        assert_eq!(format_study_duration(45 * 60), "45m");
        assert_eq!(format_study_duration(7_200), "2h");
        assert_eq!(format_study_duration(5_400), "1h30m");
        assert_eq!(format_study_duration(30), "0m");
    }
}
