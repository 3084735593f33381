use std::sync::Arc;

use chrono::{TimeZone, Utc};
use studytime::{
    clock::ManualClock,
    config::{TimerSettings, TrackerConfig},
    StudyTracker,
};

/// A clock parked at a fixed instant (Wednesday 2024-05-01, 09:00 UTC).
pub fn test_clock() -> ManualClock {
    ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap())
}

/// Config rooted in `dir` with the background ticker off, so tests drive time.
pub fn test_config(dir: &tempfile::TempDir) -> TrackerConfig {
    let mut config = TrackerConfig::in_dir(dir.path());
    config.timer = TimerSettings::manual();
    config
}

pub async fn open_tracker(config: TrackerConfig, clock: &ManualClock) -> StudyTracker {
    StudyTracker::open_with_clock(config, Arc::new(clock.clone()))
        .await
        .expect("Failed to open tracker")
}

/// A fresh tracker in a temporary directory; keep the directory alive.
pub async fn create_test_tracker() -> (StudyTracker, ManualClock, tempfile::TempDir) {
    let dir = tempfile::TempDir::new().expect("Failed to create temp directory");
    let clock = test_clock();
    let tracker = open_tracker(test_config(&dir), &clock).await;
    (tracker, clock, dir)
}
