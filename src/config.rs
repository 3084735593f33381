use std::{fs, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const ENABLE_LOGS: bool = true;

use crate::log_warn;

pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const DEFAULT_DB_FILE_NAME: &str = "studytime.sqlite3";

/// Roughly what a browser origin gets for local storage.
pub const DEFAULT_STORAGE_QUOTA_BYTES: u64 = 5 * 1024 * 1024;
/// Ceiling for an embedded subject image, measured before encoding.
pub const DEFAULT_MAX_IMAGE_BYTES: u64 = 5 * 1024 * 1024;
pub const DEFAULT_CHECKPOINT_EVERY_SECS: u64 = 10;
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct TimerSettings {
    /// `None` disables the background ticker; elapsed time is still correct on
    /// every read, only the periodic checkpoints and snapshot pushes stop.
    pub tick_interval_ms: Option<u64>,
    pub checkpoint_every_secs: u64,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: Some(DEFAULT_TICK_INTERVAL_MS),
            checkpoint_every_secs: DEFAULT_CHECKPOINT_EVERY_SECS,
        }
    }
}

impl TimerSettings {
    pub fn tick_interval(&self) -> Option<Duration> {
        self.tick_interval_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    /// Ticking is driven by the caller (tests, embedded hosts with their own loop).
    pub fn manual() -> Self {
        Self {
            tick_interval_ms: None,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackerConfig {
    pub data_dir: PathBuf,
    pub db_file_name: String,
    pub storage_quota_bytes: u64,
    pub max_image_bytes: u64,
    pub timer: TimerSettings,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            db_file_name: DEFAULT_DB_FILE_NAME.into(),
            storage_quota_bytes: DEFAULT_STORAGE_QUOTA_BYTES,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            timer: TimerSettings::default(),
        }
    }
}

impl TrackerConfig {
    pub fn in_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Load `settings.json` from `data_dir`, falling back to defaults when the file
    /// is missing or unreadable. `data_dir` always wins over whatever the file says.
    pub fn load(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        let path = data_dir.join(SETTINGS_FILE_NAME);

        let mut config = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log_warn!("Ignoring corrupt settings at {}: {err}", path.display());
                Self::default()
            })
        } else {
            Self::default()
        };

        config.data_dir = data_dir;
        config.apply_env();
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir).with_context(|| {
            format!("Failed to create data directory {}", self.data_dir.display())
        })?;
        let path = self.data_dir.join(SETTINGS_FILE_NAME);
        let serialized = serde_json::to_string_pretty(self)?;
        fs::write(&path, serialized)
            .with_context(|| format!("Failed to write settings to {}", path.display()))
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(&self.db_file_name)
    }

    /// `STUDYTIME_DEBUG=1` checkpoints on every second instead of every tenth.
    fn apply_env(&mut self) {
        let debug_mode = std::env::var("STUDYTIME_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        if debug_mode {
            self.timer.checkpoint_every_secs = 1;
        }
    }
}
