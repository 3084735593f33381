//! String key-value store on top of [`Database`].
//!
//! Mirrors what a browser origin gets from local storage: one flat namespace,
//! last write wins, and a hard capacity. Capacity failures come back as
//! [`TrackerError::QuotaExceeded`] so callers can ask the user to shrink their
//! data instead of showing a generic failure.

use anyhow::Context;
use rusqlite::{params, OptionalExtension};

use crate::{
    db::{helpers::size_in_kb, Database},
    error::{Result, TrackerError},
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Documents above this size get a warning on every write.
const LARGE_WRITE_WARN_KB: u64 = 5_000;

enum WriteOutcome {
    Stored,
    OverQuota { used_bytes: u64 },
}

#[derive(Clone)]
pub struct KvStore {
    db: Database,
    quota_bytes: u64,
}

impl KvStore {
    pub fn new(db: Database, quota_bytes: u64) -> Self {
        Self { db, quota_bytes }
    }

    pub fn quota_bytes(&self) -> u64 {
        self.quota_bytes
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let owned_key = key.to_string();
        let value = self
            .db
            .execute(move |conn| {
                let value = conn
                    .query_row(
                        "SELECT value FROM kv WHERE key = ?1",
                        params![owned_key],
                        |row| row.get::<_, String>(0),
                    )
                    .optional()?;
                Ok(value)
            })
            .await
            .with_context(|| format!("failed to read '{key}'"))?;

        match &value {
            Some(data) => log_debug!("Read {key}: ~{}KB", size_in_kb(data.len())),
            None => log_debug!("Read {key}: absent"),
        }

        Ok(value)
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        let size_kb = size_in_kb(value.len());
        log_debug!("Writing {key}: ~{size_kb}KB");
        if size_kb > LARGE_WRITE_WARN_KB {
            log_warn!("Writing a very large value to {key} (~{size_kb}KB)");
        }

        let quota = self.quota_bytes;
        let owned_key = key.to_string();
        let owned_value = value.to_string();

        let outcome = self
            .db
            .execute(move |conn| {
                let used_elsewhere: i64 = conn.query_row(
                    "SELECT COALESCE(SUM(LENGTH(CAST(value AS BLOB))), 0) FROM kv WHERE key != ?1",
                    params![owned_key],
                    |row| row.get(0),
                )?;
                let used_bytes = u64::try_from(used_elsewhere).unwrap_or(0);
                if used_bytes.saturating_add(owned_value.len() as u64) > quota {
                    return Ok(WriteOutcome::OverQuota { used_bytes });
                }

                conn.execute(
                    "INSERT INTO kv (key, value, updated_at)
                     VALUES (?1, ?2, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
                     ON CONFLICT(key) DO UPDATE SET
                         value = excluded.value,
                         updated_at = excluded.updated_at",
                    params![owned_key, owned_value],
                )?;
                Ok(WriteOutcome::Stored)
            })
            .await;

        match outcome {
            Ok(WriteOutcome::Stored) => {
                log_info!("Saved {key}: ~{size_kb}KB");
                Ok(())
            }
            Ok(WriteOutcome::OverQuota { used_bytes }) => {
                log_error!(
                    "Storage quota exceeded writing {key}: ~{size_kb}KB on top of ~{}KB used (quota ~{}KB)",
                    size_in_kb(used_bytes as usize),
                    size_in_kb(quota as usize)
                );
                Err(TrackerError::QuotaExceeded {
                    key: key.to_string(),
                    size_kb,
                })
            }
            Err(err) if is_disk_full(&err) => {
                log_error!("Disk full writing {key} (~{size_kb}KB): {err:#}");
                Err(TrackerError::QuotaExceeded {
                    key: key.to_string(),
                    size_kb,
                })
            }
            Err(err) => {
                log_error!("Failed to write {key}: {err:#}");
                Err(TrackerError::Storage(
                    err.context(format!("failed to write '{key}'")),
                ))
            }
        }
    }

    pub async fn remove(&self, key: &str) -> Result<()> {
        let owned_key = key.to_string();
        self.db
            .execute(move |conn| {
                conn.execute("DELETE FROM kv WHERE key = ?1", params![owned_key])?;
                Ok(())
            })
            .await
            .with_context(|| format!("failed to remove '{key}'"))?;
        Ok(())
    }

    /// Total bytes currently stored across all keys.
    pub async fn usage_bytes(&self) -> Result<u64> {
        let used = self
            .db
            .execute(|conn| {
                let used: i64 = conn.query_row(
                    "SELECT COALESCE(SUM(LENGTH(CAST(value AS BLOB))), 0) FROM kv",
                    [],
                    |row| row.get(0),
                )?;
                Ok(used)
            })
            .await
            .context("failed to measure storage usage")?;
        Ok(u64::try_from(used).unwrap_or(0))
    }
}

fn is_disk_full(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<rusqlite::Error>(),
            Some(rusqlite::Error::SqliteFailure(ffi_err, _))
                if ffi_err.code == rusqlite::ErrorCode::DiskFull
        )
    })
}
