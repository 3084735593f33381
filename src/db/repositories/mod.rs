//! Typed collections over the key-value store.
//!
//! Each collection is a single JSON array under a fixed key, rewritten in full on
//! every change. Reads are forgiving: an unparsable document reads as empty and
//! unreadable elements are skipped, so one bad write can never brick startup.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::{
    db::{helpers::size_in_kb, KvStore},
    error::{Result, TrackerError},
};

mod study_records;
mod subjects;

pub const SUBJECTS_KEY: &str = "study-tracker-subjects";
pub const RECORDS_KEY: &str = "study-tracker-records";

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

#[derive(Clone)]
pub struct RecordRepository {
    kv: KvStore,
    max_image_bytes: u64,
}

impl RecordRepository {
    pub fn new(kv: KvStore, max_image_bytes: u64) -> Self {
        Self { kv, max_image_bytes }
    }

    pub fn store(&self) -> &KvStore {
        &self.kv
    }

    async fn read_collection<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>> {
        let Some(raw) = self.kv.get(key).await? else {
            return Ok(Vec::new());
        };

        let elements: Vec<Value> = match serde_json::from_str(&raw) {
            Ok(elements) => elements,
            Err(source) => {
                let err = TrackerError::Parse {
                    key: key.to_string(),
                    source,
                };
                log_error!("{err} (~{}KB); treating it as empty", size_in_kb(raw.len()));
                return Ok(Vec::new());
            }
        };

        let total = elements.len();
        let items: Vec<T> = elements
            .into_iter()
            .enumerate()
            .filter_map(|(index, element)| match serde_json::from_value(element) {
                Ok(item) => Some(item),
                Err(err) => {
                    log_warn!("Skipping unreadable entry {index} in {key}: {err}");
                    None
                }
            })
            .collect();

        log_info!("Loaded {} of {total} entries from {key}", items.len());
        Ok(items)
    }

    async fn write_collection<T: Serialize>(&self, key: &str, items: &[T]) -> Result<()> {
        let data = serde_json::to_string(items).map_err(anyhow::Error::from)?;
        log_info!(
            "Saving {} entries to {key}, ~{}KB total",
            items.len(),
            size_in_kb(data.len())
        );
        self.kv.set(key, &data).await
    }
}
