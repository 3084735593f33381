use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_optional_datetime(
    value: Option<String>,
    field: &str,
) -> Result<Option<DateTime<Utc>>> {
    match value {
        Some(raw) => parse_datetime(&raw, field).map(Some),
        None => Ok(None),
    }
}

pub fn parse_seconds(value: &str, field: &str) -> Result<u64> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|err| anyhow!("{field} is not a whole number of seconds ('{value}'): {err}"))
}

pub fn parse_flag(value: &str, field: &str) -> Result<bool> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(anyhow!("{field} has unknown value '{other}'")),
    }
}

/// Size reported in logs and quota errors; rounds like the UI expects ("~12KB").
pub fn size_in_kb(len: usize) -> u64 {
    ((len as u64) + 512) / 1024
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}
