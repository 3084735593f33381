//! Error types surfaced by the tracker core.
//!
//! Internal plumbing (the database worker, migrations) speaks `anyhow`; everything
//! crossing the public boundary is converted into [`TrackerError`] so callers can
//! tell "fix your input" apart from "free up space" apart from "storage broke".

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    /// Caller supplied something unusable (empty subject name, oversized image).
    #[error("invalid input: {0}")]
    Validation(String),

    /// A referenced id does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The store refused the write because it would exceed its capacity.
    #[error(
        "storage quota exceeded while writing '{key}' (~{size_kb}KB); try reducing the image size"
    )]
    QuotaExceeded { key: String, size_kb: u64 },

    /// A persisted document could not be decoded.
    #[error("failed to parse '{key}': {source}")]
    Parse {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("storage failure: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl TrackerError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }
}

pub type Result<T> = std::result::Result<T, TrackerError>;
