//! Subject data models.
//!
//! `Subject` is the normalized shape handed to callers. `StoredSubject` is the
//! lenient on-disk shape: every field optional, so documents written by older
//! builds (or hand-edited ones) still load.

use serde::{Deserialize, Serialize};

pub const DEFAULT_SUBJECT_IMAGE: &str = "/default-subject.png";
pub const UNTITLED_SUBJECT_NAME: &str = "Untitled";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub name: String,
    pub image_url: String,
}

impl Subject {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            image_url: DEFAULT_SUBJECT_IMAGE.into(),
        }
    }

    pub fn has_embedded_image(&self) -> bool {
        self.image_url.starts_with("data:image/")
    }
}

/// Input for creating a subject. A missing or colliding id gets replaced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSubject {
    pub id: Option<String>,
    pub name: String,
    pub image_url: Option<String>,
}

impl NewSubject {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_image(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = Some(image_url.into());
        self
    }
}

/// Partial update; `None` fields keep their stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectUpdate {
    pub id: String,
    pub name: Option<String>,
    pub image_url: Option<String>,
}

impl SubjectUpdate {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn image_url(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = Some(image_url.into());
        self
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct StoredSubject {
    pub id: Option<String>,
    pub name: Option<String>,
    pub image_url: Option<String>,
}

/// Subjects seeded into an empty store on first launch.
pub fn default_subjects() -> Vec<Subject> {
    ["English", "History", "Math", "Biology", "Music"]
        .iter()
        .enumerate()
        .map(|(index, name)| Subject::new((index + 1).to_string(), *name))
        .collect()
}
