use std::collections::HashSet;

use crate::{
    db::{
        helpers::{new_id, size_in_kb},
        models::{
            NewSubject, StoredSubject, Subject, SubjectUpdate, DEFAULT_SUBJECT_IMAGE,
            UNTITLED_SUBJECT_NAME,
        },
    },
    error::{Result, TrackerError},
};

use super::{RecordRepository, SUBJECTS_KEY};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Embedded images above this size get a warning even when they fit the ceiling.
const LARGE_IMAGE_WARN_KB: u64 = 1_000;

/// Id for a stored subject that lacks one. Derived from its position so every
/// read of the same document agrees; skips ids other subjects already use.
fn fallback_subject_id(index: usize, taken: &mut HashSet<String>) -> String {
    let base = format!("subject-{}", index + 1);
    let mut candidate = base.clone();
    let mut suffix = 1;
    while taken.contains(&candidate) {
        suffix += 1;
        candidate = format!("{base}-{suffix}");
    }
    taken.insert(candidate.clone());
    candidate
}

fn normalize_subject(stored: StoredSubject, index: usize, taken: &mut HashSet<String>) -> Subject {
    let id = match stored.id.filter(|id| !id.is_empty()) {
        Some(id) => id,
        None => {
            let id = fallback_subject_id(index, taken);
            log_warn!("Stored subject {index} had no id; using {id}");
            id
        }
    };

    Subject {
        id,
        name: stored
            .name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| UNTITLED_SUBJECT_NAME.to_string()),
        image_url: stored
            .image_url
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| DEFAULT_SUBJECT_IMAGE.to_string()),
    }
}

fn normalize_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(TrackerError::validation("subject name must not be empty"));
    }
    Ok(trimmed.to_string())
}

/// Decoded size of an inline `data:` image, or `None` for plain URLs.
fn embedded_image_bytes(image_url: &str) -> Option<u64> {
    let rest = image_url.strip_prefix("data:image/")?;
    let (header, payload) = rest.split_once(',')?;
    let encoded = payload.len() as u64;
    if header.ends_with(";base64") {
        let padding = payload.bytes().rev().take_while(|b| *b == b'=').count() as u64;
        Some((encoded / 4 * 3).saturating_sub(padding))
    } else {
        Some(encoded)
    }
}

impl RecordRepository {
    fn prepare_image(&self, image_url: Option<&str>) -> Result<String> {
        let image_url = match image_url.map(str::trim) {
            None | Some("") => return Ok(DEFAULT_SUBJECT_IMAGE.to_string()),
            Some(url) => url,
        };

        if let Some(bytes) = embedded_image_bytes(image_url) {
            let size_kb = size_in_kb(bytes as usize);
            log_info!("Embedded subject image: ~{size_kb}KB decoded");
            if bytes > self.max_image_bytes {
                return Err(TrackerError::validation(format!(
                    "image is ~{size_kb}KB, above the {}KB limit; reduce the image size",
                    size_in_kb(self.max_image_bytes as usize)
                )));
            }
            if size_kb > LARGE_IMAGE_WARN_KB {
                log_warn!("Embedded subject image is very large (~{size_kb}KB)");
            }
        }

        Ok(image_url.to_string())
    }

    /// All subjects, with missing names and images filled in. Nothing is written back.
    pub async fn list_subjects(&self) -> Result<Vec<Subject>> {
        let stored: Vec<StoredSubject> = self.read_collection(SUBJECTS_KEY).await?;
        let mut taken: HashSet<String> = stored
            .iter()
            .filter_map(|subject| subject.id.clone())
            .filter(|id| !id.is_empty())
            .collect();
        Ok(stored
            .into_iter()
            .enumerate()
            .map(|(index, subject)| normalize_subject(subject, index, &mut taken))
            .collect())
    }

    pub async fn replace_subjects(&self, subjects: &[Subject]) -> Result<()> {
        for subject in subjects.iter().filter(|s| s.has_embedded_image()) {
            let size_kb = size_in_kb(subject.image_url.len());
            if size_kb > LARGE_IMAGE_WARN_KB {
                log_warn!("Subject '{}' carries a ~{size_kb}KB image", subject.name);
            }
        }
        self.write_collection(SUBJECTS_KEY, subjects).await
    }

    pub async fn add_subject(&self, input: NewSubject) -> Result<Subject> {
        let name = normalize_name(&input.name)?;
        let image_url = self.prepare_image(input.image_url.as_deref())?;

        let mut subjects = self.list_subjects().await?;

        let id = match input.id.filter(|id| !id.is_empty()) {
            Some(id) if subjects.iter().any(|s| s.id == id) => {
                let fresh = new_id();
                log_warn!("Subject id {id} already exists; using {fresh}");
                fresh
            }
            Some(id) => id,
            None => new_id(),
        };

        let subject = Subject {
            id,
            name,
            image_url,
        };
        subjects.push(subject.clone());
        self.replace_subjects(&subjects).await?;

        log_info!("Added subject '{}' ({})", subject.name, subject.id);
        Ok(subject)
    }

    /// Merge the fields present in `update` over the stored subject.
    pub async fn update_subject(&self, update: SubjectUpdate) -> Result<Subject> {
        let name = update.name.as_deref().map(normalize_name).transpose()?;
        let image_url = match update.image_url.as_deref() {
            Some(url) => Some(self.prepare_image(Some(url))?),
            None => None,
        };

        let mut subjects = self.list_subjects().await?;
        let Some(existing) = subjects.iter_mut().find(|s| s.id == update.id) else {
            return Err(TrackerError::not_found(format!("subject {}", update.id)));
        };

        let before_kb = size_in_kb(existing.image_url.len());
        if let Some(name) = name {
            existing.name = name;
        }
        if let Some(image_url) = image_url {
            existing.image_url = image_url;
        }
        let updated = existing.clone();
        log_info!(
            "Updating subject {}: image ~{before_kb}KB -> ~{}KB",
            updated.id,
            size_in_kb(updated.image_url.len())
        );

        self.replace_subjects(&subjects).await?;
        Ok(updated)
    }

    /// Remove a subject. Its study records are left in place.
    pub async fn delete_subject(&self, subject_id: &str) -> Result<()> {
        let subjects = self.list_subjects().await?;
        let before = subjects.len();
        let remaining: Vec<Subject> = subjects
            .into_iter()
            .filter(|s| s.id != subject_id)
            .collect();

        if remaining.len() == before {
            log_warn!("Subject {subject_id} not found; nothing to delete");
            return Ok(());
        }

        self.replace_subjects(&remaining).await?;
        log_info!("Deleted subject {subject_id}");
        Ok(())
    }
}
