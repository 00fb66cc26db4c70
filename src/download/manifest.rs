//! Per-title resume manifest.
//!
//! One JSON document per title directory records the outcome of every
//! chapter attempt. Starting a chapter only touches memory; the document on
//! disk is replaced atomically when a chapter completes or fails, so a crash
//! mid-chapter leaves the previous state intact.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::fs::{ensure_dir, write_atomic};

pub const MANIFEST_FILENAME: &str = ".mloader-manifest.json";
pub const MANIFEST_SCHEMA: &str = "mloader.title_download_manifest";
pub const MANIFEST_VERSION: u64 = 2;

/// Status of one chapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChapterStatus {
    Pending,
    Completed,
    Failed,
}

impl ChapterStatus {
    /// Whether moving from `from` to `self` is allowed. Completed is terminal.
    fn reachable_from(self, from: Option<ChapterStatus>) -> bool {
        matches!(
            (from, self),
            (None, ChapterStatus::Pending)
                | (Some(ChapterStatus::Pending), ChapterStatus::Pending)
                | (Some(ChapterStatus::Failed), ChapterStatus::Pending)
                | (Some(ChapterStatus::Pending), ChapterStatus::Completed)
                | (Some(ChapterStatus::Pending), ChapterStatus::Failed)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub status: ChapterStatus,
    /// UTC timestamp of the latest transition.
    pub last_attempt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
}

#[derive(Serialize)]
struct ManifestDocument<'a> {
    version: u64,
    schema: &'static str,
    chapters: &'a BTreeMap<u32, ManifestEntry>,
}

fn utc_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Resume state of one title.
#[derive(Debug)]
pub struct Manifest {
    path: PathBuf,
    chapters: BTreeMap<u32, ManifestEntry>,
}

impl Manifest {
    /// Load the manifest of `title_dir`. A missing or unreadable document
    /// yields an empty manifest.
    pub fn load(title_dir: &Path) -> Self {
        let path = title_dir.join(MANIFEST_FILENAME);
        let chapters = match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<Value>(&bytes) {
                Ok(document) => normalize_document(&document),
                Err(e) => {
                    tracing::warn!("Ignoring corrupt manifest {}: {}", path.display(), e);
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                tracing::warn!("Cannot read manifest {}: {}", path.display(), e);
                BTreeMap::new()
            }
        };

        Self { path, chapters }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entry(&self, chapter_id: u32) -> Option<&ManifestEntry> {
        self.chapters.get(&chapter_id)
    }

    pub fn len(&self) -> usize {
        self.chapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }

    /// Forget every entry and delete the document.
    pub fn reset(&mut self) -> Result<()> {
        self.chapters.clear();
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::info!("Manifest reset: {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether `chapter_id` was completed by an earlier run.
    pub fn should_skip(&self, chapter_id: u32) -> bool {
        self.entry(chapter_id)
            .is_some_and(|entry| entry.status == ChapterStatus::Completed)
    }

    /// Mark `chapter_id` as in progress. Not persisted.
    pub fn record_start(
        &mut self,
        chapter_id: u32,
        chapter_name: &str,
        sub_title: &str,
    ) -> Result<()> {
        let entry = self.transition(chapter_id, ChapterStatus::Pending)?;
        entry.note = None;
        entry.chapter_name = Some(chapter_name.to_string());
        entry.sub_title = Some(sub_title.to_string());
        Ok(())
    }

    /// Mark `chapter_id` as completed and persist.
    pub fn record_success(&mut self, chapter_id: u32, output_path: Option<&Path>) -> Result<()> {
        let entry = self.transition(chapter_id, ChapterStatus::Completed)?;
        entry.note = None;
        if let Some(path) = output_path {
            entry.output_path = Some(path.display().to_string());
        }
        self.save()
    }

    /// Mark `chapter_id` as failed with a short cause and persist.
    pub fn record_failure(&mut self, chapter_id: u32, note: &str) -> Result<()> {
        let entry = self.transition(chapter_id, ChapterStatus::Failed)?;
        entry.note = Some(note.to_string());
        self.save()
    }

    fn transition(&mut self, chapter_id: u32, next: ChapterStatus) -> Result<&mut ManifestEntry> {
        let current = self.chapters.get(&chapter_id).map(|e| e.status);
        if !next.reachable_from(current) {
            return Err(Error::Internal(format!(
                "Chapter {} cannot move from {:?} to {:?}",
                chapter_id, current, next
            )));
        }

        let entry = self.chapters.entry(chapter_id).or_insert_with(|| ManifestEntry {
            status: next,
            last_attempt: String::new(),
            note: None,
            chapter_name: None,
            sub_title: None,
            output_path: None,
        });
        entry.status = next;
        entry.last_attempt = utc_timestamp();
        Ok(entry)
    }

    /// Write the whole document atomically.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            ensure_dir(parent)?;
        }
        let document = ManifestDocument {
            version: MANIFEST_VERSION,
            schema: MANIFEST_SCHEMA,
            chapters: &self.chapters,
        };
        let data = serde_json::to_vec_pretty(&document)?;
        write_atomic(&self.path, &data)
            .map_err(|e| Error::Manifest(format!("{}: {}", self.path.display(), e)))
    }
}

/// Read chapter entries out of any known document layout.
///
/// Version 0 is a flat `{chapter_id: entry}` map (or a bare `chapters`
/// object), version 1 nests entries under `chapters`, version 2 adds the
/// schema marker. Newer versions are read as-is.
fn normalize_document(document: &Value) -> BTreeMap<u32, ManifestEntry> {
    let version = document.get("version").and_then(Value::as_u64).unwrap_or(0);
    if version > MANIFEST_VERSION {
        tracing::warn!(
            "Manifest version {} is newer than {}; reading it as-is",
            version,
            MANIFEST_VERSION
        );
    } else if version < MANIFEST_VERSION {
        tracing::debug!("Migrating manifest from version {}", version);
    }

    let chapters = match document.get("chapters") {
        Some(Value::Object(chapters)) => Some(chapters),
        _ if version == 0 => document.as_object(),
        _ => None,
    };

    chapters
        .into_iter()
        .flatten()
        .filter_map(|(key, value)| Some((key.parse::<u32>().ok()?, entry_from_value(value)?)))
        .collect()
}

fn entry_from_value(value: &Value) -> Option<ManifestEntry> {
    let object = value.as_object()?;
    let text = |key: &str| {
        object
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let status = match text("status").as_deref() {
        Some("completed") => ChapterStatus::Completed,
        Some("failed") => ChapterStatus::Failed,
        // Older documents call an unfinished attempt "in_progress".
        _ => ChapterStatus::Pending,
    };

    Some(ManifestEntry {
        status,
        last_attempt: ["last_attempt", "completed_at", "failed_at", "started_at"]
            .iter()
            .find_map(|key| text(key))
            .unwrap_or_default(),
        note: text("note").or_else(|| text("error")),
        chapter_name: text("chapter_name"),
        sub_title: text("sub_title"),
        output_path: text("output_path"),
    })
}
