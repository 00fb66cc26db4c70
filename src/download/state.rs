//! Download state tracking.

use std::fmt;

use serde::Serialize;

use crate::error::{exit_codes, Error, ErrorKind};

/// Stage of one chapter inside a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChapterState {
    Skipped,
    Fetching,
    Decoding,
    Exporting,
    Completed,
    Failed,
}

impl fmt::Display for ChapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChapterState::Skipped => "skipped",
            ChapterState::Fetching => "fetching",
            ChapterState::Decoding => "decoding",
            ChapterState::Exporting => "exporting",
            ChapterState::Completed => "completed",
            ChapterState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Why one chapter failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChapterFailure {
    pub chapter_id: u32,
    pub kind: ErrorKind,
    pub message: String,
}

/// Why a whole title could not be processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TitleFailure {
    pub title_id: u32,
    pub kind: ErrorKind,
    pub message: String,
}

/// Chapter counters of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub downloaded: u64,
    pub skipped_manifest: u64,
    pub skipped_existing: u64,
    pub failed: u64,
    pub failed_chapter_ids: Vec<u32>,
    pub failures: Vec<ChapterFailure>,
}

impl RunSummary {
    pub fn mark_downloaded(&mut self) {
        self.downloaded += 1;
    }

    pub fn mark_skipped_manifest(&mut self) {
        self.skipped_manifest += 1;
    }

    pub fn mark_skipped_existing(&mut self) {
        self.skipped_existing += 1;
    }

    pub fn mark_failed(&mut self, chapter_id: u32, error: &Error) {
        self.failed += 1;
        self.failed_chapter_ids.push(chapter_id);
        self.failures.push(ChapterFailure {
            chapter_id,
            kind: error.kind(),
            message: error.to_string(),
        });
    }

    /// Chapters that were looked at, whatever happened to them.
    pub fn total(&self) -> u64 {
        self.downloaded + self.skipped_manifest + self.skipped_existing + self.failed
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunOutcome {
    pub summary: RunSummary,
    pub title_failures: Vec<TitleFailure>,
    pub interrupted: bool,
}

impl RunOutcome {
    pub fn mark_title_failed(&mut self, title_id: u32, error: &Error) {
        self.title_failures.push(TitleFailure {
            title_id,
            kind: error.kind(),
            message: error.to_string(),
        });
    }

    pub fn is_success(&self) -> bool {
        !self.interrupted && self.title_failures.is_empty() && self.summary.failed == 0
    }

    /// Exit code of the run: the most severe of title failures, chapter
    /// failures and interruption.
    pub fn exit_code(&self) -> i32 {
        let chapters = if self.summary.failed > 0 || self.interrupted {
            exit_codes::EXTERNAL_FAILURE
        } else {
            exit_codes::SUCCESS
        };
        self.title_failures
            .iter()
            .map(|failure| failure.kind.exit_code())
            .fold(chapters, i32::max)
    }

    /// One-line description of what went wrong, if anything did.
    pub fn error_message(&self) -> Option<String> {
        let mut parts: Vec<String> = self
            .title_failures
            .iter()
            .map(|failure| format!("title {}: {}", failure.title_id, failure.message))
            .collect();
        if self.summary.failed > 0 {
            parts.push(Error::ChaptersFailed(self.summary.failed).to_string());
        }
        if self.interrupted {
            parts.push(Error::Interrupted.to_string());
        }
        (!parts.is_empty()).then(|| parts.join("; "))
    }
}
