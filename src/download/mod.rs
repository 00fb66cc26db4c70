//! Download module for chapter downloading.
//!
//! This module provides:
//! - Per-title resume manifests
//! - Chapter state and run summary tracking
//! - The chapter download pipeline
//! - Title metadata export

pub mod manifest;
pub mod metadata;
pub mod orchestrator;
pub mod state;

pub use manifest::{ChapterStatus, Manifest, ManifestEntry, MANIFEST_FILENAME};
pub use metadata::{write_title_metadata, METADATA_FILENAME};
pub use orchestrator::{request_cancel, Downloader, RetryPolicy};
pub use state::{ChapterFailure, ChapterState, RunOutcome, RunSummary, TitleFailure};
