//! mloader - a resumable MangaPlus manga downloader
//!
//! This library provides functionality for downloading manga chapters from MangaPlus.
//!
//! # Features
//!
//! - Title and viewer URL / id normalization
//! - Binary API client with optional payload capture and schema verification
//! - Page image decryption
//! - Raw, CBZ and PDF export
//! - Resumable runs through per-title manifests
//! - Bulk title discovery (API listing, list page scraping, headless browser)
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use mloader::{Config, Downloader, FormatExporterFactory, MangaPlusApi, WorkUnit};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let api = MangaPlusApi::new(config.auth.clone(), Duration::from_secs(30))?;
//!     let exporters = FormatExporterFactory::from_config(&config);
//!
//!     let outcome = Downloader::new(&api, &exporters, &config)
//!         .run(&[WorkUnit::Title(100017)])
//!         .await;
//!     println!("{} chapter(s) downloaded", outcome.summary.downloaded);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod download;
pub mod error;
pub mod export;
pub mod fs;
pub mod manga;
pub mod output;

// Re-exports for convenience
pub use api::{MangaApi, MangaPlusApi};
pub use config::{Config, OutputFormat, Quality};
pub use download::{Downloader, Manifest, RunOutcome, RunSummary};
pub use error::{Error, Result};
pub use export::{Exporter, ExporterFactory, FormatExporterFactory};
pub use manga::WorkUnit;
