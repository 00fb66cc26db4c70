//! Command-line argument definitions using clap.

use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;

use crate::config::{Config, ModeFlags, OutputFormat, Quality};
use crate::error::Result;
use crate::manga::Language;

/// MangaPlus chapter downloader CLI.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "mloader",
    version,
    about = "Download manga chapters from MangaPlus",
    long_about = "Download manga chapters from MangaPlus as CBZ, PDF or raw images.\n\n\
                  Targets are title or viewer URLs, or ids given with --title/--chapter. \
                  Runs are resumable: completed chapters are recorded per title and skipped later."
)]
pub struct Args {
    /// Title or viewer URLs (e.g. https://mangaplus.shueisha.co.jp/titles/100017),
    /// or bare ids also named by --title/--chapter.
    pub urls: Vec<String>,

    /// Title id to download (repeatable).
    #[arg(short = 't', long = "title", value_name = "ID")]
    pub titles: Vec<u32>,

    /// Chapter id to download (repeatable).
    #[arg(short = 'c', long = "chapter", alias = "chapter-id", value_name = "ID")]
    pub chapters: Vec<u32>,

    /// Output directory for downloads.
    #[arg(short = 'o', long = "out", value_name = "DIR", env = "MLOADER_OUT_DIR")]
    pub out_dir: Option<PathBuf>,

    /// Path to configuration file.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Save raw images instead of archives.
    #[arg(short = 'r', long)]
    pub raw: bool,

    /// Chapter output format.
    #[arg(short = 'f', long, value_enum)]
    pub format: Option<FormatArg>,

    /// Image quality.
    #[arg(short = 'q', long, value_enum)]
    pub quality: Option<QualityArg>,

    /// Split combined double-page images.
    #[arg(short = 's', long)]
    pub split: bool,

    /// Minimal chapter number to download.
    #[arg(short = 'b', long)]
    pub begin: Option<u32>,

    /// Maximal chapter number to download.
    #[arg(short = 'e', long)]
    pub end: Option<u32>,

    /// Download only the last chapter of each title.
    #[arg(short = 'l', long)]
    pub last: bool,

    /// Use the chapter subtitle as the document title.
    #[arg(long)]
    pub chapter_title: bool,

    /// Save raw images in one subdirectory per chapter.
    #[arg(long)]
    pub chapter_subdir: bool,

    /// Export title metadata as JSON.
    #[arg(short = 'm', long)]
    pub meta: bool,

    /// Skip chapters a previous run completed (default).
    #[arg(long, overrides_with = "no_resume")]
    pub resume: bool,

    /// Ignore the per-title manifest.
    #[arg(long, overrides_with = "resume")]
    pub no_resume: bool,

    /// Delete per-title manifests before downloading.
    #[arg(long)]
    pub manifest_reset: bool,

    /// Record raw API payloads and metadata in this directory.
    #[arg(long = "capture-api", value_name = "DIR", env = "MLOADER_CAPTURE_API_DIR")]
    pub capture_dir: Option<PathBuf>,

    /// Verify captured payloads in this directory and exit.
    #[arg(long = "verify-capture-schema", value_name = "DIR")]
    pub verify_capture_schema: Option<PathBuf>,

    /// Compare verified capture signatures against this baseline directory.
    #[arg(long = "verify-capture-baseline", value_name = "DIR")]
    pub verify_capture_baseline: Option<PathBuf>,

    /// Discover all available titles and download them.
    #[arg(long)]
    pub all: bool,

    /// List page to scrape for title links (repeatable).
    #[arg(long = "page", value_name = "URL")]
    pub pages: Vec<String>,

    /// API endpoint used for title discovery.
    #[arg(long, value_name = "URL", env = "MLOADER_TITLE_INDEX_ENDPOINT")]
    pub title_index_endpoint: Option<String>,

    /// Keep only discovered title ids with exactly this many digits.
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
    pub id_length: Option<u16>,

    /// Restrict --all discovery to a language (repeatable).
    #[arg(long = "language", value_name = "LANGUAGE")]
    pub languages: Vec<Language>,

    /// Only print the discovered title ids.
    #[arg(long)]
    pub list_only: bool,

    /// Render list pages in a headless browser when scraping finds nothing (default).
    #[arg(long, overrides_with = "no_browser_fallback")]
    pub browser_fallback: bool,

    /// Never launch a browser for discovery.
    #[arg(long, overrides_with = "browser_fallback")]
    pub no_browser_fallback: bool,

    /// Auth parameter override, e.g. `--auth app_ver=98` (repeatable).
    #[arg(long = "auth", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub auth_overrides: Vec<(String, String)>,

    /// Per-request timeout in seconds.
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Retries for transient network failures.
    #[arg(long, value_name = "N")]
    pub max_retries: Option<u32>,

    /// Emit one JSON document on stdout instead of text.
    #[arg(long)]
    pub json: bool,

    /// Only print warnings and errors.
    #[arg(long)]
    pub quiet: bool,

    /// Increase logging verbosity (repeatable).
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
}

/// CLI output format argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    /// Loose image files.
    Raw,
    /// Zip archive with ComicInfo.xml.
    Cbz,
    /// One PDF page per image.
    Pdf,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Raw => OutputFormat::Raw,
            FormatArg::Cbz => OutputFormat::Cbz,
            FormatArg::Pdf => OutputFormat::Pdf,
        }
    }
}

/// CLI image quality argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum QualityArg {
    #[value(name = "super_high", alias = "super-high")]
    SuperHigh,
    High,
    Low,
}

impl From<QualityArg> for Quality {
    fn from(arg: QualityArg) -> Self {
        match arg {
            QualityArg::SuperHigh => Quality::SuperHigh,
            QualityArg::High => Quality::High,
            QualityArg::Low => Quality::Low,
        }
    }
}

fn parse_key_value(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

impl Args {
    /// Flags whose combination is checked before any work starts.
    pub fn mode_flags(&self) -> ModeFlags {
        ModeFlags {
            all: self.all,
            list_only: self.list_only,
            has_languages: !self.languages.is_empty(),
            verify_capture_schema: self.verify_capture_schema.is_some(),
            verify_capture_baseline: self.verify_capture_baseline.is_some(),
        }
    }

    /// Merge CLI arguments into an existing config, overriding where specified.
    pub fn merge_into_config(&self, config: &mut Config) -> Result<()> {
        config.auth.apply_overrides(&self.auth_overrides)?;

        let options = &mut config.options;
        if let Some(dir) = &self.out_dir {
            options.out_dir = dir.clone();
        }

        if let Some(format) = self.format {
            options.format = format.into();
        }
        // --raw wins over --format.
        if self.raw {
            options.format = OutputFormat::Raw;
        }

        if let Some(quality) = self.quality {
            options.quality = quality.into();
        }

        if let Some(begin) = self.begin {
            options.begin = begin;
        }

        if self.end.is_some() {
            options.end = self.end;
        }

        if let Some(dir) = &self.capture_dir {
            options.capture_dir = Some(dir.clone());
        }

        if let Some(timeout) = self.timeout {
            options.request_timeout_secs = timeout;
        }

        if let Some(retries) = self.max_retries {
            options.max_retries = retries;
        }

        // Boolean flags (only override if set to non-default)
        options.split |= self.split;
        options.last |= self.last;
        options.chapter_title |= self.chapter_title;
        options.chapter_subdir |= self.chapter_subdir;
        options.meta |= self.meta;
        options.manifest_reset |= self.manifest_reset;

        if self.resume {
            options.resume = true;
        }
        if self.no_resume {
            options.resume = false;
        }

        if self.quiet || self.json {
            options.show_progress = false;
        }

        let discovery = &mut config.discovery;
        if !self.pages.is_empty() {
            discovery.pages = self.pages.clone();
        }

        if let Some(endpoint) = &self.title_index_endpoint {
            discovery.title_index_endpoint = endpoint.clone();
        }

        if let Some(len) = self.id_length {
            discovery.id_length = Some(len as usize);
        }

        if !self.languages.is_empty() {
            discovery.languages = self.languages.clone();
        }

        if self.browser_fallback {
            discovery.browser_fallback = true;
        }
        if self.no_browser_fallback {
            discovery.browser_fallback = false;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("mloader").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_parses_targets_and_ids() {
        let args = parse(&[
            "https://mangaplus.shueisha.co.jp/titles/100017",
            "100020",
            "-t",
            "100020",
            "--chapter-id",
            "1000486",
        ]);
        assert_eq!(args.urls.len(), 2);
        assert_eq!(args.titles, vec![100020]);
        assert_eq!(args.chapters, vec![1000486]);
    }

    #[test]
    fn test_merge_overrides_config() {
        let args = parse(&[
            "-o",
            "/tmp/manga",
            "-f",
            "pdf",
            "-q",
            "low",
            "--begin",
            "3",
            "--end",
            "9",
            "--no-resume",
            "--meta",
            "--auth",
            "app_ver=98",
        ]);
        let mut config = Config::default();
        args.merge_into_config(&mut config).unwrap();

        assert_eq!(config.options.out_dir, PathBuf::from("/tmp/manga"));
        assert_eq!(config.options.format, OutputFormat::Pdf);
        assert_eq!(config.options.quality, Quality::Low);
        assert_eq!(config.options.begin, 3);
        assert_eq!(config.options.end, Some(9));
        assert!(!config.options.resume);
        assert!(config.options.meta);
        assert_eq!(config.auth.app_ver, "98");
    }

    #[test]
    fn test_raw_wins_over_format() {
        let args = parse(&["--raw", "--format", "cbz"]);
        let mut config = Config::default();
        args.merge_into_config(&mut config).unwrap();
        assert_eq!(config.options.format, OutputFormat::Raw);
    }

    #[test]
    fn test_unset_flags_keep_config_values() {
        let args = parse(&[]);
        let mut config = Config::default();
        config.options.resume = false;
        config.discovery.browser_fallback = false;
        args.merge_into_config(&mut config).unwrap();
        assert!(!config.options.resume);
        assert!(!config.discovery.browser_fallback);
        assert!(config.options.show_progress);
    }

    #[test]
    fn test_last_resume_flag_wins() {
        let args = parse(&["--no-resume", "--resume"]);
        assert!(args.resume);
        assert!(!args.no_resume);
    }

    #[test]
    fn test_discovery_flags() {
        let args = parse(&[
            "--all",
            "--language",
            "spanish",
            "--language",
            "French",
            "--id-length",
            "6",
            "--no-browser-fallback",
            "--page",
            "https://list.example/a",
        ]);
        let flags = args.mode_flags();
        assert!(flags.all && flags.has_languages);

        let mut config = Config::default();
        args.merge_into_config(&mut config).unwrap();
        assert_eq!(
            config.discovery.languages,
            vec![Language::Spanish, Language::French]
        );
        assert_eq!(config.discovery.id_length, Some(6));
        assert!(!config.discovery.browser_fallback);
        assert_eq!(config.discovery.pages, vec!["https://list.example/a"]);
    }

    #[test]
    fn test_json_hides_progress() {
        let args = parse(&["--json"]);
        let mut config = Config::default();
        args.merge_into_config(&mut config).unwrap();
        assert!(!config.options.show_progress);
    }

    #[test]
    fn test_rejects_bad_values() {
        let bad = |args: &[&str]| {
            Args::try_parse_from(std::iter::once("mloader").chain(args.iter().copied())).is_err()
        };
        assert!(bad(&["--format", "epub"]));
        assert!(bad(&["--id-length", "0"]));
        assert!(bad(&["--language", "klingon"]));
        assert!(bad(&["--auth", "novalue"]));
        assert!(bad(&["--title", "abc"]));
    }

    #[test]
    fn test_unknown_auth_key_is_config_error() {
        let args = parse(&["--auth", "token=x"]);
        let err = args.merge_into_config(&mut Config::default()).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::exit_codes::VALIDATION_ERROR);
    }

    #[test]
    fn test_verbosity_counts() {
        assert_eq!(parse(&["-vv"]).verbose, 2);
        assert_eq!(parse(&[]).verbose, 0);
    }
}
