//! Run statistics reporting, as text or as one JSON document.

use console::style;
use serde::Serialize;

use crate::api::CaptureVerificationSummary;
use crate::discovery::Discovery;
use crate::download::{RunOutcome, RunSummary, TitleFailure};
use crate::error::{exit_codes, Result};
use crate::manga::WorkUnit;

/// Which command produced a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Download,
    ListOnly,
    VerifyCapture,
}

/// Requested work, split by kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReportTargets {
    pub titles: Vec<u32>,
    pub chapters: Vec<u32>,
}

impl ReportTargets {
    pub fn from_units(units: &[WorkUnit]) -> Self {
        let mut targets = Self::default();
        for unit in units {
            match *unit {
                WorkUnit::Title(id) => targets.titles.push(id),
                WorkUnit::Chapter(id) => targets.chapters.push(id),
            }
        }
        targets
    }
}

/// Machine-readable outcome of one invocation.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub status: &'static str,
    pub mode: RunMode,
    pub exit_code: i32,
    pub targets: ReportTargets,
    pub discovery: Option<Discovery>,
    pub summary: Option<RunSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<CaptureVerificationSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub title_failures: Vec<TitleFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunReport {
    pub fn new(mode: RunMode, targets: ReportTargets) -> Self {
        Self {
            status: "ok",
            mode,
            exit_code: exit_codes::SUCCESS,
            targets,
            discovery: None,
            summary: None,
            verification: None,
            title_failures: Vec::new(),
            error: None,
        }
    }

    pub fn record_discovery(&mut self, discovery: Discovery) {
        self.discovery = Some(discovery);
    }

    pub fn record_verification(&mut self, verification: CaptureVerificationSummary) {
        self.verification = Some(verification);
    }

    /// Take over the counters of a download run and its failures, if any.
    pub fn record_outcome(&mut self, outcome: &RunOutcome) {
        self.summary = Some(outcome.summary.clone());
        self.title_failures = outcome.title_failures.clone();
        if let Some(message) = outcome.error_message() {
            self.fail(outcome.exit_code(), message);
        }
    }

    pub fn fail(&mut self, exit_code: i32, message: impl Into<String>) {
        self.status = "error";
        self.exit_code = exit_code;
        self.error = Some(message.into());
    }
}

/// Print the report as a single JSON document on stdout.
pub fn print_json_report(report: &RunReport) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

/// One-line counters of a run.
pub fn summary_line(summary: &RunSummary) -> String {
    format!(
        "Download summary: downloaded={}, skipped_manifest={}, skipped_existing={}, failed={}",
        summary.downloaded, summary.skipped_manifest, summary.skipped_existing, summary.failed
    )
}

/// Print the human-readable end-of-run summary.
pub fn print_summary(outcome: &RunOutcome) {
    let summary = &outcome.summary;

    println!();
    println!("{}", style("═".repeat(50)).dim());
    println!("{}", summary_line(summary));
    if !summary.failed_chapter_ids.is_empty() {
        let ids: Vec<String> = summary
            .failed_chapter_ids
            .iter()
            .map(|id| id.to_string())
            .collect();
        println!("  Failed chapter ids: {}", style(ids.join(", ")).red());
    }
    for failure in &outcome.title_failures {
        println!(
            "  Title {} failed ({}): {}",
            failure.title_id,
            failure.kind,
            style(&failure.message).red()
        );
    }
    if outcome.interrupted {
        println!("  {}", style("Interrupted before all chapters were processed").yellow());
    }
    println!("{}", style("═".repeat(50)).dim());
}
