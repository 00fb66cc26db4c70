//! Verification of a capture directory against the response schema and an
//! optional baseline capture.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use prost::Message;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::api::capture::CaptureMetadata;
use crate::api::client::{TITLE_DETAIL_ENDPOINT, TITLE_LIST_ENDPOINT, VIEWER_ENDPOINT};
use crate::api::types::{Response, SuccessResult};
use crate::error::{Error, Result};

/// Outcome of a successful verification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CaptureVerificationSummary {
    pub total_records: usize,
    pub endpoint_counts: BTreeMap<String, usize>,
    /// Records of failed calls, which carry no payload to check.
    pub skipped_failed_calls: usize,
}

/// Shape of one endpoint's captured traffic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct EndpointSignature {
    param_keys: BTreeSet<String>,
    response_paths: BTreeSet<String>,
}

struct VerifiedRecord {
    endpoint: String,
    param_keys: BTreeSet<String>,
    response_paths: BTreeSet<String>,
}

/// Check every record in `dir`.
pub fn verify_capture_schema(dir: &Path) -> Result<CaptureVerificationSummary> {
    let (summary, _) = verify_directory(dir)?;
    Ok(summary)
}

/// Check every record in `dir`, then compare its per-endpoint signatures with
/// those of `baseline`.
pub fn verify_capture_schema_against_baseline(
    dir: &Path,
    baseline: &Path,
) -> Result<CaptureVerificationSummary> {
    let (summary, signatures) = verify_directory(dir)?;
    let (_, baseline_signatures) = verify_directory(baseline)?;

    let mut problems = Vec::new();
    for (endpoint, signature) in &signatures {
        let Some(expected) = baseline_signatures.get(endpoint) else {
            problems.push(format!("Unknown endpoint '{}' not present in baseline", endpoint));
            continue;
        };
        if signature != expected {
            problems.push(describe_drift(endpoint, expected, signature));
        }
    }

    if !problems.is_empty() {
        return Err(Error::CaptureVerification(problems.join("; ")));
    }
    Ok(summary)
}

fn describe_drift(endpoint: &str, expected: &EndpointSignature, actual: &EndpointSignature) -> String {
    let diff = |a: &BTreeSet<String>, b: &BTreeSet<String>| -> Vec<String> {
        a.difference(b).cloned().collect()
    };
    format!(
        "Schema drift detected for endpoint '{}': missing params {:?}, unexpected params {:?}, missing fields {:?}, unexpected fields {:?}",
        endpoint,
        diff(&expected.param_keys, &actual.param_keys),
        diff(&actual.param_keys, &expected.param_keys),
        diff(&expected.response_paths, &actual.response_paths),
        diff(&actual.response_paths, &expected.response_paths),
    )
}

fn verify_directory(
    dir: &Path,
) -> Result<(CaptureVerificationSummary, BTreeMap<String, EndpointSignature>)> {
    if !dir.is_dir() {
        return Err(Error::CaptureVerification(format!(
            "Capture directory not found: {}",
            dir.display()
        )));
    }

    let mut meta_files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .map(|n| n.to_string_lossy().ends_with(".meta.json"))
                .unwrap_or(false)
        })
        .collect();
    meta_files.sort();

    if meta_files.is_empty() {
        return Err(Error::CaptureVerification(format!(
            "No '*.meta.json' files found in {}",
            dir.display()
        )));
    }

    let mut summary = CaptureVerificationSummary::default();
    let mut signatures: BTreeMap<String, EndpointSignature> = BTreeMap::new();
    let mut problems = Vec::new();

    for meta_path in &meta_files {
        let name = meta_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        match verify_record(dir, meta_path) {
            Ok(Some(record)) => {
                summary.total_records += 1;
                *summary
                    .endpoint_counts
                    .entry(record.endpoint.clone())
                    .or_default() += 1;
                let signature = signatures.entry(record.endpoint).or_default();
                signature.param_keys.extend(record.param_keys);
                signature.response_paths.extend(record.response_paths);
            }
            Ok(None) => summary.skipped_failed_calls += 1,
            Err(message) => problems.push(format!("{}: {}", name, message)),
        }
    }

    if !problems.is_empty() {
        return Err(Error::CaptureVerification(problems.join("; ")));
    }

    Ok((summary, signatures))
}

fn verify_record(dir: &Path, meta_path: &Path) -> std::result::Result<Option<VerifiedRecord>, String> {
    let raw_meta = fs::read(meta_path).map_err(|e| format!("Unreadable metadata: {}", e))?;
    let metadata: CaptureMetadata =
        serde_json::from_slice(&raw_meta).map_err(|e| format!("Invalid metadata: {}", e))?;

    if metadata.error.is_some() {
        return Ok(None);
    }

    if metadata.endpoint.trim().is_empty() {
        return Err("Missing endpoint".to_string());
    }

    let payload_path = dir.join(&metadata.raw_payload_file);
    let payload = fs::read(&payload_path)
        .map_err(|_| format!("Missing raw payload file {}", metadata.raw_payload_file))?;

    if payload.len() != metadata.payload_size_bytes {
        return Err(format!(
            "Payload size mismatch (expected {}, found {})",
            metadata.payload_size_bytes,
            payload.len()
        ));
    }

    if hex::encode(Sha256::digest(&payload)) != metadata.payload_sha256 {
        return Err("Payload sha256 mismatch".to_string());
    }

    let response =
        Response::decode(payload.as_slice()).map_err(|e| format!("Undecodable payload: {}", e))?;
    let success = response
        .success
        .as_ref()
        .ok_or_else(|| "Missing success envelope".to_string())?;

    match metadata.endpoint.as_str() {
        TITLE_DETAIL_ENDPOINT => check_title_detail(success)?,
        VIEWER_ENDPOINT => check_viewer(success)?,
        TITLE_LIST_ENDPOINT => check_title_list(success)?,
        other => return Err(format!("Unsupported endpoint '{}'", other)),
    }

    let json = serde_json::to_value(&response).map_err(|e| e.to_string())?;
    let mut response_paths = BTreeSet::new();
    collect_paths(&json, "", &mut response_paths);

    Ok(Some(VerifiedRecord {
        endpoint: metadata.endpoint,
        param_keys: metadata.params.into_keys().collect(),
        response_paths,
    }))
}

fn check_title_detail(success: &SuccessResult) -> std::result::Result<(), String> {
    let view = success
        .title_detail_view
        .as_ref()
        .ok_or("Missing title_detail_view")?;
    let title = view.title.as_ref().ok_or("Missing title")?;
    if title.title_id == 0 || title.name.is_empty() {
        return Err("Title id or name missing".to_string());
    }
    let has_chapters = view.chapter_list_group.iter().any(|g| {
        !g.first_chapter_list.is_empty()
            || !g.mid_chapter_list.is_empty()
            || !g.last_chapter_list.is_empty()
    });
    if !has_chapters {
        return Err("Title has no chapters".to_string());
    }
    Ok(())
}

fn check_viewer(success: &SuccessResult) -> std::result::Result<(), String> {
    let viewer = success.manga_viewer.as_ref().ok_or("Missing manga_viewer")?;
    if viewer.title_id == 0 || viewer.chapter_id == 0 {
        return Err("Viewer title_id or chapter_id missing".to_string());
    }
    let has_image = viewer
        .pages
        .iter()
        .filter_map(|p| p.manga_page.as_ref())
        .any(|p| !p.image_url.is_empty());
    if !has_image {
        return Err("Viewer has no page with an image url".to_string());
    }
    let has_last_page = viewer
        .pages
        .iter()
        .filter_map(|p| p.last_page.as_ref())
        .any(|lp| lp.current_chapter.is_some());
    if !has_last_page {
        return Err("Viewer is missing last_page.current_chapter".to_string());
    }
    Ok(())
}

fn check_title_list(success: &SuccessResult) -> std::result::Result<(), String> {
    let view = success.all_titles_view.as_ref().ok_or("Missing all_titles_view")?;
    if view.title_groups.iter().all(|g| g.titles.is_empty()) {
        return Err("Title list is empty".to_string());
    }
    Ok(())
}

/// Collect dotted key paths; array elements contribute `[]`.
fn collect_paths(value: &Value, prefix: &str, out: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                out.insert(path.clone());
                collect_paths(child, &path, out);
            }
        }
        Value::Array(items) => {
            let path = format!("{}[]", prefix);
            for item in items {
                collect_paths(item, &path, out);
            }
        }
        _ => {}
    }
}
