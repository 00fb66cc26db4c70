//! Recording of raw API payloads for fixtures and schema checks.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::LazyLock;

use chrono::{SecondsFormat, Utc};
use prost::Message;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::api::types::Response;
use crate::error::Result;

const REDACTED: &str = "***REDACTED***";
const SENSITIVE_KEYS: [&str; 6] = ["secret", "authorization", "auth", "token", "cookie", "session"];

static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9_.-]+").expect("valid regex"));

/// Sidecar metadata written next to every captured payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureMetadata {
    pub captured_at_utc: String,
    pub endpoint: String,
    pub identifier: String,
    pub url: String,
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub http_status: Option<u16>,
    pub payload_sha256: String,
    pub payload_size_bytes: usize,
    pub raw_payload_file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed_payload_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed_payload_error: Option<String>,
    /// Set when the call itself failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Request description handed to [`PayloadCapture::record`].
#[derive(Debug, Clone, Copy)]
pub struct CapturedCall<'a> {
    pub endpoint: &'a str,
    pub identifier: &'a str,
    pub url: &'a str,
    pub params: &'a [(&'a str, &'a str)],
}

/// Append-only writer of capture file sets.
#[derive(Debug)]
pub struct PayloadCapture {
    dir: PathBuf,
    sequence: AtomicUsize,
}

impl PayloadCapture {
    /// Open (and create) a capture directory. Numbering continues after any
    /// records already present.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let existing = fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".meta.json"))
            .count();

        Ok(Self {
            dir,
            sequence: AtomicUsize::new(existing),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write one `.pb` / `.meta.json` / `.response.json` set. Returns the metadata path.
    pub fn record(
        &self,
        call: CapturedCall<'_>,
        http_status: Option<u16>,
        payload: &[u8],
        error: Option<&str>,
    ) -> Result<PathBuf> {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let stem = format!(
            "{:04}_{}_{}",
            seq,
            sanitize_capture_component(call.endpoint),
            sanitize_capture_component(call.identifier)
        );

        let raw_name = format!("{}.pb", stem);
        fs::write(self.dir.join(&raw_name), payload)?;

        let (parsed_payload_file, parsed_payload_error) = match Response::decode(payload) {
            Ok(response) if !payload.is_empty() => {
                let parsed_name = format!("{}.response.json", stem);
                let json = serde_json::to_vec_pretty(&response)?;
                fs::write(self.dir.join(&parsed_name), json)?;
                (Some(parsed_name), None)
            }
            Ok(_) => (None, Some("empty payload".to_string())),
            Err(e) => (None, Some(e.to_string())),
        };

        let metadata = CaptureMetadata {
            captured_at_utc: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            endpoint: call.endpoint.to_string(),
            identifier: call.identifier.to_string(),
            url: call.url.to_string(),
            params: redact_params(call.params),
            http_status,
            payload_sha256: hex::encode(Sha256::digest(payload)),
            payload_size_bytes: payload.len(),
            raw_payload_file: raw_name,
            parsed_payload_file,
            parsed_payload_error,
            error: error.map(str::to_string),
        };

        let meta_path = self.dir.join(format!("{}.meta.json", stem));
        fs::write(&meta_path, serde_json::to_vec_pretty(&metadata)?)?;
        tracing::debug!("Captured {} payload to {}", call.endpoint, meta_path.display());
        Ok(meta_path)
    }
}

/// Sorted request parameters with credentials masked.
pub fn redact_params(params: &[(&str, &str)]) -> BTreeMap<String, String> {
    params
        .iter()
        .map(|(key, value)| {
            let lower = key.to_lowercase();
            let value = if SENSITIVE_KEYS.contains(&lower.as_str()) {
                REDACTED.to_string()
            } else {
                value.to_string()
            };
            (key.to_string(), value)
        })
        .collect()
}

/// Make an endpoint or identifier safe for use in a capture file name.
pub fn sanitize_capture_component(value: &str) -> String {
    let replaced = UNSAFE_CHARS.replace_all(value, "_");
    let trimmed = replaced.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        "capture".to_string()
    } else {
        trimmed.to_string()
    }
}
