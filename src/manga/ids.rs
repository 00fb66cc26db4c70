//! Normalization of user-supplied URLs and ids into work units.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;
use url::Url;

use crate::config::validation::validate_id;
use crate::error::{Error, Result};

/// Hosts accepted in absolute URLs.
pub const ALLOWED_HOSTS: [&str; 2] = ["mangaplus.shueisha.co.jp", "www.mangaplus.shueisha.co.jp"];

/// One unit of requested work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum WorkUnit {
    Title(u32),
    Chapter(u32),
}

impl WorkUnit {
    pub fn id(&self) -> u32 {
        match *self {
            WorkUnit::Title(id) | WorkUnit::Chapter(id) => id,
        }
    }
}

impl fmt::Display for WorkUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkUnit::Title(id) => write!(f, "title {}", id),
            WorkUnit::Chapter(id) => write!(f, "chapter {}", id),
        }
    }
}

/// Parse a `titles/<id>` or `viewer/<id>` URL or relative path.
pub fn parse_target(input: &str) -> Result<WorkUnit> {
    let trimmed = input.trim();
    let invalid = |reason: &str| Error::Validation {
        field: "url".to_string(),
        message: format!("{}: {}", reason, input),
    };

    let url = if trimmed.contains("://") {
        let url = Url::parse(trimmed).map_err(|_| invalid("Invalid url"))?;
        match url.host_str() {
            Some(host) if ALLOWED_HOSTS.contains(&host) => url,
            _ => return Err(invalid("Invalid url host")),
        }
    } else {
        let base = Url::parse("https://mangaplus.shueisha.co.jp/")?;
        base.join(trimmed.trim_start_matches('/'))
            .map_err(|_| invalid("Invalid url"))?
    };

    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    let (kind, id) = match segments.as_slice() {
        [kind, id] if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) => (*kind, *id),
        _ => return Err(invalid("Invalid url")),
    };

    let id: u32 = id.parse().map_err(|_| invalid("Id out of range in url"))?;
    match kind {
        "titles" => Ok(WorkUnit::Title(validate_id("title", id)?)),
        "viewer" => Ok(WorkUnit::Chapter(validate_id("chapter", id)?)),
        _ => Err(invalid("Invalid url")),
    }
}

/// Build the deduplicated work plan from positional inputs and `--title`/`--chapter` ids.
///
/// Positional inputs come first, then titles, then chapters; the first
/// occurrence of a unit fixes its position. A bare number among the
/// positional inputs is accepted only when exactly one of the id flags also
/// names it. Every invalid input is reported at once.
pub fn normalize_targets(
    inputs: &[String],
    title_ids: &[u32],
    chapter_ids: &[u32],
) -> Result<Vec<WorkUnit>> {
    let mut units = Vec::new();
    let mut problems = Vec::new();

    for input in inputs {
        let trimmed = input.trim();
        if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
            match resolve_bare_id(trimmed, title_ids, chapter_ids) {
                Ok(unit) => units.push(unit),
                Err(message) => problems.push(message),
            }
            continue;
        }

        match parse_target(trimmed) {
            Ok(unit) => units.push(unit),
            Err(e) => problems.push(e.to_string()),
        }
    }

    for &id in title_ids {
        match validate_id("title", id) {
            Ok(id) => units.push(WorkUnit::Title(id)),
            Err(e) => problems.push(e.to_string()),
        }
    }

    for &id in chapter_ids {
        match validate_id("chapter", id) {
            Ok(id) => units.push(WorkUnit::Chapter(id)),
            Err(e) => problems.push(e.to_string()),
        }
    }

    if !problems.is_empty() {
        return Err(Error::InvalidInputs(problems));
    }

    let mut seen = HashSet::new();
    units.retain(|unit| seen.insert(*unit));
    Ok(units)
}

fn resolve_bare_id(
    raw: &str,
    title_ids: &[u32],
    chapter_ids: &[u32],
) -> std::result::Result<WorkUnit, String> {
    let id: u32 = raw
        .parse()
        .map_err(|_| format!("'{}' is not a valid id", raw))?;

    match (title_ids.contains(&id), chapter_ids.contains(&id)) {
        (true, false) => Ok(WorkUnit::Title(id)),
        (false, true) => Ok(WorkUnit::Chapter(id)),
        _ => Err(format!(
            "'{}' is ambiguous; pass it with --title or --chapter, or as a titles/ or viewer/ url",
            raw
        )),
    }
}
