//! Path and directory management.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::fs::naming::{sanitize_path_component, title_dir_name};

/// Output directory of one title below `out_dir`.
pub fn title_directory(out_dir: &Path, title_name: &str) -> Result<PathBuf> {
    let name = sanitize_path_component(&title_dir_name(title_name))?;
    Ok(out_dir.join(name))
}

/// Unique hidden sibling path used while `path` is being written.
fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp.{}", name, uuid::Uuid::new_v4().simple()))
}

/// Replace `path` with `data` through a temp file and rename, so readers see
/// either the old or the new content.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let tmp = temp_sibling(path);
    std::fs::write(&tmp, data)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

/// Ensure a directory exists, creating it if necessary.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}
