//! Loose image files.

use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::export::{ChapterOutput, Exporter};
use crate::fs::{ensure_dir, write_atomic};
use crate::manga::PageIndex;

/// Writes every page straight into the title directory, or into a
/// per-chapter subdirectory.
///
/// Pages already on disk are skipped, so an interrupted chapter resumes
/// where it stopped.
pub struct RawExporter {
    output: ChapterOutput,
    dir: PathBuf,
    closed: bool,
}

impl RawExporter {
    pub fn new(output: ChapterOutput, chapter_subdir: bool) -> Result<Self> {
        let dir = if chapter_subdir {
            output.title_dir.join(output.naming.chapter_name())
        } else {
            output.title_dir.clone()
        };
        ensure_dir(&dir)?;

        Ok(Self {
            output,
            dir,
            closed: false,
        })
    }

    fn page_path(&self, index: PageIndex) -> PathBuf {
        self.dir.join(self.output.naming.page_name(index, "jpg"))
    }
}

impl Exporter for RawExporter {
    fn add_image(&mut self, data: &[u8], index: PageIndex) -> Result<()> {
        let path = self.page_path(index);
        write_atomic(&path, data)?;
        tracing::trace!("Wrote {}", path.display());
        Ok(())
    }

    fn skip_image(&self, index: PageIndex) -> bool {
        self.page_path(index).is_file()
    }

    fn close(&mut self) -> Result<PathBuf> {
        if self.closed {
            return Err(Error::Internal("Exporter closed twice".to_string()));
        }
        self.closed = true;
        Ok(self.dir.clone())
    }
}
