//! CBZ archive exporter.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;

use tempfile::NamedTempFile;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{Error, Result};
use crate::export::{xml_escape, ChapterOutput, Exporter};
use crate::fs::ensure_dir;
use crate::manga::PageIndex;

/// Buffers a chapter's pages and writes them as one zip archive on close.
///
/// When the archive already exists every page is skipped and close leaves
/// the file untouched.
pub struct CbzExporter {
    output: ChapterOutput,
    path: PathBuf,
    skip_all: bool,
    pages: BTreeMap<usize, (PageIndex, Vec<u8>)>,
    closed: bool,
}

impl CbzExporter {
    pub fn new(output: ChapterOutput) -> Result<Self> {
        ensure_dir(&output.title_dir)?;
        let path = output.chapter_file("cbz");
        let skip_all = path.exists();

        Ok(Self {
            output,
            path,
            skip_all,
            pages: BTreeMap::new(),
            closed: false,
        })
    }

    fn comic_info(&self) -> String {
        format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<ComicInfo>
    <Series>{}</Series>
    <Number>{}</Number>
    <Title>{}</Title>
    <Writer>{}</Writer>
    <LanguageISO>{}</LanguageISO>
    <Manga>YesAndRightToLeft</Manga>
    <Publisher>Shueisha</Publisher>
    <Genre>Manga</Genre>
</ComicInfo>
"#,
            xml_escape(&self.output.series),
            xml_escape(&self.output.number),
            xml_escape(&self.output.document_title),
            xml_escape(&self.output.writer),
            xml_escape(&self.output.language_iso),
        )
    }

    fn write_archive(&self) -> Result<()> {
        let chapter_dir = self.output.naming.chapter_name();
        let options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        let tmp = NamedTempFile::new_in(&self.output.title_dir)?;
        let mut zip = ZipWriter::new(tmp);

        for (index, data) in self.pages.values() {
            let name = format!(
                "{}/{}",
                chapter_dir,
                self.output.naming.page_name(*index, "jpg")
            );
            zip.start_file(name, options)?;
            zip.write_all(data)?;
        }

        zip.start_file(format!("{}/ComicInfo.xml", chapter_dir), options)?;
        zip.write_all(self.comic_info().as_bytes())?;

        let tmp = zip.finish()?;
        tmp.persist(&self.path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }
}

impl Exporter for CbzExporter {
    fn add_image(&mut self, data: &[u8], index: PageIndex) -> Result<()> {
        if !self.skip_all {
            self.pages.insert(index.start(), (index, data.to_vec()));
        }
        Ok(())
    }

    fn skip_image(&self, _index: PageIndex) -> bool {
        self.skip_all
    }

    fn close(&mut self) -> Result<PathBuf> {
        if self.closed {
            return Err(Error::Internal("Exporter closed twice".to_string()));
        }
        self.closed = true;

        if !self.skip_all {
            self.write_archive()?;
            tracing::debug!(
                "Wrote {} page(s) to {}",
                self.pages.len(),
                self.path.display()
            );
            self.pages.clear();
        }
        Ok(self.path.clone())
    }
}

impl Drop for CbzExporter {
    fn drop(&mut self) {
        if !self.closed && !self.pages.is_empty() {
            tracing::debug!(
                "Discarding {} buffered page(s) for {}",
                self.pages.len(),
                self.path.display()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::tests::{sample_chapter, sample_title};
    use std::io::Read;
    use tempfile::TempDir;

    fn exporter(dir: &TempDir) -> CbzExporter {
        let output =
            ChapterOutput::new(dir.path(), &sample_title(0), &sample_chapter(), false).unwrap();
        CbzExporter::new(output).unwrap()
    }

    #[test]
    fn test_archive_entries_in_page_order() {
        let dir = TempDir::new().unwrap();
        let mut cbz = exporter(&dir);
        cbz.add_image(b"third", PageIndex::Single(3)).unwrap();
        cbz.add_image(b"first", PageIndex::Single(0)).unwrap();
        cbz.add_image(b"spread", PageIndex::Spread { start: 1, stop: 2 })
            .unwrap();
        let path = cbz.close().unwrap();

        let mut archive = zip::ZipArchive::new(std::fs::File::open(&path).unwrap()).unwrap();
        let names: Vec<String> = archive.file_names().map(String::from).collect();
        assert_eq!(names.len(), 4);

        let prefix = "The Elusive Samurai - 012 - Chapter 12 Night Raid/";
        assert_eq!(
            names[0],
            format!(
                "{}The Elusive Samurai - 012 - p000 - Chapter 12 Night Raid.jpg",
                prefix
            )
        );
        assert!(names[1].contains("p001-002"));
        assert!(names[2].contains("p003"));
        assert_eq!(names[3], format!("{}ComicInfo.xml", prefix));

        let mut info = String::new();
        archive
            .by_name(&names[3])
            .unwrap()
            .read_to_string(&mut info)
            .unwrap();
        assert!(info.contains("<Series>the elusive samurai</Series>"));
        assert!(info.contains("<Number>12</Number>"));
        assert!(info.contains("<LanguageISO>en</LanguageISO>"));
        assert!(info.contains("<Manga>YesAndRightToLeft</Manga>"));
    }

    #[test]
    fn test_existing_archive_skips_everything() {
        let dir = TempDir::new().unwrap();
        let path = dir
            .path()
            .join("The Elusive Samurai")
            .join("The Elusive Samurai - 012 - Chapter 12 Night Raid.cbz");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"existing").unwrap();

        let mut cbz = exporter(&dir);
        assert!(cbz.skip_image(PageIndex::Single(0)));
        cbz.add_image(b"page", PageIndex::Single(0)).unwrap();
        assert_eq!(cbz.close().unwrap(), path);
        assert_eq!(std::fs::read(&path).unwrap(), b"existing");
    }

    #[test]
    fn test_dropped_exporter_writes_nothing() {
        let dir = TempDir::new().unwrap();
        {
            let mut cbz = exporter(&dir);
            cbz.add_image(b"page", PageIndex::Single(0)).unwrap();
        }
        let title_dir = dir.path().join("The Elusive Samurai");
        assert_eq!(std::fs::read_dir(title_dir).unwrap().count(), 0);
    }

    #[test]
    fn test_close_twice_fails() {
        let dir = TempDir::new().unwrap();
        let mut cbz = exporter(&dir);
        cbz.close().unwrap();
        assert!(cbz.close().is_err());
    }
}
