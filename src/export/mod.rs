//! Chapter exporters.
//!
//! An [`Exporter`] receives the decoded page images of one chapter and turns
//! them into the configured output. Exporters are created per chapter by an
//! [`ExporterFactory`], so the download loop never names a concrete format.
//!
//! Chapter-level outputs (CBZ, PDF) are only written by [`Exporter::close`];
//! an exporter dropped before that discards whatever it buffered.

pub mod cbz;
pub mod pdf;
pub mod raw;

use std::path::{Path, PathBuf};

use crate::config::{Config, OutputFormat};
use crate::error::Result;
use crate::fs::{escape_path, fix_mojibake, title_directory, title_dir_name};
use crate::manga::{language_tag, ChapterSummary, PageIndex, TitleDetail};

pub use cbz::CbzExporter;
pub use pdf::PdfExporter;
pub use raw::RawExporter;

/// Per-chapter image sink.
pub trait Exporter: Send {
    /// Store the image occupying `index`.
    fn add_image(&mut self, data: &[u8], index: PageIndex) -> Result<()>;

    /// Whether the image for `index` is already present in the output.
    /// A skipped page keeps its slot; later pages are numbered as if it had
    /// been added.
    fn skip_image(&self, index: PageIndex) -> bool;

    /// Finalize the output and return its path. Fails if called twice.
    fn close(&mut self) -> Result<PathBuf>;
}

/// Creates the exporter for each chapter.
pub trait ExporterFactory: Send + Sync {
    fn create(&self, title: &TitleDetail, chapter: &ChapterSummary) -> Result<Box<dyn Exporter>>;

    /// Finished chapter-level output that makes downloading `chapter` unnecessary.
    fn existing_output(&self, title: &TitleDetail, chapter: &ChapterSummary) -> Option<PathBuf>;
}

/// File names shared by all formats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterNaming {
    prefix: String,
    suffix: String,
}

impl ChapterNaming {
    pub fn new(title: &TitleDetail, chapter: &ChapterSummary) -> Self {
        let prefix = format!(
            "{}{} - {}",
            title_dir_name(&title.name),
            language_tag(title.language),
            escape_path(&fix_mojibake(&chapter.name))
        );

        let subtitle = escape_path(&fix_mojibake(&chapter.sub_title));
        let suffix = if subtitle.is_empty() {
            "- Unknown".to_string()
        } else {
            format!("- {}", subtitle)
        };

        Self { prefix, suffix }
    }

    /// `"{Title}{lang} - {chapter} - {subtitle}"`, used for archives and subdirectories.
    pub fn chapter_name(&self) -> String {
        format!("{} {}", self.prefix, self.suffix)
    }

    /// `"{Title}{lang} - {chapter} - p001-002 - {subtitle}.jpg"` style page name.
    pub fn page_name(&self, index: PageIndex, ext: &str) -> String {
        format!(
            "{} - {} {}.{}",
            self.prefix,
            index,
            self.suffix,
            ext.trim_start_matches('.')
        )
    }
}

/// Everything an exporter needs to know about its chapter.
#[derive(Debug, Clone)]
pub struct ChapterOutput {
    pub naming: ChapterNaming,
    pub title_dir: PathBuf,
    pub series: String,
    pub number: String,
    pub document_title: String,
    pub writer: String,
    pub language_iso: String,
}

impl ChapterOutput {
    pub fn new(
        out_dir: &Path,
        title: &TitleDetail,
        chapter: &ChapterSummary,
        use_subtitle_as_title: bool,
    ) -> Result<Self> {
        let naming = ChapterNaming::new(title, chapter);
        let document_title = if use_subtitle_as_title && !chapter.sub_title.trim().is_empty() {
            fix_mojibake(&chapter.sub_title)
        } else {
            naming.chapter_name()
        };

        Ok(Self {
            title_dir: title_directory(out_dir, &title.name)?,
            series: fix_mojibake(&title.name),
            number: chapter
                .number()
                .map(|n| n.to_string())
                .unwrap_or_else(|| chapter.name.trim_start_matches('#').to_string()),
            document_title,
            writer: fix_mojibake(&title.author),
            language_iso: title
                .language()
                .map(|l| l.iso_code().to_string())
                .unwrap_or_default(),
            naming,
        })
    }

    /// Path of a chapter-level output with extension `ext`.
    pub fn chapter_file(&self, ext: &str) -> PathBuf {
        self.title_dir
            .join(format!("{}.{}", self.naming.chapter_name(), ext))
    }
}

/// Builds exporters for the configured [`OutputFormat`].
#[derive(Debug, Clone)]
pub struct FormatExporterFactory {
    pub format: OutputFormat,
    pub out_dir: PathBuf,
    pub chapter_title: bool,
    pub chapter_subdir: bool,
}

impl FormatExporterFactory {
    pub fn from_config(config: &Config) -> Self {
        Self {
            format: config.options.format,
            out_dir: config.options.out_dir.clone(),
            chapter_title: config.options.chapter_title,
            chapter_subdir: config.options.chapter_subdir,
        }
    }

    fn output(&self, title: &TitleDetail, chapter: &ChapterSummary) -> Result<ChapterOutput> {
        ChapterOutput::new(&self.out_dir, title, chapter, self.chapter_title)
    }
}

impl ExporterFactory for FormatExporterFactory {
    fn create(&self, title: &TitleDetail, chapter: &ChapterSummary) -> Result<Box<dyn Exporter>> {
        let output = self.output(title, chapter)?;
        Ok(match self.format {
            OutputFormat::Raw => Box::new(RawExporter::new(output, self.chapter_subdir)?),
            OutputFormat::Cbz => Box::new(CbzExporter::new(output)?),
            OutputFormat::Pdf => Box::new(PdfExporter::new(output)?),
        })
    }

    fn existing_output(&self, title: &TitleDetail, chapter: &ChapterSummary) -> Option<PathBuf> {
        let ext = self.format.chapter_extension()?;
        let path = self.output(title, chapter).ok()?.chapter_file(ext);
        path.is_file().then_some(path)
    }
}

/// Escape text for inclusion in XML element content.
pub(crate) fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}
