//! PDF exporter.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::PathBuf;

use image::codecs::jpeg::JpegDecoder;
use image::{DynamicImage, ExtendedColorType, ImageDecoder, ImageFormat};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use tempfile::NamedTempFile;

use crate::error::{Error, Result};
use crate::export::{ChapterOutput, Exporter};
use crate::fs::ensure_dir;
use crate::manga::PageIndex;

/// Rendering resolution: one image pixel is 1/100 inch.
const DPI: f32 = 100.0;

/// JPEG data ready to be embedded as an image XObject.
struct EmbeddedImage {
    jpeg: Vec<u8>,
    width: u32,
    height: u32,
    color_space: &'static str,
}

/// PDF color space for JPEG data stored with `original` components, if the
/// bytes can be embedded without conversion.
fn direct_color_space(original: ExtendedColorType) -> Option<&'static str> {
    match original {
        ExtendedColorType::Rgb8 => Some("DeviceRGB"),
        ExtendedColorType::L8 => Some("DeviceGray"),
        _ => None,
    }
}

/// Embed JPEGs as they are when the PDF can use them directly, re-encode
/// everything else as RGB JPEG.
fn prepare_image(data: &[u8]) -> Result<EmbeddedImage> {
    let format = image::guess_format(data)?;
    let img = image::load_from_memory_with_format(data, format)?;
    let (width, height) = (img.width(), img.height());

    // The decoder converts CMYK to RGB; the stored components decide.
    let direct = if format == ImageFormat::Jpeg {
        let decoder = JpegDecoder::new(Cursor::new(data))?;
        direct_color_space(decoder.original_color_type())
    } else {
        None
    };
    if let Some(color_space) = direct {
        return Ok(EmbeddedImage {
            jpeg: data.to_vec(),
            width,
            height,
            color_space,
        });
    }

    let mut jpeg = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img.to_rgb8()).write_to(&mut jpeg, ImageFormat::Jpeg)?;
    Ok(EmbeddedImage {
        jpeg: jpeg.into_inner(),
        width,
        height,
        color_space: "DeviceRGB",
    })
}

/// Collects a chapter's pages and renders them into one PDF on close,
/// one page per image.
pub struct PdfExporter {
    output: ChapterOutput,
    path: PathBuf,
    skip_all: bool,
    pages: BTreeMap<usize, Vec<u8>>,
    closed: bool,
}

impl PdfExporter {
    pub fn new(output: ChapterOutput) -> Result<Self> {
        ensure_dir(&output.title_dir)?;
        let path = output.chapter_file("pdf");
        let skip_all = path.exists();

        Ok(Self {
            output,
            path,
            skip_all,
            pages: BTreeMap::new(),
            closed: false,
        })
    }

    fn build_document(&self) -> Result<Document> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut kids: Vec<Object> = Vec::with_capacity(self.pages.len());

        for data in self.pages.values() {
            let image = prepare_image(data)?;
            let width = image.width as f32 * 72.0 / DPI;
            let height = image.height as f32 * 72.0 / DPI;

            let image_id = doc.add_object(
                Stream::new(
                    dictionary! {
                        "Type" => "XObject",
                        "Subtype" => "Image",
                        "Width" => image.width as i64,
                        "Height" => image.height as i64,
                        "ColorSpace" => image.color_space,
                        "BitsPerComponent" => 8,
                        "Filter" => "DCTDecode",
                    },
                    image.jpeg,
                )
                .with_compression(false),
            );

            let content = Content {
                operations: vec![
                    Operation::new("q", vec![]),
                    Operation::new(
                        "cm",
                        vec![
                            width.into(),
                            0.into(),
                            0.into(),
                            height.into(),
                            0.into(),
                            0.into(),
                        ],
                    ),
                    Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                    Operation::new("Q", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
                "Contents" => content_id,
                "Resources" => dictionary! {
                    "XObject" => dictionary! { "Im0" => image_id },
                },
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        let producer = format!("mloader - {}", env!("CARGO_PKG_VERSION"));
        let info_id = doc.add_object(dictionary! {
            "Title" => Object::string_literal(self.output.document_title.as_str()),
            "Author" => Object::string_literal(self.output.writer.as_str()),
            "Producer" => Object::string_literal(producer.as_str()),
            "Creator" => Object::string_literal(producer.as_str()),
        });
        doc.trailer.set("Root", catalog_id);
        doc.trailer.set("Info", info_id);

        Ok(doc)
    }

    fn write_document(&self) -> Result<()> {
        if self.pages.is_empty() {
            return Err(Error::Export(format!(
                "No pages to write to {}",
                self.path.display()
            )));
        }

        let mut doc = self.build_document()?;
        let mut tmp = NamedTempFile::new_in(&self.output.title_dir)?;
        doc.save_to(&mut tmp)?;
        tmp.persist(&self.path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }
}

impl Exporter for PdfExporter {
    fn add_image(&mut self, data: &[u8], index: PageIndex) -> Result<()> {
        if !self.skip_all {
            self.pages.insert(index.start(), data.to_vec());
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
            self.write_document()?;
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

impl Drop for PdfExporter {
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
    use image::{Rgb, RgbImage, RgbaImage};
    use tempfile::TempDir;

    fn encoded(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, format).unwrap();
        buf.into_inner()
    }

    fn exporter(dir: &TempDir) -> PdfExporter {
        let output =
            ChapterOutput::new(dir.path(), &sample_title(0), &sample_chapter(), true).unwrap();
        PdfExporter::new(output).unwrap()
    }

    #[test]
    fn test_rgb_jpeg_is_embedded_unchanged() {
        let jpeg = encoded(
            DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 4, Rgb([200, 10, 10]))),
            ImageFormat::Jpeg,
        );
        let prepared = prepare_image(&jpeg).unwrap();
        assert_eq!(prepared.jpeg, jpeg);
        assert_eq!((prepared.width, prepared.height), (8, 4));
        assert_eq!(prepared.color_space, "DeviceRGB");
    }

    #[test]
    fn test_only_rgb_and_gray_jpegs_embed_directly() {
        assert_eq!(direct_color_space(ExtendedColorType::Rgb8), Some("DeviceRGB"));
        assert_eq!(direct_color_space(ExtendedColorType::L8), Some("DeviceGray"));
        assert_eq!(direct_color_space(ExtendedColorType::Cmyk8), None);
        assert_eq!(direct_color_space(ExtendedColorType::Rgba8), None);
    }

    #[test]
    fn test_gray_jpeg_is_embedded_as_gray() {
        let jpeg = encoded(
            DynamicImage::ImageLuma8(image::GrayImage::new(4, 4)),
            ImageFormat::Jpeg,
        );
        let prepared = prepare_image(&jpeg).unwrap();
        assert_eq!(prepared.jpeg, jpeg);
        assert_eq!(prepared.color_space, "DeviceGray");
    }

    #[test]
    fn test_png_is_reencoded() {
        let png = encoded(
            DynamicImage::ImageRgba8(RgbaImage::new(3, 5)),
            ImageFormat::Png,
        );
        let prepared = prepare_image(&png).unwrap();
        assert_eq!(image::guess_format(&prepared.jpeg).unwrap(), ImageFormat::Jpeg);
        assert_eq!((prepared.width, prepared.height), (3, 5));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(prepare_image(b"not an image").is_err());
    }

    #[test]
    fn test_writes_one_page_per_image() {
        let dir = TempDir::new().unwrap();
        let mut pdf = exporter(&dir);
        let page = encoded(
            DynamicImage::ImageRgb8(RgbImage::new(100, 200)),
            ImageFormat::Jpeg,
        );
        pdf.add_image(&page, PageIndex::Single(1)).unwrap();
        pdf.add_image(&page, PageIndex::Single(0)).unwrap();
        let path = pdf.close().unwrap();
        assert!(path.ends_with("The Elusive Samurai - 012 - Chapter 12 Night Raid.pdf"));

        let doc = Document::load(&path).unwrap();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 2);

        let first = doc.get_object(pages[&1]).unwrap().as_dict().unwrap();
        let media_box = first.get(b"MediaBox").unwrap().as_array().unwrap();
        assert_eq!(media_box[2].as_float().unwrap(), 72.0);
        assert_eq!(media_box[3].as_float().unwrap(), 144.0);
    }

    #[test]
    fn test_empty_chapter_is_export_error() {
        let dir = TempDir::new().unwrap();
        let mut pdf = exporter(&dir);
        assert!(matches!(pdf.close(), Err(Error::Export(_))));
    }
}
