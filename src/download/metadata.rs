//! Title metadata export (`--meta`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::Result;
use crate::fs::{ensure_dir, escape_path, fix_mojibake, title_case, write_atomic};
use crate::manga::TitleDetail;

pub const METADATA_FILENAME: &str = "title_metadata.json";

#[derive(Serialize)]
struct TitleMetadata<'a> {
    name: &'a str,
    author: &'a str,
    overview: &'a str,
    portrait_image_url: &'a str,
    non_appearance_info: &'a str,
    number_of_views: u32,
    chapters: BTreeMap<u32, ChapterMetadata<'a>>,
}

#[derive(Serialize)]
struct ChapterMetadata<'a> {
    chapter_id: u32,
    name: &'a str,
    sub_title: String,
    thumbnail_url: &'a str,
}

/// Write `title_metadata.json` for `title` into `title_dir`.
pub fn write_title_metadata(title_dir: &Path, title: &TitleDetail) -> Result<PathBuf> {
    let chapters = title
        .chapters
        .iter()
        .map(|chapter| {
            (
                chapter.chapter_id,
                ChapterMetadata {
                    chapter_id: chapter.chapter_id,
                    name: &chapter.name,
                    sub_title: title_case(&escape_path(&fix_mojibake(&chapter.sub_title))),
                    thumbnail_url: &chapter.thumbnail_url,
                },
            )
        })
        .collect();

    let metadata = TitleMetadata {
        name: &title.name,
        author: &title.author,
        overview: &title.overview,
        portrait_image_url: &title.portrait_image_url,
        non_appearance_info: &title.non_appearance_info,
        number_of_views: title.number_of_views,
        chapters,
    };

    ensure_dir(title_dir)?;
    let path = title_dir.join(METADATA_FILENAME);
    write_atomic(&path, &serde_json::to_vec_pretty(&metadata)?)?;
    tracing::info!("    Metadata for title '{}' exported", title.name);
    Ok(path)
}
