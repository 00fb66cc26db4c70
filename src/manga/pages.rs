//! Viewer page blocks and output index assignment.

use std::fmt;

use crate::manga::chapters::ChapterSummary;

/// Layout of one page image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageLayout {
    #[default]
    Single,
    Left,
    Right,
    /// One image spanning two page slots.
    Double,
}

impl PageLayout {
    pub fn from_code(code: i32) -> PageLayout {
        match code {
            1 => PageLayout::Left,
            2 => PageLayout::Right,
            3 => PageLayout::Double,
            _ => PageLayout::Single,
        }
    }
}

/// One page image as delivered by the viewer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageDescriptor {
    /// Image URL at the quality tier the viewer was asked for.
    pub image_url: String,
    pub width: u32,
    pub height: u32,
    pub layout: PageLayout,
    /// Hex XOR key when the image is obfuscated.
    pub encryption_key: Option<String>,
}

/// Output slot(s) of a page.
///
/// A spread covers `[start, stop)` with `stop == start + 1`; `stop` is the
/// second slot number written into file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PageIndex {
    Single(usize),
    Spread { start: usize, stop: usize },
}

impl PageIndex {
    pub fn start(&self) -> usize {
        match *self {
            PageIndex::Single(index) => index,
            PageIndex::Spread { start, .. } => start,
        }
    }

    pub fn stop(&self) -> Option<usize> {
        match *self {
            PageIndex::Single(_) => None,
            PageIndex::Spread { stop, .. } => Some(stop),
        }
    }
}

impl fmt::Display for PageIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageIndex::Single(index) => write!(f, "p{:03}", index),
            PageIndex::Spread { start, stop } => write!(f, "p{:03}-{:03}", start, stop),
        }
    }
}

/// Assign output slots to a chapter's pages. A double page consumes two slots.
pub fn assign_page_indices(pages: &[PageDescriptor]) -> Vec<PageIndex> {
    let mut next = 0;
    pages
        .iter()
        .map(|page| {
            let start = next;
            if page.layout == PageLayout::Double {
                next += 2;
                PageIndex::Spread {
                    start,
                    stop: start + 1,
                }
            } else {
                next += 1;
                PageIndex::Single(start)
            }
        })
        .collect()
}

/// Everything the viewer returns for one chapter.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageBlock {
    pub title_id: u32,
    pub chapter_id: u32,
    pub title_name: String,
    pub chapter_name: String,
    /// Pages carrying an image, in reading order.
    pub pages: Vec<PageDescriptor>,
    /// Sibling chapters of the same title.
    pub chapters: Vec<ChapterSummary>,
    pub current_chapter: Option<ChapterSummary>,
    pub next_chapter: Option<ChapterSummary>,
}

impl PageBlock {
    /// The viewer only sends the closing page marker to readers allowed to
    /// see the whole chapter.
    pub fn is_complete(&self) -> bool {
        self.current_chapter.is_some()
    }
}
