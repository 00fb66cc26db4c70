//! Manga domain module.
//!
//! Provides:
//! - Work unit normalization
//! - Title, chapter and page types
//! - Page image decryption

pub mod chapters;
pub mod decrypt;
pub mod ids;
pub mod pages;

pub use chapters::{
    chapter_name_to_int, language_tag, ChapterRange, ChapterSummary, Language, TitleDetail,
};
pub use decrypt::decrypt;
pub use ids::{normalize_targets, parse_target, WorkUnit};
pub use pages::{assign_page_indices, PageBlock, PageDescriptor, PageIndex, PageLayout};
