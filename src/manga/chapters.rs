//! Title and chapter domain types, languages and chapter range filtering.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Languages published by the upstream catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    English,
    Spanish,
    French,
    Indonesian,
    Portuguese,
    Russian,
    Thai,
    German,
    Vietnamese,
}

impl Language {
    pub const ALL: [Language; 9] = [
        Language::English,
        Language::Spanish,
        Language::French,
        Language::Indonesian,
        Language::Portuguese,
        Language::Russian,
        Language::Thai,
        Language::German,
        Language::Vietnamese,
    ];

    /// Numeric code used on the wire.
    pub fn code(&self) -> i32 {
        match self {
            Language::English => 0,
            Language::Spanish => 1,
            Language::French => 2,
            Language::Indonesian => 3,
            Language::Portuguese => 4,
            Language::Russian => 5,
            Language::Thai => 6,
            Language::German => 7,
            Language::Vietnamese => 8,
        }
    }

    pub fn from_code(code: i32) -> Option<Language> {
        Self::ALL.into_iter().find(|l| l.code() == code)
    }

    /// ISO 639-1 code, as written into ComicInfo.xml.
    pub fn iso_code(&self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Spanish => "es",
            Language::French => "fr",
            Language::Indonesian => "id",
            Language::Portuguese => "pt",
            Language::Russian => "ru",
            Language::Thai => "th",
            Language::German => "de",
            Language::Vietnamese => "vi",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Language::English => "english",
            Language::Spanish => "spanish",
            Language::French => "french",
            Language::Indonesian => "indonesian",
            Language::Portuguese => "portuguese",
            Language::Russian => "russian",
            Language::Thai => "thai",
            Language::German => "german",
            Language::Vietnamese => "vietnamese",
        };
        f.write_str(name)
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|l| l.to_string() == wanted)
            .ok_or_else(|| format!("Unknown language: {}", s))
    }
}

/// Tag appended to the title in output names: empty for English,
/// ` [SPANISH]` style for known languages, ` [LANG-n]` for unknown codes.
pub fn language_tag(code: i32) -> String {
    match Language::from_code(code) {
        Some(Language::English) => String::new(),
        Some(language) => format!(" [{}]", language.to_string().to_uppercase()),
        None => format!(" [LANG-{}]", code),
    }
}

/// One chapter as listed by the title detail or viewer responses.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ChapterSummary {
    pub chapter_id: u32,
    pub title_id: u32,
    /// Display name, usually `#NNN`.
    pub name: String,
    pub sub_title: String,
    pub thumbnail_url: String,
    /// Availability window as unix seconds; zero when unknown.
    pub start_timestamp: u32,
    pub end_timestamp: u32,
    /// Zero-based position within the title listing.
    pub position: usize,
}

impl ChapterSummary {
    /// Chapter number parsed from the display name.
    pub fn number(&self) -> Option<u32> {
        chapter_name_to_int(&self.name)
    }

    /// Whether the chapter had opened at `now` (unix seconds).
    pub fn is_released(&self, now: i64) -> bool {
        self.start_timestamp == 0 || i64::from(self.start_timestamp) <= now
    }
}

/// A title with its chapter listing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct TitleDetail {
    pub title_id: u32,
    pub name: String,
    pub author: String,
    pub portrait_image_url: String,
    /// Wire language code, see [`Language::from_code`].
    pub language: i32,
    pub overview: String,
    pub non_appearance_info: String,
    pub number_of_views: u32,
    pub chapters: Vec<ChapterSummary>,
}

impl TitleDetail {
    pub fn chapter(&self, chapter_id: u32) -> Option<&ChapterSummary> {
        self.chapters.iter().find(|c| c.chapter_id == chapter_id)
    }

    pub fn language(&self) -> Option<Language> {
        Language::from_code(self.language)
    }
}

/// Parse a chapter number from a display name such as `#012`.
pub fn chapter_name_to_int(name: &str) -> Option<u32> {
    name.trim().trim_start_matches('#').parse().ok()
}

/// `--begin`/`--end`/`--last` selection over a title's chapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChapterRange {
    pub begin: u32,
    pub end: Option<u32>,
    pub last: bool,
}

impl ChapterRange {
    /// Select chapters to download, returned in ascending chapter-id order.
    ///
    /// Unnumbered chapters count as number zero. `last` picks the final
    /// listed chapter and ignores the numeric bounds.
    pub fn select<'a>(&self, chapters: &'a [ChapterSummary]) -> Vec<&'a ChapterSummary> {
        let mut selected: Vec<&ChapterSummary> = if self.last {
            chapters.iter().max_by_key(|c| c.position).into_iter().collect()
        } else {
            chapters
                .iter()
                .filter(|c| {
                    let number = c.number().unwrap_or(0);
                    number >= self.begin && self.end.map_or(true, |end| number <= end)
                })
                .collect()
        };
        selected.sort_by_key(|c| c.chapter_id);
        selected.dedup_by_key(|c| c.chapter_id);
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapter(chapter_id: u32, name: &str, position: usize) -> ChapterSummary {
        ChapterSummary {
            chapter_id,
            title_id: 100017,
            name: name.to_string(),
            position,
            ..Default::default()
        }
    }

    fn listing() -> Vec<ChapterSummary> {
        vec![
            chapter(1000, "#001", 0),
            chapter(1001, "#002", 1),
            chapter(1002, "#003", 2),
            chapter(1003, "ex", 3),
            chapter(1004, "#004", 4),
        ]
    }

    #[test]
    fn test_chapter_name_to_int() {
        assert_eq!(chapter_name_to_int("#012"), Some(12));
        assert_eq!(chapter_name_to_int("7"), Some(7));
        assert_eq!(chapter_name_to_int("ex"), None);
        assert_eq!(chapter_name_to_int(""), None);
    }

    #[test]
    fn test_is_released() {
        let mut upcoming = chapter(1, "#001", 0);
        assert!(upcoming.is_released(1_700_000_000));
        upcoming.start_timestamp = 1_800_000_000;
        assert!(!upcoming.is_released(1_700_000_000));
        assert!(upcoming.is_released(1_800_000_000));
    }

    #[test]
    fn test_duplicate_listing_entries_collapse() {
        let mut chapters = listing();
        chapters.push(chapter(1002, "#003", 2));
        let ids: Vec<u32> = ChapterRange::default()
            .select(&chapters)
            .iter()
            .map(|c| c.chapter_id)
            .collect();
        assert_eq!(ids, vec![1000, 1001, 1002, 1003, 1004]);
    }

    #[test]
    fn test_range_is_inclusive() {
        let chapters = listing();
        let range = ChapterRange {
            begin: 2,
            end: Some(3),
            last: false,
        };
        let ids: Vec<u32> = range.select(&chapters).iter().map(|c| c.chapter_id).collect();
        assert_eq!(ids, vec![1001, 1002]);
    }

    #[test]
    fn test_default_range_keeps_unnumbered() {
        let chapters = listing();
        let ids: Vec<u32> = ChapterRange::default()
            .select(&chapters)
            .iter()
            .map(|c| c.chapter_id)
            .collect();
        assert_eq!(ids, vec![1000, 1001, 1002, 1003, 1004]);
    }

    #[test]
    fn test_last_overrides_range() {
        let chapters = listing();
        let range = ChapterRange {
            begin: 1,
            end: Some(1),
            last: true,
        };
        let ids: Vec<u32> = range.select(&chapters).iter().map(|c| c.chapter_id).collect();
        assert_eq!(ids, vec![1004]);
    }

    #[test]
    fn test_language_tags() {
        assert_eq!(language_tag(0), "");
        assert_eq!(language_tag(1), " [SPANISH]");
        assert_eq!(language_tag(42), " [LANG-42]");
        assert_eq!("German".parse::<Language>().unwrap(), Language::German);
        assert_eq!(Language::Vietnamese.iso_code(), "vi");
    }

    #[test]
    fn test_release_window() {
        let mut c = chapter(1, "#001", 0);
        assert!(c.is_released(0));
        c.start_timestamp = 2_000;
        assert!(!c.is_released(1_000));
        assert!(c.is_released(2_000));
    }
}
