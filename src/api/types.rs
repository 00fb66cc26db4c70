//! Upstream protobuf response messages.
//!
//! Only the fields this crate reads are declared; unknown fields are skipped
//! by the decoder.

use serde::Serialize;

use crate::manga::{ChapterSummary, PageBlock, PageDescriptor, PageLayout, TitleDetail};

#[derive(Clone, PartialEq, prost::Message, Serialize)]
pub struct Response {
    #[prost(message, optional, tag = "1")]
    pub success: Option<SuccessResult>,
    #[prost(message, optional, tag = "2")]
    pub error: Option<ErrorResult>,
}

#[derive(Clone, PartialEq, prost::Message, Serialize)]
pub struct ErrorResult {
    /// 0 default, 1 unauthorized, 2 maintenance, 3 geo-ip blocking.
    #[prost(int32, tag = "1")]
    pub action: i32,
    #[prost(message, optional, tag = "2")]
    pub english_popup: Option<Popup>,
    #[prost(string, tag = "4")]
    pub debug_info: String,
}

#[derive(Clone, PartialEq, prost::Message, Serialize)]
pub struct Popup {
    #[prost(string, tag = "1")]
    pub subject: String,
    #[prost(string, tag = "2")]
    pub body: String,
}

#[derive(Clone, PartialEq, prost::Message, Serialize)]
pub struct SuccessResult {
    #[prost(message, optional, tag = "8")]
    pub title_detail_view: Option<TitleDetailView>,
    #[prost(message, optional, tag = "10")]
    pub manga_viewer: Option<MangaViewer>,
    #[prost(message, optional, tag = "25")]
    pub all_titles_view: Option<AllTitlesView>,
}

#[derive(Clone, PartialEq, prost::Message, Serialize)]
pub struct Title {
    #[prost(uint32, tag = "1")]
    pub title_id: u32,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(string, tag = "3")]
    pub author: String,
    #[prost(string, tag = "4")]
    pub portrait_image_url: String,
    #[prost(string, tag = "5")]
    pub landscape_image_url: String,
    #[prost(uint32, tag = "6")]
    pub view_count: u32,
    #[prost(int32, tag = "7")]
    pub language: i32,
}

#[derive(Clone, PartialEq, prost::Message, Serialize)]
pub struct Chapter {
    #[prost(uint32, tag = "1")]
    pub title_id: u32,
    #[prost(uint32, tag = "2")]
    pub chapter_id: u32,
    #[prost(string, tag = "3")]
    pub name: String,
    #[prost(string, tag = "4")]
    pub sub_title: String,
    #[prost(string, tag = "5")]
    pub thumbnail_url: String,
    #[prost(uint32, tag = "6")]
    pub start_timestamp: u32,
    #[prost(uint32, tag = "7")]
    pub end_timestamp: u32,
}

#[derive(Clone, PartialEq, prost::Message, Serialize)]
pub struct ChapterGroup {
    #[prost(string, tag = "1")]
    pub chapter_numbers: String,
    #[prost(message, repeated, tag = "2")]
    pub first_chapter_list: Vec<Chapter>,
    #[prost(message, repeated, tag = "3")]
    pub mid_chapter_list: Vec<Chapter>,
    #[prost(message, repeated, tag = "4")]
    pub last_chapter_list: Vec<Chapter>,
}

#[derive(Clone, PartialEq, prost::Message, Serialize)]
pub struct TitleDetailView {
    #[prost(message, optional, tag = "1")]
    pub title: Option<Title>,
    #[prost(string, tag = "3")]
    pub overview: String,
    #[prost(string, tag = "8")]
    pub non_appearance_info: String,
    #[prost(uint32, tag = "18")]
    pub number_of_views: u32,
    #[prost(message, repeated, tag = "28")]
    pub chapter_list_group: Vec<ChapterGroup>,
}

#[derive(Clone, PartialEq, prost::Message, Serialize)]
pub struct MangaPage {
    #[prost(string, tag = "1")]
    pub image_url: String,
    #[prost(uint32, tag = "2")]
    pub width: u32,
    #[prost(uint32, tag = "3")]
    pub height: u32,
    /// 0 single, 1 left, 2 right, 3 double.
    #[prost(int32, tag = "4")]
    pub r#type: i32,
    #[prost(string, tag = "5")]
    pub encryption_key: String,
}

#[derive(Clone, PartialEq, prost::Message, Serialize)]
pub struct LastPage {
    #[prost(message, optional, tag = "1")]
    pub current_chapter: Option<Chapter>,
    #[prost(message, optional, tag = "2")]
    pub next_chapter: Option<Chapter>,
}

#[derive(Clone, PartialEq, prost::Message, Serialize)]
pub struct Page {
    #[prost(message, optional, tag = "1")]
    pub manga_page: Option<MangaPage>,
    #[prost(message, optional, tag = "3")]
    pub last_page: Option<LastPage>,
}

#[derive(Clone, PartialEq, prost::Message, Serialize)]
pub struct MangaViewer {
    #[prost(message, repeated, tag = "1")]
    pub pages: Vec<Page>,
    #[prost(uint32, tag = "2")]
    pub chapter_id: u32,
    #[prost(message, repeated, tag = "3")]
    pub chapters: Vec<Chapter>,
    #[prost(string, tag = "5")]
    pub title_name: String,
    #[prost(string, tag = "6")]
    pub chapter_name: String,
    #[prost(uint32, tag = "9")]
    pub title_id: u32,
}

#[derive(Clone, PartialEq, prost::Message, Serialize)]
pub struct AllTitlesGroup {
    #[prost(string, tag = "1")]
    pub the_title: String,
    #[prost(message, repeated, tag = "2")]
    pub titles: Vec<Title>,
}

#[derive(Clone, PartialEq, prost::Message, Serialize)]
pub struct AllTitlesView {
    #[prost(message, repeated, tag = "1")]
    pub title_groups: Vec<AllTitlesGroup>,
}

/// HTTP-status-like code for an error envelope action.
pub fn error_action_code(action: i32) -> u16 {
    match action {
        1 => 401,
        2 => 503,
        3 => 451,
        _ => 400,
    }
}

impl ErrorResult {
    /// Best human-readable description of the failure.
    pub fn describe(&self) -> String {
        let popup = self
            .english_popup
            .as_ref()
            .map(|p| format!("{} {}", p.subject, p.body).trim().to_string())
            .unwrap_or_default();
        if !popup.is_empty() {
            popup
        } else if !self.debug_info.is_empty() {
            self.debug_info.clone()
        } else {
            format!("upstream error action {}", self.action)
        }
    }
}

impl Chapter {
    pub fn to_summary(&self, position: usize) -> ChapterSummary {
        ChapterSummary {
            chapter_id: self.chapter_id,
            title_id: self.title_id,
            name: self.name.clone(),
            sub_title: self.sub_title.clone(),
            thumbnail_url: self.thumbnail_url.clone(),
            start_timestamp: self.start_timestamp,
            end_timestamp: self.end_timestamp,
            position,
        }
    }
}

impl From<TitleDetailView> for TitleDetail {
    fn from(view: TitleDetailView) -> Self {
        let title = view.title.unwrap_or_default();
        let chapters = view
            .chapter_list_group
            .iter()
            .flat_map(|group| {
                group
                    .first_chapter_list
                    .iter()
                    .chain(group.mid_chapter_list.iter())
                    .chain(group.last_chapter_list.iter())
            })
            .enumerate()
            .map(|(position, chapter)| chapter.to_summary(position))
            .collect();

        TitleDetail {
            title_id: title.title_id,
            name: title.name,
            author: title.author,
            portrait_image_url: title.portrait_image_url,
            language: title.language,
            overview: view.overview,
            non_appearance_info: view.non_appearance_info,
            number_of_views: view.number_of_views,
            chapters,
        }
    }
}

impl From<MangaViewer> for PageBlock {
    fn from(viewer: MangaViewer) -> Self {
        let pages = viewer
            .pages
            .iter()
            .filter_map(|p| p.manga_page.as_ref())
            .filter(|p| !p.image_url.is_empty())
            .map(|p| PageDescriptor {
                image_url: p.image_url.clone(),
                width: p.width,
                height: p.height,
                layout: PageLayout::from_code(p.r#type),
                encryption_key: Some(p.encryption_key.clone()).filter(|k| !k.is_empty()),
            })
            .collect();

        let last_page = viewer.pages.last().and_then(|p| p.last_page.as_ref());
        let current_chapter = last_page
            .and_then(|lp| lp.current_chapter.as_ref())
            .map(|c| c.to_summary(0));
        let next_chapter = last_page
            .and_then(|lp| lp.next_chapter.as_ref())
            .filter(|c| c.chapter_id != 0)
            .map(|c| c.to_summary(0));

        PageBlock {
            title_id: viewer.title_id,
            chapter_id: viewer.chapter_id,
            title_name: viewer.title_name,
            chapter_name: viewer.chapter_name,
            pages,
            chapters: viewer
                .chapters
                .iter()
                .enumerate()
                .map(|(position, c)| c.to_summary(position))
                .collect(),
            current_chapter,
            next_chapter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    fn chapter(id: u32, name: &str) -> Chapter {
        Chapter {
            title_id: 100017,
            chapter_id: id,
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_title_detail_flattens_groups_in_order() {
        let view = TitleDetailView {
            title: Some(Title {
                title_id: 100017,
                name: "Sample".into(),
                ..Default::default()
            }),
            chapter_list_group: vec![ChapterGroup {
                chapter_numbers: "1-3".into(),
                first_chapter_list: vec![chapter(1, "#001")],
                mid_chapter_list: vec![chapter(2, "#002")],
                last_chapter_list: vec![chapter(3, "#003")],
            }],
            ..Default::default()
        };

        let encoded = view.encode_to_vec();
        let decoded = TitleDetailView::decode(encoded.as_slice()).unwrap();
        let detail = TitleDetail::from(decoded);

        assert_eq!(detail.name, "Sample");
        let ids: Vec<u32> = detail.chapters.iter().map(|c| c.chapter_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(detail.chapters[2].position, 2);
    }

    #[test]
    fn test_viewer_keeps_image_pages_and_last_page() {
        let viewer = MangaViewer {
            pages: vec![
                Page {
                    manga_page: Some(MangaPage {
                        image_url: "https://img/1".into(),
                        r#type: 3,
                        encryption_key: "ff".into(),
                        ..Default::default()
                    }),
                    last_page: None,
                },
                Page {
                    manga_page: Some(MangaPage::default()),
                    last_page: None,
                },
                Page {
                    manga_page: None,
                    last_page: Some(LastPage {
                        current_chapter: Some(chapter(10, "#010")),
                        next_chapter: Some(chapter(0, "")),
                    }),
                },
            ],
            chapter_id: 10,
            title_id: 100017,
            ..Default::default()
        };

        let block = PageBlock::from(viewer);
        assert_eq!(block.pages.len(), 1);
        assert_eq!(block.pages[0].layout, PageLayout::Double);
        assert_eq!(block.pages[0].encryption_key.as_deref(), Some("ff"));
        assert!(block.is_complete());
        assert!(block.next_chapter.is_none());
    }

    #[test]
    fn test_last_page_marker_must_close_the_chapter() {
        let marker = Page {
            manga_page: None,
            last_page: Some(LastPage {
                current_chapter: Some(chapter(10, "#010")),
                next_chapter: None,
            }),
        };
        let image = Page {
            manga_page: Some(MangaPage {
                image_url: "https://img/2".into(),
                ..Default::default()
            }),
            last_page: None,
        };
        let viewer = MangaViewer {
            pages: vec![marker, image],
            chapter_id: 10,
            title_id: 100017,
            ..Default::default()
        };

        let block = PageBlock::from(viewer);
        assert_eq!(block.pages.len(), 1);
        assert!(!block.is_complete());
        assert!(block.current_chapter.is_none());
    }

    #[test]
    fn test_error_description_prefers_popup() {
        let error = ErrorResult {
            action: 1,
            english_popup: Some(Popup {
                subject: "Error".into(),
                body: "Login required".into(),
            }),
            debug_info: "dbg".into(),
        };
        assert_eq!(error.describe(), "Error Login required");
        assert_eq!(error_action_code(error.action), 401);
        assert_eq!(error_action_code(0), 400);
    }
}
