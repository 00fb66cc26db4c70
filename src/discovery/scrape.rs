//! Title id extraction from list pages.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

/// `/titles/123` links, including the `\/titles\/123` shape of escaped JSON.
static TITLE_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\\?/titles\\?/(\d+)(?:\\?/|$|[?#"'])"#).expect("valid regex")
});

static LINK_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid selector"));

/// Whether `title_id` has exactly `id_length` digits, when a length is set.
pub fn has_id_length(title_id: u32, id_length: Option<usize>) -> bool {
    id_length.map_or(true, |len| title_id.to_string().len() == len)
}

/// Title ids referenced anywhere in `text`.
pub fn extract_title_ids(text: &str, id_length: Option<usize>) -> BTreeSet<u32> {
    TITLE_ID_PATTERN
        .captures_iter(text)
        .filter_map(|caps| {
            let digits = caps.get(1)?.as_str();
            if id_length.is_some_and(|len| digits.len() != len) {
                return None;
            }
            digits.parse::<u32>().ok()
        })
        .filter(|&id| id > 0)
        .collect()
}

/// `href` targets of every link in an HTML document.
pub fn extract_links(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    document
        .select(&LINK_SELECTOR)
        .filter_map(|link| link.value().attr("href"))
        .map(str::to_string)
        .collect()
}

/// Title ids linked from a rendered HTML document.
pub fn extract_linked_title_ids(html: &str, id_length: Option<usize>) -> BTreeSet<u32> {
    extract_links(html)
        .iter()
        .flat_map(|href| extract_title_ids(href, id_length))
        .collect()
}
