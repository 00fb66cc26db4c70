//! Bulk-mode title discovery.
//!
//! Title ids are looked up through an ordered chain of stages, each tried
//! only while the previous ones found nothing:
//! 1. the API catalog listing (the only stage that can filter by language)
//! 2. a static fetch of every configured list page, scraped for title links
//! 3. the same pages rendered in a headless browser, when enabled

pub mod browser;
pub mod scrape;

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::api::{MangaPlusApi, TitleListing};
use crate::config::DiscoveryConfig;
use crate::error::{Error, Result};

pub use browser::BrowserRenderer;
pub use scrape::{extract_linked_title_ids, extract_title_ids, has_id_length};

/// Where discovery gets its raw material from.
#[async_trait]
pub trait DiscoverySource: Send + Sync {
    /// Catalog listing from the title index endpoint.
    async fn list_titles(&self, endpoint: &str) -> Result<Vec<TitleListing>>;

    /// Raw text of a list page.
    async fn fetch_page(&self, url: &str) -> Result<String>;

    /// DOM of a list page after scripts ran.
    async fn render_page(&self, url: &str) -> Result<String>;
}

/// Stage that produced the discovered ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryStage {
    Api,
    Scrape,
    Browser,
}

impl fmt::Display for DiscoveryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryStage::Api => write!(f, "api"),
            DiscoveryStage::Scrape => write!(f, "scrape"),
            DiscoveryStage::Browser => write!(f, "browser"),
        }
    }
}

/// Result of a discovery run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Discovery {
    pub title_ids: Vec<u32>,
    pub stage: DiscoveryStage,
    /// Stage failures and skips, in the order they happened.
    pub notices: Vec<String>,
}

fn notice(notices: &mut Vec<String>, message: String) {
    tracing::warn!("{}", message);
    notices.push(message);
}

/// Run the discovery chain. Stage failures are recorded as notices; only a
/// chain that finds nothing at all is an error.
pub async fn discover_title_ids(
    source: &dyn DiscoverySource,
    settings: &DiscoveryConfig,
) -> Result<Discovery> {
    let mut notices = Vec::new();
    let id_length = settings.id_length;

    let language_codes: BTreeSet<i32> = settings.languages.iter().map(|l| l.code()).collect();
    match source.list_titles(&settings.title_index_endpoint).await {
        Ok(listing) => {
            let ids: BTreeSet<u32> = listing
                .iter()
                .filter(|t| language_codes.is_empty() || language_codes.contains(&t.language))
                .map(|t| t.title_id)
                .filter(|&id| id > 0 && has_id_length(id, id_length))
                .collect();
            if !ids.is_empty() {
                tracing::info!("Discovered {} title(s) from the API listing", ids.len());
                return Ok(found(ids, DiscoveryStage::Api, notices));
            }
            notice(&mut notices, "API listing returned no title ids".to_string());
        }
        Err(e) => notice(&mut notices, format!("API listing failed: {}", e)),
    }

    if !language_codes.is_empty() {
        notice(
            &mut notices,
            "Language filters only apply to the API listing; page scraping skipped".to_string(),
        );
        return Err(nothing_found(&notices));
    }

    let mut ids = BTreeSet::new();
    for page in &settings.pages {
        match source.fetch_page(page).await {
            Ok(html) => ids.extend(extract_title_ids(&html, id_length)),
            Err(e) => notice(&mut notices, format!("Fetching {} failed: {}", page, e)),
        }
    }
    if !ids.is_empty() {
        tracing::info!("Discovered {} title(s) from list pages", ids.len());
        return Ok(found(ids, DiscoveryStage::Scrape, notices));
    }
    notice(&mut notices, "List pages contained no title links".to_string());

    if !settings.browser_fallback {
        return Err(nothing_found(&notices));
    }

    for page in &settings.pages {
        match source.render_page(page).await {
            Ok(html) => ids.extend(extract_linked_title_ids(&html, id_length)),
            Err(e) => notice(&mut notices, format!("Browser rendering failed: {}", e)),
        }
    }
    if !ids.is_empty() {
        tracing::info!("Discovered {} title(s) from rendered list pages", ids.len());
        return Ok(found(ids, DiscoveryStage::Browser, notices));
    }
    notice(&mut notices, "Rendered list pages contained no title links".to_string());

    Err(nothing_found(&notices))
}

fn found(ids: BTreeSet<u32>, stage: DiscoveryStage, notices: Vec<String>) -> Discovery {
    Discovery {
        title_ids: ids.into_iter().collect(),
        stage,
        notices,
    }
}

fn nothing_found(notices: &[String]) -> Error {
    Error::Discovery(format!("No title ids found ({})", notices.join("; ")))
}

/// Discovery over the live API client, list pages and a headless browser.
pub struct HttpDiscoverySource<'a> {
    api: &'a MangaPlusApi,
    browser: BrowserRenderer,
}

impl<'a> HttpDiscoverySource<'a> {
    pub fn new(api: &'a MangaPlusApi, render_timeout: Duration) -> Self {
        Self {
            api,
            browser: BrowserRenderer::new(render_timeout),
        }
    }
}

#[async_trait]
impl DiscoverySource for HttpDiscoverySource<'_> {
    async fn list_titles(&self, endpoint: &str) -> Result<Vec<TitleListing>> {
        self.api.fetch_title_list(endpoint).await
    }

    async fn fetch_page(&self, url: &str) -> Result<String> {
        self.api.fetch_text(url).await
    }

    async fn render_page(&self, url: &str) -> Result<String> {
        self.browser.render(url).await
    }
}
