//! MangaPlus API HTTP client.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use prost::Message;
use reqwest::Client;

use crate::api::capture::{CapturedCall, PayloadCapture};
use crate::api::types::{error_action_code, Response, SuccessResult, Title};
use crate::config::{AuthSettings, Quality};
use crate::error::{Error, Result};
use crate::manga::{PageBlock, TitleDetail};

/// MangaPlus API base URL.
pub const API_BASE: &str = "https://jumpg-api.tokyo-cdn.com";

/// User agent of the mobile app the API expects.
pub const USER_AGENT: &str = "JumpPlus/1 CFNetwork/1333.0.4 Darwin/21.5.0";

/// Endpoint names, as used in capture file names.
pub const VIEWER_ENDPOINT: &str = "manga_viewer";
pub const TITLE_DETAIL_ENDPOINT: &str = "title_detailV3";
pub const TITLE_LIST_ENDPOINT: &str = "title_list";

const VIEWER_CACHE_SIZE: usize = 512;
const TITLE_CACHE_SIZE: usize = 256;

/// Operations the download orchestrator needs from the upstream service.
#[async_trait]
pub trait MangaApi: Send + Sync {
    /// Fetch a title with its full chapter listing.
    async fn fetch_title_detail(&self, title_id: u32) -> Result<TitleDetail>;

    /// Fetch the page block of one chapter.
    async fn fetch_chapter_viewer(
        &self,
        chapter_id: u32,
        quality: Quality,
        split: bool,
    ) -> Result<PageBlock>;

    /// Download one page image.
    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>>;
}

/// Title entry of the catalog listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleListing {
    pub title_id: u32,
    pub name: String,
    pub language: i32,
}

impl From<&Title> for TitleListing {
    fn from(title: &Title) -> Self {
        Self {
            title_id: title.title_id,
            name: title.name.clone(),
            language: title.language,
        }
    }
}

/// Small insertion-ordered cache that drops its least recently used entry.
#[derive(Debug)]
struct BoundedCache<K, V> {
    capacity: usize,
    entries: HashMap<K, V>,
    order: VecDeque<K>,
}

impl<K: Eq + Hash + Clone, V: Clone> BoundedCache<K, V> {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&mut self, key: &K) -> Option<V> {
        let value = self.entries.get(key)?.clone();
        self.order.retain(|k| k != key);
        self.order.push_back(key.clone());
        Some(value)
    }

    fn insert(&mut self, key: K, value: V) {
        if self.entries.insert(key.clone(), value).is_some() {
            self.order.retain(|k| k != &key);
        }
        self.order.push_back(key);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }
}

/// MangaPlus API client.
pub struct MangaPlusApi {
    client: Client,
    base_url: String,
    auth: AuthSettings,
    capture: Option<PayloadCapture>,
    viewer_cache: Mutex<BoundedCache<(u32, Quality, bool), PageBlock>>,
    title_cache: Mutex<BoundedCache<u32, TitleDetail>>,
}

impl MangaPlusApi {
    /// Create a new API client.
    pub fn new(auth: AuthSettings, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(request_timeout)
            .connect_timeout(request_timeout.min(Duration::from_secs(10)))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: API_BASE.to_string(),
            auth,
            capture: None,
            viewer_cache: Mutex::new(BoundedCache::new(VIEWER_CACHE_SIZE)),
            title_cache: Mutex::new(BoundedCache::new(TITLE_CACHE_SIZE)),
        })
    }

    /// Point the client at another API host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Record every API payload into `capture`.
    pub fn with_capture(mut self, capture: PayloadCapture) -> Self {
        self.capture = Some(capture);
        self
    }

    /// Underlying HTTP client, shared with page scraping.
    pub fn http(&self) -> &Client {
        &self.client
    }

    fn capture_call(
        &self,
        call: CapturedCall<'_>,
        status: Option<u16>,
        payload: &[u8],
        error: Option<&str>,
    ) {
        if let Some(capture) = &self.capture {
            if let Err(e) = capture.record(call, status, payload, error) {
                tracing::warn!("Failed to capture {} payload: {}", call.endpoint, e);
            }
        }
    }

    /// Issue a GET and return the raw body, capturing the exchange.
    async fn get_payload(
        &self,
        endpoint: &str,
        identifier: &str,
        url: &str,
        params: &[(&str, &str)],
    ) -> Result<Vec<u8>> {
        let call = CapturedCall {
            endpoint,
            identifier,
            url,
            params,
        };

        tracing::debug!("GET {} ({})", url, identifier);

        let response = match self.client.get(url).query(params).send().await {
            Ok(response) => response,
            Err(e) => {
                self.capture_call(call, None, &[], Some(&e.to_string()));
                return Err(e.into());
            }
        };

        let status = response.status();
        tracing::debug!("Response status: {}", status);

        let body = match response.bytes().await {
            Ok(body) => body.to_vec(),
            Err(e) => {
                self.capture_call(call, Some(status.as_u16()), &[], Some(&e.to_string()));
                return Err(e.into());
            }
        };

        if !status.is_success() {
            let message = format!("HTTP {} from {}", status, endpoint);
            self.capture_call(call, Some(status.as_u16()), &body, Some(&message));
            return Err(if status.as_u16() == 429 || status.is_server_error() {
                Error::Transient(message)
            } else {
                Error::Upstream {
                    code: status.as_u16(),
                    message,
                }
            });
        }

        self.capture_call(call, Some(status.as_u16()), &body, None);
        Ok(body)
    }

    /// Fetch the catalog listing from `endpoint`.
    pub async fn fetch_title_list(&self, endpoint: &str) -> Result<Vec<TitleListing>> {
        let payload = self
            .get_payload(TITLE_LIST_ENDPOINT, "all", endpoint, &[])
            .await?;
        let success = decode_success(&payload)?;
        let view = success
            .all_titles_view
            .ok_or_else(|| Error::Decode("Response has no title list".to_string()))?;

        Ok(view
            .title_groups
            .iter()
            .flat_map(|group| group.titles.iter())
            .map(TitleListing::from)
            .collect())
    }

    /// Fetch an HTML page as text.
    pub async fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }
}

#[async_trait]
impl MangaApi for MangaPlusApi {
    async fn fetch_title_detail(&self, title_id: u32) -> Result<TitleDetail> {
        let cached = lock(&self.title_cache)?.get(&title_id);
        if let Some(cached) = cached {
            return Ok(cached);
        }

        let url = format!("{}/api/{}", self.base_url, TITLE_DETAIL_ENDPOINT);
        let id = title_id.to_string();
        let mut params: Vec<(&str, &str)> = self.auth.query_params().to_vec();
        params.push(("title_id", id.as_str()));

        let payload = self
            .get_payload(TITLE_DETAIL_ENDPOINT, &id, &url, &params)
            .await?;
        let view = decode_success(&payload)?.title_detail_view.ok_or_else(|| {
            Error::Decode(format!("Response for title {} has no title detail", title_id))
        })?;

        let detail = TitleDetail::from(view);
        lock(&self.title_cache)?.insert(title_id, detail.clone());
        Ok(detail)
    }

    async fn fetch_chapter_viewer(
        &self,
        chapter_id: u32,
        quality: Quality,
        split: bool,
    ) -> Result<PageBlock> {
        let key = (chapter_id, quality, split);
        let cached = lock(&self.viewer_cache)?.get(&key);
        if let Some(cached) = cached {
            return Ok(cached);
        }

        let url = format!("{}/api/{}", self.base_url, VIEWER_ENDPOINT);
        let id = chapter_id.to_string();
        let mut params: Vec<(&str, &str)> = self.auth.query_params().to_vec();
        params.push(("chapter_id", id.as_str()));
        params.push(("split", if split { "yes" } else { "no" }));
        params.push(("img_quality", quality.as_param()));

        let payload = self.get_payload(VIEWER_ENDPOINT, &id, &url, &params).await?;
        let viewer = decode_success(&payload)?.manga_viewer.ok_or_else(|| {
            Error::Decode(format!("Response for chapter {} has no viewer", chapter_id))
        })?;

        let block = PageBlock::from(viewer);
        lock(&self.viewer_cache)?.insert(key, block.clone());
        Ok(block)
    }

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<std::sync::MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| Error::Internal("API cache lock poisoned".to_string()))
}

/// Decode a response envelope, turning error envelopes into upstream errors.
pub fn decode_success(payload: &[u8]) -> Result<SuccessResult> {
    let response = Response::decode(payload)?;

    if let Some(error) = response.error {
        return Err(Error::Upstream {
            code: error_action_code(error.action),
            message: error.describe(),
        });
    }

    response
        .success
        .ok_or_else(|| Error::Decode("Response has neither success nor error".to_string()))
}
