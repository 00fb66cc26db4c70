//! Download orchestration.
//!
//! Work units are grouped per title, each title's selected chapters are
//! processed in chapter-id order, and every chapter runs through
//! fetch → decode → export on its own: one chapter failing never stops its
//! siblings. Resume state lives in the per-title [`Manifest`].

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use indicatif::ProgressBar;
use rand::Rng;
use tokio::time::sleep;

use crate::api::MangaApi;
use crate::config::Config;
use crate::download::manifest::Manifest;
use crate::download::metadata::write_title_metadata;
use crate::download::state::{ChapterState, RunOutcome};
use crate::error::{Error, ErrorKind, Result};
use crate::export::{Exporter, ExporterFactory};
use crate::fs::{ensure_dir, title_directory};
use crate::manga::{
    assign_page_indices, decrypt, ChapterRange, ChapterSummary, PageBlock, PageIndex,
    TitleDetail, WorkUnit,
};
use crate::output::create_item_bar;

const SUBSCRIPTION_REQUIRED: &str = "A MAX subscription is required to download this chapter";

/// Capped exponential backoff for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }

    /// Same attempt count, no waiting.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before retry `attempt` (1-based), with up to 25% random jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let backoff = self
            .base_delay
            .saturating_mul(1u32 << shift)
            .min(self.max_delay);

        let jitter_ms = backoff.as_millis() as u64 / 4;
        if jitter_ms == 0 {
            return backoff;
        }
        backoff + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }

    /// Run `operation`, repeating it while it fails with a retryable error.
    pub async fn run<T, F, Fut>(&self, what: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.delay(attempt);
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "{} failed: {}; retrying",
                        what,
                        e
                    );
                    sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Chapters requested for one title.
#[derive(Debug)]
struct TitlePlan {
    title_id: u32,
    /// The title itself was requested; its range selection replaces `chapter_ids`.
    whole_title: bool,
    chapter_ids: Vec<u32>,
    /// Viewer responses fetched while resolving chapter units.
    blocks: HashMap<u32, PageBlock>,
}

impl TitlePlan {
    fn new(title_id: u32) -> Self {
        Self {
            title_id,
            whole_title: false,
            chapter_ids: Vec::new(),
            blocks: HashMap::new(),
        }
    }
}

fn plan_for(plans: &mut Vec<TitlePlan>, title_id: u32) -> &mut TitlePlan {
    let index = match plans.iter().position(|plan| plan.title_id == title_id) {
        Some(index) => index,
        None => {
            plans.push(TitlePlan::new(title_id));
            plans.len() - 1
        }
    };
    &mut plans[index]
}

fn summary_from_block(block: &PageBlock) -> ChapterSummary {
    block.current_chapter.clone().unwrap_or_else(|| ChapterSummary {
        chapter_id: block.chapter_id,
        title_id: block.title_id,
        name: block.chapter_name.clone(),
        ..Default::default()
    })
}

fn log_state(chapter_id: u32, state: ChapterState) {
    tracing::debug!(chapter_id, state = %state, "chapter state");
}

/// Record an interrupt on `cancel`. Returns true if one was already pending.
pub fn request_cancel(cancel: &AtomicBool) -> bool {
    cancel.swap(true, Ordering::SeqCst)
}

/// Drives the per-chapter pipeline for a set of work units.
pub struct Downloader<'a> {
    api: &'a dyn MangaApi,
    exporters: &'a dyn ExporterFactory,
    config: &'a Config,
    retry: RetryPolicy,
    cancel: Arc<AtomicBool>,
    show_progress: bool,
}

impl<'a> Downloader<'a> {
    pub fn new(
        api: &'a dyn MangaApi,
        exporters: &'a dyn ExporterFactory,
        config: &'a Config,
    ) -> Self {
        Self {
            api,
            exporters,
            config,
            retry: RetryPolicy::new(config.options.max_retries),
            cancel: Arc::new(AtomicBool::new(false)),
            show_progress: config.options.show_progress,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Stop before the next chapter once `cancel` is set.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn range(&self) -> ChapterRange {
        ChapterRange {
            begin: self.config.options.begin,
            end: self.config.options.end,
            last: self.config.options.last,
        }
    }

    async fn fetch_viewer(&self, chapter_id: u32) -> Result<PageBlock> {
        let options = &self.config.options;
        self.retry
            .run("chapter viewer", || {
                self.api
                    .fetch_chapter_viewer(chapter_id, options.quality, options.split)
            })
            .await
    }

    /// Download every unit. Never fails as a whole; problems are recorded in
    /// the returned outcome.
    pub async fn run(&self, units: &[WorkUnit]) -> RunOutcome {
        let mut outcome = RunOutcome::default();
        let plans = self.plan(units, &mut outcome).await;

        let total = plans.len();
        for (index, plan) in plans.iter().enumerate() {
            if self.is_cancelled() {
                outcome.interrupted = true;
                break;
            }
            if let Err(e) = self.process_title(index + 1, total, plan, &mut outcome).await {
                tracing::error!("Title {} failed: {}", plan.title_id, e);
                outcome.mark_title_failed(plan.title_id, &e);
            }
            if outcome.interrupted {
                break;
            }
        }

        if outcome.interrupted {
            tracing::warn!("Download interrupted; remaining chapters were not attempted");
        }
        outcome
    }

    /// Group units by title. Chapter units are resolved through the viewer,
    /// whose response is kept for the download itself.
    async fn plan(&self, units: &[WorkUnit], outcome: &mut RunOutcome) -> Vec<TitlePlan> {
        let mut plans: Vec<TitlePlan> = Vec::new();

        for unit in units {
            if self.is_cancelled() {
                outcome.interrupted = true;
                break;
            }
            match *unit {
                WorkUnit::Title(title_id) => plan_for(&mut plans, title_id).whole_title = true,
                WorkUnit::Chapter(chapter_id) => match self.fetch_viewer(chapter_id).await {
                    Ok(block) => {
                        let plan = plan_for(&mut plans, block.title_id);
                        if !plan.chapter_ids.contains(&chapter_id) {
                            plan.chapter_ids.push(chapter_id);
                        }
                        plan.blocks.insert(chapter_id, block);
                    }
                    Err(e) => {
                        tracing::error!("Cannot resolve chapter {}: {}", chapter_id, e);
                        outcome.summary.mark_failed(chapter_id, &e);
                    }
                },
            }
        }

        plans
    }

    fn select_chapters(&self, title: &TitleDetail, plan: &TitlePlan) -> Vec<ChapterSummary> {
        if plan.whole_title {
            let now = Utc::now().timestamp();
            let released: Vec<ChapterSummary> = title
                .chapters
                .iter()
                .filter(|chapter| chapter.is_released(now))
                .cloned()
                .collect();
            if released.len() < title.chapters.len() {
                tracing::info!(
                    "    {} chapter(s) of '{}' are not released yet",
                    title.chapters.len() - released.len(),
                    title.name
                );
            }
            return self
                .range()
                .select(&released)
                .into_iter()
                .cloned()
                .collect();
        }

        let mut chapters: Vec<ChapterSummary> = plan
            .chapter_ids
            .iter()
            .map(|&chapter_id| {
                title
                    .chapter(chapter_id)
                    .cloned()
                    .or_else(|| plan.blocks.get(&chapter_id).map(summary_from_block))
                    .unwrap_or_else(|| ChapterSummary {
                        chapter_id,
                        title_id: title.title_id,
                        ..Default::default()
                    })
            })
            .collect();
        chapters.sort_by_key(|chapter| chapter.chapter_id);
        chapters
    }

    async fn process_title(
        &self,
        index: usize,
        total: usize,
        plan: &TitlePlan,
        outcome: &mut RunOutcome,
    ) -> Result<()> {
        let options = &self.config.options;
        let title = self
            .retry
            .run("title detail", || self.api.fetch_title_detail(plan.title_id))
            .await?;

        tracing::info!("{}/{}) Manga: {}", index, total, title.name);
        tracing::info!("    Author: {}", title.author);

        let title_dir = title_directory(&options.out_dir, &title.name)?;
        ensure_dir(&title_dir)?;

        if options.manifest_reset {
            Manifest::load(&title_dir).reset()?;
        }
        let mut manifest = options.resume.then(|| Manifest::load(&title_dir));

        if options.meta {
            write_title_metadata(&title_dir, &title)?;
        }

        let chapters = self.select_chapters(&title, plan);
        if chapters.is_empty() {
            tracing::info!("    No chapters selected for '{}'", title.name);
            return Ok(());
        }

        let total_chapters = chapters.len();
        let mut skipped = 0;
        for (position, chapter) in chapters.iter().enumerate() {
            if self.is_cancelled() {
                outcome.interrupted = true;
                return Ok(());
            }

            let chapter_id = chapter.chapter_id;
            if manifest.as_ref().is_some_and(|m| m.should_skip(chapter_id)) {
                log_state(chapter_id, ChapterState::Skipped);
                outcome.summary.mark_skipped_manifest();
                skipped += 1;
                continue;
            }
            if let Some(path) = self.exporters.existing_output(&title, chapter) {
                tracing::debug!("    Output exists: {}", path.display());
                log_state(chapter_id, ChapterState::Skipped);
                outcome.summary.mark_skipped_existing();
                skipped += 1;
                continue;
            }

            tracing::info!(
                "    {}/{}) Chapter {}: {}",
                position + 1,
                total_chapters,
                chapter.name,
                chapter.sub_title
            );
            if let Some(manifest) = manifest.as_mut() {
                manifest.record_start(chapter_id, &chapter.name, &chapter.sub_title)?;
            }

            match self
                .process_chapter(&title, chapter, plan.blocks.get(&chapter_id))
                .await
            {
                Ok(path) => {
                    log_state(chapter_id, ChapterState::Completed);
                    outcome.summary.mark_downloaded();
                    if let Some(manifest) = manifest.as_mut() {
                        manifest.record_success(chapter_id, Some(&path))?;
                    }
                }
                Err(e) => {
                    log_state(chapter_id, ChapterState::Failed);
                    if e.kind() == ErrorKind::Export {
                        tracing::error!("    Failed to write chapter {}: {}", chapter_id, e);
                    } else {
                        tracing::error!("    Failed chapter {}: {}", chapter_id, e);
                    }
                    outcome.summary.mark_failed(chapter_id, &e);
                    if let Some(manifest) = manifest.as_mut() {
                        manifest.record_failure(chapter_id, &e.to_string())?;
                    }
                }
            }
        }

        if skipped > 0 {
            tracing::info!(
                "    Skipped {} chapter(s) already downloaded for '{}'",
                skipped,
                title.name
            );
        }
        Ok(())
    }

    async fn process_chapter(
        &self,
        title: &TitleDetail,
        chapter: &ChapterSummary,
        prefetched: Option<&PageBlock>,
    ) -> Result<PathBuf> {
        let chapter_id = chapter.chapter_id;

        log_state(chapter_id, ChapterState::Fetching);
        let block = match prefetched {
            Some(block) => block.clone(),
            None => self.fetch_viewer(chapter_id).await?,
        };
        if !block.is_complete() {
            return Err(Error::Upstream {
                code: 403,
                message: SUBSCRIPTION_REQUIRED.to_string(),
            });
        }

        let mut exporter = self
            .exporters
            .create(title, chapter)
            .map_err(Error::into_export)?;

        let bar = create_item_bar(
            block.pages.len() as u64,
            &block.chapter_name,
            self.show_progress,
        );
        let fetched = self.fetch_pages(&block, &*exporter, &bar).await;
        bar.finish_and_clear();
        let fetched = fetched?;

        log_state(chapter_id, ChapterState::Decoding);
        let pages = fetched
            .into_iter()
            .map(|(index, key, data)| match key {
                Some(key) => decrypt(&data, key).map(|data| (index, data)),
                None => Ok((index, data)),
            })
            .collect::<Result<Vec<_>>>()?;

        log_state(chapter_id, ChapterState::Exporting);
        for (index, data) in &pages {
            exporter
                .add_image(data, *index)
                .map_err(Error::into_export)?;
        }
        exporter.close().map_err(Error::into_export)
    }

    /// Download the images the exporter does not already have. Skipped pages
    /// keep their index, so later pages are named as in a full download.
    async fn fetch_pages<'b>(
        &self,
        block: &'b PageBlock,
        exporter: &dyn Exporter,
        bar: &ProgressBar,
    ) -> Result<Vec<(PageIndex, Option<&'b str>, Vec<u8>)>> {
        let indices = assign_page_indices(&block.pages);
        let mut fetched = Vec::with_capacity(block.pages.len());

        for (page, index) in block.pages.iter().zip(indices) {
            if !exporter.skip_image(index) {
                let data = self
                    .retry
                    .run("page image", || self.api.fetch_image(&page.image_url))
                    .await?;
                fetched.push((index, page.encryption_key.as_deref(), data));
            }
            bar.inc(1);
        }

        Ok(fetched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OutputFormat, Quality};
    use crate::download::manifest::ChapterStatus;
    use crate::export::FormatExporterFactory;
    use crate::manga::{PageDescriptor, PageLayout};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    const TITLE_ID: u32 = 100017;

    #[derive(Default)]
    struct FakeApi {
        titles: HashMap<u32, TitleDetail>,
        viewers: HashMap<u32, PageBlock>,
        unavailable: HashSet<u32>,
        transient_image_failures: AtomicUsize,
        title_calls: AtomicUsize,
        viewer_calls: AtomicUsize,
        image_calls: AtomicUsize,
    }

    impl FakeApi {
        fn viewer_calls(&self) -> usize {
            self.viewer_calls.load(Ordering::SeqCst)
        }

        fn image_calls(&self) -> usize {
            self.image_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MangaApi for FakeApi {
        async fn fetch_title_detail(&self, title_id: u32) -> Result<TitleDetail> {
            self.title_calls.fetch_add(1, Ordering::SeqCst);
            self.titles.get(&title_id).cloned().ok_or(Error::Upstream {
                code: 404,
                message: "no such title".into(),
            })
        }

        async fn fetch_chapter_viewer(
            &self,
            chapter_id: u32,
            _quality: Quality,
            _split: bool,
        ) -> Result<PageBlock> {
            self.viewer_calls.fetch_add(1, Ordering::SeqCst);
            if self.unavailable.contains(&chapter_id) {
                return Err(Error::Upstream {
                    code: 404,
                    message: "chapter unavailable".into(),
                });
            }
            self.viewers
                .get(&chapter_id)
                .cloned()
                .ok_or(Error::Decode("no viewer".into()))
        }

        async fn fetch_image(&self, url: &str) -> Result<Vec<u8>> {
            self.image_calls.fetch_add(1, Ordering::SeqCst);
            let pending = self.transient_image_failures.load(Ordering::SeqCst);
            if pending > 0 {
                self.transient_image_failures
                    .store(pending - 1, Ordering::SeqCst);
                return Err(Error::Transient("connection reset".into()));
            }
            Ok(url.as_bytes().to_vec())
        }
    }

    fn chapter(chapter_id: u32, number: u32) -> ChapterSummary {
        ChapterSummary {
            chapter_id,
            title_id: TITLE_ID,
            name: format!("#{:03}", number),
            sub_title: format!("Chapter {}", number),
            position: number as usize - 1,
            ..Default::default()
        }
    }

    fn block(chapter: &ChapterSummary, encryption_key: Option<&str>) -> PageBlock {
        let page = |n: usize, layout: PageLayout| PageDescriptor {
            image_url: format!("https://img.example/{}/{}.jpg", chapter.chapter_id, n),
            layout,
            encryption_key: encryption_key.map(str::to_string),
            ..Default::default()
        };
        PageBlock {
            title_id: TITLE_ID,
            chapter_id: chapter.chapter_id,
            title_name: "One Piece".into(),
            chapter_name: chapter.name.clone(),
            pages: vec![page(0, PageLayout::Single), page(1, PageLayout::Double)],
            chapters: Vec::new(),
            current_chapter: Some(chapter.clone()),
            next_chapter: None,
        }
    }

    /// Title with chapters 1..=3; `broken` gets an undecodable page key.
    fn fake_api(broken: Option<u32>) -> FakeApi {
        let chapters: Vec<ChapterSummary> = (1..=3).map(|n| chapter(n, n)).collect();
        let mut api = FakeApi::default();
        for chapter in &chapters {
            let key = (broken == Some(chapter.chapter_id)).then_some("zz");
            api.viewers.insert(chapter.chapter_id, block(chapter, key));
        }
        api.titles.insert(
            TITLE_ID,
            TitleDetail {
                title_id: TITLE_ID,
                name: "One Piece".into(),
                author: "Eiichiro Oda".into(),
                chapters,
                ..Default::default()
            },
        );
        api
    }

    fn config(out_dir: &Path, format: OutputFormat) -> Config {
        let mut config = Config::default();
        config.options.out_dir = out_dir.to_path_buf();
        config.options.format = format;
        config.options.show_progress = false;
        config
    }

    async fn run(api: &FakeApi, config: &Config, units: &[WorkUnit]) -> RunOutcome {
        let factory = FormatExporterFactory::from_config(config);
        Downloader::new(api, &factory, config)
            .with_retry_policy(RetryPolicy::immediate(2))
            .run(units)
            .await
    }

    fn title_dir(out: &TempDir) -> PathBuf {
        out.path().join("One Piece")
    }

    #[tokio::test]
    async fn test_failed_chapter_does_not_stop_siblings() {
        let out = TempDir::new().unwrap();
        let api = fake_api(Some(2));
        let config = config(out.path(), OutputFormat::Cbz);

        let outcome = run(&api, &config, &[WorkUnit::Title(TITLE_ID)]).await;

        assert_eq!(outcome.summary.downloaded, 2);
        assert_eq!(outcome.summary.failed, 1);
        assert_eq!(outcome.summary.failed_chapter_ids, vec![2]);
        assert_eq!(outcome.summary.failures[0].kind, ErrorKind::Decode);
        assert!(outcome.title_failures.is_empty());

        let manifest = Manifest::load(&title_dir(&out));
        assert_eq!(manifest.entry(1).unwrap().status, ChapterStatus::Completed);
        assert_eq!(manifest.entry(2).unwrap().status, ChapterStatus::Failed);
        assert_eq!(manifest.entry(3).unwrap().status, ChapterStatus::Completed);

        // The failed chapter left no archive behind.
        let archives = std::fs::read_dir(title_dir(&out))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "cbz"))
            .count();
        assert_eq!(archives, 2);
    }

    #[tokio::test]
    async fn test_resume_skips_completed_chapters_without_fetching() {
        let out = TempDir::new().unwrap();
        let api = fake_api(None);
        let config = config(out.path(), OutputFormat::Raw);

        let first = run(&api, &config, &[WorkUnit::Title(TITLE_ID)]).await;
        assert_eq!(first.summary.downloaded, 3);
        let (viewers, images) = (api.viewer_calls(), api.image_calls());
        assert_eq!(viewers, 3);
        assert_eq!(images, 6);

        let second = run(&api, &config, &[WorkUnit::Title(TITLE_ID)]).await;
        assert_eq!(second.summary.skipped_manifest, 3);
        assert_eq!(second.summary.downloaded, 0);
        assert_eq!(api.viewer_calls(), viewers);
        assert_eq!(api.image_calls(), images);
    }

    #[tokio::test]
    async fn test_manifest_reset_fetches_everything_again() {
        let out = TempDir::new().unwrap();
        let api = fake_api(None);
        let mut config = config(out.path(), OutputFormat::Raw);

        run(&api, &config, &[WorkUnit::Title(TITLE_ID)]).await;
        let viewers = api.viewer_calls();

        config.options.manifest_reset = true;
        let outcome = run(&api, &config, &[WorkUnit::Title(TITLE_ID)]).await;
        assert_eq!(outcome.summary.skipped_manifest, 0);
        assert_eq!(api.viewer_calls(), viewers * 2);
    }

    #[tokio::test]
    async fn test_transient_image_failure_is_retried() {
        let out = TempDir::new().unwrap();
        let api = fake_api(None);
        api.transient_image_failures.store(2, Ordering::SeqCst);
        let config = config(out.path(), OutputFormat::Raw);

        let outcome = run(&api, &config, &[WorkUnit::Title(TITLE_ID)]).await;
        assert_eq!(outcome.summary.downloaded, 3);
        assert_eq!(api.image_calls(), 6 + 2);
    }

    #[tokio::test]
    async fn test_upstream_error_is_not_retried() {
        let out = TempDir::new().unwrap();
        let mut api = fake_api(None);
        api.unavailable.insert(3);
        let config = config(out.path(), OutputFormat::Raw);

        let outcome = run(&api, &config, &[WorkUnit::Title(TITLE_ID)]).await;
        assert_eq!(outcome.summary.downloaded, 2);
        assert_eq!(outcome.summary.failed_chapter_ids, vec![3]);
        assert_eq!(outcome.summary.failures[0].kind, ErrorKind::Upstream);
        assert_eq!(api.viewer_calls(), 3);
    }

    #[tokio::test]
    async fn test_missing_last_page_requires_subscription() {
        let out = TempDir::new().unwrap();
        let mut api = fake_api(None);
        if let Some(block) = api.viewers.get_mut(&1) {
            block.current_chapter = None;
        }
        let config = config(out.path(), OutputFormat::Raw);

        let outcome = run(&api, &config, &[WorkUnit::Title(TITLE_ID)]).await;
        assert_eq!(outcome.summary.failed_chapter_ids, vec![1]);
        assert!(outcome.summary.failures[0].message.contains("MAX subscription"));
    }

    #[tokio::test]
    async fn test_existing_output_is_skipped_before_network() {
        let out = TempDir::new().unwrap();
        let api = fake_api(None);
        let config = config(out.path(), OutputFormat::Cbz);
        std::fs::create_dir_all(title_dir(&out)).unwrap();
        std::fs::write(
            title_dir(&out).join("One Piece - 001 - Chapter 1.cbz"),
            b"existing",
        )
        .unwrap();

        let outcome = run(&api, &config, &[WorkUnit::Title(TITLE_ID)]).await;
        assert_eq!(outcome.summary.skipped_existing, 1);
        assert_eq!(outcome.summary.downloaded, 2);
        assert_eq!(api.viewer_calls(), 2);
    }

    #[tokio::test]
    async fn test_chapter_units_resolve_to_their_title() {
        let out = TempDir::new().unwrap();
        let api = fake_api(None);
        let config = config(out.path(), OutputFormat::Raw);

        let outcome = run(
            &api,
            &config,
            &[WorkUnit::Chapter(3), WorkUnit::Chapter(1)],
        )
        .await;
        assert_eq!(outcome.summary.downloaded, 2);
        // Viewer responses from planning are reused for the download.
        assert_eq!(api.viewer_calls(), 2);
        assert_eq!(api.title_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_range_and_last_filter_title_expansion() {
        let out = TempDir::new().unwrap();
        let api = fake_api(None);
        let mut config = config(out.path(), OutputFormat::Raw);
        config.options.begin = 2;

        let outcome = run(&api, &config, &[WorkUnit::Title(TITLE_ID)]).await;
        assert_eq!(outcome.summary.downloaded, 2);

        let out = TempDir::new().unwrap();
        let mut config = self::config(out.path(), OutputFormat::Raw);
        config.options.last = true;
        let outcome = run(&api, &config, &[WorkUnit::Title(TITLE_ID)]).await;
        assert_eq!(outcome.summary.downloaded, 1);
        assert_eq!(
            Manifest::load(&title_dir(&out)).entry(3).unwrap().status,
            ChapterStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_unknown_title_is_a_title_failure() {
        let out = TempDir::new().unwrap();
        let api = fake_api(None);
        let config = config(out.path(), OutputFormat::Raw);

        let outcome = run(&api, &config, &[WorkUnit::Title(1)]).await;
        assert_eq!(outcome.title_failures.len(), 1);
        assert_eq!(outcome.title_failures[0].kind, ErrorKind::Upstream);
        assert_eq!(outcome.exit_code(), crate::error::exit_codes::EXTERNAL_FAILURE);
    }

    #[tokio::test]
    async fn test_cancel_flag_stops_before_next_chapter() {
        let out = TempDir::new().unwrap();
        let api = fake_api(None);
        let config = config(out.path(), OutputFormat::Raw);
        let factory = FormatExporterFactory::from_config(&config);

        let outcome = Downloader::new(&api, &factory, &config)
            .with_cancel_flag(Arc::new(AtomicBool::new(true)))
            .run(&[WorkUnit::Title(TITLE_ID)])
            .await;
        assert!(outcome.interrupted);
        assert_eq!(outcome.summary.total(), 0);
        assert_eq!(api.viewer_calls(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_listing_entry_is_downloaded_once() {
        let out = TempDir::new().unwrap();
        let mut api = fake_api(None);
        if let Some(title) = api.titles.get_mut(&TITLE_ID) {
            title.chapters.push(chapter(3, 3));
        }
        let config = config(out.path(), OutputFormat::Raw);

        let outcome = run(&api, &config, &[WorkUnit::Title(TITLE_ID)]).await;
        assert_eq!(outcome.summary.downloaded, 3);
        assert_eq!(outcome.summary.skipped_manifest, 0);
        assert_eq!(api.viewer_calls(), 3);
    }

    #[tokio::test]
    async fn test_unreleased_chapters_are_not_expanded() {
        let out = TempDir::new().unwrap();
        let mut api = fake_api(None);
        if let Some(title) = api.titles.get_mut(&TITLE_ID) {
            title.chapters[2].start_timestamp = u32::MAX;
        }
        let config = config(out.path(), OutputFormat::Raw);

        let outcome = run(&api, &config, &[WorkUnit::Title(TITLE_ID)]).await;
        assert_eq!(outcome.summary.downloaded, 2);
        assert_eq!(api.viewer_calls(), 2);
    }

    #[tokio::test]
    async fn test_unwritable_manifest_keeps_chapter_in_summary() {
        let out = TempDir::new().unwrap();
        let api = fake_api(None);
        let config = config(out.path(), OutputFormat::Raw);
        std::fs::create_dir_all(title_dir(&out).join(crate::download::MANIFEST_FILENAME))
            .unwrap();

        let outcome = run(&api, &config, &[WorkUnit::Title(TITLE_ID)]).await;
        assert_eq!(outcome.summary.downloaded, 1);
        assert_eq!(outcome.summary.total(), 1);
        assert_eq!(outcome.title_failures.len(), 1);
        assert_eq!(outcome.title_failures[0].title_id, TITLE_ID);
        assert!(!outcome.is_success());
    }

    #[tokio::test]
    async fn test_existing_spread_keeps_page_numbering() {
        let out = TempDir::new().unwrap();
        let mut api = fake_api(None);
        let first = chapter(1, 1);
        let mut spread_block = block(&first, None);
        spread_block.pages.push(PageDescriptor {
            image_url: "https://img.example/1/2.jpg".into(),
            layout: PageLayout::Single,
            ..Default::default()
        });
        api.viewers.insert(1, spread_block);

        let mut config = config(out.path(), OutputFormat::Raw);
        config.options.end = Some(1);

        let dir = title_dir(&out);
        std::fs::create_dir_all(&dir).unwrap();
        let spread = dir.join("One Piece - 001 - p001-002 - Chapter 1.jpg");
        std::fs::write(&spread, b"existing").unwrap();

        let outcome = run(&api, &config, &[WorkUnit::Title(TITLE_ID)]).await;
        assert_eq!(outcome.summary.downloaded, 1);
        assert_eq!(api.image_calls(), 2);

        assert_eq!(
            std::fs::read(dir.join("One Piece - 001 - p000 - Chapter 1.jpg")).unwrap(),
            b"https://img.example/1/0.jpg"
        );
        assert_eq!(std::fs::read(&spread).unwrap(), b"existing");
        assert_eq!(
            std::fs::read(dir.join("One Piece - 001 - p003 - Chapter 1.jpg")).unwrap(),
            b"https://img.example/1/2.jpg"
        );
    }

    #[tokio::test]
    async fn test_cancel_flag_stops_chapter_resolution() {
        let out = TempDir::new().unwrap();
        let api = fake_api(None);
        let config = config(out.path(), OutputFormat::Raw);
        let factory = FormatExporterFactory::from_config(&config);

        let outcome = Downloader::new(&api, &factory, &config)
            .with_cancel_flag(Arc::new(AtomicBool::new(true)))
            .run(&[WorkUnit::Chapter(1), WorkUnit::Chapter(2)])
            .await;
        assert!(outcome.interrupted);
        assert_eq!(api.viewer_calls(), 0);
        assert_eq!(api.title_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_second_interrupt_is_reported() {
        let cancel = AtomicBool::new(false);
        assert!(!request_cancel(&cancel));
        assert!(cancel.load(Ordering::SeqCst));
        assert!(request_cancel(&cancel));
    }

    #[test]
    fn test_retry_gives_up_after_max_retries() {
        let policy = RetryPolicy::immediate(2);
        let calls = AtomicUsize::new(0);
        let result: Result<()> = tokio_test::block_on(policy.run("chapter viewer", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::Transient("timeout".into())) }
        }));
        assert!(matches!(result, Err(Error::Transient(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy::new(10);
        assert!(policy.delay(1) >= Duration::from_millis(500));
        assert!(policy.delay(1) <= Duration::from_millis(625));
        assert!(policy.delay(30) <= Duration::from_secs(10));
        assert_eq!(RetryPolicy::immediate(3).delay(3), Duration::ZERO);
    }
}
