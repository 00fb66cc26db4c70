//! Headless browser rendering for list pages that build their links in script.

use std::sync::Mutex;
use std::time::Duration;

use headless_chrome::{Browser, LaunchOptions};

use crate::error::{Error, Result};

/// Lazily launched headless Chrome, shared by every rendered page.
pub struct BrowserRenderer {
    browser: Mutex<Option<Browser>>,
    timeout: Duration,
}

impl BrowserRenderer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            browser: Mutex::new(None),
            timeout,
        }
    }

    fn cached(&self) -> Result<Option<Browser>> {
        let guard = self
            .browser
            .lock()
            .map_err(|_| Error::Internal("Browser lock poisoned".to_string()))?;
        Ok(guard.clone())
    }

    async fn browser(&self) -> Result<Browser> {
        if let Some(browser) = self.cached()? {
            return Ok(browser);
        }

        let timeout = self.timeout;
        let browser = tokio::task::spawn_blocking(move || launch(timeout))
            .await
            .map_err(|e| Error::Internal(format!("Browser task failed: {}", e)))??;

        let mut guard = self
            .browser
            .lock()
            .map_err(|_| Error::Internal("Browser lock poisoned".to_string()))?;
        Ok(guard.get_or_insert(browser).clone())
    }

    /// Load `url`, wait for navigation to settle and return the resulting DOM.
    pub async fn render(&self, url: &str) -> Result<String> {
        let browser = self.browser().await?;
        let url = url.to_string();
        let timeout = self.timeout;

        tokio::task::spawn_blocking(move || render_blocking(&browser, &url, timeout))
            .await
            .map_err(|e| Error::Internal(format!("Browser task failed: {}", e)))?
    }
}

fn launch(timeout: Duration) -> Result<Browser> {
    tracing::debug!("Launching headless browser");
    let options = LaunchOptions::default_builder()
        .headless(true)
        .idle_browser_timeout(timeout.saturating_mul(4))
        .build()
        .map_err(|e| Error::Discovery(format!("Browser configuration error: {}", e)))?;

    Browser::new(options).map_err(|e| Error::Discovery(format!("Browser launch failed: {}", e)))
}

fn render_error(url: &str, e: impl std::fmt::Display) -> Error {
    Error::Discovery(format!("Rendering {} failed: {}", url, e))
}

fn render_blocking(browser: &Browser, url: &str, timeout: Duration) -> Result<String> {
    let tab = browser.new_tab().map_err(|e| render_error(url, e))?;
    tab.set_default_timeout(timeout);
    tab.navigate_to(url)
        .and_then(|tab| tab.wait_until_navigated())
        .map_err(|e| render_error(url, e))?;
    let html = tab.get_content().map_err(|e| render_error(url, e))?;

    if let Err(e) = tab.close(true) {
        tracing::debug!("Failed to close browser tab: {}", e);
    }
    Ok(html)
}
