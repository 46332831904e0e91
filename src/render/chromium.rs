//! Headless Chromium renderer (`chromium` feature).
//!
//! In [`SessionMode::Shared`] one browser is kept for the life of the daemon
//! and relaunched when its connection handler has exited. In
//! [`SessionMode::PerCall`] every `open` launches a fresh browser that is torn
//! down with the page.

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{EnableParams, SetBlockedUrLsParams};
use chromiumoxide::Page;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{PageRenderer, RenderOptions, RenderedPage, ResourceType, USER_AGENT};
use crate::error::ScrapeError;

const CHROME_ARGS: [&str; 5] = [
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--disable-extensions",
    "--disable-background-networking",
    "--no-first-run",
];

const SELECTOR_POLL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    Shared,
    PerCall,
}

struct Session {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl Session {
    async fn launch() -> Result<Self, ScrapeError> {
        info!("Launching headless browser");
        let config = BrowserConfig::builder()
            .no_sandbox()
            .args(CHROME_ARGS)
            .build()
            .map_err(ScrapeError::Render)?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| ScrapeError::Render(e.to_string()))?;
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });
        Ok(Self { browser, handler })
    }

    fn is_connected(&self) -> bool {
        !self.handler.is_finished()
    }

    async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!(error = %e, "Browser close failed");
        }
        let _ = self.browser.wait().await;
        self.handler.abort();
        debug!("Browser closed");
    }
}

pub struct ChromiumRenderer {
    mode: SessionMode,
    shared: Arc<Mutex<Option<Session>>>,
}

impl ChromiumRenderer {
    pub fn new(mode: SessionMode) -> Self {
        Self {
            mode,
            shared: Arc::new(Mutex::new(None)),
        }
    }

    async fn shared_page(&self) -> Result<Page, ScrapeError> {
        let mut slot = self.shared.lock().await;
        let stale = slot.as_ref().map(|s| !s.is_connected()).unwrap_or(true);
        if stale {
            if let Some(old) = slot.take() {
                warn!("Browser disconnected; relaunching");
                old.close().await;
            }
            *slot = Some(Session::launch().await?);
        }
        match slot.as_ref() {
            Some(session) => session
                .browser
                .new_page("about:blank")
                .await
                .map_err(|e| ScrapeError::Render(e.to_string())),
            None => Err(ScrapeError::Render("browser session unavailable".into())),
        }
    }
}

fn block_patterns(resources: &[ResourceType]) -> Vec<String> {
    resources
        .iter()
        .flat_map(|r| match r {
            ResourceType::Image => &["*.png", "*.jpg", "*.jpeg", "*.gif", "*.webp", "*.svg", "*.ico"][..],
            ResourceType::Stylesheet => &["*.css"][..],
            ResourceType::Font => &["*.woff", "*.woff2", "*.ttf", "*.otf"][..],
            ResourceType::Media => &["*.mp4", "*.webm", "*.mp3", "*.m3u8"][..],
            ResourceType::Document | ResourceType::Script => &[][..],
        })
        .map(|p| p.to_string())
        .collect()
}

async fn prepare(page: &Page, url: &str, options: &RenderOptions) -> Result<(), ScrapeError> {
    let cdp = |e: chromiumoxide::error::CdpError| ScrapeError::Render(e.to_string());
    page.set_user_agent(USER_AGENT).await.map_err(cdp)?;
    let patterns = block_patterns(&options.effective_blocklist());
    if !patterns.is_empty() {
        page.execute(EnableParams::default()).await.map_err(cdp)?;
        page.execute(SetBlockedUrLsParams::new(patterns)).await.map_err(cdp)?;
    }
    match tokio::time::timeout(options.load_timeout, page.goto(url)).await {
        Err(_) => Err(ScrapeError::LoadTimeout(options.load_timeout.as_millis() as u64)),
        Ok(Err(e)) => Err(ScrapeError::Navigation(e.to_string())),
        Ok(Ok(_)) => Ok(()),
    }
}

impl PageRenderer for ChromiumRenderer {
    type Page = ChromiumPage;

    async fn open(&self, url: &str, options: &RenderOptions) -> Result<ChromiumPage, ScrapeError> {
        let (page, owned) = match self.mode {
            SessionMode::Shared => (self.shared_page().await?, None),
            SessionMode::PerCall => {
                let session = Session::launch().await?;
                let page = session
                    .browser
                    .new_page("about:blank")
                    .await
                    .map_err(|e| ScrapeError::Render(e.to_string()))?;
                (page, Some(session))
            }
        };

        if let Err(e) = prepare(&page, url, options).await {
            let _ = page.close().await;
            if let Some(session) = owned {
                session.close().await;
            }
            return Err(e);
        }

        Ok(ChromiumPage {
            page,
            url: url.to_string(),
            owned,
        })
    }

    async fn shutdown(&self) {
        if let Some(session) = self.shared.lock().await.take() {
            info!("Closing browser");
            session.close().await;
        }
    }
}

pub struct ChromiumPage {
    page: Page,
    url: String,
    owned: Option<Session>,
}

impl RenderedPage for ChromiumPage {
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(SELECTOR_POLL).await;
        }
    }

    async fn click(&self, selector: &str) -> Result<bool, ScrapeError> {
        match self.page.find_element(selector).await {
            Ok(element) => {
                element
                    .click()
                    .await
                    .map_err(|e| ScrapeError::Render(e.to_string()))?;
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    async fn scroll_by(&self, pixels: i64) -> Result<(), ScrapeError> {
        self.page
            .evaluate(format!("window.scrollBy(0, {pixels})"))
            .await
            .map(|_| ())
            .map_err(|e| ScrapeError::Render(e.to_string()))
    }

    async fn content(&self) -> Result<String, ScrapeError> {
        self.page
            .content()
            .await
            .map_err(|e| ScrapeError::Render(e.to_string()))
    }

    fn url(&self) -> &str {
        &self.url
    }

    async fn close(self) {
        if let Err(e) = self.page.close().await {
            debug!(error = %e, url = %self.url, "Page close failed");
        }
        if let Some(session) = self.owned {
            session.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_patterns_skip_document_and_script() {
        let patterns = block_patterns(&[ResourceType::Stylesheet, ResourceType::Script]);
        assert_eq!(patterns, vec!["*.css".to_string()]);
    }
}
