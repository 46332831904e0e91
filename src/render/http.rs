//! Plain HTTP renderer and the shared fetch helper.
//!
//! Used for static HTML sources, feeds, and as the default page renderer when
//! the `chromium` feature is off. No scripts run, so only markup present in
//! the server response is visible.

use reqwest::Client;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{debug, instrument};

use super::{PageRenderer, RenderOptions, RenderedPage, USER_AGENT};
use crate::error::ScrapeError;

/// Build the HTTP client shared by feeds, static pages and this renderer.
pub fn build_client() -> Result<Client, ScrapeError> {
    Ok(Client::builder().user_agent(USER_AGENT).build()?)
}

/// GET `url` and return `(final_url, body)`.
#[instrument(level = "debug", skip(client))]
pub async fn fetch_text(
    client: &Client,
    url: &str,
    timeout: Duration,
) -> Result<(String, String), ScrapeError> {
    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| classify(e, timeout))?;

    let status = response.status();
    if !status.is_success() {
        return Err(ScrapeError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }
    let final_url = response.url().to_string();
    let body = response.text().await.map_err(|e| classify(e, timeout))?;
    debug!(bytes = body.len(), %final_url, "Fetched document");
    Ok((final_url, body))
}

fn classify(e: reqwest::Error, timeout: Duration) -> ScrapeError {
    if e.is_timeout() {
        ScrapeError::LoadTimeout(timeout.as_millis() as u64)
    } else if e.is_connect() || e.is_redirect() {
        ScrapeError::Navigation(e.to_string())
    } else {
        ScrapeError::Http(e)
    }
}

#[derive(Debug, Clone)]
pub struct HttpRenderer {
    client: Client,
}

impl HttpRenderer {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl PageRenderer for HttpRenderer {
    type Page = StaticPage;

    async fn open(&self, url: &str, options: &RenderOptions) -> Result<StaticPage, ScrapeError> {
        debug!(url, blocked = ?options.blocked, "Plain fetch; subresources are never requested");
        let (final_url, html) = fetch_text(&self.client, url, options.load_timeout).await?;
        Ok(StaticPage::new(final_url, html))
    }

    async fn shutdown(&self) {}
}

/// A fetched document with no live DOM behind it.
#[derive(Debug, Clone)]
pub struct StaticPage {
    url: String,
    html: String,
}

impl StaticPage {
    pub fn new(url: String, html: String) -> Self {
        Self { url, html }
    }

    fn matches(&self, selector: &str) -> bool {
        match Selector::parse(selector) {
            Ok(sel) => Html::parse_document(&self.html).select(&sel).next().is_some(),
            Err(_) => false,
        }
    }
}

impl RenderedPage for StaticPage {
    async fn wait_for_selector(&self, selector: &str, _timeout: Duration) -> bool {
        self.matches(selector)
    }

    async fn click(&self, _selector: &str) -> Result<bool, ScrapeError> {
        Ok(false)
    }

    async fn scroll_by(&self, _pixels: i64) -> Result<(), ScrapeError> {
        Ok(())
    }

    async fn content(&self) -> Result<String, ScrapeError> {
        Ok(self.html.clone())
    }

    fn url(&self) -> &str {
        &self.url
    }

    async fn close(self) {}
}
