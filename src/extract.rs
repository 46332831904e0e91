//! Generic listing and article-body extraction.
//!
//! The procedure shared by every HTML source:
//!
//! 1. Load the page (heavy subresources blocked) with a bounded timeout
//! 2. Dismiss common popups, best effort
//! 3. Wait briefly for the primary selector, then extract regardless
//! 4. Select primary matches, or scan all links when the source opts in
//! 5. Keep the first [`MAX_ITEMS`] candidates in DOM order
//! 6. Derive title, URL, recency and summary per candidate
//!
//! Steps 4-6 are pure functions over markup ([`extract_listing`]) so they can
//! be tested against fixtures and reused for static pages.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::{debug, info, instrument};
use url::Url;

use crate::config::ScraperConfig;
use crate::error::ScrapeError;
use crate::models::ScrapedItem;
use crate::render::{PageRenderer, RenderOptions, RenderedPage};
use crate::utils::{collapse_whitespace, format_recency, parse_timestamp, truncate_summary};

/// Upper bound on candidates examined per listing.
pub const MAX_ITEMS: usize = 15;

/// Dismissal controls tried on every rendered listing.
pub const POPUP_SELECTORS: [&str; 5] = [
    r#"button[aria-label="Close"]"#,
    ".close-button",
    "#close-popup",
    ".newsletter-modal .close",
    r#"div[class*="popup"] button"#,
];

/// Ordered article-body containers tried by [`extract_main_content`].
pub const CONTENT_SELECTORS: [&str; 10] = [
    "article",
    ".post-content",
    ".entry-content",
    ".article-body",
    ".article-content",
    ".post-body",
    "main article",
    r#"[role="main"]"#,
    ".story-body",
    ".content-body",
];

const FALLBACK_MIN_TEXT: usize = 30;
const BOILERPLATE: [&str; 2] = ["Read More", "Subscribe"];
const SUMMARY_MIN_CHARS: usize = 20;
const CONTAINER_MIN_CHARS: usize = 200;
const CONTAINER_SEARCH_DEPTH: usize = 6;
const ARTICLE_LIKE_CLASSES: [&str; 5] = ["post", "card", "story", "entry", "article"];
const SCROLL_PIXELS: i64 = 500;
const SCROLL_SETTLE: Duration = Duration::from_millis(1000);

static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
static ANY_ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a").unwrap());
static TIME: Lazy<Selector> = Lazy::new(|| Selector::parse("time").unwrap());
static PARAGRAPH: Lazy<Selector> = Lazy::new(|| Selector::parse("p").unwrap());
static BODY: Lazy<Selector> = Lazy::new(|| Selector::parse("body").unwrap());
static DESCRIPTION: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".description, .excerpt, .summary, .post-content").unwrap());
static RECENCY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+ (hour|minute|day)s? ago)|([A-Z][a-z]{2} \d{1,2}, \d{4})").unwrap()
});

/// How one listing page is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingSpec {
    /// Primary item selector.
    pub selector: &'static str,
    /// Scan every link when the primary selector finds nothing.
    pub fallback_scan: bool,
    /// Source-specific date element, tried before the generic search.
    pub time_selector: Option<&'static str>,
    /// Recency value used when nothing is found.
    pub time_filler: &'static str,
    /// Scroll before snapshotting to trigger lazy-loaded items.
    pub scroll: bool,
}

impl ListingSpec {
    pub const fn new(selector: &'static str) -> Self {
        Self {
            selector,
            fallback_scan: false,
            time_selector: None,
            time_filler: "Just now",
            scroll: false,
        }
    }

    pub const fn with_fallback_scan(mut self) -> Self {
        self.fallback_scan = true;
        self
    }

    pub const fn with_time(mut self, selector: &'static str, filler: &'static str) -> Self {
        self.time_selector = Some(selector);
        self.time_filler = filler;
        self
    }

    pub const fn with_scroll(mut self) -> Self {
        self.scroll = true;
        self
    }
}

/// Render `url` and extract its listing.
///
/// Popup dismissal, the selector wait and scrolling are best effort; only
/// loading and reading the page can fail.
///
/// # Arguments
///
/// * `renderer` - Backend that loads the page.
/// * `url` - Listing page address.
/// * `source` - Source name stamped on every item.
/// * `spec` - How the listing is read.
/// * `config` - Load timeout, selector wait and popup settle delay.
///
/// # Returns
///
/// Up to [`MAX_ITEMS`] items in page order, possibly none.
///
/// # Errors
///
/// Returns [`ScrapeError::LoadTimeout`] or [`ScrapeError::Navigation`] when
/// the page cannot be loaded, and [`ScrapeError::Selector`] for an invalid
/// `spec.selector`.
#[instrument(level = "info", skip(renderer, spec, config), fields(selector = spec.selector))]
pub async fn scrape_listing<R: PageRenderer>(
    renderer: &R,
    url: &str,
    source: &str,
    spec: &ListingSpec,
    config: &ScraperConfig,
) -> Result<Vec<ScrapedItem>, ScrapeError> {
    let options = RenderOptions::lightweight(config.page_load_timeout());
    let page = renderer.open(url, &options).await?;

    dismiss_popups(&page, config.popup_settle()).await;

    if !page.wait_for_selector(spec.selector, config.selector_wait()).await {
        info!(source, "Primary selector did not appear in time; extracting anyway");
    }

    if spec.scroll {
        if let Err(e) = page.scroll_by(SCROLL_PIXELS).await {
            debug!(error = %e, "Scroll failed (ignored)");
        }
        tokio::time::sleep(SCROLL_SETTLE).await;
    }

    let html = page.content().await;
    let base = page.url().to_string();
    page.close().await;

    extract_listing(&html?, &base, source, spec, Utc::now())
}

async fn dismiss_popups<P: RenderedPage>(page: &P, settle: Duration) {
    for selector in POPUP_SELECTORS {
        match page.click(selector).await {
            Ok(true) => {
                debug!(selector, "Dismissed popup");
                tokio::time::sleep(settle).await;
            }
            Ok(false) => {}
            Err(e) => debug!(selector, error = %e, "Popup dismissal failed (ignored)"),
        }
    }
}

/// Extract at most [`MAX_ITEMS`] items from listing markup.
///
/// # Arguments
///
/// * `html` - Listing page markup.
/// * `base_url` - Address relative links are resolved against.
/// * `source` - Source name stamped on every item.
/// * `spec` - Primary selector, fallback scan and date handling.
/// * `now` - Reference time for recency strings.
///
/// # Returns
///
/// Items in document order. Candidates without a usable link or title are
/// dropped.
///
/// # Errors
///
/// Returns [`ScrapeError::Selector`] if `spec.selector` is not valid CSS.
pub fn extract_listing(
    html: &str,
    base_url: &str,
    source: &str,
    spec: &ListingSpec,
    now: DateTime<Utc>,
) -> Result<Vec<ScrapedItem>, ScrapeError> {
    let selector =
        Selector::parse(spec.selector).map_err(|_| ScrapeError::Selector(spec.selector.to_string()))?;
    let base = Url::parse(base_url).ok();
    let document = Html::parse_document(html);

    let mut candidates: Vec<ElementRef> = document.select(&selector).collect();
    if candidates.is_empty() && spec.fallback_scan {
        candidates = document
            .select(&ANY_ANCHOR)
            .filter(|a| is_substantial_link(&visible_text(*a)))
            .collect();
        debug!(source, found = candidates.len(), "Primary selector empty; used link scan");
    }
    candidates.truncate(MAX_ITEMS);

    Ok(candidates
        .into_iter()
        .filter_map(|el| derive_item(el, base.as_ref(), source, spec, now))
        .collect())
}

fn is_substantial_link(text: &str) -> bool {
    text.chars().count() > FALLBACK_MIN_TEXT && !BOILERPLATE.iter().any(|b| text.contains(b))
}

fn derive_item(
    el: ElementRef,
    base: Option<&Url>,
    source: &str,
    spec: &ListingSpec,
    now: DateTime<Utc>,
) -> Option<ScrapedItem> {
    let anchor = if el.value().name() == "a" {
        el
    } else {
        el.select(&ANCHOR).next()?
    };
    let url = resolve_url(base, anchor.value().attr("href")?)?;

    let mut title = visible_text(el);
    if title.is_empty() {
        title = visible_text(anchor);
    }
    if title.is_empty() {
        return None;
    }

    let container = item_container(el);
    let time = container
        .and_then(|c| derive_time(c, spec, now))
        .unwrap_or_else(|| spec.time_filler.to_string());
    let summary = container
        .and_then(|c| derive_summary(c, &title))
        .map(|s| truncate_summary(&s))
        .unwrap_or_default();

    Some(ScrapedItem {
        title,
        url,
        source: source.to_string(),
        time,
        summary,
    })
}

/// Absolute http(s) URL for `href`, or `None`.
fn resolve_url(base: Option<&Url>, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let resolved = match base {
        Some(base) => base.join(href).ok()?,
        None => Url::parse(href).ok()?,
    };
    matches!(resolved.scheme(), "http" | "https").then(|| resolved.to_string())
}

/// Nearest `<article>` ancestor, else the nearest article-like block, else
/// the direct parent.
fn item_container(el: ElementRef) -> Option<ElementRef> {
    let ancestors = || el.ancestors().filter_map(ElementRef::wrap);
    ancestors()
        .find(|a| a.value().name() == "article")
        .or_else(|| {
            ancestors()
                .take(CONTAINER_SEARCH_DEPTH)
                .find(|a| !is_heading(*a) && is_article_like(*a))
        })
        .or_else(|| el.parent().and_then(ElementRef::wrap))
}

fn is_heading(el: ElementRef) -> bool {
    matches!(el.value().name(), "h1" | "h2" | "h3" | "h4" | "h5" | "h6")
}

fn is_article_like(el: ElementRef) -> bool {
    el.value().classes().any(|class| {
        let class = class.to_ascii_lowercase();
        ARTICLE_LIKE_CLASSES.iter().any(|c| class.contains(c))
    })
}

fn derive_time(container: ElementRef, spec: &ListingSpec, now: DateTime<Utc>) -> Option<String> {
    if let Some(custom) = spec.time_selector.and_then(|s| Selector::parse(s).ok()) {
        if let Some(text) = container
            .select(&custom)
            .map(visible_text)
            .find(|t| !t.is_empty())
        {
            return Some(text);
        }
    }

    if let Some(time_el) = container.select(&TIME).next() {
        if let Some(raw) = time_el.value().attr("datetime").map(str::trim) {
            if let Some(ts) = parse_timestamp(raw) {
                return Some(format_recency(ts, now));
            }
            if !raw.is_empty() {
                return Some(raw.to_string());
            }
        }
        let text = visible_text(time_el);
        if !text.is_empty() {
            return Some(text);
        }
    }

    RECENCY_RE
        .find(&visible_text(container))
        .map(|m| m.as_str().to_string())
}

fn derive_summary(container: ElementRef, title: &str) -> Option<String> {
    let paragraph = container
        .select(&PARAGRAPH)
        .map(visible_text)
        .find(|p| !p.is_empty() && p != title && p.chars().count() > SUMMARY_MIN_CHARS);
    paragraph.or_else(|| {
        container
            .select(&DESCRIPTION)
            .map(visible_text)
            .find(|d| !d.is_empty())
    })
}

/// Whitespace-collapsed text of `el`, skipping script and style subtrees.
pub fn visible_text(el: ElementRef) -> String {
    text_excluding(el, &["script", "style", "noscript"])
}

fn text_excluding(el: ElementRef, excluded: &[&str]) -> String {
    let mut parts = Vec::new();
    for node in el.descendants() {
        if let Node::Text(text) = node.value() {
            let hidden = node.ancestors().any(|ancestor| {
                ancestor
                    .value()
                    .as_element()
                    .map(|e| excluded.contains(&e.name()))
                    .unwrap_or(false)
            });
            if !hidden {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    parts.push(trimmed);
                }
            }
        }
    }
    collapse_whitespace(&parts.join(" "))
}

/// Main body text of an article page.
///
/// The first [`CONTENT_SELECTORS`] match with more than 200 characters wins;
/// otherwise the whole body minus navigation, footer and scripts is used.
pub fn extract_main_content(html: &str) -> String {
    let document = Html::parse_document(html);

    for raw in CONTENT_SELECTORS {
        let Ok(selector) = Selector::parse(raw) else {
            continue;
        };
        if let Some(text) = document
            .select(&selector)
            .map(visible_text)
            .find(|t| t.chars().count() > CONTAINER_MIN_CHARS)
        {
            debug!(selector = raw, chars = text.chars().count(), "Matched content container");
            return text;
        }
    }

    document
        .select(&BODY)
        .next()
        .map(|body| text_excluding(body, &["nav", "footer", "script", "style", "noscript"]))
        .unwrap_or_default()
}
