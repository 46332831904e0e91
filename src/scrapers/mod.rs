//! News source registry and adapters.
//!
//! Every source is a declarative [`SourceEntry`]; one generic adapter per
//! [`SourceKind`] turns an entry into a [`SourceResult`]. Adapters never
//! return errors: fetch and render failures become `error` results.
//!
//! # Supported Sources
//!
//! | Source | Sector | Weight | Method | Notes |
//! |--------|--------|--------|--------|-------|
//! | CPP Luxury | luxury | 2 | Static HTML | Date from `.date` |
//! | Jing Daily | luxury | 2 | Rendered | Link-scan fallback when markup changes |
//! | PurseBlog | luxury | 2 | Rendered | Secondary selector; scrolls for lazy items |
//! | PurseBlog Forum | luxury | 1 | Rendered | XenForo "hot" feed |
//! | Luxury Fallback | luxury | 1 | Google News search | 10 items |
//! | Lithosgraphein | semiconductors | 3 | Substack RSS | |
//! | SemiAnalysis | semiconductors | 2 | Rendered | |
//! | Fabricated Knowledge | semiconductors | 2 | Rendered | |
//! | Asianometry | semiconductors | 1 | Rendered | YouTube channel videos |
//! | More Than Moore | semiconductors | 2 | Rendered | |
//! | Hacker News | semiconductors | 3 | RSS | hnrss front page |
//! | TechCrunch | semiconductors | 2 | RSS | |
//! | Ars Technica | semiconductors | 2 | RSS | Technology Lab |
//! | Tech News | semiconductors | 1 | Google News search | 10 items |
//!
//! Registry order is the batch traversal order.

use chrono::Utc;
use reqwest::Client;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

use crate::config::ScraperConfig;
use crate::error::{InitError, ScrapeError};
use crate::extract::{self, ListingSpec};
use crate::models::{ScrapedItem, Sector, SourceResult};
use crate::render::http::fetch_text;
use crate::render::PageRenderer;

pub mod feed;

pub use feed::FeedSpec;

/// A listing page and how to read it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingTarget {
    pub url: &'static str,
    pub spec: ListingSpec,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    /// Rendered page; `secondary` is tried only when `primary` yields nothing.
    Rendered {
        primary: ListingTarget,
        secondary: Option<ListingTarget>,
    },
    /// Server-rendered page fetched over plain HTTP.
    StaticHtml(ListingTarget),
    /// RSS feed.
    Feed(FeedSpec),
}

/// One registered source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    pub name: &'static str,
    pub sector: Sector,
    /// Relative pick weight in continuous mode. Always positive.
    pub weight: u32,
    pub kind: SourceKind,
}

const fn rendered(url: &'static str, spec: ListingSpec) -> SourceKind {
    SourceKind::Rendered {
        primary: ListingTarget { url, spec },
        secondary: None,
    }
}

static REGISTRY: [SourceEntry; 14] = [
    SourceEntry {
        name: "CPP Luxury",
        sector: Sector::Luxury,
        weight: 2,
        kind: SourceKind::StaticHtml(ListingTarget {
            url: "https://cpp-luxury.com/",
            spec: ListingSpec::new("h5 a").with_time(".date", "Recent"),
        }),
    },
    SourceEntry {
        name: "Jing Daily",
        sector: Sector::Luxury,
        weight: 2,
        kind: rendered(
            "https://jingdaily.com/",
            ListingSpec::new("h3.elementor-post__title a").with_fallback_scan(),
        ),
    },
    SourceEntry {
        name: "PurseBlog",
        sector: Sector::Luxury,
        weight: 2,
        kind: SourceKind::Rendered {
            primary: ListingTarget {
                url: "https://www.purseblog.com/",
                spec: ListingSpec::new("h2.post-title a").with_scroll(),
            },
            secondary: Some(ListingTarget {
                url: "https://www.purseblog.com/",
                spec: ListingSpec::new("article h2 a").with_scroll(),
            }),
        },
    },
    SourceEntry {
        name: "PurseBlog Forum",
        sector: Sector::Luxury,
        weight: 1,
        kind: rendered(
            "https://forum.purseblog.com/feeds/hot",
            ListingSpec::new("div.structItem-title a[data-tp-primary='on']"),
        ),
    },
    SourceEntry {
        name: "Luxury Fallback",
        sector: Sector::Luxury,
        weight: 1,
        kind: SourceKind::Feed(FeedSpec::google_news("luxury fashion industry", 10)),
    },
    SourceEntry {
        name: "Lithosgraphein",
        sector: Sector::Semiconductors,
        weight: 3,
        kind: SourceKind::Feed(
            FeedSpec::url("https://lithosgraphein.substack.com/feed").with_filler("Recent"),
        ),
    },
    SourceEntry {
        name: "SemiAnalysis",
        sector: Sector::Semiconductors,
        weight: 2,
        kind: rendered("https://www.semianalysis.com/", ListingSpec::new("h1 a")),
    },
    SourceEntry {
        name: "Fabricated Knowledge",
        sector: Sector::Semiconductors,
        weight: 2,
        kind: rendered("https://www.fabricatedknowledge.com/", ListingSpec::new("h3 a")),
    },
    SourceEntry {
        name: "Asianometry",
        sector: Sector::Semiconductors,
        weight: 1,
        kind: rendered(
            "https://www.youtube.com/@Asianometry/videos",
            ListingSpec::new("a#video-title-link"),
        ),
    },
    SourceEntry {
        name: "More Than Moore",
        sector: Sector::Semiconductors,
        weight: 2,
        kind: rendered("https://www.morethanmoore.com/", ListingSpec::new("h3 a")),
    },
    SourceEntry {
        name: "Hacker News",
        sector: Sector::Semiconductors,
        weight: 3,
        kind: SourceKind::Feed(FeedSpec::url("https://hnrss.org/frontpage")),
    },
    SourceEntry {
        name: "TechCrunch",
        sector: Sector::Semiconductors,
        weight: 2,
        kind: SourceKind::Feed(FeedSpec::url("https://techcrunch.com/feed/")),
    },
    SourceEntry {
        name: "Ars Technica",
        sector: Sector::Semiconductors,
        weight: 2,
        kind: SourceKind::Feed(FeedSpec::url(
            "https://feeds.arstechnica.com/arstechnica/technology-lab",
        )),
    },
    SourceEntry {
        name: "Tech News",
        sector: Sector::Semiconductors,
        weight: 1,
        kind: SourceKind::Feed(FeedSpec::google_news("semiconductor industry", 10)),
    },
];

/// All sources in batch traversal order.
pub fn registry() -> &'static [SourceEntry] {
    &REGISTRY
}

/// Case-insensitive lookup by display name.
pub fn find_source(name: &str) -> Result<&'static SourceEntry, InitError> {
    registry()
        .iter()
        .find(|s| s.name.eq_ignore_ascii_case(name.trim()))
        .ok_or_else(|| InitError::UnknownSource {
            name: name.to_string(),
            known: registry().iter().map(|s| s.name).collect::<Vec<_>>().join(", "),
        })
}

/// Runs one source end to end.
pub trait SourceRunner {
    async fn run(&self, source: &SourceEntry) -> SourceResult;
}

/// Production adapters: shared HTTP client plus a page renderer.
pub struct Scrapers<R> {
    client: Client,
    renderer: R,
    config: ScraperConfig,
}

impl<R: PageRenderer> Scrapers<R> {
    pub fn new(client: Client, renderer: R, config: ScraperConfig) -> Self {
        Self {
            client,
            renderer,
            config,
        }
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn config(&self) -> &ScraperConfig {
        &self.config
    }

    async fn collect(&self, source: &SourceEntry) -> Result<Vec<ScrapedItem>, ScrapeError> {
        match &source.kind {
            SourceKind::Rendered { primary, secondary } => {
                let items = self.rendered(source.name, primary).await?;
                match secondary {
                    Some(secondary) if items.is_empty() => {
                        info!(
                            source = source.name,
                            selector = secondary.spec.selector,
                            "Primary target empty; trying secondary"
                        );
                        self.rendered(source.name, secondary).await
                    }
                    _ => Ok(items),
                }
            }
            SourceKind::StaticHtml(target) => {
                let (final_url, html) =
                    fetch_text(&self.client, target.url, self.config.fetch_timeout()).await?;
                extract::extract_listing(&html, &final_url, source.name, &target.spec, Utc::now())
            }
            SourceKind::Feed(spec) => {
                feed::scrape_feed(&self.client, source.name, spec, self.config.fetch_timeout()).await
            }
        }
    }

    async fn rendered(
        &self,
        name: &str,
        target: &ListingTarget,
    ) -> Result<Vec<ScrapedItem>, ScrapeError> {
        extract::scrape_listing(&self.renderer, target.url, name, &target.spec, &self.config).await
    }
}

impl<R: PageRenderer> SourceRunner for Scrapers<R> {
    #[instrument(level = "info", skip_all, fields(source = source.name))]
    async fn run(&self, source: &SourceEntry) -> SourceResult {
        let started = Instant::now();
        match self.collect(source).await {
            Ok(items) => {
                let result = SourceResult::from_items(source.name, items, started);
                if result.count == 0 {
                    warn!(elapsed_ms = result.duration, "Source returned no items");
                } else {
                    info!(count = result.count, elapsed_ms = result.duration, "Scraped source");
                }
                result
            }
            Err(e) => {
                error!(error = %e, "Source failed");
                SourceResult::failed(source.name, &e, started)
            }
        }
    }
}
