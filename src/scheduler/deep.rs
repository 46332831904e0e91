//! Deep scraping: full-text extraction for stored articles.
//!
//! Every attempted article ends up marked deep-scraped, whether its content
//! was stored or not, so an unparseable page is never retried.

use tracing::{error, info, instrument, warn};

use crate::config::ScraperConfig;
use crate::error::ScrapeError;
use crate::extract::extract_main_content;
use crate::models::Article;
use crate::random::{jittered_delay, RandomSource};
use crate::render::{PageRenderer, RenderOptions, RenderedPage};
use crate::scrapers::Scrapers;
use crate::shutdown::Shutdown;
use crate::store::ArticleStore;
use crate::utils::truncate_chars;

/// Loads an article page and returns its main text.
pub trait ContentFetcher {
    async fn fetch_content(&self, url: &str) -> Result<String, ScrapeError>;
}

impl<R: PageRenderer> ContentFetcher for Scrapers<R> {
    async fn fetch_content(&self, url: &str) -> Result<String, ScrapeError> {
        let options = RenderOptions::lightweight(self.config().deep_scrape_timeout());
        let page = self.renderer().open(url, &options).await?;
        let html = page.content().await;
        page.close().await;
        Ok(extract_main_content(&html?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeepOutcome {
    Stored { chars: usize },
    TooShort { chars: usize },
    /// The page could not be loaded.
    Failed(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeepReport {
    pub attempted: usize,
    pub stored: usize,
    pub too_short: usize,
    pub failed: usize,
    /// Characters written across stored articles.
    pub chars_stored: usize,
}

/// Deep-scrape one article and record the outcome in the store.
#[instrument(level = "info", skip_all, fields(url = %article.url))]
pub async fn deep_scrape_article<F, S>(
    fetcher: &F,
    store: &S,
    article: &Article,
    config: &ScraperConfig,
) -> DeepOutcome
where
    F: ContentFetcher,
    S: ArticleStore,
{
    let outcome = match fetcher.fetch_content(&article.url).await {
        Ok(text) => {
            let chars = text.chars().count();
            if chars > config.min_content_chars {
                let content = truncate_chars(&text, config.max_content_chars);
                let stored_chars = content.chars().count();
                match store.update_content(&article.url, &content).await {
                    Ok(_) => {
                        info!(chars = stored_chars, "Extracted article content");
                        DeepOutcome::Stored { chars: stored_chars }
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to store article content");
                        DeepOutcome::Failed(e.to_string())
                    }
                }
            } else {
                warn!(chars, "Content too short or empty");
                DeepOutcome::TooShort { chars }
            }
        }
        Err(e) => {
            error!(error = %e, "Deep scrape failed");
            DeepOutcome::Failed(e.to_string())
        }
    };

    if !matches!(outcome, DeepOutcome::Stored { .. }) {
        if let Err(e) = store.mark_deep_scraped(&article.url).await {
            error!(error = %e, "Failed to mark article deep-scraped");
        }
    }
    outcome
}

/// Deep-scrape up to `deep_scrape_batch` unprocessed articles with a
/// randomized pause between them.
pub async fn deep_scrape_batch<F, S, R>(
    fetcher: &F,
    store: &S,
    rng: &mut R,
    config: &ScraperConfig,
    shutdown: &Shutdown,
) -> DeepReport
where
    F: ContentFetcher,
    S: ArticleStore,
    R: RandomSource + ?Sized,
{
    let mut report = DeepReport::default();
    let pending = match store.get_unscraped(config.deep_scrape_batch).await {
        Ok(pending) => pending,
        Err(e) => {
            error!(error = %e, "Failed to query unscraped articles");
            return report;
        }
    };
    info!(count = pending.len(), "Found articles to deep scrape");

    for (i, article) in pending.iter().enumerate() {
        if shutdown.is_triggered() {
            break;
        }
        if i > 0 {
            let delay = jittered_delay(rng, config.article_delay);
            info!(secs = delay.as_secs(), "Waiting before next article");
            if !shutdown.sleep(delay).await {
                break;
            }
        }

        let _guard = shutdown.begin(&article.url);
        report.attempted += 1;
        match deep_scrape_article(fetcher, store, article, config).await {
            DeepOutcome::Stored { chars } => {
                report.stored += 1;
                report.chars_stored += chars;
            }
            DeepOutcome::TooShort { .. } => report.too_short += 1,
            DeepOutcome::Failed(_) => report.failed += 1,
        }
    }
    report
}

#[cfg(test)]
pub(crate) mod testing {
    use super::ContentFetcher;
    use crate::error::ScrapeError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Canned page text per URL; unknown URLs fail to load.
    #[derive(Debug, Default)]
    pub struct FakeFetcher {
        pub pages: HashMap<String, String>,
        pub fetched: Mutex<Vec<String>>,
    }

    impl FakeFetcher {
        pub fn with(pages: &[(&str, &str)]) -> Self {
            Self {
                pages: pages
                    .iter()
                    .map(|(u, t)| (u.to_string(), t.to_string()))
                    .collect(),
                ..Default::default()
            }
        }
    }

    impl ContentFetcher for FakeFetcher {
        async fn fetch_content(&self, url: &str) -> Result<String, ScrapeError> {
            self.fetched.lock().unwrap().push(url.to_string());
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| ScrapeError::LoadTimeout(60_000))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeFetcher;
    use super::*;
    use crate::random::testing::ScriptedRandom;
    use crate::store::testing::article;
    use crate::store::MemoryStore;

    fn long_text(n: usize) -> String {
        "x".repeat(n)
    }

    async fn seeded(urls: &[&str]) -> MemoryStore {
        let store = MemoryStore::new();
        for url in urls {
            store.upsert(&[article(url, "t")]).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_every_outcome_marks_article() {
        let good = long_text(500);
        let fetcher = FakeFetcher::with(&[
            ("https://a.test/good", good.as_str()),
            ("https://a.test/short", "tiny"),
        ]);
        let store = seeded(&["https://a.test/good", "https://a.test/short", "https://a.test/down"]).await;
        let config = ScraperConfig::default();

        for url in ["https://a.test/good", "https://a.test/short", "https://a.test/down"] {
            deep_scrape_article(&fetcher, &store, &article(url, "t"), &config).await;
        }

        assert!(store.get_unscraped(10).await.unwrap().is_empty());
        let rows = store.snapshot().await;
        let good_row = rows.iter().find(|a| a.url == "https://a.test/good").unwrap();
        assert_eq!(good_row.content.as_deref().map(str::len), Some(500));
        let short_row = rows.iter().find(|a| a.url == "https://a.test/short").unwrap();
        assert!(short_row.is_deep_scraped());
        assert_eq!(short_row.content, None);
    }

    #[tokio::test]
    async fn test_content_truncated_to_cap() {
        let text = long_text(80_000);
        let fetcher = FakeFetcher::with(&[("https://a.test/long", text.as_str())]);
        let store = seeded(&["https://a.test/long"]).await;
        let outcome =
            deep_scrape_article(&fetcher, &store, &article("https://a.test/long", "t"), &ScraperConfig::default())
                .await;
        assert_eq!(outcome, DeepOutcome::Stored { chars: 50_000 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_respects_limit_and_pauses_between() {
        let text = long_text(300);
        let urls = ["https://a.test/1", "https://a.test/2", "https://a.test/3", "https://a.test/4"];
        let pages: Vec<(&str, &str)> = urls.iter().map(|u| (*u, text.as_str())).collect();
        let fetcher = FakeFetcher::with(&pages);
        let store = seeded(&urls).await;
        let config = ScraperConfig::default();
        let mut rng = ScriptedRandom::new([0, 0]);

        let started = tokio::time::Instant::now();
        let report = deep_scrape_batch(&fetcher, &store, &mut rng, &config, &Shutdown::new()).await;

        assert_eq!(report.attempted, 3);
        assert_eq!(report.stored, 3);
        assert_eq!(report.chars_stored, 900);
        // two pauses at the 10 s minimum
        assert_eq!(started.elapsed().as_secs(), 20);
        assert_eq!(rng.bounds_seen.len(), 2);
        assert_eq!(store.get_unscraped(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_batch_stops_on_shutdown() {
        let store = seeded(&["https://a.test/1"]).await;
        let shutdown = Shutdown::new();
        shutdown.trigger();
        let report = deep_scrape_batch(
            &FakeFetcher::default(),
            &store,
            &mut ScriptedRandom::new([]),
            &ScraperConfig::default(),
            &shutdown,
        )
        .await;
        assert_eq!(report.attempted, 0);
    }
}
