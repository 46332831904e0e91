//! Continuous mode.
//!
//! ```text
//! PickSource -> Scrape -> Persist -> DeepScrapeWait -> DeepScrapeLoop -> SourceWait
//!      ^                                                                    |
//!      +--------------------------------------------------------------------+
//! ```
//!
//! `Shutdown` is reachable from every state and is checked before each step.
//! A failed source skips `Persist` but still runs the deep-scrape cycle.

use std::time::Instant;
use tracing::{error, info, warn};

use super::deep::{deep_scrape_batch, ContentFetcher};
use crate::config::ScraperConfig;
use crate::models::{Article, ScrapedItem};
use crate::random::{jittered_delay, pick_weighted, RandomSource};
use crate::scrapers::{SourceEntry, SourceRunner};
use crate::shutdown::Shutdown;
use crate::store::{persist, ArticleStore};
use crate::utils::format_uptime;

#[derive(Debug, Clone, PartialEq)]
pub enum DaemonState<'a> {
    PickSource,
    Scrape(&'a SourceEntry),
    Persist {
        source: &'a SourceEntry,
        items: Vec<ScrapedItem>,
    },
    DeepScrapeWait,
    DeepScrapeLoop,
    SourceWait,
    Shutdown,
}

#[derive(Debug, Clone, Copy)]
pub struct DaemonStats {
    pub sources_scraped: u64,
    pub articles_found: u64,
    pub articles_deep_scraped: u64,
    pub errors: u64,
    pub started: Instant,
}

impl DaemonStats {
    fn new() -> Self {
        Self {
            sources_scraped: 0,
            articles_found: 0,
            articles_deep_scraped: 0,
            errors: 0,
            started: Instant::now(),
        }
    }

    pub fn log(&self) {
        info!(
            uptime = %format_uptime(self.started.elapsed()),
            sources_scraped = self.sources_scraped,
            articles_found = self.articles_found,
            articles_deep_scraped = self.articles_deep_scraped,
            errors = self.errors,
            "Daemon statistics"
        );
    }
}

pub struct Daemon<'a, N, F, S, R> {
    sources: &'a [SourceEntry],
    runner: &'a N,
    fetcher: &'a F,
    store: &'a S,
    config: &'a ScraperConfig,
    shutdown: Shutdown,
    rng: R,
    stats: DaemonStats,
}

impl<'a, N, F, S, R> Daemon<'a, N, F, S, R>
where
    N: SourceRunner,
    F: ContentFetcher,
    S: ArticleStore,
    R: RandomSource,
{
    pub fn new(
        sources: &'a [SourceEntry],
        runner: &'a N,
        fetcher: &'a F,
        store: &'a S,
        config: &'a ScraperConfig,
        shutdown: Shutdown,
        rng: R,
    ) -> Self {
        Self {
            sources,
            runner,
            fetcher,
            store,
            config,
            shutdown,
            rng,
            stats: DaemonStats::new(),
        }
    }

    #[cfg(test)]
    pub fn stats(&self) -> &DaemonStats {
        &self.stats
    }

    /// Run until shutdown; returns the final statistics.
    pub async fn run(mut self) -> DaemonStats {
        info!(sources = self.sources.len(), "Starting continuous scraping");
        let mut state = DaemonState::PickSource;
        while state != DaemonState::Shutdown {
            state = self.step(state).await;
        }
        info!("Daemon stopped");
        self.stats.log();
        self.stats
    }

    /// Advance one state.
    pub async fn step(&mut self, state: DaemonState<'a>) -> DaemonState<'a> {
        if self.shutdown.is_triggered() {
            return DaemonState::Shutdown;
        }
        match state {
            DaemonState::PickSource => {
                match pick_weighted(&mut self.rng, self.sources, |s| s.weight) {
                    Some(source) => DaemonState::Scrape(source),
                    None => {
                        error!("No weighted sources to pick from");
                        DaemonState::Shutdown
                    }
                }
            }
            DaemonState::Scrape(source) => {
                info!(source = source.name, sector = %source.sector, "Picked source");
                let result = {
                    let _guard = self.shutdown.begin(source.name);
                    self.runner.run(source).await
                };
                self.stats.sources_scraped += 1;
                if result.is_error() {
                    self.stats.errors += 1;
                    error!(source = source.name, error = result.error_message(), "Source failed");
                    return DaemonState::DeepScrapeWait;
                }
                self.stats.articles_found += result.count as u64;
                if result.items.is_empty() {
                    DaemonState::DeepScrapeWait
                } else {
                    DaemonState::Persist {
                        source,
                        items: result.items,
                    }
                }
            }
            DaemonState::Persist { source, items } => {
                let articles: Vec<Article> = items
                    .into_iter()
                    .map(|item| Article::from_item(item, source.sector))
                    .collect();
                let found = articles.len();
                let written = persist(self.store, articles).await;
                info!(source = source.name, found, written, "Saved articles");
                DaemonState::DeepScrapeWait
            }
            DaemonState::DeepScrapeWait => {
                let delay = jittered_delay(&mut self.rng, self.config.article_delay);
                info!(secs = delay.as_secs(), "Waiting before deep scraping");
                if self.shutdown.sleep(delay).await {
                    DaemonState::DeepScrapeLoop
                } else {
                    DaemonState::Shutdown
                }
            }
            DaemonState::DeepScrapeLoop => {
                let report = deep_scrape_batch(
                    self.fetcher,
                    self.store,
                    &mut self.rng,
                    self.config,
                    &self.shutdown,
                )
                .await;
                if report.stored > 0 {
                    info!(stored = report.stored, chars = report.chars_stored, "Deep scrape batch stored content");
                }
                self.stats.articles_deep_scraped += report.stored as u64;
                self.stats.errors += report.failed as u64;
                if report.too_short + report.failed > 0 {
                    warn!(
                        too_short = report.too_short,
                        failed = report.failed,
                        "Some articles yielded no content"
                    );
                }
                DaemonState::SourceWait
            }
            DaemonState::SourceWait => {
                let delay = jittered_delay(&mut self.rng, self.config.source_delay);
                info!(secs = delay.as_secs(), "Waiting before next source");
                let completed = self.shutdown.sleep(delay).await;
                if self.stats.sources_scraped % self.config.stats_every == 0 {
                    self.stats.log();
                }
                if completed {
                    DaemonState::PickSource
                } else {
                    DaemonState::Shutdown
                }
            }
            DaemonState::Shutdown => DaemonState::Shutdown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Sector;
    use crate::random::testing::ScriptedRandom;
    use crate::scheduler::deep::testing::FakeFetcher;
    use crate::scheduler::testing::{source, Script, ScriptedRunner};
    use crate::store::MemoryStore;
    use std::time::Duration;

    fn sources() -> Vec<SourceEntry> {
        vec![
            source("Hacker News", Sector::Semiconductors, 3),
            source("PurseBlog", Sector::Luxury, 1),
        ]
    }

    fn kind(state: &DaemonState<'_>) -> &'static str {
        match state {
            DaemonState::PickSource => "pick",
            DaemonState::Scrape(_) => "scrape",
            DaemonState::Persist { .. } => "persist",
            DaemonState::DeepScrapeWait => "deep_wait",
            DaemonState::DeepScrapeLoop => "deep_loop",
            DaemonState::SourceWait => "source_wait",
            DaemonState::Shutdown => "shutdown",
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_full_cycle() {
        let sources = sources();
        let runner = ScriptedRunner::new(&[("PurseBlog", &[Script::Items(2)])]);
        let body = "b".repeat(400);
        let fetcher = FakeFetcher::with(&[
            ("https://purseblog.test/0", body.as_str()),
            ("https://purseblog.test/1", body.as_str()),
        ]);
        let store = MemoryStore::new();
        let config = ScraperConfig::default();
        // roll 3 of 4 picks PurseBlog; delays all take the minimum
        let rng = ScriptedRandom::new([3, 0, 0, 0]);
        let mut daemon = Daemon::new(&sources, &runner, &fetcher, &store, &config, Shutdown::new(), rng);

        let mut state = DaemonState::PickSource;
        let mut seen = vec![kind(&state)];
        for _ in 0..6 {
            state = daemon.step(state).await;
            seen.push(kind(&state));
        }

        assert_eq!(
            seen,
            vec!["pick", "scrape", "persist", "deep_wait", "deep_loop", "source_wait", "pick"]
        );
        assert_eq!(runner.calls(), vec!["PurseBlog"]);
        let rows = store.snapshot().await;
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|a| a.sector == Sector::Luxury && a.is_deep_scraped()));
        assert_eq!(daemon.stats().articles_found, 2);
        assert_eq!(daemon.stats().articles_deep_scraped, 2);
        assert_eq!(daemon.stats().errors, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_source_skips_persist() {
        let sources = sources();
        let runner = ScriptedRunner::new(&[("Hacker News", &[Script::Fail])]);
        let fetcher = FakeFetcher::default();
        let store = MemoryStore::new();
        let config = ScraperConfig::default();
        let mut daemon = Daemon::new(
            &sources,
            &runner,
            &fetcher,
            &store,
            &config,
            Shutdown::new(),
            ScriptedRandom::new([0]),
        );

        let state = daemon.step(DaemonState::PickSource).await;
        assert!(matches!(state, DaemonState::Scrape(s) if s.name == "Hacker News"));
        let state = daemon.step(state).await;
        assert_eq!(state, DaemonState::DeepScrapeWait);
        assert_eq!(daemon.stats().errors, 1);
        assert_eq!(daemon.stats().sources_scraped, 1);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deep_scrape_failures_count_as_errors() {
        let sources = sources();
        let runner = ScriptedRunner::default();
        let fetcher = FakeFetcher::default();
        let store = MemoryStore::from_articles(vec![crate::store::testing::article("https://gone.test/a", "t")]);
        let config = ScraperConfig::default();
        let mut daemon = Daemon::new(
            &sources,
            &runner,
            &fetcher,
            &store,
            &config,
            Shutdown::new(),
            ScriptedRandom::new([]),
        );

        let state = daemon.step(DaemonState::DeepScrapeLoop).await;
        assert_eq!(state, DaemonState::SourceWait);
        assert_eq!(daemon.stats().errors, 1);
        assert!(store.get_unscraped(10).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_pacing_wait() {
        let sources = sources();
        let runner = ScriptedRunner::default();
        let fetcher = FakeFetcher::default();
        let store = MemoryStore::new();
        let config = ScraperConfig::default();
        let shutdown = Shutdown::new();
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.trigger();
        });

        let daemon = Daemon::new(&sources, &runner, &fetcher, &store, &config, shutdown, ScriptedRandom::new([]));
        let started = tokio::time::Instant::now();
        let stats = daemon.run().await;

        // one empty source, then the 10 s deep-scrape wait is cut short
        assert_eq!(stats.sources_scraped, 1);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_no_steps_after_shutdown() {
        let sources = sources();
        let runner = ScriptedRunner::default();
        let fetcher = FakeFetcher::default();
        let store = MemoryStore::new();
        let config = ScraperConfig::default();
        let shutdown = Shutdown::new();
        shutdown.trigger();
        let mut daemon = Daemon::new(&sources, &runner, &fetcher, &store, &config, shutdown, ScriptedRandom::new([]));

        let state = daemon.step(DaemonState::Scrape(&sources[0])).await;
        assert_eq!(state, DaemonState::Shutdown);
        assert!(runner.calls().is_empty());
    }
}
