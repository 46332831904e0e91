//! Batch mode: one pass over every source, then a single sync.
//!
//! A source inside its backoff window is skipped without being invoked. An
//! interrupted run skips the sync so a partial pass is never written.
//! Failure alerts are delivered alongside the pass, so a slow mail API never
//! stretches the pause between sources.

use chrono::Utc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tracing::{error, info, instrument, warn};

use crate::backoff::BackoffTracker;
use crate::config::ScraperConfig;
use crate::models::Article;
use crate::notify::Notifier;
use crate::random::{jitter_up_to, RandomSource};
use crate::scrapers::{SourceEntry, SourceRunner};
use crate::shutdown::Shutdown;
use crate::store::{persist, ArticleStore};

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// A failure alert waiting for delivery.
#[derive(Debug)]
struct FailureAlert {
    source: &'static str,
    message: String,
    failures: u32,
    backoff_hours: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Sources that returned at least one item.
    pub success: usize,
    pub failed: Vec<String>,
    /// Sources that ran fine but found nothing.
    pub empty: Vec<String>,
    /// Sources skipped while in backoff.
    pub skipped: Vec<String>,
    /// Articles collected before dedup.
    pub total_articles: usize,
    /// Rows the store reported written.
    pub written: usize,
    pub interrupted: bool,
}

pub struct Batch<'a, N, S, A> {
    pub sources: &'a [SourceEntry],
    pub runner: &'a N,
    pub store: &'a S,
    pub notifier: &'a A,
    pub config: &'a ScraperConfig,
    pub shutdown: &'a Shutdown,
}

impl<N, S, A> Batch<'_, N, S, A>
where
    N: SourceRunner,
    S: ArticleStore,
    A: Notifier,
{
    /// Run one pass. `jitter` enables the randomized startup delay.
    pub async fn run<R: RandomSource + ?Sized>(
        &self,
        rng: &mut R,
        backoff: &mut BackoffTracker,
        jitter: bool,
    ) -> RunSummary {
        let mut summary = RunSummary::default();

        if jitter {
            let delay = jitter_up_to(rng, self.config.startup_jitter_max());
            info!(mins = delay.as_secs() / 60, "Applying startup jitter");
            if !self.shutdown.sleep(delay).await {
                summary.interrupted = true;
                warn!("Shutdown requested during startup jitter");
                return summary;
            }
        }

        let (alerts, mut pending) = unbounded_channel::<FailureAlert>();
        let pass = async {
            let mut collected: Vec<Article> = Vec::new();
            for (i, source) in self.sources.iter().enumerate() {
                if self.shutdown.is_triggered() {
                    summary.interrupted = true;
                    break;
                }
                if i > 0 && !self.shutdown.sleep(self.config.batch_source_delay()).await {
                    summary.interrupted = true;
                    break;
                }
                self.run_source(source, backoff, &mut summary, &mut collected, &alerts)
                    .await;
            }
            // closes the queue so delivery can finish
            drop(alerts);
            collected
        };
        let deliver = async {
            while let Some(alert) = pending.recv().await {
                self.send_failure_alert(alert).await;
            }
        };
        let (collected, ()) = tokio::join!(pass, deliver);
        summary.total_articles = collected.len();

        if summary.interrupted || self.shutdown.is_triggered() {
            summary.interrupted = true;
            warn!(
                collected = summary.total_articles,
                "Run interrupted; skipping sync"
            );
            return summary;
        }

        summary.written = persist(self.store, collected).await;

        if !summary.failed.is_empty() {
            let sent = tokio::time::timeout(
                NOTIFY_TIMEOUT,
                self.notifier
                    .alert_summary(summary.success, &summary.failed, summary.total_articles),
            )
            .await;
            if sent.is_err() {
                warn!("Summary alert timed out");
            }
        }

        info!(
            success = summary.success,
            total = self.sources.len(),
            failed = ?summary.failed,
            skipped = ?summary.skipped,
            empty = ?summary.empty,
            total_articles = summary.total_articles,
            written = summary.written,
            "Scrape run finished"
        );
        summary
    }

    async fn send_failure_alert(&self, alert: FailureAlert) {
        let sent = tokio::time::timeout(
            NOTIFY_TIMEOUT,
            self.notifier.alert_failure(
                alert.source,
                &alert.message,
                alert.failures,
                alert.backoff_hours,
            ),
        )
        .await;
        if sent.is_err() {
            warn!(source = alert.source, "Failure alert timed out");
        }
    }

    #[instrument(level = "info", skip_all, fields(source = source.name))]
    async fn run_source(
        &self,
        source: &SourceEntry,
        backoff: &mut BackoffTracker,
        summary: &mut RunSummary,
        collected: &mut Vec<Article>,
        alerts: &UnboundedSender<FailureAlert>,
    ) {
        let now = Utc::now();
        if backoff.in_backoff(source.name, now) {
            let remaining = backoff
                .health(source.name)
                .and_then(|h| h.backoff_until)
                .map(|until| (until - now).num_minutes())
                .unwrap_or(0);
            info!(remaining_mins = remaining, "Skipping source in backoff");
            summary.skipped.push(source.name.to_string());
            return;
        }

        let result = {
            let _guard = self.shutdown.begin(source.name);
            self.runner.run(source).await
        };

        if result.is_error() {
            let record = backoff.record_failure(source.name, Utc::now());
            error!(
                failures = record.failures,
                backoff_hours = record.backoff_hours,
                error = result.error_message(),
                "Source failed; backing off"
            );
            summary.failed.push(source.name.to_string());
            let queued = alerts.send(FailureAlert {
                source: source.name,
                message: result.error_message().to_string(),
                failures: record.failures,
                backoff_hours: record.backoff_hours,
            });
            if queued.is_err() {
                warn!("Alert queue closed; failure alert dropped");
            }
            return;
        }

        let previous = backoff.failures(source.name);
        if previous > 0 {
            info!(failures = previous, "Recovered after failures");
        }
        backoff.record_success(source.name);

        if result.items.is_empty() {
            summary.empty.push(source.name.to_string());
            return;
        }
        summary.success += 1;
        collected.extend(
            result
                .items
                .into_iter()
                .map(|item| Article::from_item(item, source.sector)),
        );
    }
}
