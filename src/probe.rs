//! One-shot extraction report: what each source yields right now.

use serde::Serialize;
use tracing::info;

use crate::models::{Article, SourceResult};
use crate::scrapers::{SourceEntry, SourceRunner};
use crate::shutdown::Shutdown;
use crate::store::dedup_by_url;

#[derive(Debug, Serialize)]
pub struct ProbeReport {
    pub articles: Vec<Article>,
    /// Per-source results with their items moved into `articles`.
    pub summary: Vec<SourceResult>,
}

pub async fn probe<N: SourceRunner>(
    runner: &N,
    targets: &[&SourceEntry],
    shutdown: &Shutdown,
) -> ProbeReport {
    let mut articles = Vec::new();
    let mut summary = Vec::with_capacity(targets.len());
    for source in targets {
        if shutdown.is_triggered() {
            break;
        }
        let mut result = runner.run(source).await;
        articles.extend(
            result
                .items
                .drain(..)
                .map(|item| Article::from_item(item, source.sector)),
        );
        summary.push(result);
    }
    let articles = dedup_by_url(articles);
    info!(sources = summary.len(), articles = articles.len(), "Probe finished");
    ProbeReport { articles, summary }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Sector, SourceStatus};
    use crate::scheduler::testing::{source, Script, ScriptedRunner};

    #[tokio::test]
    async fn test_probe_reports_every_target() {
        let a = source("Lithosgraphein", Sector::Semiconductors, 3);
        let b = source("PurseBlog Forum", Sector::Luxury, 1);
        let runner = ScriptedRunner::new(&[("Lithosgraphein", &[Script::Items(2)]), ("PurseBlog Forum", &[Script::Fail])]);

        let report = probe(&runner, &[&a, &b], &Shutdown::new()).await;

        assert_eq!(report.articles.len(), 2);
        assert!(report.articles.iter().all(|x| x.sector == Sector::Semiconductors));
        assert_eq!(report.summary.len(), 2);
        assert_eq!(report.summary[0].count, 2);
        assert!(report.summary[0].items.is_empty());
        assert_eq!(report.summary[1].status, SourceStatus::Error);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["summary"][1]["status"], "error");
    }
}
