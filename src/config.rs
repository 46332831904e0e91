//! Tuning configuration for the scheduler and extraction engine.
//!
//! Every field has a default, so the YAML file is optional and may override
//! any subset of values:
//!
//! ```yaml
//! source_delay:
//!   min_secs: 30
//!   max_secs: 180
//! deep_scrape_batch: 3
//! max_backoff_hours: 8
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::fs;
use tracing::{info, instrument};

use crate::error::InitError;

/// Inclusive range of seconds for a randomized pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min_secs: u64,
    pub max_secs: u64,
}

impl DelayRange {
    pub const fn new(min_secs: u64, max_secs: u64) -> Self {
        Self { min_secs, max_secs }
    }

    /// Bounds in milliseconds, for millisecond-granular jitter.
    pub fn millis(&self) -> (u64, u64) {
        (self.min_secs * 1000, self.max_secs * 1000)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    /// Pause between sources in continuous mode.
    pub source_delay: DelayRange,
    /// Pause before and between deep-scraped articles.
    pub article_delay: DelayRange,
    /// Articles deep-scraped per source cycle.
    pub deep_scrape_batch: usize,
    /// Stored content is cut to this many characters.
    pub max_content_chars: usize,
    /// Deep-scraped content shorter than this counts as a failure.
    pub min_content_chars: usize,
    pub deep_scrape_timeout_secs: u64,
    /// Load timeout for rendered listing pages.
    pub page_load_timeout_secs: u64,
    /// Wait for the primary selector before extracting anyway.
    pub selector_wait_secs: u64,
    /// Settle delay after each popup dismissal click.
    pub popup_settle_ms: u64,
    /// Timeout for plain HTTP fetches (feeds, static pages).
    pub fetch_timeout_secs: u64,
    /// Fixed pause between sources in batch mode.
    pub batch_source_delay_secs: u64,
    pub max_backoff_hours: u32,
    pub startup_jitter_mins: u64,
    /// Continuous mode logs statistics every N sources.
    pub stats_every: u64,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            source_delay: DelayRange::new(30, 180),
            article_delay: DelayRange::new(10, 60),
            deep_scrape_batch: 3,
            max_content_chars: 50_000,
            min_content_chars: 100,
            deep_scrape_timeout_secs: 60,
            page_load_timeout_secs: 60,
            selector_wait_secs: 15,
            popup_settle_ms: 500,
            fetch_timeout_secs: 20,
            batch_source_delay_secs: 3,
            max_backoff_hours: 8,
            startup_jitter_mins: 30,
            stats_every: 10,
        }
    }
}

impl ScraperConfig {
    /// Load from an optional YAML file, falling back to defaults.
    #[instrument(level = "info")]
    pub async fn load(path: Option<&str>) -> Result<Self, InitError> {
        let config = match path {
            Some(path) => {
                let raw = fs::read_to_string(path)
                    .await
                    .map_err(|e| InitError::Config(format!("reading {path}: {e}")))?;
                let parsed = Self::from_yaml(&raw)?;
                info!(path, "Loaded scraper configuration");
                parsed
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, InitError> {
        serde_yaml::from_str(raw).map_err(|e| InitError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), InitError> {
        for (name, range) in [
            ("source_delay", self.source_delay),
            ("article_delay", self.article_delay),
        ] {
            if range.min_secs > range.max_secs {
                return Err(InitError::Config(format!(
                    "{name}: min_secs ({}) exceeds max_secs ({})",
                    range.min_secs, range.max_secs
                )));
            }
        }
        if self.deep_scrape_batch == 0 {
            return Err(InitError::Config("deep_scrape_batch must be positive".into()));
        }
        if self.max_content_chars == 0 {
            return Err(InitError::Config("max_content_chars must be positive".into()));
        }
        if self.stats_every == 0 {
            return Err(InitError::Config("stats_every must be positive".into()));
        }
        Ok(())
    }

    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_secs(self.page_load_timeout_secs)
    }

    pub fn deep_scrape_timeout(&self) -> Duration {
        Duration::from_secs(self.deep_scrape_timeout_secs)
    }

    pub fn selector_wait(&self) -> Duration {
        Duration::from_secs(self.selector_wait_secs)
    }

    pub fn popup_settle(&self) -> Duration {
        Duration::from_millis(self.popup_settle_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn batch_source_delay(&self) -> Duration {
        Duration::from_secs(self.batch_source_delay_secs)
    }

    pub fn startup_jitter_max(&self) -> Duration {
        Duration::from_secs(self.startup_jitter_mins * 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_constants() {
        let c = ScraperConfig::default();
        assert_eq!(c.source_delay, DelayRange::new(30, 180));
        assert_eq!(c.article_delay, DelayRange::new(10, 60));
        assert_eq!(c.deep_scrape_batch, 3);
        assert_eq!(c.max_content_chars, 50_000);
        assert_eq!(c.max_backoff_hours, 8);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_other_defaults() {
        let c = ScraperConfig::from_yaml("deep_scrape_batch: 5\nsource_delay:\n  min_secs: 1\n  max_secs: 2\n")
            .unwrap();
        assert_eq!(c.deep_scrape_batch, 5);
        assert_eq!(c.source_delay.millis(), (1000, 2000));
        assert_eq!(c.article_delay, DelayRange::new(10, 60));
    }

    #[test]
    fn test_inverted_range_rejected() {
        let c = ScraperConfig {
            article_delay: DelayRange::new(60, 10),
            ..ScraperConfig::default()
        };
        assert!(matches!(c.validate(), Err(InitError::Config(_))));
    }

    #[tokio::test]
    async fn test_load_missing_file_is_init_error() {
        let err = ScraperConfig::load(Some("/nonexistent/scraper.yaml")).await;
        assert!(matches!(err, Err(InitError::Config(_))));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("scraper.yaml");
        std::fs::write(&path, "stats_every: 4\n").unwrap();
        let c = ScraperConfig::load(path.to_str()).await.unwrap();
        assert_eq!(c.stats_every, 4);
    }
}
