//! Data models for scraped items, stored articles and per-source results.
//!
//! This module defines the core data structures used throughout the daemon:
//! - [`ScrapedItem`]: One candidate article as produced by a source adapter
//! - [`Article`]: The persisted record, keyed by canonical URL
//! - [`SourceResult`]: The envelope every adapter invocation returns
//! - [`Sector`]: The fixed classification assigned by the scheduler
//!
//! Field names use snake_case to match the columns of the `articles` table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

use crate::error::ScrapeError;

/// Fixed set of dashboard sectors.
///
/// The sector is decided by which registry entry produced an item, never by
/// the adapter itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sector {
    Luxury,
    Semiconductors,
}

impl Sector {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sector::Luxury => "luxury",
            Sector::Semiconductors => "semiconductors",
        }
    }
}

impl fmt::Display for Sector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A candidate article extracted from a listing page or feed.
///
/// Adapters produce these without any sector information; the scheduler
/// converts them into [`Article`]s once it knows which registry entry ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedItem {
    /// Headline text.
    pub title: String,
    /// Absolute URL of the article.
    pub url: String,
    /// Human-readable adapter name.
    pub source: String,
    /// Best-effort recency string ("Just now", "3 hours ago", "Oct 02, 2026").
    pub time: String,
    /// Short excerpt, at most 150 characters plus an ellipsis.
    pub summary: String,
}

/// A persisted article row.
///
/// `url` is the primary key. `content`, `deep_scraped` and `deep_scraped_at`
/// are only ever written by the deep-scrape pass; listing upserts leave them
/// untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub url: String,
    pub title: String,
    pub source: String,
    pub sector: Sector,
    pub time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deep_scraped: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deep_scraped_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Article {
    /// Tag a scraped item with the sector of the registry entry that produced it.
    pub fn from_item(item: ScrapedItem, sector: Sector) -> Self {
        let summary = (!item.summary.is_empty()).then_some(item.summary);
        Self {
            url: item.url,
            title: item.title,
            source: item.source,
            sector,
            time: item.time,
            summary,
            content: None,
            deep_scraped: None,
            deep_scraped_at: None,
            updated_at: None,
        }
    }

    /// `true` once a deep-scrape attempt has run, successful or not.
    pub fn is_deep_scraped(&self) -> bool {
        self.deep_scraped.unwrap_or(false)
    }
}

/// Outcome classification of one adapter invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    /// At least one item was extracted.
    Success,
    /// The fetch worked but nothing was extracted.
    Warning,
    /// The fetch or render itself failed.
    Error,
}

/// Envelope returned by every source adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceResult {
    pub source: String,
    pub status: SourceStatus,
    pub count: usize,
    /// Wall time of the invocation in milliseconds.
    pub duration: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub items: Vec<ScrapedItem>,
}

impl SourceResult {
    /// Build a non-error result; status follows from whether anything was found.
    pub fn from_items(source: &str, items: Vec<ScrapedItem>, started: Instant) -> Self {
        let status = if items.is_empty() {
            SourceStatus::Warning
        } else {
            SourceStatus::Success
        };
        Self {
            source: source.to_string(),
            status,
            count: items.len(),
            duration: started.elapsed().as_millis() as u64,
            error: None,
            items,
        }
    }

    /// Build an error result from a failed fetch or render.
    pub fn failed(source: &str, error: &ScrapeError, started: Instant) -> Self {
        Self {
            source: source.to_string(),
            status: SourceStatus::Error,
            count: 0,
            duration: started.elapsed().as_millis() as u64,
            error: Some(error.to_string()),
            items: Vec::new(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == SourceStatus::Error
    }

    /// Error message for logs and alerts; falls back to a generic label.
    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or("Unknown error")
    }
}
