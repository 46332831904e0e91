//! Article persistence.
//!
//! The scheduler talks to an [`ArticleStore`]. Backends:
//!
//! | Backend | Module | Notes |
//! |---------|--------|-------|
//! | In-process map | [`memory`] | Tests and the file store's working set |
//! | JSON snapshot | [`file`] | `articles.json` in a data directory |
//! | Supabase | [`supabase`] | PostgREST `articles` table keyed on `url` |
//!
//! Listing upserts only carry listing fields, so they never clear content or
//! revert a deep-scrape flag written earlier.

use serde::Serialize;
use std::collections::HashMap;
use tracing::{error, info, instrument};

use crate::error::StoreError;
use crate::models::{Article, Sector};

pub mod file;
pub mod memory;
pub mod supabase;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use supabase::SupabaseStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UpsertOutcome {
    pub success: bool,
    /// Rows written after store-side dedup.
    pub count: usize,
}

pub trait ArticleStore {
    /// Insert or update by `url`.
    async fn upsert(&self, articles: &[Article]) -> Result<UpsertOutcome, StoreError>;

    /// Store extracted content and mark the article deep-scraped.
    async fn update_content(&self, url: &str, content: &str) -> Result<bool, StoreError>;

    /// Mark deep-scraped without content, so the article is never retried.
    async fn mark_deep_scraped(&self, url: &str) -> Result<(), StoreError>;

    /// Articles never deep-scraped, most recently updated first.
    async fn get_unscraped(&self, limit: usize) -> Result<Vec<Article>, StoreError>;

    async fn get_by_sector(&self, sector: Sector, limit: usize) -> Result<Vec<Article>, StoreError>;

    async fn get_by_source(&self, source: &str, limit: usize) -> Result<Vec<Article>, StoreError>;
}

/// Backend chosen at startup.
pub enum Store {
    File(FileStore),
    Supabase(SupabaseStore),
}

impl ArticleStore for Store {
    async fn upsert(&self, articles: &[Article]) -> Result<UpsertOutcome, StoreError> {
        match self {
            Store::File(s) => s.upsert(articles).await,
            Store::Supabase(s) => s.upsert(articles).await,
        }
    }

    async fn update_content(&self, url: &str, content: &str) -> Result<bool, StoreError> {
        match self {
            Store::File(s) => s.update_content(url, content).await,
            Store::Supabase(s) => s.update_content(url, content).await,
        }
    }

    async fn mark_deep_scraped(&self, url: &str) -> Result<(), StoreError> {
        match self {
            Store::File(s) => s.mark_deep_scraped(url).await,
            Store::Supabase(s) => s.mark_deep_scraped(url).await,
        }
    }

    async fn get_unscraped(&self, limit: usize) -> Result<Vec<Article>, StoreError> {
        match self {
            Store::File(s) => s.get_unscraped(limit).await,
            Store::Supabase(s) => s.get_unscraped(limit).await,
        }
    }

    async fn get_by_sector(&self, sector: Sector, limit: usize) -> Result<Vec<Article>, StoreError> {
        match self {
            Store::File(s) => s.get_by_sector(sector, limit).await,
            Store::Supabase(s) => s.get_by_sector(sector, limit).await,
        }
    }

    async fn get_by_source(&self, source: &str, limit: usize) -> Result<Vec<Article>, StoreError> {
        match self {
            Store::File(s) => s.get_by_source(source, limit).await,
            Store::Supabase(s) => s.get_by_source(source, limit).await,
        }
    }
}

/// Deduplicate by URL.
///
/// Each URL keeps the position of its first occurrence and the value of its
/// last. Applying it twice gives the same result as once.
pub fn dedup_by_url(articles: Vec<Article>) -> Vec<Article> {
    let mut index: HashMap<String, usize> = HashMap::with_capacity(articles.len());
    let mut out: Vec<Article> = Vec::with_capacity(articles.len());
    for article in articles {
        match index.get(&article.url) {
            Some(&i) => out[i] = article,
            None => {
                index.insert(article.url.clone(), out.len());
                out.push(article);
            }
        }
    }
    out
}

/// Dedup and upsert one batch; store failures are logged and count as zero.
#[instrument(level = "info", skip_all, fields(incoming = articles.len()))]
pub async fn persist<S: ArticleStore>(store: &S, articles: Vec<Article>) -> usize {
    if articles.is_empty() {
        return 0;
    }
    let unique = dedup_by_url(articles);
    match store.upsert(&unique).await {
        Ok(outcome) if outcome.success => {
            info!(unique = unique.len(), written = outcome.count, "Persisted articles");
            outcome.count
        }
        Ok(_) => {
            error!(unique = unique.len(), "Store reported an unsuccessful upsert");
            0
        }
        Err(e) => {
            error!(error = %e, unique = unique.len(), "Failed to persist articles");
            0
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::models::{Article, Sector};

    pub fn article(url: &str, title: &str) -> Article {
        Article {
            url: url.to_string(),
            title: title.to_string(),
            source: "Test".to_string(),
            sector: Sector::Luxury,
            time: "Just now".to_string(),
            summary: None,
            content: None,
            deep_scraped: None,
            deep_scraped_at: None,
            updated_at: None,
        }
    }
}
