//! In-process article store.

use chrono::Utc;
use itertools::Itertools;
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::{ArticleStore, UpsertOutcome};
use crate::error::StoreError;
use crate::models::{Article, Sector};

#[derive(Debug)]
struct Row {
    article: Article,
    /// Write sequence; orders rows sharing an `updated_at`.
    seq: u64,
}

#[derive(Debug, Default)]
struct Rows {
    by_url: HashMap<String, Row>,
    next_seq: u64,
}

impl Rows {
    fn bump(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn newest_first<F>(&self, filter: F, limit: usize) -> Vec<Article>
    where
        F: Fn(&Article) -> bool,
    {
        self.by_url
            .values()
            .filter(|row| filter(&row.article))
            .sorted_by(|a, b| {
                b.article
                    .updated_at
                    .cmp(&a.article.updated_at)
                    .then(b.seq.cmp(&a.seq))
            })
            .take(limit)
            .map(|row| row.article.clone())
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<Rows>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore rows exactly as given, flags and content included.
    pub fn from_articles(articles: Vec<Article>) -> Self {
        let mut rows = Rows::default();
        for article in articles {
            let seq = rows.bump();
            rows.by_url.insert(article.url.clone(), Row { article, seq });
        }
        Self {
            rows: Mutex::new(rows),
        }
    }

    /// Every row, newest first.
    pub async fn snapshot(&self) -> Vec<Article> {
        self.rows.lock().await.newest_first(|_| true, usize::MAX)
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.rows.lock().await.by_url.len()
    }
}

impl ArticleStore for MemoryStore {
    async fn upsert(&self, articles: &[Article]) -> Result<UpsertOutcome, StoreError> {
        let mut rows = self.rows.lock().await;
        let now = Utc::now();
        let mut written: Vec<&str> = Vec::with_capacity(articles.len());
        for incoming in articles {
            let seq = rows.bump();
            match rows.by_url.get_mut(&incoming.url) {
                Some(row) => {
                    let a = &mut row.article;
                    a.title = incoming.title.clone();
                    a.source = incoming.source.clone();
                    a.sector = incoming.sector;
                    a.time = incoming.time.clone();
                    a.summary = incoming.summary.clone();
                    a.updated_at = Some(now);
                    row.seq = seq;
                }
                None => {
                    let article = Article {
                        content: None,
                        deep_scraped: None,
                        deep_scraped_at: None,
                        updated_at: Some(now),
                        ..incoming.clone()
                    };
                    rows.by_url.insert(incoming.url.clone(), Row { article, seq });
                }
            }
            if !written.contains(&incoming.url.as_str()) {
                written.push(&incoming.url);
            }
        }
        Ok(UpsertOutcome {
            success: true,
            count: written.len(),
        })
    }

    async fn update_content(&self, url: &str, content: &str) -> Result<bool, StoreError> {
        let mut rows = self.rows.lock().await;
        match rows.by_url.get_mut(url) {
            Some(row) => {
                let now = Utc::now();
                row.article.content = Some(content.to_string());
                row.article.deep_scraped = Some(true);
                row.article.deep_scraped_at = Some(now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_deep_scraped(&self, url: &str) -> Result<(), StoreError> {
        let mut rows = self.rows.lock().await;
        if let Some(row) = rows.by_url.get_mut(url) {
            row.article.deep_scraped = Some(true);
            row.article.deep_scraped_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn get_unscraped(&self, limit: usize) -> Result<Vec<Article>, StoreError> {
        Ok(self
            .rows
            .lock()
            .await
            .newest_first(|a| !a.is_deep_scraped(), limit))
    }

    async fn get_by_sector(&self, sector: Sector, limit: usize) -> Result<Vec<Article>, StoreError> {
        Ok(self
            .rows
            .lock()
            .await
            .newest_first(|a| a.sector == sector, limit))
    }

    async fn get_by_source(&self, source: &str, limit: usize) -> Result<Vec<Article>, StoreError> {
        Ok(self
            .rows
            .lock()
            .await
            .newest_first(|a| a.source == source, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::article;

    #[tokio::test]
    async fn test_upsert_overwrites_listing_fields_only() {
        let store = MemoryStore::new();
        store.upsert(&[article("https://a.test/1", "old")]).await.unwrap();
        assert!(store.update_content("https://a.test/1", "body text").await.unwrap());

        let mut again = article("https://a.test/1", "new");
        again.deep_scraped = Some(false);
        again.summary = Some("fresh summary".into());
        store.upsert(&[again]).await.unwrap();

        let rows = store.snapshot().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title, "new");
        assert_eq!(rows[0].summary.as_deref(), Some("fresh summary"));
        assert_eq!(rows[0].content.as_deref(), Some("body text"));
        assert!(rows[0].is_deep_scraped());
    }

    #[tokio::test]
    async fn test_unscraped_excludes_marked_and_orders_newest_first() {
        let store = MemoryStore::new();
        for i in 0..4 {
            store
                .upsert(&[article(&format!("https://a.test/{i}"), "t")])
                .await
                .unwrap();
        }
        store.mark_deep_scraped("https://a.test/3").await.unwrap();

        let pending = store.get_unscraped(2).await.unwrap();
        let urls: Vec<&str> = pending.iter().map(|a| a.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a.test/2", "https://a.test/1"]);
    }

    #[tokio::test]
    async fn test_update_content_unknown_url() {
        let store = MemoryStore::new();
        assert!(!store.update_content("https://missing.test/", "x").await.unwrap());
        store.mark_deep_scraped("https://missing.test/").await.unwrap();
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_filters_by_sector_and_source() {
        let store = MemoryStore::new();
        let mut semi = article("https://s.test/1", "chip");
        semi.sector = Sector::Semiconductors;
        semi.source = "SemiAnalysis".into();
        store
            .upsert(&[article("https://l.test/1", "bag"), semi])
            .await
            .unwrap();

        let lux = store.get_by_sector(Sector::Luxury, 10).await.unwrap();
        assert_eq!(lux.len(), 1);
        assert_eq!(lux[0].title, "bag");
        let by_source = store.get_by_source("SemiAnalysis", 10).await.unwrap();
        assert_eq!(by_source[0].title, "chip");
    }

    #[tokio::test]
    async fn test_upsert_counts_unique_urls() {
        let store = MemoryStore::new();
        let outcome = store
            .upsert(&[
                article("https://a.test/1", "a"),
                article("https://a.test/1", "b"),
            ])
            .await
            .unwrap();
        assert_eq!(outcome.count, 1);
    }
}
