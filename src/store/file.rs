//! JSON snapshot store.
//!
//! Articles live in memory and are written to a single file after every
//! mutation:
//!
//! ```text
//! data_dir/
//! └── articles.json
//! ```
//!
//! The snapshot is written to a temporary sibling first and renamed into
//! place, so a crash mid-write leaves the previous snapshot intact.

use std::path::PathBuf;
use tokio::fs;
use tracing::{error, info, instrument};

use super::{ArticleStore, MemoryStore, UpsertOutcome};
use crate::error::{InitError, StoreError};
use crate::models::{Article, Sector};
use crate::utils::ensure_writable_dir;

pub const SNAPSHOT_FILE: &str = "articles.json";

pub struct FileStore {
    path: PathBuf,
    rows: MemoryStore,
}

impl FileStore {
    /// Open (or create) the store in `data_dir`.
    ///
    /// Fails if the directory is not writable or an existing snapshot cannot
    /// be parsed.
    #[instrument(level = "info", skip_all, fields(data_dir = %data_dir))]
    pub async fn open(data_dir: &str) -> Result<Self, InitError> {
        if let Err(e) = ensure_writable_dir(data_dir).await {
            error!(error = %e, "Data directory is not writable (fix perms or choose a different path)");
            return Err(InitError::Store(format!("{data_dir}: {e}")));
        }

        let path = PathBuf::from(data_dir).join(SNAPSHOT_FILE);
        let articles: Vec<Article> = match fs::read_to_string(&path).await {
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| InitError::Store(format!("{}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(InitError::Store(format!("{}: {e}", path.display()))),
        };
        info!(path = %path.display(), count = articles.len(), "Loaded article snapshot");

        Ok(Self {
            path,
            rows: MemoryStore::from_articles(articles),
        })
    }

    async fn flush(&self) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(&self.rows.snapshot().await)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &self.path).await?;
        info!(path = %self.path.display(), "Wrote article snapshot");
        Ok(())
    }
}

impl ArticleStore for FileStore {
    async fn upsert(&self, articles: &[Article]) -> Result<UpsertOutcome, StoreError> {
        let outcome = self.rows.upsert(articles).await?;
        self.flush().await?;
        Ok(outcome)
    }

    async fn update_content(&self, url: &str, content: &str) -> Result<bool, StoreError> {
        let updated = self.rows.update_content(url, content).await?;
        if updated {
            self.flush().await?;
        }
        Ok(updated)
    }

    async fn mark_deep_scraped(&self, url: &str) -> Result<(), StoreError> {
        self.rows.mark_deep_scraped(url).await?;
        self.flush().await
    }

    async fn get_unscraped(&self, limit: usize) -> Result<Vec<Article>, StoreError> {
        self.rows.get_unscraped(limit).await
    }

    async fn get_by_sector(&self, sector: Sector, limit: usize) -> Result<Vec<Article>, StoreError> {
        self.rows.get_by_sector(sector, limit).await
    }

    async fn get_by_source(&self, source: &str, limit: usize) -> Result<Vec<Article>, StoreError> {
        self.rows.get_by_source(source, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::article;

    #[tokio::test]
    async fn test_snapshot_survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().to_str().unwrap();

        let store = FileStore::open(dir).await.unwrap();
        store
            .upsert(&[article("https://a.test/1", "one"), article("https://a.test/2", "two")])
            .await
            .unwrap();
        store.update_content("https://a.test/1", "full text").await.unwrap();

        let reopened = FileStore::open(dir).await.unwrap();
        let pending = reopened.get_unscraped(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].url, "https://a.test/2");

        let lux = reopened.get_by_sector(Sector::Luxury, 10).await.unwrap();
        let one = lux.iter().find(|a| a.url == "https://a.test/1").unwrap();
        assert_eq!(one.content.as_deref(), Some("full text"));
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_init_error() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(SNAPSHOT_FILE), "{not json").unwrap();
        let err = FileStore::open(tmp.path().to_str().unwrap()).await;
        assert!(matches!(err, Err(InitError::Store(_))));
    }

    #[tokio::test]
    async fn test_creates_missing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("data/articles");
        let store = FileStore::open(nested.to_str().unwrap()).await.unwrap();
        store.upsert(&[article("https://a.test/1", "one")]).await.unwrap();
        assert!(nested.join(SNAPSHOT_FILE).exists());
    }
}
