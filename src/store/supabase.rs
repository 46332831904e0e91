//! Supabase (PostgREST) article store.
//!
//! All calls go to `{base}/rest/v1/articles` with the service key sent as both
//! `apikey` and bearer token.
//!
//! | Operation | Request |
//! |-----------|---------|
//! | upsert | `POST ?on_conflict=url`, `Prefer: resolution=merge-duplicates` |
//! | update content / mark | `PATCH ?url=eq.<url>` |
//! | unscraped | `GET ?or=(deep_scraped.is.null,deep_scraped.eq.false)&order=updated_at.desc` |
//!
//! Upsert rows omit `content` and the deep-scrape columns, so merging a
//! duplicate never reverts them.

use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

use super::{dedup_by_url, ArticleStore, UpsertOutcome};
use crate::error::{InitError, StoreError};
use crate::models::{Article, Sector};
use crate::utils::truncate_for_log;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct SupabaseStore {
    client: Client,
    endpoint: String,
    key: String,
}

#[derive(Debug, Serialize, PartialEq)]
struct UpsertRow<'a> {
    url: &'a str,
    title: &'a str,
    source: &'a str,
    sector: Sector,
    time: &'a str,
    summary: &'a str,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct DeepScrapePatch<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    deep_scraped: bool,
    deep_scraped_at: DateTime<Utc>,
}

fn upsert_rows(articles: &[Article], now: DateTime<Utc>) -> Vec<UpsertRow<'_>> {
    articles
        .iter()
        .map(|a| UpsertRow {
            url: &a.url,
            title: &a.title,
            source: &a.source,
            sector: a.sector,
            time: if a.time.is_empty() { "Recent" } else { a.time.as_str() },
            summary: a.summary.as_deref().unwrap_or(""),
            updated_at: now,
        })
        .collect()
}

fn unscraped_query(limit: usize) -> Vec<(&'static str, String)> {
    vec![
        ("select", "*".to_string()),
        ("or", "(deep_scraped.is.null,deep_scraped.eq.false)".to_string()),
        ("order", "updated_at.desc".to_string()),
        ("limit", limit.to_string()),
    ]
}

impl SupabaseStore {
    /// Validate credentials and build the store. Nothing is sent yet.
    pub fn new(client: Client, base_url: &str, key: &str) -> Result<Self, InitError> {
        if key.trim().is_empty() {
            return Err(InitError::Store("missing Supabase service key".into()));
        }
        let base = Url::parse(base_url)
            .map_err(|e| InitError::Store(format!("invalid Supabase URL `{base_url}`: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}/rest/v1/articles", base.as_str().trim_end_matches('/')),
            key: key.to_string(),
        })
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("apikey", &self.key)
            .bearer_auth(&self.key)
            .timeout(REQUEST_TIMEOUT)
    }

    async fn check(response: Response) -> Result<Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        warn!(%status, body = %truncate_for_log(&body, 300), "Supabase rejected request");
        Err(StoreError::Rejected {
            status: status.as_u16(),
            body: truncate_for_log(&body, 300),
        })
    }

    async fn patch(&self, url: &str, patch: &DeepScrapePatch<'_>) -> Result<(), StoreError> {
        let req = self
            .client
            .patch(&self.endpoint)
            .query(&[("url", format!("eq.{url}"))])
            .header("Prefer", "return=minimal")
            .json(patch);
        Self::check(self.authed(req).send().await?).await?;
        Ok(())
    }

    async fn select(&self, query: &[(&str, String)]) -> Result<Vec<Article>, StoreError> {
        let req = self.client.get(&self.endpoint).query(query);
        let response = Self::check(self.authed(req).send().await?).await?;
        Ok(response.json::<Vec<Article>>().await?)
    }
}

impl ArticleStore for SupabaseStore {
    #[instrument(level = "info", skip_all, fields(count = articles.len()))]
    async fn upsert(&self, articles: &[Article]) -> Result<UpsertOutcome, StoreError> {
        if articles.is_empty() {
            return Ok(UpsertOutcome {
                success: true,
                count: 0,
            });
        }
        let unique = dedup_by_url(articles.to_vec());
        let rows = upsert_rows(&unique, Utc::now());
        let req = self
            .client
            .post(&self.endpoint)
            .query(&[("on_conflict", "url")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&rows);
        Self::check(self.authed(req).send().await?).await?;
        debug!(rows = rows.len(), "Upserted rows");
        Ok(UpsertOutcome {
            success: true,
            count: rows.len(),
        })
    }

    #[instrument(level = "debug", skip(self, content), fields(chars = content.chars().count()))]
    async fn update_content(&self, url: &str, content: &str) -> Result<bool, StoreError> {
        self.patch(
            url,
            &DeepScrapePatch {
                content: Some(content),
                deep_scraped: true,
                deep_scraped_at: Utc::now(),
            },
        )
        .await?;
        Ok(true)
    }

    #[instrument(level = "debug", skip(self))]
    async fn mark_deep_scraped(&self, url: &str) -> Result<(), StoreError> {
        self.patch(
            url,
            &DeepScrapePatch {
                content: None,
                deep_scraped: true,
                deep_scraped_at: Utc::now(),
            },
        )
        .await
    }

    async fn get_unscraped(&self, limit: usize) -> Result<Vec<Article>, StoreError> {
        self.select(&unscraped_query(limit)).await
    }

    async fn get_by_sector(&self, sector: Sector, limit: usize) -> Result<Vec<Article>, StoreError> {
        self.select(&[
            ("select", "*".to_string()),
            ("sector", format!("eq.{sector}")),
            ("order", "updated_at.desc".to_string()),
            ("limit", limit.to_string()),
        ])
        .await
    }

    async fn get_by_source(&self, source: &str, limit: usize) -> Result<Vec<Article>, StoreError> {
        self.select(&[
            ("select", "*".to_string()),
            ("source", format!("eq.{source}")),
            ("order", "updated_at.desc".to_string()),
            ("limit", limit.to_string()),
        ])
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::article;

    #[test]
    fn test_upsert_rows_omit_deep_scrape_columns() {
        let mut a = article("https://a.test/1", "t");
        a.content = Some("body".into());
        a.deep_scraped = Some(false);
        a.time = String::new();
        let articles = [a];
        let rows = upsert_rows(&articles, Utc::now());
        let json = serde_json::to_value(&rows).unwrap();
        let row = &json[0];
        assert!(row.get("content").is_none());
        assert!(row.get("deep_scraped").is_none());
        assert_eq!(row["time"], "Recent");
        assert_eq!(row["summary"], "");
        assert_eq!(row["sector"], "luxury");
    }

    #[test]
    fn test_mark_patch_has_no_content() {
        let patch = DeepScrapePatch {
            content: None,
            deep_scraped: true,
            deep_scraped_at: Utc::now(),
        };
        let json = serde_json::to_value(&patch).unwrap();
        assert!(json.get("content").is_none());
        assert_eq!(json["deep_scraped"], true);
    }

    #[test]
    fn test_unscraped_query() {
        let q = unscraped_query(3);
        assert!(q.contains(&("or", "(deep_scraped.is.null,deep_scraped.eq.false)".to_string())));
        assert!(q.contains(&("limit", "3".to_string())));
    }

    #[test]
    fn test_new_validates_credentials() {
        let client = Client::new();
        assert!(SupabaseStore::new(client.clone(), "https://abc.supabase.co/", "").is_err());
        assert!(SupabaseStore::new(client.clone(), "not a url", "key").is_err());
        let store = SupabaseStore::new(client, "https://abc.supabase.co/", "key").unwrap();
        assert_eq!(store.endpoint, "https://abc.supabase.co/rest/v1/articles");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_unavailable() {
        let store = SupabaseStore::new(Client::new(), "http://127.0.0.1:9/", "key").unwrap();
        let err = store.upsert(&[article("https://a.test/1", "t")]).await;
        assert!(matches!(err, Err(StoreError::Unavailable(_))));
    }
}
