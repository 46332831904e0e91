//! Best-effort failure alerts by email.
//!
//! Alerts go through the Resend HTTP API. Delivery problems are logged and
//! swallowed; a missing API key or recipient turns alerting into a no-op.

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::utils::truncate_for_log;

const RESEND_ENDPOINT: &str = "https://api.resend.com/emails";
const FROM: &str = "Lux Scrapers <onboarding@resend.dev>";
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

pub trait Notifier {
    /// One source failed; `backoff_hours` is the window actually applied.
    async fn alert_failure(&self, source: &str, message: &str, failures: u32, backoff_hours: u64);

    /// End-of-run report. Only sent when something failed.
    async fn alert_summary(&self, success: usize, failed: &[String], total_articles: usize);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub subject: String,
    pub text: String,
}

pub fn failure_message(
    source: &str,
    message: &str,
    failures: u32,
    backoff_hours: u64,
    now: DateTime<Utc>,
    host: &str,
) -> EmailMessage {
    EmailMessage {
        subject: format!("Scraper Failed: {source}"),
        text: format!(
            "Scraper: {source}\n\
             Error: {message}\n\
             Failure Count: {failures}\n\
             Backoff: {backoff_hours} hours until next retry\n\
             \n\
             Timestamp: {}\n\
             Host: {host}",
            now.to_rfc3339()
        ),
    }
}

/// `None` when nothing failed.
pub fn summary_message(
    success: usize,
    failed: &[String],
    total_articles: usize,
    now: DateTime<Utc>,
    host: &str,
) -> Option<EmailMessage> {
    if failed.is_empty() {
        return None;
    }
    let list = failed
        .iter()
        .map(|name| format!("  - {name}"))
        .collect::<Vec<_>>()
        .join("\n");
    Some(EmailMessage {
        subject: format!("Scraper Run Summary: {} failures", failed.len()),
        text: format!(
            "Scraper Run Summary\n\
             ==================\n\
             Successful Scrapers: {success}\n\
             Failed Scrapers: {}\n\
             Total Articles Synced: {total_articles}\n\
             \n\
             Failed:\n\
             {list}\n\
             \n\
             Timestamp: {}\n\
             Host: {host}",
            failed.len(),
            now.to_rfc3339()
        ),
    })
}

#[derive(Serialize)]
struct ResendPayload<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: &'a str,
}

#[derive(Debug, Clone)]
pub struct EmailNotifier {
    client: Client,
    api_key: String,
    to: String,
    host: String,
}

impl EmailNotifier {
    pub fn new(client: Client, api_key: String, to: String) -> Self {
        let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown host".to_string());
        Self {
            client,
            api_key,
            to,
            host,
        }
    }

    #[instrument(level = "info", skip_all, fields(subject = %email.subject))]
    async fn send(&self, email: &EmailMessage) {
        let payload = ResendPayload {
            from: FROM,
            to: [&self.to],
            subject: &email.subject,
            text: &email.text,
        };
        let res = self
            .client
            .post(RESEND_ENDPOINT)
            .bearer_auth(&self.api_key)
            .timeout(SEND_TIMEOUT)
            .json(&payload)
            .send()
            .await;

        match res {
            Ok(rsp) if rsp.status().is_success() => info!("Alert email sent"),
            Ok(rsp) => {
                let status = rsp.status();
                let body = rsp.text().await.unwrap_or_default();
                warn!(%status, body = %truncate_for_log(&body, 300), "Alert email rejected");
            }
            Err(e) => warn!(error = %e, "Failed to send alert email"),
        }
    }
}

impl Notifier for EmailNotifier {
    async fn alert_failure(&self, source: &str, message: &str, failures: u32, backoff_hours: u64) {
        let email = failure_message(source, message, failures, backoff_hours, Utc::now(), &self.host);
        self.send(&email).await;
    }

    async fn alert_summary(&self, success: usize, failed: &[String], total_articles: usize) {
        if let Some(email) = summary_message(success, failed, total_articles, Utc::now(), &self.host) {
            self.send(&email).await;
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    async fn alert_failure(&self, source: &str, _message: &str, failures: u32, _backoff_hours: u64) {
        debug!(source, failures, "Alerting not configured; skipping failure email");
    }

    async fn alert_summary(&self, _success: usize, failed: &[String], _total_articles: usize) {
        debug!(failed = failed.len(), "Alerting not configured; skipping summary email");
    }
}

/// Notifier chosen at startup.
#[derive(Debug, Clone)]
pub enum Alerts {
    Email(EmailNotifier),
    Noop(NoopNotifier),
}

impl Alerts {
    /// Email when both the API key and recipient are set, otherwise no-op.
    pub fn from_settings(client: Client, api_key: Option<String>, to: Option<String>) -> Self {
        match (api_key.filter(|k| !k.is_empty()), to.filter(|t| !t.is_empty())) {
            (Some(key), Some(to)) => {
                info!(%to, "Email alerts enabled");
                Alerts::Email(EmailNotifier::new(client, key, to))
            }
            _ => {
                warn!("RESEND_API_KEY or ALERT_EMAIL not configured; alert emails disabled");
                Alerts::Noop(NoopNotifier)
            }
        }
    }
}

impl Notifier for Alerts {
    async fn alert_failure(&self, source: &str, message: &str, failures: u32, backoff_hours: u64) {
        match self {
            Alerts::Email(n) => n.alert_failure(source, message, failures, backoff_hours).await,
            Alerts::Noop(n) => n.alert_failure(source, message, failures, backoff_hours).await,
        }
    }

    async fn alert_summary(&self, success: usize, failed: &[String], total_articles: usize) {
        match self {
            Alerts::Email(n) => n.alert_summary(success, failed, total_articles).await,
            Alerts::Noop(n) => n.alert_summary(success, failed, total_articles).await,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::Notifier;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Sent {
        Failure {
            source: String,
            failures: u32,
            backoff_hours: u64,
        },
        Summary {
            success: usize,
            failed: Vec<String>,
            total: usize,
        },
    }

    /// Records every call.
    #[derive(Debug, Default)]
    pub struct RecordingNotifier {
        pub sent: Mutex<Vec<Sent>>,
    }

    impl Notifier for RecordingNotifier {
        async fn alert_failure(&self, source: &str, _message: &str, failures: u32, backoff_hours: u64) {
            self.sent.lock().unwrap().push(Sent::Failure {
                source: source.to_string(),
                failures,
                backoff_hours,
            });
        }

        async fn alert_summary(&self, success: usize, failed: &[String], total_articles: usize) {
            self.sent.lock().unwrap().push(Sent::Summary {
                success,
                failed: failed.to_vec(),
                total: total_articles,
            });
        }
    }
}
