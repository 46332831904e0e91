//! Error types for scraping, persistence and startup.
//!
//! Only [`InitError`] is allowed to reach `main`; every other error is caught
//! at its boundary and turned into a status record or a log line.

use thiserror::Error;

/// Failure of a single fetch, render or parse step.
#[derive(Error, Debug)]
pub enum ScrapeError {
    /// The page did not finish loading within its timeout.
    #[error("page load timed out after {0}ms")]
    LoadTimeout(u64),

    /// The renderer could not reach or navigate to the target.
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// The rendering backend itself misbehaved (browser crash, CDP error).
    #[error("renderer error: {0}")]
    Render(String),

    /// Transport-level HTTP failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    /// Feed or document could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// A configured selector is not valid CSS.
    #[error("invalid selector `{0}`")]
    Selector(String),
}

/// Failure talking to the article store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Backing connection could not be established.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store answered but refused the write.
    #[error("store rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

/// Startup failure; the process exits non-zero.
#[derive(Error, Debug)]
pub enum InitError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("store initialization failed: {0}")]
    Store(String),

    #[error("unknown source `{name}` (known: {known})")]
    UnknownSource { name: String, known: String },
}
