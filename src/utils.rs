//! Utility functions for text shaping, recency formatting and file system checks.
//!
//! This module provides helper functions used throughout the daemon:
//! - Summary and content truncation with the fixed caps
//! - Whitespace collapsing and tag stripping for scraped text
//! - Recency strings for feed timestamps and `datetime` attributes
//! - Uptime formatting for statistics
//! - File system validation for the file-backed store

use chrono::{DateTime, Duration, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::io;
use std::time::Duration as StdDuration;
use tokio::fs;
use tracing::{info, instrument};

/// Maximum summary length before the ellipsis marker is appended.
pub const SUMMARY_MAX_CHARS: usize = 150;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>?").unwrap());

/// Cap a summary at [`SUMMARY_MAX_CHARS`] characters, appending `...` when cut.
///
/// Inputs at or under the cap are returned verbatim.
pub fn truncate_summary(s: &str) -> String {
    if s.chars().count() <= SUMMARY_MAX_CHARS {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(SUMMARY_MAX_CHARS).collect();
        out.push_str("...");
        out
    }
}

/// Keep at most `max` characters of `s`.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to `max` characters with an ellipsis and
/// byte count indicator appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…(+{} bytes)", &s[..idx], s.len() - idx),
        None => s.to_string(),
    }
}

/// Collapse runs of whitespace into single spaces and trim the ends.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Remove markup tags from feed descriptions.
pub fn strip_tags(s: &str) -> String {
    TAG_RE.replace_all(s, "").to_string()
}

/// Parse the timestamp formats seen in feeds and `datetime` attributes.
///
/// Accepts RFC 3339, RFC 2822 and bare `YYYY-MM-DD` dates (taken as midnight UTC).
///
/// # Arguments
///
/// * `raw` - A `pubDate` value or `datetime` attribute; surrounding whitespace is ignored.
///
/// # Returns
///
/// The instant in UTC, or `None` when `raw` is empty or in no accepted format.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Render a publication timestamp as a short recency string.
///
/// Under an hour (or in the future) is `Just now`, then hours, then days up
/// to a week, after which the calendar date is used.
///
/// # Arguments
///
/// * `published` - When the item was published.
/// * `now` - Reference time, passed in so callers and tests agree on one clock.
///
/// # Returns
///
/// `Just now`, `N hours ago`, `N days ago` or a date like `Oct 09, 2026`.
pub fn format_recency(published: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let age = now.signed_duration_since(published);
    if age < Duration::hours(1) {
        "Just now".to_string()
    } else if age < Duration::hours(24) {
        plural_ago(age.num_hours(), "hour")
    } else if age < Duration::days(7) {
        plural_ago(age.num_days(), "day")
    } else {
        published.format("%b %d, %Y").to_string()
    }
}

fn plural_ago(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("1 {unit} ago")
    } else {
        format!("{n} {unit}s ago")
    }
}

/// Format an uptime as `Hh Mm Ss`.
pub fn format_uptime(elapsed: StdDuration) -> String {
    let total = elapsed.as_secs();
    format!("{}h {}m {}s", total / 3600, (total / 60) % 60, total % 60)
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if it doesn't exist, then performs a write test by
/// creating and immediately deleting a probe file.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or is not writable
/// (permission denied, read-only filesystem, etc.).
#[instrument(level = "info", skip_all, fields(path = %path))]
pub async fn ensure_writable_dir(path: &str) -> io::Result<()> {
    fs::create_dir_all(path).await?;
    let probe_path = format!("{}/..__probe_write__", path.trim_end_matches('/'));
    fs::write(&probe_path, b"").await?;
    let _ = fs::remove_file(&probe_path).await;
    info!("Data directory is writable");
    Ok(())
}
